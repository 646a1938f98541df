use harvester_core::{ExtractionError, FieldPath, PageExtractor, RecordLayout};
use pretty_assertions::assert_eq;
use serde_json::json;

fn ids(records: &[serde_json::Value]) -> Vec<i64> {
    records.iter().filter_map(|r| r["id"].as_i64()).collect()
}

#[test]
fn record_list_is_found_under_data_entities_or_root() {
    let extractor = PageExtractor::default();

    let under_data = json!({ "data": [{ "id": 1 }, { "id": 2 }], "meta": { "total": 2 } });
    let under_entities = json!({ "entities": [{ "id": 3 }] });
    let top_level = json!([{ "id": 4 }, { "id": 5 }, { "id": 6 }]);

    assert_eq!(ids(extractor.extract(&under_data)), vec![1, 2]);
    assert_eq!(ids(extractor.extract(&under_entities)), vec![3]);
    assert_eq!(ids(extractor.extract(&top_level)), vec![4, 5, 6]);
}

#[test]
fn data_object_is_skipped_in_favour_of_later_candidates() {
    let extractor = PageExtractor::default();
    let body = json!({ "data": { "count": 0 }, "entities": [{ "id": 9 }] });

    assert_eq!(ids(extractor.extract(&body)), vec![9]);
}

#[test]
fn empty_list_is_an_answer_not_a_miss() {
    let extractor = PageExtractor::default();
    let body = json!({ "data": [], "entities": [{ "id": 1 }] });

    assert_eq!(extractor.try_extract(&body), Ok(&[][..]));
}

#[test]
fn nested_record_path_reaches_hotel_lists() {
    let extractor = PageExtractor::new(vec![FieldPath::parse("data.hotels").expect("path")]);
    let body = json!({
        "data": {
            "hotels": [{ "id": 11 }, { "id": 12 }],
            "navigationTokens": { "nextPage": "abc" }
        }
    });

    assert_eq!(ids(extractor.extract(&body)), vec![11, 12]);
}

#[test]
fn page_without_record_list_reports_candidates() {
    let extractor = PageExtractor::default();
    let body = json!({ "error": "captcha" });

    assert_eq!(
        extractor.try_extract(&body),
        Err(ExtractionError::NoRecordList {
            tried: vec!["data".to_string(), "entities".to_string(), "$".to_string()],
        })
    );
    assert!(extractor.extract(&body).is_empty());
}

#[test]
fn single_layout_treats_the_located_object_as_one_record() {
    let extractor =
        PageExtractor::new(vec![FieldPath::root()]).with_layout(RecordLayout::Single);
    let body = json!({ "ota_hotel_id": "baikal", "rates": [] });

    let records = extractor.try_extract(&body).expect("record");

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["ota_hotel_id"], "baikal");
    assert!(extractor.try_extract(&json!({})).is_err());
}
