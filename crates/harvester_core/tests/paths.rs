use harvester_core::{FieldPath, PathError, Segment};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn paths_parse_keys_indices_and_wildcards() {
    let path = FieldPath::parse("payment_options.payment_types[0].amount").expect("path");
    assert_eq!(
        path.segments(),
        &[
            Segment::Key("payment_options".to_string()),
            Segment::Key("payment_types".to_string()),
            Segment::Index(0),
            Segment::Key("amount".to_string()),
        ]
    );
    assert!(!path.is_anchored());

    let anchored: FieldPath = "$.ota_hotel_id".parse().expect("path");
    assert!(anchored.is_anchored());
    assert_eq!(anchored.to_string(), "$.ota_hotel_id");

    let root_index = FieldPath::parse("$[1]").expect("path");
    assert_eq!(root_index.segments(), &[Segment::Index(1)]);
}

#[test]
fn malformed_paths_are_rejected() {
    assert_eq!(FieldPath::parse("  "), Err(PathError::Empty));
    assert!(matches!(FieldPath::parse("a..b"), Err(PathError::EmptySegment(_))));
    assert!(matches!(FieldPath::parse("a[1"), Err(PathError::Unbalanced(_))));
    assert!(matches!(FieldPath::parse("a]"), Err(PathError::Unbalanced(_))));
    assert!(matches!(FieldPath::parse("a[one]"), Err(PathError::BadIndex { .. })));
}

#[test]
fn lookup_skips_blank_values_but_resolve_keeps_them() {
    let record = json!({ "title": "  ", "rooms": [], "rating": 0 });

    assert_eq!(FieldPath::key("title").lookup(&record), None);
    assert_eq!(FieldPath::key("rooms").lookup(&record), None);
    assert_eq!(FieldPath::key("rooms").resolve(&record), Some(&json!([])));
    assert_eq!(FieldPath::key("rating").lookup(&record), Some(&json!(0)));
    assert_eq!(FieldPath::key("missing").resolve(&record), None);
}

#[test]
fn wildcard_takes_first_non_empty_match() {
    let record = json!({ "policies": [{ "penalty": {} }, { "penalty": { "percent": 30 } }] });
    let path = FieldPath::parse("policies[*].penalty.percent").expect("path");

    assert_eq!(path.lookup(&record), Some(&json!(30)));
}

#[test]
fn list_levels_split_explosion_keys() {
    let levels = FieldPath::parse("rates[*].rooms[*]")
        .expect("path")
        .list_levels()
        .expect("levels");
    let rendered: Vec<String> = levels.iter().map(ToString::to_string).collect();

    assert_eq!(rendered, vec!["rates", "rooms"]);
    assert_eq!(FieldPath::parse("rates.rooms").expect("path").list_levels(), None);
    assert_eq!(FieldPath::parse("rates[*][*]").expect("path").list_levels(), None);
}
