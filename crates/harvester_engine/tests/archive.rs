use std::fs;

use harvester_core::{Cursor, Position, RawPage, SourceConfig};
use harvester_engine::{load_archive, ArchiveError, RawPageArchive};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

fn rooms_config(hotel: &str) -> SourceConfig {
    serde_json::from_value(json!({
        "name": "ostrovok rooms",
        "endpoint": "https://ostrovok.example/hotel/search/v1/site/hp/rates",
        "request_body": r#"{"hotel": "{hotel}"}"#,
        "vars": { "hotel": hotel },
        "pagination": { "LinkPresence": {} },
        "fields": [{ "name": "room", "path": "room_name" }],
    }))
    .expect("valid config")
}

fn cursor(page: u32) -> Cursor {
    Cursor::new(Position::Page(page))
}

#[test]
fn pages_keep_their_link_and_total_metadata() {
    let temp = TempDir::new().unwrap();
    let archive = RawPageArchive::new(temp.path(), &rooms_config("baikal_hotel"));
    let page = RawPage::new(json!({ "rates": [{ "room_name": "Standard" }] }))
        .with_next_link(false)
        .with_declared_total(1);

    let path = archive.store(&cursor(1), &page).expect("stored");

    assert!(path.to_string_lossy().ends_with("--0000.page.json"));
    let runs = load_archive(temp.path(), "ostrovok rooms").expect("loaded");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].pages, vec![page]);
}

#[test]
fn each_hotel_of_a_batch_is_its_own_run() {
    let temp = TempDir::new().unwrap();
    for hotel in ["angara", "baikal_hotel"] {
        RawPageArchive::new(temp.path(), &rooms_config(hotel))
            .store(&cursor(1), &RawPage::new(json!({ "hotel": hotel })))
            .expect("stored");
    }

    let runs = load_archive(temp.path(), "ostrovok rooms").expect("loaded");

    assert_eq!(runs.len(), 2);
    let mut hotels: Vec<_> = runs.iter().map(|run| run.pages[0].body["hotel"].clone()).collect();
    hotels.sort_by_key(ToString::to_string);
    assert_eq!(hotels, vec![json!("angara"), json!("baikal_hotel")]);
}

#[test]
fn other_sources_and_files_are_left_out() {
    let temp = TempDir::new().unwrap();
    RawPageArchive::new(temp.path(), &rooms_config("angara"))
        .store(&cursor(1), &RawPage::new(json!([])))
        .expect("stored");
    fs::write(temp.path().join("notes.txt"), "not a page").unwrap();

    assert!(load_archive(temp.path(), "tvil").expect("loaded").is_empty());
    assert_eq!(load_archive(temp.path(), "ostrovok rooms").expect("loaded").len(), 1);
}

#[test]
fn foreign_page_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("stray.page.json"), r#"{"body": []}"#).unwrap();

    let err = load_archive(temp.path(), "tvil").unwrap_err();

    assert!(matches!(err, ArchiveError::NotAPage { .. }));
}

#[test]
fn missing_archive_directory_is_an_io_error() {
    let temp = TempDir::new().unwrap();

    let err = load_archive(&temp.path().join("absent"), "tvil").unwrap_err();

    assert!(matches!(err, ArchiveError::Io { .. }));
}
