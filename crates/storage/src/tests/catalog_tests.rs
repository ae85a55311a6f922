use super::*;

fn record(id: &str, page: u32) -> String {
    format!(
        r#"{{"id":"{id}","page":{page},"vid_id":"vid-{id}","title":"Video {id}","channel":"Chan","duration":"3:21","views":"1.2M views","years":"2 years ago","profile":"https://example.com/{id}.png"}}"#
    )
}

#[test]
fn groups_items_by_page_in_sorted_order() {
    let raw = format!(
        "[{},{},{},{}]",
        record("b1", 2),
        record("a1", 1),
        record("b2", 2),
        record("a2", 1)
    );
    let catalog = Catalog::from_json_str(&raw, MAX_PAGES).expect("catalog");

    assert_eq!(catalog.pages(), &[PageNumber(1), PageNumber(2)]);
    let page_one: Vec<&str> = catalog
        .items_on(PageNumber(1))
        .iter()
        .map(|item| item.id.as_str())
        .collect();
    assert_eq!(page_one, vec!["a1", "a2"]);
    assert_eq!(catalog.items_on(PageNumber(2))[0].title, "Video b1");
    assert!(catalog.warnings().is_empty());
}

#[test]
fn missing_page_defaults_to_first_page_and_integer_ids_are_accepted() {
    let raw = r#"[{"id": 7, "vid_id": "abc"}, {"id": "8", "vid_id": "def"}]"#;
    let catalog = Catalog::from_json_str(raw, MAX_PAGES).expect("catalog");

    assert_eq!(catalog.pages(), &[PageNumber(1)]);
    let items = catalog.items_on(PageNumber(1));
    assert_eq!(items[0].id, ItemId::from("7"));
    assert_eq!(items[0].title, "");
}

#[test]
fn truncates_walk_to_max_pages() {
    let records: Vec<String> = (1..=12)
        .flat_map(|page| vec![record(&format!("p{page}a"), page), record(&format!("p{page}b"), page)])
        .collect();
    let raw = format!("[{}]", records.join(","));
    let catalog = Catalog::from_json_str(&raw, MAX_PAGES).expect("catalog");

    assert_eq!(catalog.pages().len(), 10);
    assert_eq!(catalog.last_page(), Some(PageNumber(10)));
    assert!(catalog.items_on(PageNumber(11)).is_empty());
    assert!(catalog.warnings().contains(&CatalogWarning::PagesTruncated {
        dropped: vec![PageNumber(11), PageNumber(12)],
    }));
}

#[test]
fn odd_item_count_is_a_warning_not_an_error() {
    let raw = format!("[{},{},{}]", record("a1", 1), record("a2", 1), record("a3", 1));
    let catalog = Catalog::from_json_str(&raw, MAX_PAGES).expect("catalog");

    assert_eq!(catalog.items_on(PageNumber(1)).len(), 3);
    assert_eq!(
        catalog.warnings(),
        &[CatalogWarning::UnexpectedItemCount {
            page: PageNumber(1),
            count: 3
        }]
    );
    assert!(catalog
        .page_warning(PageNumber(1))
        .expect("warning")
        .contains("found 3"));
}

#[test]
fn non_positive_pages_are_dropped_from_the_walk() {
    let raw = format!("[{},{},{}]", record("z", 0), record("a1", 1), record("a2", 1));
    let catalog = Catalog::from_json_str(&raw, MAX_PAGES).expect("catalog");

    assert_eq!(catalog.pages(), &[PageNumber(1)]);
    assert_eq!(catalog.item_count(), 2);
    assert!(matches!(
        catalog.warnings()[0],
        CatalogWarning::PageOutOfRange { page: 0, .. }
    ));
}

#[test]
fn empty_metadata_yields_zero_pages() {
    let catalog = Catalog::from_json_str("[]", MAX_PAGES).expect("catalog");
    assert!(catalog.is_empty());
    assert_eq!(catalog.last_page(), None);
}

#[test]
fn rejects_duplicate_and_incomplete_records() {
    let duplicate = format!("[{},{}]", record("a1", 1), record("a1", 2));
    assert!(matches!(
        Catalog::from_json_str(&duplicate, MAX_PAGES),
        Err(CatalogError::DuplicateId(id)) if id.as_str() == "a1"
    ));

    let no_id = r#"[{"vid_id": "abc"}]"#;
    assert!(matches!(
        Catalog::from_json_str(no_id, MAX_PAGES),
        Err(CatalogError::MissingId { index: 0 })
    ));

    let no_vid = r#"[{"id": "a1"}]"#;
    assert!(matches!(
        Catalog::from_json_str(no_vid, MAX_PAGES),
        Err(CatalogError::MissingVidId { .. })
    ));

    assert!(matches!(
        Catalog::from_json_str("{\"not\": \"a list\"}", MAX_PAGES),
        Err(CatalogError::Parse(_))
    ));
}

#[test]
fn missing_file_is_reported_with_its_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("video_metadata.json");
    let err = Catalog::load(&path, MAX_PAGES).expect_err("should fail");
    assert!(err.to_string().contains("video_metadata.json"));
}

#[test]
fn loads_catalog_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("video_metadata.json");
    fs::write(&path, format!("[{},{}]", record("a1", 1), record("a2", 1))).expect("write");

    let catalog = Catalog::load(&path, MAX_PAGES).expect("catalog");
    assert_eq!(catalog.item_count(), 2);
}
