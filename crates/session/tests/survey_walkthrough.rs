use std::sync::Arc;

use session::{advance, enter_page, initialize_session, select_item, SurveyContext, DEFAULT_TIME_ZONE};
use shared::{
    domain::{PageNumber, ParticipantId},
    protocol::AdvanceOutcome,
};
use storage::{Catalog, CsvChoiceLog, Storage, MAX_PAGES};

const METADATA: &str = r#"[
    {"id": 1, "page": 1, "vid_id": "dQw4w9WgXcQ", "title": "First, with comma", "channel": "C1"},
    {"id": 2, "page": 1, "vid_id": "9bZkp7q19f0", "title": "Second", "channel": "C2"},
    {"id": 3, "page": 2, "vid_id": "kJQP7kiw5Fk", "title": "Third", "channel": "C3"},
    {"id": 4, "page": 2, "vid_id": "JGwWNGJdvx8", "title": "Fourth", "channel": "C4"},
    {"id": 5, "page": 3, "vid_id": "OPf0YbXqDm0", "title": "Fifth", "channel": "C5"},
    {"id": 6, "page": 3, "vid_id": "RgKAFK5djSk", "title": "Sixth", "channel": "C6"}
]"#;

async fn walk_every_page(ctx: &SurveyContext, participant: &str) {
    let started = initialize_session(ctx, ParticipantId::from(participant)).expect("session");
    loop {
        let view = enter_page(ctx, started.session_id).expect("page");
        if view.completed {
            break;
        }
        let first_shown = view.items[0].item.id.clone();
        select_item(ctx, started.session_id, view.page, &first_shown).expect("select");

        // A double click on Continue must not produce a second row.
        let outcome = advance(ctx, started.session_id, view.page).await.expect("advance");
        advance(ctx, started.session_id, view.page).await.expect("advance");
        if matches!(outcome, AdvanceOutcome::Completed { .. }) {
            break;
        }
    }
}

#[tokio::test]
async fn two_participants_fill_a_shared_csv_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("choices_log.csv");
    let catalog = Catalog::from_json_str(METADATA, MAX_PAGES).expect("catalog");
    let ctx = SurveyContext::new(
        catalog,
        Arc::new(CsvChoiceLog::new(&log_path)),
        DEFAULT_TIME_ZONE,
        None,
    );

    walk_every_page(&ctx, "R_one").await;
    walk_every_page(&ctx, "R_two").await;

    let mut reader = csv::Reader::from_path(&log_path).expect("reader");
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["timestamp_et", "participant_id", "page", "video_id", "video_title", "video_vid_id"]
    );
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.expect("row")).collect();
    assert_eq!(rows.len(), 6);
    for (index, row) in rows.iter().enumerate() {
        let participant = if index < 3 { "R_one" } else { "R_two" };
        assert_eq!(&row[1], participant);
        assert_eq!(&row[2], ((index % 3) + 1).to_string().as_str());
        assert_eq!(row[0].len(), "2025-01-01 00:00:00".len());
    }
}

#[tokio::test]
async fn sqlite_log_keeps_assignment_metadata() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let catalog = Catalog::from_json_str(METADATA, MAX_PAGES).expect("catalog");
    let ctx = SurveyContext::new(catalog, Arc::new(storage.clone()), DEFAULT_TIME_ZONE, Some(7));

    walk_every_page(&ctx, "R_sql").await;

    let stored = storage.list_choices(Some("R_sql")).await.expect("list");
    assert_eq!(stored.len(), 3);
    for choice in stored {
        let record = choice.record;
        let control = record.control_internal_id.expect("control");
        let treated = record.treated_internal_id.expect("treated");
        assert_ne!(control, treated);
        assert!(record.treated_image_congruency.is_some());
        assert!(record.treated_text_congruency.is_some());
        assert!(record.chosen_internal_id == control || record.chosen_internal_id == treated);
        assert!(record.page >= PageNumber(1));
    }
}
