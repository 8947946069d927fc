//! Ledger behavior against a real on-disk SQLite database.

use tempfile::TempDir;

use doc_relay::ledger::{Ledger, RemoveOutcome};
use doc_relay::migrate::run_migrations;
use doc_relay::models::{file_id, IndexStatus};

async fn ledger_in(tmp: &TempDir) -> Ledger {
    let ledger = Ledger::connect(&tmp.path().join("ledger.db")).await.unwrap();
    run_migrations(ledger.pool()).await.unwrap();
    ledger
}

#[tokio::test]
async fn record_indexed_creates_a_row() {
    let tmp = TempDir::new().unwrap();
    let ledger = ledger_in(&tmp).await;

    let id = file_id("docs/report.pdf");
    ledger
        .record_indexed(
            &id,
            &["c1".to_string(), "c2".to_string()],
            "report.pdf",
            "docs/report.pdf",
            Some("finance"),
            4,
        )
        .await
        .unwrap();

    let entry = ledger.get(&id).await.unwrap().unwrap();
    assert_eq!(entry.current_status, IndexStatus::Indexed);
    assert_eq!(entry.filename, "report.pdf");
    assert_eq!(entry.sourcefile, "docs/report.pdf");
    assert_eq!(entry.category.as_deref(), Some("finance"));
    assert_eq!(entry.pages, 4);
    assert_eq!(entry.chunk_ids, vec!["c1", "c2"]);
    assert_eq!(entry.history.len(), 1);
    assert_eq!(entry.history[0].action, "INDEXED");
}

#[tokio::test]
async fn record_indexed_is_idempotent_with_appended_history() {
    let tmp = TempDir::new().unwrap();
    let ledger = ledger_in(&tmp).await;

    let id = file_id("docs/report.pdf");
    ledger
        .record_indexed(&id, &["c1".to_string()], "report.pdf", "docs/report.pdf", None, 2)
        .await
        .unwrap();
    ledger
        .record_indexed(
            &id,
            &["c1-v2".to_string(), "c2-v2".to_string()],
            "report.pdf",
            "docs/report.pdf",
            None,
            3,
        )
        .await
        .unwrap();

    let entry = ledger.get(&id).await.unwrap().unwrap();
    assert_eq!(entry.current_status, IndexStatus::Indexed);
    assert_eq!(entry.chunk_ids, vec!["c1-v2", "c2-v2"]);
    assert_eq!(entry.pages, 3);
    assert_eq!(entry.history.len(), 2);
    assert!(entry.history.iter().all(|h| h.action == "INDEXED"));
}

#[tokio::test]
async fn category_is_set_on_creation_only() {
    let tmp = TempDir::new().unwrap();
    let ledger = ledger_in(&tmp).await;

    let id = file_id("a.pdf");
    ledger
        .record_indexed(&id, &[], "a.pdf", "a.pdf", Some("legal"), 1)
        .await
        .unwrap();
    ledger
        .record_indexed(&id, &[], "a.pdf", "a.pdf", Some("finance"), 1)
        .await
        .unwrap();

    let entry = ledger.get(&id).await.unwrap().unwrap();
    assert_eq!(entry.category.as_deref(), Some("legal"));
}

#[tokio::test]
async fn record_removed_transitions_and_clears_chunks() {
    let tmp = TempDir::new().unwrap();
    let ledger = ledger_in(&tmp).await;

    let id = file_id("docs/report.pdf");
    ledger
        .record_indexed(
            &id,
            &["c1".to_string(), "c2".to_string()],
            "report.pdf",
            "docs/report.pdf",
            None,
            4,
        )
        .await
        .unwrap();

    let outcome = ledger.record_removed("docs/report.pdf").await.unwrap();
    assert_eq!(outcome, RemoveOutcome::Removed);

    let entry = ledger.get(&id).await.unwrap().unwrap();
    assert_eq!(entry.current_status, IndexStatus::Removed);
    assert!(entry.chunk_ids.is_empty());
    assert_eq!(entry.pages, 0);
    assert_eq!(entry.history.len(), 2);
    assert_eq!(entry.history[1].action, "REMOVED");
    // Rows are never deleted.
    assert_eq!(ledger.find_by_sourcefile("docs/report.pdf").await.unwrap().len(), 1);
}

#[tokio::test]
async fn remove_of_unknown_sourcefile_is_reported_not_raised() {
    let tmp = TempDir::new().unwrap();
    let ledger = ledger_in(&tmp).await;

    let outcome = ledger.record_removed("never-seen.pdf").await.unwrap();
    assert_eq!(outcome, RemoveOutcome::NotFoundOrAmbiguous(0));
}

#[tokio::test]
async fn ambiguous_remove_leaves_the_ledger_unchanged() {
    let tmp = TempDir::new().unwrap();
    let ledger = ledger_in(&tmp).await;

    // Two distinct ids sharing a sourcefile.
    ledger
        .record_indexed(&file_id("a"), &[], "dup.pdf", "dup.pdf", None, 1)
        .await
        .unwrap();
    ledger
        .record_indexed(&file_id("b"), &[], "dup.pdf", "dup.pdf", None, 1)
        .await
        .unwrap();

    let outcome = ledger.record_removed("dup.pdf").await.unwrap();
    assert_eq!(outcome, RemoveOutcome::NotFoundOrAmbiguous(2));

    for entry in ledger.find_by_sourcefile("dup.pdf").await.unwrap() {
        assert_eq!(entry.current_status, IndexStatus::Indexed);
        assert_eq!(entry.history.len(), 1);
    }
}

#[tokio::test]
async fn failure_notes_accumulate_per_blob_url() {
    let tmp = TempDir::new().unwrap();
    let ledger = ledger_in(&tmp).await;

    let url = "https://acct.blob.core.windows.net/content/bad.pdf";
    ledger
        .record_failure_note(url, "Failure: indexing routine failed: boom")
        .await
        .unwrap();
    ledger
        .record_failure_note(url, "Failure: indexing routine failed: again")
        .await
        .unwrap();

    let notes = ledger.failure_notes(url).await.unwrap();
    assert_eq!(notes.len(), 2);
    assert!(notes[0].ends_with("boom"));
    assert!(notes[1].ends_with("again"));

    assert!(ledger.failure_notes("https://other/url").await.unwrap().is_empty());
}
