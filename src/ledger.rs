//! Durable per-file indexing status ledger.
//!
//! One row per logical source file, keyed by the stable file id. Every
//! transition appends to the row's `history` column; rows are never
//! deleted. Writes are last-writer-wins optimistic replaces — there is no
//! conflict-retry loop, so two overlapping consumer batches updating the
//! same file id resolve to whichever write lands last.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::models::{HistoryEntry, IndexStatus, LedgerEntry};

/// Outcome of a remove-by-sourcefile lookup. Zero or multiple matches are
/// reported, not raised: the caller logs and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFoundOrAmbiguous(usize),
}

#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Open (creating if missing) the ledger database at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(RelayError::Ledger)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record a successful index of a file. Idempotent upsert: an existing
    /// row converges to the same final field values, with one history entry
    /// appended per call. `category` is set on creation only.
    pub async fn record_indexed(
        &self,
        file_id: &str,
        chunk_ids: &[String],
        filename: &str,
        sourcefile: &str,
        category: Option<&str>,
        pages: i64,
    ) -> Result<()> {
        info!(sourcefile, "Recording file indexed");
        let now = Utc::now();

        let mut history = self.history_for(file_id).await?;
        history.push(HistoryEntry {
            action: IndexStatus::Indexed.as_str().to_string(),
            timestamp: now,
        });

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, current_status, filename, sourcefile, category, pages, chunk_ids, last_modified, history)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                current_status = excluded.current_status,
                filename = excluded.filename,
                sourcefile = excluded.sourcefile,
                pages = excluded.pages,
                chunk_ids = excluded.chunk_ids,
                last_modified = excluded.last_modified,
                history = excluded.history
            "#,
        )
        .bind(file_id)
        .bind(IndexStatus::Indexed.as_str())
        .bind(filename)
        .bind(sourcefile)
        .bind(category)
        .bind(pages)
        .bind(serde_json::to_string(chunk_ids)?)
        .bind(now.to_rfc3339())
        .bind(serde_json::to_string(&history)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Transition the row matching `sourcefile` to `REMOVED`, clearing its
    /// chunk ids and pages. Expects exactly one match; otherwise logs and
    /// leaves the ledger unchanged.
    pub async fn record_removed(&self, sourcefile: &str) -> Result<RemoveOutcome> {
        let rows = sqlx::query("SELECT id, history FROM ledger_entries WHERE sourcefile = ?")
            .bind(sourcefile)
            .fetch_all(&self.pool)
            .await?;

        if rows.len() != 1 {
            error!(
                sourcefile,
                matches = rows.len(),
                "Expected exactly one ledger row for removal"
            );
            return Ok(RemoveOutcome::NotFoundOrAmbiguous(rows.len()));
        }

        let id: String = rows[0].try_get("id")?;
        let history_json: String = rows[0].try_get("history")?;
        let mut history: Vec<HistoryEntry> = serde_json::from_str(&history_json)?;

        let now = Utc::now();
        history.push(HistoryEntry {
            action: IndexStatus::Removed.as_str().to_string(),
            timestamp: now,
        });

        sqlx::query(
            r#"
            UPDATE ledger_entries
            SET current_status = ?, chunk_ids = '[]', pages = 0, last_modified = ?, history = ?
            WHERE id = ?
            "#,
        )
        .bind(IndexStatus::Removed.as_str())
        .bind(now.to_rfc3339())
        .bind(serde_json::to_string(&history)?)
        .bind(&id)
        .execute(&self.pool)
        .await?;

        info!(sourcefile, id = %id, "Ledger row marked removed");
        Ok(RemoveOutcome::Removed)
    }

    /// Best-effort audit note for a message that was dead-lettered. Callers
    /// log a failure of this write and never escalate it.
    pub async fn record_failure_note(&self, blob_url: &str, note: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO failure_notes (id, blob_url, note, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(blob_url)
        .bind(note)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Failure notes recorded for a blob URL, oldest first.
    pub async fn failure_notes(&self, blob_url: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT note FROM failure_notes WHERE blob_url = ? ORDER BY created_at ASC",
        )
        .bind(blob_url)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("note").map_err(RelayError::Ledger))
            .collect()
    }

    /// Fetch a row by stable file id.
    pub async fn get(&self, file_id: &str) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query("SELECT * FROM ledger_entries WHERE id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    /// Fetch all rows matching a sourcefile (normally zero or one).
    pub async fn find_by_sourcefile(&self, sourcefile: &str) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query("SELECT * FROM ledger_entries WHERE sourcefile = ?")
            .bind(sourcefile)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn history_for(&self, file_id: &str) -> Result<Vec<HistoryEntry>> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT history FROM ledger_entries WHERE id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
        match existing {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry> {
    let status_text: String = row.try_get("current_status")?;
    let current_status = IndexStatus::parse(&status_text).ok_or_else(|| {
        RelayError::Ledger(sqlx::Error::Decode(
            format!("unknown ledger status '{}'", status_text).into(),
        ))
    })?;

    let chunk_ids_json: String = row.try_get("chunk_ids")?;
    let history_json: String = row.try_get("history")?;
    let last_modified_text: String = row.try_get("last_modified")?;
    let last_modified = DateTime::parse_from_rfc3339(&last_modified_text)
        .map_err(|e| RelayError::Ledger(sqlx::Error::Decode(e.to_string().into())))?
        .with_timezone(&Utc);

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        current_status,
        filename: row.try_get("filename")?,
        sourcefile: row.try_get("sourcefile")?,
        category: row.try_get("category")?,
        pages: row.try_get("pages")?,
        chunk_ids: serde_json::from_str(&chunk_ids_json)?,
        last_modified,
        history: serde_json::from_str(&history_json)?,
    })
}
