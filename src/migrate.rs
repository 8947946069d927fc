use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per logical source file; removal is a status transition,
    // never a row deletion.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            id TEXT PRIMARY KEY,
            current_status TEXT NOT NULL,
            filename TEXT NOT NULL,
            sourcefile TEXT NOT NULL,
            category TEXT,
            pages INTEGER NOT NULL DEFAULT 0,
            chunk_ids TEXT NOT NULL DEFAULT '[]',
            last_modified TEXT NOT NULL,
            history TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS failure_notes (
            id TEXT PRIMARY KEY,
            blob_url TEXT NOT NULL,
            note TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ledger_sourcefile ON ledger_entries(sourcefile)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_failure_notes_blob_url ON failure_notes(blob_url)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
