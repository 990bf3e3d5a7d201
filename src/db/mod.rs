//! Relational store module (SQLite).
//!
//! Holds `users`, `candidates`, `comments` and `reminders` tables keyed by UUID
//! and broadcasts row changes to subscribers.

mod realtime;
mod repository;

pub use realtime::*;
pub use repository::*;

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

/// Open (creating if needed) the SQLite file and bring the schema up to date.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Idempotent `CREATE ... IF NOT EXISTS` schema.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL DEFAULT '',
            full_name TEXT NOT NULL DEFAULT '',
            role TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_login TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS candidates (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL DEFAULT '',
            phone TEXT,
            position TEXT,
            location TEXT,
            source TEXT,
            status TEXT NOT NULL,
            applied_at TEXT NOT NULL,
            start_date TEXT,
            notes TEXT,
            last_update TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            extra TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id TEXT NOT NULL,
            candidate_id TEXT NOT NULL REFERENCES candidates(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            author TEXT NOT NULL,
            comment_type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            edited_at TEXT,
            PRIMARY KEY (candidate_id, id)
        );

        CREATE TABLE IF NOT EXISTS reminders (
            id TEXT NOT NULL,
            candidate_id TEXT NOT NULL REFERENCES candidates(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            due_date TEXT NOT NULL,
            priority TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (candidate_id, id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Status filter, list ordering and per-candidate child lookups
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_candidates_status ON candidates(status);
        CREATE INDEX IF NOT EXISTS idx_candidates_last_update ON candidates(last_update);
        CREATE INDEX IF NOT EXISTS idx_comments_candidate ON comments(candidate_id, position);
        CREATE INDEX IF NOT EXISTS idx_reminders_candidate ON reminders(candidate_id, position);
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
