use sqlx::SqlitePool;

use crate::error::Result;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS work_metadata (
        rjcode        TEXT PRIMARY KEY,
        work_name     TEXT NOT NULL,
        maker_id      TEXT NOT NULL,
        maker_name    TEXT NOT NULL,
        release_date  TEXT NOT NULL,
        series_id     TEXT,
        series_name   TEXT,
        age_category  TEXT NOT NULL,
        tags          TEXT NOT NULL,
        cvs           TEXT NOT NULL,
        cover_url     TEXT NOT NULL,
        cached_at     TEXT NOT NULL,
        expires_at    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS library_snapshot (
        rjcode      TEXT PRIMARY KEY,
        folder_path TEXT NOT NULL,
        folder_size INTEGER NOT NULL,
        file_count  INTEGER NOT NULL,
        scanned_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conflict_works (
        id                TEXT PRIMARY KEY,
        task_id           TEXT NOT NULL,
        rjcode            TEXT NOT NULL,
        conflict_type     TEXT NOT NULL,
        existing_path     TEXT NOT NULL,
        new_path          TEXT NOT NULL,
        new_metadata      TEXT NOT NULL,
        status            TEXT NOT NULL DEFAULT 'PENDING',
        linked_works_info TEXT NOT NULL,
        analysis_info     TEXT NOT NULL,
        related_rjcodes   TEXT NOT NULL,
        created_at        TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_conflict_rjcode_status
        ON conflict_works (rjcode, status)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS processed_archives (
        id            TEXT PRIMARY KEY,
        original_path TEXT NOT NULL,
        current_path  TEXT NOT NULL,
        filename      TEXT NOT NULL,
        rjcode        TEXT,
        file_size     INTEGER NOT NULL,
        processed_at  TEXT NOT NULL,
        process_count INTEGER NOT NULL DEFAULT 1,
        task_id       TEXT,
        status        TEXT NOT NULL DEFAULT 'completed'
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_processed_filename
        ON processed_archives (filename)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS password_entries (
        id           TEXT PRIMARY KEY,
        rjcode       TEXT,
        filename     TEXT,
        password     TEXT NOT NULL,
        description  TEXT,
        source       TEXT NOT NULL DEFAULT 'manual',
        use_count    INTEGER NOT NULL DEFAULT 0,
        last_used_at TEXT,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_password_rjcode ON password_entries (rjcode)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_password_filename ON password_entries (filename)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS work_linkages (
        original_rjcode TEXT NOT NULL,
        linked_rjcode   TEXT NOT NULL,
        work_type       TEXT NOT NULL,
        lang            TEXT NOT NULL,
        cached_at       TEXT NOT NULL,
        expires_at      TEXT NOT NULL,
        PRIMARY KEY (original_rjcode, linked_rjcode)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS existing_folder_cache (
        folder_path    TEXT PRIMARY KEY,
        folder_name    TEXT NOT NULL,
        rjcode         TEXT,
        duplicate_info TEXT,
        file_count     INTEGER NOT NULL DEFAULT 0,
        folder_size    INTEGER NOT NULL DEFAULT 0,
        cached_at      TEXT NOT NULL,
        updated_at     TEXT NOT NULL,
        needs_refresh  INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS password_cleanup_logs (
        id                        TEXT PRIMARY KEY,
        deleted_count             INTEGER NOT NULL,
        config_snapshot           TEXT NOT NULL,
        deleted_passwords_summary TEXT NOT NULL,
        created_at                TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS processed_archive_cleanup_logs (
        id                       TEXT PRIMARY KEY,
        deleted_count            INTEGER NOT NULL,
        freed_space_bytes        INTEGER NOT NULL,
        config_snapshot          TEXT NOT NULL,
        deleted_archives_summary TEXT NOT NULL,
        created_at               TEXT NOT NULL
    )
    "#,
];

/// Create any missing tables. Idempotent; runs at every pool open.
pub async fn bootstrap(pool: &SqlitePool) -> Result<()> {
    for statement in TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
