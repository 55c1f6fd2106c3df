// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use anyhow::Result;

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Runtime settings (media root, transcoder stop marker)
    CREATE TABLE properties (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL DEFAULT ''
    );

    -- Top-level catalog directories
    CREATE TABLE categories (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        media_type TEXT NOT NULL CHECK (media_type IN ('movie', 'series', 'music'))
    );

    -- Catalog nodes (files and containers)
    CREATE TABLE metadata (
        id TEXT PRIMARY KEY,
        parent_id TEXT NOT NULL DEFAULT '',
        media_type TEXT NOT NULL CHECK (media_type IN ('file-video', 'file-audio', 'series', 'season', 'artist', 'album')),
        name_display TEXT NOT NULL,
        name_sort TEXT NOT NULL,
        streams TEXT NOT NULL DEFAULT '[]',
        duration INTEGER NOT NULL DEFAULT 0,
        size INTEGER NOT NULL DEFAULT 0
    );

    CREATE UNIQUE INDEX idx_metadata_parent_sort ON metadata(parent_id, name_sort);

    -- Raw sources awaiting (or done with) transcoding
    CREATE TABLE input_files (
        id TEXT PRIMARY KEY,
        source_location TEXT NOT NULL UNIQUE,
        source_streams TEXT NOT NULL DEFAULT '[]',
        stream_map TEXT NOT NULL DEFAULT '[]',
        source_duration INTEGER NOT NULL DEFAULT 0,
        time_scanned INTEGER NOT NULL DEFAULT 0,
        transcoding_command TEXT NOT NULL DEFAULT '',
        transcoding_time_started INTEGER NOT NULL DEFAULT 0,
        transcoding_time_elapsed INTEGER NOT NULL DEFAULT 0,
        transcoding_error TEXT NOT NULL DEFAULT ''
    );

    CREATE INDEX idx_input_files_pending ON input_files(transcoding_time_started, transcoding_error);
    "#,

    // Migration 2: Category ordering
    r#"
    ALTER TABLE categories ADD COLUMN sort_index INTEGER NOT NULL DEFAULT 9999;
    "#,

    // Migration 3: Source container format (used by the copy fast path)
    r#"
    ALTER TABLE input_files ADD COLUMN source_format TEXT NOT NULL DEFAULT '';
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    // Refuse to open a DB created by a newer build
    if current_version > target_version {
        anyhow::bail!(
            "Database schema version {} is newer than this build supports (max {}). Please upgrade reelvault.",
            current_version,
            target_version
        );
    }

    if current_version == target_version {
        return Ok(());
    }

    // Apply pending migrations one-by-one
    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        conn.execute_batch(migration)?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;

        log::info!("Applied migration {}", migration_version);
    }

    Ok(())
}

/// Get current schema version
pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}
