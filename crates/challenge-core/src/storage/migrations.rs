//! Database schema migrations for the challenge store.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: challenges, members and reset history.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS challenges (
            challenge_id          INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_user_id         INTEGER NOT NULL,
            title                 TEXT NOT NULL,
            description           TEXT NOT NULL DEFAULT '',
            category              TEXT NOT NULL DEFAULT '',
            target_days           INTEGER NOT NULL DEFAULT 0,
            max_participant_count INTEGER NOT NULL,
            is_private            INTEGER NOT NULL DEFAULT 0,
            start_date_time       TEXT,
            created_at            TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS members (
            member_id              INTEGER PRIMARY KEY AUTOINCREMENT,
            challenge_id           INTEGER NOT NULL
                REFERENCES challenges(challenge_id) ON DELETE CASCADE,
            user_id                INTEGER NOT NULL,
            joined_at              TEXT NOT NULL,
            recent_reset_date_time TEXT,
            UNIQUE (challenge_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS reset_records (
            reset_record_id   INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id         INTEGER NOT NULL
                REFERENCES members(member_id) ON DELETE CASCADE,
            reset_date_time   TEXT NOT NULL,
            record_in_seconds INTEGER NOT NULL CHECK (record_in_seconds >= 0),
            content           TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_members_user ON members(user_id);
        CREATE INDEX IF NOT EXISTS idx_reset_records_member ON reset_records(member_id, reset_date_time);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: start reasons.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS start_reasons (
            reason_id  INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id  INTEGER NOT NULL
                REFERENCES members(member_id) ON DELETE CASCADE,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_start_reasons_member ON start_reasons(member_id);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}
