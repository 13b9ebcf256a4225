//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- ============================================
    -- Canonical input: sessions and heartbeats
    -- ============================================

    CREATE TABLE IF NOT EXISTS sessions (
        session_id       TEXT PRIMARY KEY,
        member           TEXT NOT NULL,
        course           TEXT NOT NULL,
        chapter          TEXT,
        lesson           TEXT,
        start_time       DATETIME NOT NULL,
        end_time         DATETIME,
        active_time      INTEGER NOT NULL DEFAULT 0,
        end_reason       TEXT,

        -- Dedupe marker between live aggregation and reconciliation
        aggregated_at    DATETIME
    );

    CREATE TABLE IF NOT EXISTS heartbeats (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(session_id),
        member           TEXT NOT NULL,
        course           TEXT NOT NULL,
        unit_kind        TEXT NOT NULL,
        unit_id          TEXT NOT NULL,
        timestamp        DATETIME NOT NULL,
        is_focused       INTEGER NOT NULL DEFAULT 0,
        is_visible       INTEGER NOT NULL DEFAULT 0,
        idle_ms          INTEGER NOT NULL DEFAULT 0
    );

    -- ============================================
    -- Derived aggregates
    -- ============================================

    CREATE TABLE IF NOT EXISTS time_buckets (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        member           TEXT NOT NULL,
        member_name      TEXT,
        course           TEXT NOT NULL,
        course_name      TEXT,
        chapter          TEXT NOT NULL DEFAULT '',
        chapter_name     TEXT,
        lesson           TEXT NOT NULL DEFAULT '',
        lesson_name      TEXT,
        date             TEXT NOT NULL,
        active_time      INTEGER NOT NULL DEFAULT 0,
        sessions_count   INTEGER NOT NULL DEFAULT 0,

        UNIQUE(member, course, chapter, lesson, date)
    );

    -- ============================================
    -- Indexes
    -- ============================================

    CREATE INDEX IF NOT EXISTS idx_sessions_member ON sessions(member);
    CREATE INDEX IF NOT EXISTS idx_sessions_course ON sessions(course);
    CREATE INDEX IF NOT EXISTS idx_sessions_end_time ON sessions(end_time);
    CREATE INDEX IF NOT EXISTS idx_heartbeats_session_ts ON heartbeats(session_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_buckets_course_date ON time_buckets(course, date);
    CREATE INDEX IF NOT EXISTS idx_buckets_member ON time_buckets(member);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = ["sessions", "heartbeats", "time_buckets"];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_bucket_key_unique() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO time_buckets (member, course, chapter, lesson, date, active_time, sessions_count)
             VALUES ('jane@example.com', 'rust-101', '', '', '2026-03-14', 100, 1)",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO time_buckets (member, course, chapter, lesson, date, active_time, sessions_count)
             VALUES ('jane@example.com', 'rust-101', '', '', '2026-03-14', 50, 1)",
            [],
        );
        assert!(dup.is_err(), "duplicate bucket key should be rejected");
    }
}
