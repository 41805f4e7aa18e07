//! SQLite schema definitions
//!
//! Initial schema with all tables. Persists the Session Authenticator's (C2)
//! sessions and minimal per-activity result tables for the thin collaborator
//! surface. The Achievement Evaluator's (C5) unlocked-set is in-memory only
//! (see `data::mod`) and has no table here.
//! Activity-specific scoring logic lives with the activities themselves;
//! the core only needs enough of a row to publish a fan-out event and let
//! a client re-fetch a summary after reconnecting.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms INTEGER,
    success INTEGER NOT NULL DEFAULT 1
);

-- =============================================================================
-- 1. Sessions (Session Authenticator, C2)
-- =============================================================================
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    username TEXT NOT NULL,
    device_fingerprint TEXT,
    created_at INTEGER NOT NULL,
    last_activity INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
-- Supports the hourly sweep: active sessions ordered by expiry
CREATE INDEX IF NOT EXISTS idx_sessions_sweep ON sessions(active, expires_at);

-- =============================================================================
-- 2. Activity collaborator result tables (thin surface; scoring detail is
--    out of scope for the fan-out core)
-- =============================================================================
CREATE TABLE IF NOT EXISTS typing_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    wpm REAL NOT NULL,
    accuracy REAL NOT NULL,
    completed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_typing_results_user ON typing_results(user_id, completed_at);

CREATE TABLE IF NOT EXISTS math_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    problems_correct INTEGER NOT NULL,
    problems_total INTEGER NOT NULL,
    completed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_math_results_user ON math_results(user_id, completed_at);

CREATE TABLE IF NOT EXISTS piano_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    piece_name TEXT,
    duration_secs INTEGER NOT NULL,
    completed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_piano_sessions_user ON piano_sessions(user_id, completed_at);

CREATE TABLE IF NOT EXISTS reading_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    pages_read INTEGER NOT NULL,
    duration_secs INTEGER NOT NULL,
    completed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reading_sessions_user ON reading_sessions(user_id, completed_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn test_schema_version_is_positive() {
        assert!(SCHEMA_VERSION > 0);
    }

    #[test]
    #[allow(clippy::const_is_empty)]
    fn test_schema_is_not_empty() {
        assert!(!SCHEMA.is_empty());
    }

    #[test]
    fn test_schema_contains_required_tables() {
        let required_tables = [
            "schema_version",
            "schema_migrations",
            "sessions",
            "typing_results",
            "math_results",
            "piano_sessions",
            "reading_sessions",
        ];

        for table in required_tables {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "Schema missing table: {}",
                table
            );
        }
    }

    #[test]
    fn test_sessions_sweep_index_present() {
        assert!(SCHEMA.contains("idx_sessions_sweep"));
    }
}
