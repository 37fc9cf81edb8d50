//! `SQLite` schema definitions for smartvest.
//!
//! Records live as one JSON array in a named row of the `slots` table,
//! mirroring a browser's local key-value storage.

/// SQL statement to create the key-value slot table.
pub const CREATE_SLOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS slots (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Read a slot's value.
pub const SELECT_SLOT: &str = "SELECT value FROM slots WHERE key = ?1";

/// Replace a slot's value in one statement.
pub const UPSERT_SLOT: &str = r"
INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_SLOTS_TABLE, CREATE_METADATA_TABLE];
