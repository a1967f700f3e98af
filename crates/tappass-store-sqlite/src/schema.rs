//! SQL schema for the TapPass SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Role and access level are stored as free text so that an out-of-set
-- value survives a round trip and is denied by the policy, not rejected here.
CREATE TABLE IF NOT EXISTS credentials (
    digital_id    TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    full_name     TEXT NOT NULL CHECK (length(trim(full_name)) > 0),
    role          TEXT NOT NULL,   -- 'admin' | 'employee' | 'student' | 'guest'
    access_level  TEXT NOT NULL,   -- 'full' | 'restricted' | 'visitor'
    department    TEXT,
    phone         TEXT,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL    -- ISO 8601 UTC; server-assigned
);

-- Access attempts are strictly append-only.
CREATE TABLE IF NOT EXISTS access_attempts (
    attempt_id          TEXT PRIMARY KEY,
    digital_id          TEXT NOT NULL,
    reader_id           TEXT NOT NULL,
    reader_operator_id  TEXT NOT NULL,
    granted             INTEGER NOT NULL,
    reason_code         TEXT NOT NULL,
    location            TEXT NOT NULL,
    timestamp           TEXT NOT NULL,   -- decision evaluation instant
    computed_granted    INTEGER,         -- set only for operator overrides
    computed_reason     TEXT,
    operator_note       TEXT
);

CREATE TRIGGER IF NOT EXISTS access_attempts_immutable
BEFORE UPDATE ON access_attempts
BEGIN
    SELECT RAISE(ABORT, 'access attempts are immutable');
END;

CREATE INDEX IF NOT EXISTS credentials_user_idx     ON credentials(user_id);
CREATE INDEX IF NOT EXISTS attempts_digital_id_idx  ON access_attempts(digital_id);
CREATE INDEX IF NOT EXISTS attempts_timestamp_idx   ON access_attempts(timestamp);

PRAGMA user_version = 1;
";
