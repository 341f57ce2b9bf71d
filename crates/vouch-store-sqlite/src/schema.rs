//! SQL schema for the session store.

/// The full schema, applied idempotently on startup.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS subjects (
    subject_id    TEXT PRIMARY KEY,  -- UUID, hyphenated
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    document_id   TEXT NOT NULL,
    document_type TEXT,
    nationality   TEXT,
    date_of_birth TEXT               -- ISO 8601 calendar date
);

-- One verification attempt per row. external_id stays NULL while the
-- session is provisional, is immutable once set, and no two rows ever
-- share one. Statuses are the canonical lowercase labels.
CREATE TABLE IF NOT EXISTS sessions (
    session_id  TEXT PRIMARY KEY,    -- UUID, hyphenated
    external_id TEXT UNIQUE,
    subject_id  TEXT NOT NULL UNIQUE REFERENCES subjects(subject_id),
    status      TEXT NOT NULL DEFAULT 'pending',
    created_at  TEXT NOT NULL,       -- RFC 3339, UTC
    updated_at  TEXT NOT NULL        -- RFC 3339, UTC
);

CREATE INDEX IF NOT EXISTS subjects_document_idx ON subjects(document_id);
CREATE INDEX IF NOT EXISTS sessions_created_idx  ON sessions(created_at);

PRAGMA user_version = 1;
";
