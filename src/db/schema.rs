/// SQL statements for creating the codeintel schema.
pub const CREATE_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    path TEXT NOT NULL,
    tip_commit TEXT,
    tip_updated_at TEXT
);

CREATE TABLE IF NOT EXISTS uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    commit_hash TEXT NOT NULL,
    root TEXT NOT NULL DEFAULT '',
    indexer TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'queued',
    failure_message TEXT,
    is_latest INTEGER NOT NULL DEFAULT 0,
    uploaded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    started_at TEXT,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS indexes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    commit_hash TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'queued',
    failure_message TEXT,
    queued_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    started_at TEXT,
    finished_at TEXT
);

-- Listing order: newest first, id as tie-break
CREATE INDEX IF NOT EXISTS idx_uploads_order ON uploads(uploaded_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_indexes_order ON indexes(queued_at DESC, id DESC);
-- Resolution snapshot: completed latest uploads of one repository
CREATE INDEX IF NOT EXISTS idx_uploads_visible ON uploads(repository_id, state, is_latest);
CREATE INDEX IF NOT EXISTS idx_uploads_scope ON uploads(repository_id, commit_hash, indexer, root);
";

/// Current timestamp expression, millisecond precision, sorts lexicographically.
pub const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";
