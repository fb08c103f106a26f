/// Schema for cache stores and worker registration state.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named cache store, in creation order
CREATE TABLE IF NOT EXISTS cache_stores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Captured responses keyed by request URL
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, url),
    FOREIGN KEY (cache_name) REFERENCES cache_stores(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_url ON cache_entries(url);

-- Worker versions known to the host
CREATE TABLE IF NOT EXISTS registrations (
    version TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    skip_waiting INTEGER NOT NULL DEFAULT 0,
    claimed INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);
"#;
