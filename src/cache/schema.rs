//! On-disk layout of the response cache.
//!
//! Both tables are read directly by external tooling; column names are
//! part of the contract.

pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    key           TEXT PRIMARY KEY,
    prompt        TEXT NOT NULL,
    system_prompt TEXT,
    model         TEXT NOT NULL,
    response      TEXT NOT NULL,
    created_at    INTEGER NOT NULL,
    temperature   REAL,
    top_p         REAL,
    max_length    INTEGER,
    compressed    INTEGER NOT NULL DEFAULT 0,
    owner_scope   TEXT
);

CREATE INDEX IF NOT EXISTS idx_response_cache_created_at
    ON response_cache(created_at);

CREATE TABLE IF NOT EXISTS cache_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT
);
"#;

pub const META_TTL_SECONDS: &str = "ttl_seconds";
pub const META_HITS: &str = "hits";
pub const META_MISSES: &str = "misses";
pub const META_COMPRESSION: &str = "compression_enabled";
