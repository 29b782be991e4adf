//! Persistent response cache.
//!
//! [`ResponseCache`] memoizes generated text in SQLite, keyed by
//! [`CacheKey`]. Entries expire `ttl_seconds` after they were written;
//! expired rows stay on disk until [`ResponseCache::sweep_expired`] removes
//! them, but are never served.
//!
//! # Degradation
//!
//! The cache is never allowed to fail a request. [`lookup`](ResponseCache::lookup)
//! returns `None` and [`store`](ResponseCache::store) becomes a no-op when the
//! database cannot be read or written; both log the underlying error.
//!
//! # Concurrency
//!
//! All access goes through one connection guarded by a mutex, and every
//! operation that touches more than one row runs in an immediate
//! transaction. Hit/miss counters are incremented inside the same
//! transaction as the read they account for, and `purge` deletes entries and
//! resets counters in one transaction, so no reader ever observes a
//! half-purged cache. Callers on an async runtime should invoke these
//! methods from `spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use tracing::{info, warn};

use super::clock::{Clock, SystemClock};
use super::codec;
use super::key::CacheKey;
use super::schema::{DDL, META_COMPRESSION, META_HITS, META_MISSES, META_TTL_SECONDS};
use crate::telemetry;
use crate::{Result, SwitchyardError};

/// Number of recent entries included in [`CacheStats`].
const RECENT_ENTRIES: usize = 5;

/// Prompt preview length in [`RecentEntry`].
const PROMPT_PREVIEW_CHARS: usize = 50;

/// Initial settings for a newly created cache database.
///
/// Values already persisted in `cache_metadata` win over these, so a
/// TTL changed at runtime survives a restart.
///
/// ```rust
/// # use switchyard::cache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .ttl(Duration::from_secs(3600))
///     .compression(true);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live for cached entries. Default: 24 hours.
    pub ttl: Duration,
    /// Whether new entries are compressed. Default: false.
    pub compression: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(86_400),
            compression: false,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable compression of new entries.
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }
}

/// Fields written alongside a cached response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub prompt: String,
    pub system_prompt: String,
    pub model: String,
    pub response: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_length: u32,
    pub owner_scope: Option<String>,
}

/// A persisted cache row, as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: String,
    /// Decoded response text.
    pub response: String,
    pub created_at: i64,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_length: Option<u32>,
    pub compressed: bool,
    pub owner_scope: Option<String>,
}

/// Snapshot of cache contents and counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub location: String,
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_seconds: i64,
    pub compression_enabled: bool,
    /// Total stored payload size in bytes.
    pub total_size: u64,
    pub avg_response_size: f64,
    pub recent_entries: Vec<RecentEntry>,
}

impl CacheStats {
    /// Stats reported when no cache is configured.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            location: String::new(),
            entries: 0,
            hits: 0,
            misses: 0,
            hit_rate: 0.0,
            ttl_seconds: 0,
            compression_enabled: false,
            total_size: 0,
            avg_response_size: 0.0,
            recent_entries: Vec::new(),
        }
    }
}

/// One of the most recently written entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentEntry {
    pub key: String,
    pub prompt: String,
    pub created_at: i64,
}

/// `hits / (hits + misses)`, or 0 when there were no lookups.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// SQLite-backed response cache. Cheap to clone.
#[derive(Clone)]
pub struct ResponseCache {
    conn: Arc<Mutex<Connection>>,
    location: Arc<str>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("location", &self.location)
            .finish()
    }
}

impl ResponseCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path, config: &CacheConfig) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SwitchyardError::CacheUnavailable(format!(
                    "cannot create cache directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        if let Err(e) =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        {
            warn!(error = %e, "could not enable WAL journal; continuing with default journal");
        }
        Self::init(conn, path.display().to_string(), config)
    }

    /// Create a cache backed by a private in-memory database.
    pub fn in_memory(config: &CacheConfig) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string(), config)
    }

    fn init(conn: Connection, location: String, config: &CacheConfig) -> Result<Self> {
        let ttl = i64::try_from(config.ttl.as_secs()).map_err(|_| {
            SwitchyardError::Configuration(format!(
                "cache TTL must be at most {} seconds",
                i64::MAX
            ))
        })?;
        if ttl == 0 {
            return Err(SwitchyardError::Configuration(
                "cache TTL must be at least one second".to_string(),
            ));
        }
        conn.execute_batch(DDL)?;
        let seed = [
            (META_TTL_SECONDS, ttl.to_string()),
            (META_HITS, "0".to_string()),
            (META_MISSES, "0".to_string()),
            (META_COMPRESSION, bool_text(config.compression).to_string()),
        ];
        for (key, value) in seed {
            conn.execute(
                "INSERT OR IGNORE INTO cache_metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        info!(location = %location, "response cache ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: location.into(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source (used to test expiry).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Where the database lives.
    pub fn location(&self) -> &str {
        &self.location
    }

    // ========================================================================
    // Request path (never fails)
    // ========================================================================

    /// Look up a live entry and count the hit or miss.
    ///
    /// A scoped lookup also accepts entries stored without an owner. An
    /// entry that cannot be decompressed is logged and counted as a miss.
    pub fn lookup(&self, key: &CacheKey, scope: Option<&str>) -> Option<String> {
        match self.try_lookup(key, scope) {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    fn try_lookup(&self, key: &CacheKey, scope: Option<&str>) -> Result<Option<String>> {
        let now = self.clock.now_secs();
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let ttl = read_ttl(&tx)?;

        let row = tx
            .query_row(
                "SELECT response, compressed FROM response_cache
                 WHERE key = ?1
                   AND ?2 - created_at <= ?3
                   AND (owner_scope IS NULL OR owner_scope IS ?4)",
                params![key.as_str(), now, ttl, scope],
                |row| Ok((payload_bytes(row.get_ref(0)?), row.get::<_, bool>(1)?)),
            )
            .optional()?;

        let text = match row {
            Some((bytes, compressed)) => match codec::decode_payload(bytes, compressed) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(key = %key, error = %e, "cached payload unreadable, treating as miss");
                    None
                }
            },
            None => None,
        };

        let counter = if text.is_some() { META_HITS } else { META_MISSES };
        tx.execute(
            "UPDATE cache_metadata SET value = CAST(value AS INTEGER) + 1 WHERE key = ?1",
            params![counter],
        )?;
        tx.commit()?;

        if text.is_some() {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        } else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        }
        Ok(text)
    }

    /// Insert or replace the entry for `key`.
    ///
    /// Compresses the payload when compression is enabled; if compression
    /// fails the payload is stored uncompressed instead.
    pub fn store(&self, key: &CacheKey, record: &CacheRecord) {
        if let Err(e) = self.try_store(key, record) {
            warn!(key = %key, error = %e, "cache write failed, entry dropped");
        }
    }

    fn try_store(&self, key: &CacheKey, record: &CacheRecord) -> Result<()> {
        let now = self.clock.now_secs();
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (payload, compressed) = if read_bool(&tx, META_COMPRESSION)? {
            match codec::compress(&record.response) {
                Ok(bytes) => (Value::Blob(bytes), true),
                Err(e) => {
                    warn!(key = %key, error = %e, "compression failed, storing uncompressed");
                    (Value::Text(record.response.clone()), false)
                }
            }
        } else {
            (Value::Text(record.response.clone()), false)
        };

        tx.execute(
            "INSERT OR REPLACE INTO response_cache (
                key, prompt, system_prompt, model, response, created_at,
                temperature, top_p, max_length, compressed, owner_scope
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                key.as_str(),
                record.prompt,
                record.system_prompt,
                record.model,
                payload,
                now,
                record.temperature,
                record.top_p,
                i64::from(record.max_length),
                compressed,
                record.owner_scope,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Delete every entry older than the TTL. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        match self.try_sweep() {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "swept expired cache entries");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "cache sweep failed");
                0
            }
        }
    }

    fn try_sweep(&self) -> Result<usize> {
        let now = self.clock.now_secs();
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let ttl = read_ttl(&tx)?;
        let removed = tx.execute(
            "DELETE FROM response_cache WHERE ?1 - created_at > ?2",
            params![now, ttl],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    /// Delete all entries and reset the hit/miss counters atomically.
    ///
    /// Returns `false`, leaving everything unchanged, if the transaction fails.
    pub fn purge(&self) -> bool {
        let result = (|| -> Result<()> {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute("DELETE FROM response_cache", [])?;
            tx.execute(
                "UPDATE cache_metadata SET value = '0' WHERE key IN (?1, ?2)",
                params![META_HITS, META_MISSES],
            )?;
            tx.commit()?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                info!("response cache purged");
                true
            }
            Err(e) => {
                warn!(error = %e, "cache purge failed");
                false
            }
        }
    }

    /// Change the TTL. Rejects non-positive values without touching state.
    pub fn set_ttl(&self, seconds: i64) -> bool {
        if seconds <= 0 {
            warn!(seconds, "rejected non-positive cache TTL");
            return false;
        }
        match self.write_meta(META_TTL_SECONDS, &seconds.to_string()) {
            Ok(()) => {
                info!(seconds, "cache TTL updated");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to update cache TTL");
                false
            }
        }
    }

    /// Enable or disable compression of future writes.
    ///
    /// Existing entries keep their stored encoding and stay readable.
    pub fn set_compression(&self, enabled: bool) -> bool {
        match self.write_meta(META_COMPRESSION, bool_text(enabled)) {
            Ok(()) => {
                info!(enabled, "cache compression updated");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to update cache compression");
                false
            }
        }
    }

    fn write_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Current TTL in seconds.
    pub fn ttl_seconds(&self) -> Result<i64> {
        let conn = self.lock()?;
        read_ttl(&conn)
    }

    /// Whether new writes are compressed.
    pub fn compression_enabled(&self) -> Result<bool> {
        let conn = self.lock()?;
        read_bool(&conn, META_COMPRESSION)
    }

    /// Read a stored row without counting a lookup. Expired rows are returned too.
    pub fn entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT key, prompt, system_prompt, model, response, created_at,
                        temperature, top_p, max_length, compressed, owner_scope
                 FROM response_cache WHERE key = ?1",
                params![key.as_str()],
                |row| {
                    Ok((
                        CacheEntry {
                            key: row.get(0)?,
                            prompt: row.get(1)?,
                            system_prompt: row.get(2)?,
                            model: row.get(3)?,
                            response: String::new(),
                            created_at: row.get(5)?,
                            temperature: row.get(6)?,
                            top_p: row.get(7)?,
                            max_length: row.get(8)?,
                            compressed: row.get(9)?,
                            owner_scope: row.get(10)?,
                        },
                        payload_bytes(row.get_ref(4)?),
                    ))
                },
            )
            .optional()?;
        match row {
            Some((mut entry, bytes)) => {
                entry.response = codec::decode_payload(bytes, entry.compressed)?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Counters, sizes, and the most recent entries.
    ///
    /// Read in one transaction, so the counters and entries always come
    /// from the same state of the database.
    pub fn stats(&self) -> Result<CacheStats> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let hits = read_u64(&tx, META_HITS)?;
        let misses = read_u64(&tx, META_MISSES)?;
        let ttl_seconds = read_ttl(&tx)?;
        let compression_enabled = read_bool(&tx, META_COMPRESSION)?;

        let (entries, total_size, avg_response_size): (i64, i64, f64) = tx.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(LENGTH(CAST(response AS BLOB))), 0),
                    COALESCE(AVG(LENGTH(CAST(response AS BLOB))), 0.0)
             FROM response_cache",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let recent_entries = {
            let mut stmt = tx.prepare(
                "SELECT key, prompt, created_at FROM response_cache
                 ORDER BY created_at DESC LIMIT ?1",
            )?;
            stmt.query_map(params![RECENT_ENTRIES as i64], |row| {
                Ok(RecentEntry {
                    key: row.get(0)?,
                    prompt: preview(&row.get::<_, String>(1)?),
                    created_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
        };
        tx.commit()?;

        Ok(CacheStats {
            enabled: true,
            location: self.location.to_string(),
            entries: entries as u64,
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
            ttl_seconds,
            compression_enabled,
            total_size: total_size as u64,
            avg_response_size,
            recent_entries,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SwitchyardError::CacheUnavailable(format!("connection lock poisoned: {e}")))
    }
}

fn read_meta(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row(
        "SELECT value FROM cache_metadata WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .ok_or_else(|| SwitchyardError::CacheUnavailable(format!("metadata '{key}' missing")))
}

fn read_u64(conn: &Connection, key: &str) -> Result<u64> {
    let value = read_meta(conn, key)?;
    value.trim().parse().map_err(|_| {
        SwitchyardError::CacheUnavailable(format!("metadata '{key}' is not a number: {value}"))
    })
}

/// The persisted TTL, which must be a positive `i64`.
fn read_ttl(conn: &Connection) -> Result<i64> {
    let value = read_meta(conn, META_TTL_SECONDS)?;
    match value.trim().parse::<i64>() {
        Ok(ttl) if ttl > 0 => Ok(ttl),
        _ => Err(SwitchyardError::CacheUnavailable(format!(
            "metadata '{META_TTL_SECONDS}' is not a positive number: {value}"
        ))),
    }
}

fn read_bool(conn: &Connection, key: &str) -> Result<bool> {
    Ok(matches!(read_meta(conn, key)?.trim(), "1" | "true"))
}

fn bool_text(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn payload_bytes(value: ValueRef<'_>) -> Vec<u8> {
    match value {
        ValueRef::Text(t) => t.to_vec(),
        ValueRef::Blob(b) => b.to_vec(),
        _ => Vec::new(),
    }
}

fn preview(prompt: &str) -> String {
    if prompt.chars().count() > PROMPT_PREVIEW_CHARS {
        let head: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        prompt.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_zero_without_lookups() {
        assert_eq!(hit_rate(0, 0), 0.0);
        assert_eq!(hit_rate(1, 3), 0.25);
    }

    #[test]
    fn preview_truncates_long_prompts() {
        let long = "x".repeat(60);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(50)));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn zero_ttl_is_rejected_at_open() {
        let err = ResponseCache::in_memory(&CacheConfig::new().ttl(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, SwitchyardError::Configuration(_)));
    }

    #[test]
    fn ttl_beyond_i64_is_rejected_at_open() {
        let err = ResponseCache::in_memory(&CacheConfig::new().ttl(Duration::MAX)).unwrap_err();
        assert!(matches!(err, SwitchyardError::Configuration(_)));
    }

    #[test]
    fn bool_meta_round_trip() {
        assert_eq!(bool_text(true), "1");
        assert_eq!(bool_text(false), "0");
    }
}
