//! Response caching.
//!
//! - [`ResponseCache`] persists generated text in SQLite so identical
//!   requests are answered without generating again.
//! - [`CacheKey`] derives the lookup key from every field that affects the
//!   output.
//! - [`codec`] compresses payloads when compression is enabled.
//!
//! The cache is an accelerator only: every failure inside it degrades to a
//! miss (or a dropped write) and is logged, never surfaced to the caller.

mod clock;
pub mod codec;
mod key;
pub mod response;
mod schema;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{CacheKey, KeyParts};
pub use response::{
    CacheConfig, CacheEntry, CacheRecord, CacheStats, RecentEntry, ResponseCache, hit_rate,
};
