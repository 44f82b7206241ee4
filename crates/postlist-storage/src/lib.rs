//! Local artifact storage and TTL result cache.
//!
//! Each request owns one directory under the work dir. Completed requests
//! are indexed by source key so repeat requests can be replayed until the
//! directory's TTL runs out.

pub mod cache;
pub mod error;
pub mod layout;

pub use cache::{CacheEntry, CacheHit, ResultCache, SweepReport, INDEX_FILE};
pub use error::{StorageError, StorageResult};
pub use layout::RequestDir;
