//! Persistent resource content cache with timestamp-based staleness.

mod cache;
mod entry;
mod error;
mod store;

pub use cache::{FetchOutcome, ResourceCache, CONTENT_PREFIX, LAST_MODIFIED_PREFIX};
pub use entry::{classify_content, CacheEntry, Content, SNIFF_PREFIX_BYTES};
pub use error::CacheError;
pub use store::{record_file_name, FileKvStore, KvStore, MemoryKvStore};
