//! # Avatar Caching infrastructure
//!
//! Avatars are looked up on remote origins that are slow and rate limited, and a repository
//! history shows the same handful of authors over and over again. Every lookup thus goes through
//! the [`FetchDedupCache`], which consists of two layers:
//!
//! - A [`PersistentStore`] that keeps the outcome of the last completed fetch per [`CacheKey`],
//!   including failed fetches.
//! - An in-memory map of running fetches, which is used for request coalescing
//!   (deduplicating concurrent accesses).
//!
//! A cache request goes through the following steps:
//! - First, the [`CacheEntry`] is read from the persistent store.
//! - If there is an entry that does not need to be retried, it is used.
//! - Otherwise, if a fetch for the same key is already running, its result is awaited.
//! - Otherwise, a fresh fetch is spawned and registered for other callers to join.
//! - The outcome of the fetch is written to the persistent store.
//!
//! ## [`CacheEntry`]
//!
//! An entry records whether the fetch succeeded, the fetched value if any, and when the fetch
//! completed. There are three kinds of entries:
//!
//! - positive: The fetch succeeded and produced a value. These are used indefinitely.
//! - negative: The fetch succeeded but there is nothing to be found, for example a user without
//!   an avatar. These are used indefinitely as well, asking again would not change the answer.
//! - failed: The fetch failed, for example because of network problems or rate limiting. These
//!   are retried once they are older than the configured
//!   [`retry_failures_after`](crate::config::AvatarCacheConfig::retry_failures_after) window.
//!
//! Only positive entries with a [usable](CacheItem::is_usable) value are ever handed out to
//! callers, everything else is reported as `None`.
//!
//! ## Request coalescing
//!
//! A running fetch is shared with all callers for the same key. Checking for a running fetch and
//! registering a new one happens under a lock without any suspension point in between, so at most
//! one fetch per key is started within one process. Fetches older than
//! [`reuse_in_flight_for`](crate::config::AvatarCacheConfig::reuse_in_flight_for) are considered
//! abandoned, and a new fetch is started instead of joining them.
//!
//! Fetches are spawned onto the runtime and always run to completion, there is no timeout on the
//! fetch itself.
//!
//! ## Errors
//!
//! Callers never see errors. Failed fetches are logged and cached as failed entries.
//! Failing to read from the persistent store is logged and treated as a cache miss, failing to
//! write to it is logged and the result of the fetch is still returned.
//!
//! ## [`CacheKey`]
//!
//! The [`CacheKey`] is used both as the key for the in-memory map and the persistent store.
//! It contains some human-readable (but not necessarily machine-readable) metadata, describing
//! the entity the cached item belongs to.
//!
//! The [`CacheKeyBuilder`] provides a [`std::fmt::Write`] interface with other helper methods to
//! construct the human-readable metadata. This metadata is then SHA256-hashed to form the
//! filename for the file-system store.
//!
//! **NOTE**: Care must be taken to make sure that this metadata is stable, as it would otherwise
//! lead to bad cache reuse.
//!
//! ## Metrics
//!
//! - `avatars.access`: All accesses.
//! - `avatars.store.hit`: Accesses served by the persistent store, tagged with the entry `status`.
//! - `avatars.inflight.hit`: Accesses that joined an already running fetch.
//! - `avatars.computation`: Actual fetches being run.
//! - `avatars.fetch.duration`: How long fetches took, tagged with the resulting `status`.
//! - `avatars.store.write`: Entries written to the store, tagged with their `status`.
//! - `avatars.store.error`: Failed store accesses, tagged with the `op`.
//! - `avatars.inflight`: The number of registered fetches.

mod cache_key;
mod clock;
mod dedup;
mod entry;
mod error;
mod fs;
mod memory;
mod store;

pub use cache_key::{CacheKey, CacheKeyBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::FetchDedupCache;
pub use entry::{CacheEntry, CacheItem};
pub use error::StoreError;
pub use fs::{FS_STORE_VERSION, FsStore};
pub use memory::MemoryStore;
pub use store::PersistentStore;
