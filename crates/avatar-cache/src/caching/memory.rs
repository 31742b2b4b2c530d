use std::fmt;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::{CacheEntry, CacheItem, CacheKey, PersistentStore, StoreError};

/// A [`PersistentStore`] that keeps entries in process memory.
///
/// Entries survive for the lifetime of the store, unless the store runs over its capacity and
/// evicts entries it considers least useful.
#[derive(Clone)]
pub struct MemoryStore<T> {
    entries: moka::future::Cache<CacheKey, CacheEntry<T>>,
}

impl<T: CacheItem> MemoryStore<T> {
    /// Creates a store holding at most `capacity` entries.
    pub fn new(capacity: u64) -> Self {
        let entries = moka::future::Cache::builder()
            .max_capacity(capacity)
            .name("avatars")
            .build();
        Self { entries }
    }

    /// Returns the number of stored entries.
    ///
    /// This is an approximation, as moka applies pending writes lazily.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl<T: CacheItem> fmt::Debug for MemoryStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entry_count", &self.entry_count())
            .finish()
    }
}

impl<T: CacheItem> PersistentStore<T> for MemoryStore<T> {
    fn has<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<bool, StoreError>> {
        let contains = self.entries.contains_key(key);
        async move { Ok(contains) }.boxed()
    }

    fn get<'a>(
        &'a self,
        key: &'a CacheKey,
    ) -> BoxFuture<'a, Result<Option<CacheEntry<T>>, StoreError>> {
        async move { Ok(self.entries.get(key).await) }.boxed()
    }

    fn set<'a>(
        &'a self,
        key: &'a CacheKey,
        entry: CacheEntry<T>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            self.entries.insert(key.clone(), entry).await;
            Ok(())
        }
        .boxed()
    }
}
