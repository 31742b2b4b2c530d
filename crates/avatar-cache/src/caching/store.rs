use std::sync::Arc;

use futures::future::BoxFuture;

use super::{CacheEntry, CacheKey, StoreError};

/// Durable storage for [`CacheEntry`]s.
///
/// Implementations are expected to serialize concurrent access to the same key, with the last
/// write winning. No other transactional guarantees are required.
pub trait PersistentStore<T>: 'static + Send + Sync {
    /// Checks whether an entry exists for `key`.
    fn has<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Loads the entry for `key`, if there is one.
    fn get<'a>(
        &'a self,
        key: &'a CacheKey,
    ) -> BoxFuture<'a, Result<Option<CacheEntry<T>>, StoreError>>;

    /// Stores `entry` under `key`, replacing any previous entry.
    fn set<'a>(
        &'a self,
        key: &'a CacheKey,
        entry: CacheEntry<T>,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

impl<T, S> PersistentStore<T> for Arc<S>
where
    S: PersistentStore<T> + ?Sized,
{
    fn has<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<bool, StoreError>> {
        (**self).has(key)
    }

    fn get<'a>(
        &'a self,
        key: &'a CacheKey,
    ) -> BoxFuture<'a, Result<Option<CacheEntry<T>>, StoreError>> {
        (**self).get(key)
    }

    fn set<'a>(
        &'a self,
        key: &'a CacheKey,
        entry: CacheEntry<T>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).set(key, entry)
    }
}
