use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::Instrument;

use crate::config::AvatarCacheConfig;

use super::entry::elapsed;
use super::{CacheEntry, CacheItem, CacheKey, Clock, PersistentStore, SystemClock};

type SharedEntry<T> = Shared<BoxFuture<'static, CacheEntry<T>>>;

/// A fetch that is running, or has completed within the reuse window.
struct InFlightEntry<T> {
    started_at: DateTime<Utc>,
    pending: SharedEntry<T>,
}

/// Caches the outcome of fetches in a [`PersistentStore`], and coalesces concurrent fetches
/// for the same key.
///
/// Successful fetches are cached forever, even if they did not produce a value.
/// Failed fetches are cached as well, and retried once they are older than
/// [`retry_failures_after`](AvatarCacheConfig::retry_failures_after).
///
/// A running fetch is shared with every caller asking for the same key for up to
/// [`reuse_in_flight_for`](AvatarCacheConfig::reuse_in_flight_for) after it was started.
pub struct FetchDedupCache<T, S: ?Sized = dyn PersistentStore<T>> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    retry_failures_after: Duration,
    reuse_in_flight_for: Duration,
    in_flight: Mutex<HashMap<CacheKey, InFlightEntry<T>>>,
}

impl<T, S: ?Sized> fmt::Debug for FetchDedupCache<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight = self
            .in_flight
            .try_lock()
            .map(|in_flight| in_flight.len())
            .unwrap_or_default();
        f.debug_struct("FetchDedupCache")
            .field("retry_failures_after", &self.retry_failures_after)
            .field("reuse_in_flight_for", &self.reuse_in_flight_for)
            .field("in-flight fetches", &in_flight)
            .finish()
    }
}

impl<T, S> FetchDedupCache<T, S>
where
    T: CacheItem,
    S: PersistentStore<T> + ?Sized,
{
    pub fn new(store: Arc<S>, config: &AvatarCacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Creates a cache that takes all its timestamps from `clock`.
    pub fn with_clock(store: Arc<S>, config: &AvatarCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retry_failures_after: config.retry_failures_after,
            reuse_in_flight_for: config.reuse_in_flight_for,
            in_flight: Default::default(),
        }
    }

    /// The store backing this cache.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The number of registered fetches, including completed ones that are still inside the
    /// reuse window.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the cached value for `key`, fetching it with `producer` if needed.
    ///
    /// The `producer` is only invoked if there is no cached entry for `key`, or the entry is a
    /// failure older than the retry window, and no fetch for `key` is currently running.
    ///
    /// Errors of the `producer` are never returned. They are logged, cached so that the fetch
    /// is retried later, and reported as `None`. Values that are not
    /// [usable](CacheItem::is_usable) are reported as `None` as well.
    pub async fn fetch<F, Fut, E>(&self, key: &CacheKey, producer: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        metric!(counter("avatars.access") += 1);

        if let Some(entry) = self.lookup(key).await {
            if !entry.needs_retry(self.clock.now(), self.retry_failures_after) {
                metric!(counter("avatars.store.hit") += 1, "status" => entry.status());
                return entry.into_value();
            }
            tracing::trace!(%key, "Retrying failed avatar fetch");
        }

        let pending = self.register(key, producer);
        pending.await.into_value()
    }

    /// Loads the entry for `key` from the store.
    ///
    /// Store errors are logged and treated like a missing entry.
    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let result = match self.store.has(key).await {
            Ok(false) => return None,
            Ok(true) => self.store.get(key).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(entry) => entry,
            Err(e) => {
                metric!(counter("avatars.store.error") += 1, "op" => "get");
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    %key,
                    "Failed to read avatar cache entry",
                );
                None
            }
        }
    }

    /// Joins the registered fetch for `key`, or starts and registers a new one.
    ///
    /// This must not suspend between looking up and registering the fetch, otherwise concurrent
    /// callers could start duplicate fetches.
    fn register<F, Fut, E>(&self, key: &CacheKey, producer: F) -> SharedEntry<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let now = self.clock.now();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = in_flight.get(key) {
            if self.is_reusable(entry, now) {
                metric!(counter("avatars.inflight.hit") += 1);
                return entry.pending.clone();
            }
            tracing::debug!(%key, "Discarding stale avatar fetch");
        }

        in_flight.retain(|_, entry| self.is_reusable(entry, now));

        let pending = self.spawn_fetch(key.clone(), producer);
        in_flight.insert(
            key.clone(),
            InFlightEntry {
                started_at: now,
                pending: pending.clone(),
            },
        );
        metric!(gauge("avatars.inflight") = in_flight.len() as u64);

        pending
    }

    /// Whether callers may still join `entry`.
    ///
    /// Completed fetches stay registered until they leave the reuse window, unless they failed
    /// and the failure is due for a retry.
    fn is_reusable(&self, entry: &InFlightEntry<T>, now: DateTime<Utc>) -> bool {
        if elapsed(entry.started_at, now) > self.reuse_in_flight_for {
            return false;
        }
        !entry
            .pending
            .peek()
            .is_some_and(|settled| settled.needs_retry(now, self.retry_failures_after))
    }

    /// Spawns the `producer` and persists its outcome.
    ///
    /// The fetch runs to completion even if all callers waiting for it go away.
    fn spawn_fetch<F, Fut, E>(&self, key: CacheKey, producer: F) -> SharedEntry<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        metric!(counter("avatars.computation") += 1);
        tracing::debug!(%key, "Fetching avatar");

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        // `producer` runs under the in-flight lock and must not access this cache.
        let fetch = panic::catch_unwind(AssertUnwindSafe(producer));

        let task = async move {
            let start = Instant::now();
            let outcome = match fetch {
                Ok(fetch) => AssertUnwindSafe(fetch).catch_unwind().await,
                Err(payload) => Err(payload),
            };
            let entry = match outcome {
                Ok(Ok(value)) => CacheEntry::success(value, clock.now()),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, %key, "Avatar fetch failed, retrying later");
                    CacheEntry::failure(clock.now())
                }
                Err(_) => {
                    tracing::error!(%key, "Avatar fetch panicked");
                    CacheEntry::failure(clock.now())
                }
            };
            metric!(timer("avatars.fetch.duration") = start.elapsed(), "status" => entry.status());

            persist(&*store, &key, entry.clone()).await;
            entry
        };
        let handle = tokio::spawn(task.in_current_span());

        let clock = Arc::clone(&self.clock);
        async move {
            match handle.await {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!(
                        error = &e as &dyn std::error::Error,
                        "Avatar fetch did not complete",
                    );
                    CacheEntry::failure(clock.now())
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Writes `entry` to the store.
///
/// Store errors are logged and otherwise ignored, the entry is still handed to all callers
/// waiting for it.
async fn persist<T, S>(store: &S, key: &CacheKey, entry: CacheEntry<T>)
where
    S: PersistentStore<T> + ?Sized,
{
    metric!(counter("avatars.store.write") += 1, "status" => entry.status());

    if let Err(e) = store.set(key, entry).await {
        metric!(counter("avatars.store.error") += 1, "op" => "set");
        tracing::error!(
            error = &e as &dyn std::error::Error,
            %key,
            "Failed to write avatar cache entry",
        );
    }
}
