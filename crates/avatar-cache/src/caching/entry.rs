use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An item that can be kept in a [`FetchDedupCache`](super::FetchDedupCache).
pub trait CacheItem: 'static + Send + Sync + Clone {
    /// Whether this item is worth handing out to callers.
    ///
    /// An item that is not usable is still cached like any other successful result,
    /// it is just never returned.
    fn is_usable(&self) -> bool {
        true
    }
}

impl CacheItem for String {}

/// The persisted outcome of the last completed fetch for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// The fetched value, if the fetch succeeded and produced one.
    pub value: Option<T>,
    /// Whether the fetch completed without an error.
    pub succeeded: bool,
    /// Whether the fetch should be attempted again once this entry is old enough.
    ///
    /// This is only ever set for failed fetches.
    pub retry: bool,
    /// When the fetch completed.
    pub recorded_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Creates an entry for a fetch that completed without error, with or without a value.
    ///
    /// These entries are never retried.
    pub fn success(value: Option<T>, recorded_at: DateTime<Utc>) -> Self {
        Self {
            value,
            succeeded: true,
            retry: false,
            recorded_at,
        }
    }

    /// Creates an entry for a fetch that failed.
    pub fn failure(recorded_at: DateTime<Utc>) -> Self {
        Self {
            value: None,
            succeeded: false,
            retry: true,
            recorded_at,
        }
    }

    /// Returns `true` if this entry is a failure that is older than `retry_after`.
    pub fn needs_retry(&self, now: DateTime<Utc>, retry_after: Duration) -> bool {
        self.retry && elapsed(self.recorded_at, now) > retry_after
    }

    /// A short description of this entry, used to tag metrics.
    pub fn status(&self) -> &'static str {
        match (self.succeeded, &self.value) {
            (true, Some(_)) => "positive",
            (true, None) => "negative",
            (false, _) => "failed",
        }
    }
}

impl<T: CacheItem> CacheEntry<T> {
    /// Consumes the entry and returns its value if it is fit to be handed out.
    pub fn into_value(self) -> Option<T> {
        if !self.succeeded {
            return None;
        }
        self.value.filter(T::is_usable)
    }
}

/// Returns the time elapsed between `since` and `now`.
///
/// Timestamps in the future (for example due to clock adjustments) count as no time elapsed.
pub(crate) fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(since)
        .to_std()
        .unwrap_or_default()
}
