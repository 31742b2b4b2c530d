use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use avatar_cache::avatars::{
    ActionedUser, Avatar, AvatarFetcher, AvatarProvider, FetchError, OriginType,
};
use avatar_cache::caching::{
    CacheKey, FS_STORE_VERSION, FetchDedupCache, FsStore, ManualClock, PersistentStore,
};
use avatar_cache::config::Config;
use chrono::{DateTime, TimeZone, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;

pub use avatar_cache_test as test;

/// Creates a config with the file-system store enabled.
///
/// The returned [`TempDir`](test::TempDir) holds the cache directory, keep it as guard until the
/// test has finished.
pub fn setup_config(update_config: impl FnOnce(&mut Config)) -> (Config, test::TempDir) {
    test::setup();

    let cache_dir = test::tempdir();
    let mut config = Config {
        cache_dir: Some(cache_dir.path().to_owned()),
        ..Default::default()
    };
    update_config(&mut config);

    (config, cache_dir)
}

/// The point in time all tests using a [`ManualClock`] start at.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Creates a provider backed by the file-system store, with time controlled by `clock`.
pub fn provider_with_clock(
    origin: OriginType,
    fetcher: Arc<dyn AvatarFetcher>,
    config: &Config,
    clock: &ManualClock,
) -> AvatarProvider {
    let dir = format!("avatars/{origin}");
    let store: Arc<dyn PersistentStore<Avatar>> =
        Arc::new(FsStore::from_config(config, dir).unwrap().unwrap());
    let clock = Arc::new(clock.clone());
    let cache = FetchDedupCache::with_clock(store, &config.caches.avatars, clock);
    AvatarProvider::from_cache(origin, fetcher, cache, config)
}

/// Returns the file the avatar of `user` is persisted to.
pub fn entry_path(cache_dir: &Path, origin: OriginType, user: &ActionedUser) -> PathBuf {
    cache_dir
        .join("avatars")
        .join(origin.to_string())
        .join(CacheKey::for_user(user).cache_path(FS_STORE_VERSION))
}

/// An avatar as a hosting service would return it.
pub fn hosted_avatar(login: &str) -> Avatar {
    Avatar {
        name: login.to_owned(),
        email: String::new(),
        url: Some(format!("https://git.example.com/{login}")),
        avatar_url: Some(format!("https://avatars.example.com/{login}.png")),
    }
}

/// A fetcher with canned responses per email address.
///
/// Users without a canned response have no avatar.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Result<Option<Avatar>, FetchError>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Sets the response for lookups of `email`.
    pub fn respond(&self, email: &str, response: Result<Option<Avatar>, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(email.to_owned(), response);
    }

    /// Returns how often the avatar of `email` was looked up.
    pub fn calls(&self, email: &str) -> usize {
        self.calls.lock().unwrap().get(email).copied().unwrap_or(0)
    }

    /// Returns the total number of lookups.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl AvatarFetcher for ScriptedFetcher {
    fn fetch<'a>(
        &'a self,
        user: &'a ActionedUser,
        _proxy: &'a str,
    ) -> BoxFuture<'a, Result<Option<Avatar>, FetchError>> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(user.email.clone())
            .or_default() += 1;
        let response = self
            .responses
            .lock()
            .unwrap()
            .get(&user.email)
            .cloned()
            .unwrap_or(Ok(None));

        async move {
            // yield at least once, like a real request would
            tokio::task::yield_now().await;
            response
        }
        .boxed()
    }
}
