use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::caching::{CacheKey, FetchDedupCache, FsStore, MemoryStore, PersistentStore};
use crate::config::Config;

use super::{ActionedUser, Avatar, AvatarFetcher, OriginType};

/// Answers avatar lookups for one [`OriginType`].
///
/// Lookups are cached per user and concurrent lookups for the same user are coalesced, see
/// [`FetchDedupCache`]. The actual lookup is done by the [`AvatarFetcher`].
pub struct AvatarProvider {
    origin: OriginType,
    fetcher: Arc<dyn AvatarFetcher>,
    cache: FetchDedupCache<Avatar>,
    proxy: Arc<str>,
}

impl fmt::Debug for AvatarProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvatarProvider")
            .field("origin", &self.origin)
            .field("cache", &self.cache)
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl AvatarProvider {
    pub fn new(
        origin: OriginType,
        fetcher: Arc<dyn AvatarFetcher>,
        store: Arc<dyn PersistentStore<Avatar>>,
        config: &Config,
    ) -> Self {
        Self::from_cache(
            origin,
            fetcher,
            FetchDedupCache::new(store, &config.caches.avatars),
            config,
        )
    }

    /// Creates a provider around an existing `cache`.
    ///
    /// This allows sharing a store between providers, or using a custom
    /// [`Clock`](crate::caching::Clock).
    pub fn from_cache(
        origin: OriginType,
        fetcher: Arc<dyn AvatarFetcher>,
        cache: FetchDedupCache<Avatar>,
        config: &Config,
    ) -> Self {
        Self {
            origin,
            fetcher,
            cache,
            proxy: config.proxy().into(),
        }
    }

    /// Creates a provider with the store chosen by `config`.
    ///
    /// With a [`cache_dir`](Config::cache_dir) configured, avatars are persisted to the file
    /// system in a directory per origin. Otherwise they are only kept in memory.
    pub fn from_config(
        origin: OriginType,
        fetcher: Arc<dyn AvatarFetcher>,
        config: &Config,
    ) -> io::Result<Self> {
        let dir = Path::new("avatars").join(origin.to_string());
        let store: Arc<dyn PersistentStore<Avatar>> = match FsStore::from_config(config, dir)? {
            Some(store) => Arc::new(store),
            None => Arc::new(MemoryStore::new(config.caches.avatars.in_memory_capacity)),
        };
        Ok(Self::new(origin, fetcher, store, config))
    }

    pub fn origin(&self) -> OriginType {
        self.origin
    }

    /// The cache backing this provider.
    pub fn cache(&self) -> &FetchDedupCache<Avatar> {
        &self.cache
    }

    /// Returns `true` if this provider serves avatars for repositories hosted on `origin`.
    pub fn supported(&self, origin: OriginType) -> bool {
        origin == self.origin
    }

    /// Looks up the avatar of `user`.
    ///
    /// Returns `None` if the user has no avatar image, or the lookup failed. Failed lookups are
    /// retried on later calls once they are old enough.
    ///
    /// The returned avatar always carries the name and email of `user`.
    #[tracing::instrument(skip_all, fields(origin = %self.origin))]
    pub async fn get_avatar(&self, user: &ActionedUser) -> Option<Avatar> {
        let key = CacheKey::for_user(user);
        let fetcher = Arc::clone(&self.fetcher);
        let proxy = Arc::clone(&self.proxy);
        let user = user.clone();

        self.cache
            .fetch(&key, move || async move {
                let avatar = fetcher.fetch(&user, &proxy).await?;
                Ok::<_, crate::avatars::FetchError>(avatar.map(|avatar| Avatar {
                    name: user.name,
                    email: user.email,
                    ..avatar
                }))
            })
            .await
    }
}

/// The set of [`AvatarProvider`]s, one per supported origin.
#[derive(Debug, Default)]
pub struct AvatarProviders {
    providers: Vec<AvatarProvider>,
}

impl AvatarProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `provider`.
    ///
    /// Providers are consulted in the order they were added, the first one supporting an origin
    /// wins.
    pub fn push(&mut self, provider: AvatarProvider) {
        self.providers.push(provider);
    }

    pub fn with_provider(mut self, provider: AvatarProvider) -> Self {
        self.push(provider);
        self
    }

    /// Returns the provider responsible for `origin`, if there is one.
    pub fn for_origin(&self, origin: OriginType) -> Option<&AvatarProvider> {
        self.providers.iter().find(|p| p.supported(origin))
    }

    /// Looks up the avatar of `user` with the provider responsible for `origin`.
    pub async fn get_avatar(&self, origin: OriginType, user: &ActionedUser) -> Option<Avatar> {
        let Some(provider) = self.for_origin(origin) else {
            tracing::debug!(%origin, "No avatar provider for origin");
            return None;
        };
        provider.get_avatar(user).await
    }
}
