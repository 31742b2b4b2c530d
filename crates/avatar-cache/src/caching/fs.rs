use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::config::Config;

use super::{CacheEntry, CacheItem, CacheKey, PersistentStore, StoreError};

/// The version of the on-disk format.
///
/// Entries are stored in a directory per version, so bumping this makes all previously written
/// entries invisible.
pub const FS_STORE_VERSION: u32 = 1;

/// A [`PersistentStore`] writing JSON encoded entries to the file system.
///
/// Each entry is written to a temporary file first, which is then atomically moved into place,
/// so readers never observe partially written entries.
#[derive(Debug)]
pub struct FsStore<T> {
    /// Directory holding the entries.
    cache_dir: PathBuf,
    /// Directory for temporary files, on the same file system as `cache_dir`.
    tmp_dir: PathBuf,
    _item: PhantomData<fn() -> T>,
}

impl<T> FsStore<T> {
    /// Creates a store in `cache_dir`, using `tmp_dir` for in-progress writes.
    ///
    /// Both directories are created if they do not exist.
    pub fn new(cache_dir: PathBuf, tmp_dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        std::fs::create_dir_all(&tmp_dir)?;

        Ok(Self {
            cache_dir,
            tmp_dir,
            _item: PhantomData,
        })
    }

    /// Creates the store in the `name` subdirectory of the configured [`Config::cache_dir`].
    ///
    /// Returns `None` if no cache directory is configured.
    pub fn from_config(config: &Config, name: impl AsRef<Path>) -> io::Result<Option<Self>> {
        let (Some(cache_dir), Some(tmp_dir)) = (config.cache_dir(name), config.cache_dir("tmp"))
        else {
            return Ok(None);
        };
        Self::new(cache_dir, tmp_dir).map(Some)
    }

    /// Returns the path of the file holding the entry for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.cache_path(FS_STORE_VERSION))
    }
}

impl<T> PersistentStore<T> for FsStore<T>
where
    T: CacheItem + Serialize + DeserializeOwned,
{
    fn has<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<bool, StoreError>> {
        let path = self.entry_path(key);
        async move { Ok(tokio::fs::try_exists(&path).await?) }.boxed()
    }

    fn get<'a>(
        &'a self,
        key: &'a CacheKey,
    ) -> BoxFuture<'a, Result<Option<CacheEntry<T>>, StoreError>> {
        let path = self.entry_path(key);
        async move {
            tracing::trace!("Trying avatar cache at path {}", path.display());
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Malformed(e.to_string()))
        }
        .boxed()
    }

    fn set<'a>(
        &'a self,
        key: &'a CacheKey,
        entry: CacheEntry<T>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let path = self.entry_path(key);
        let tmp_dir = self.tmp_dir.clone();
        async move {
            let bytes = serde_json::to_vec(&entry).map_err(StoreError::Serialization)?;

            tracing::trace!("Creating avatar cache entry at path {}", path.display());
            tokio::task::spawn_blocking(move || write_entry(&tmp_dir, &path, &bytes))
                .await
                .map_err(io::Error::other)??;
            Ok(())
        }
        .boxed()
    }
}

fn write_entry(tmp_dir: &Path, cache_path: &Path, bytes: &[u8]) -> io::Result<()> {
    std::fs::create_dir_all(tmp_dir)?;
    let mut temp_file = NamedTempFile::new_in(tmp_dir)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    persist_tempfile(temp_file, cache_path)?;
    Ok(())
}

fn persist_tempfile(
    mut temp_file: NamedTempFile,
    cache_path: &Path,
) -> std::io::Result<std::fs::File> {
    let parent = cache_path
        .parent()
        .ok_or_else(|| std::io::Error::other("no parent directory to persist item"))?;

    // Somebody could remove the parent directories while we are operating in them,
    // so retry the fs operations a couple of times.
    const MAX_RETRIES: usize = 2;
    let mut retries = 0;
    let file = loop {
        retries += 1;

        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!(
                error = &e as &dyn std::error::Error,
                path = %parent.display(),
                "Failed to create cache directory",
            );
            if retries > MAX_RETRIES {
                return Err(e);
            }
            continue;
        }

        match temp_file.persist(cache_path) {
            Ok(file) => break file,
            Err(e) => {
                temp_file = e.file;
                let err = e.error;
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    path = %cache_path.display(),
                    "Failed to create cache file",
                );
                if retries > MAX_RETRIES {
                    return Err(err);
                }
                continue;
            }
        }
    };
    Ok(file)
}
