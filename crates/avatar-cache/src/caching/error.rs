use std::io;

use thiserror::Error;

/// An error reading from or writing to a [`PersistentStore`](super::PersistentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Accessing the underlying storage failed.
    #[error("failed to access the cache store")]
    Io(#[from] io::Error),
    /// A stored entry exists but could not be read back.
    #[error("malformed cache entry: {0}")]
    Malformed(String),
    /// An entry could not be serialized for storage.
    #[error("failed to serialize cache entry")]
    Serialization(#[source] serde_json::Error),
    /// The store is not able to serve requests right now.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}
