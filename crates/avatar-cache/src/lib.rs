//! A cache for avatar metadata of commit authors.
//!
//! Looking up the avatar of a user on a remote origin (GitHub, GitLab, Gravatar, …) is slow and
//! rate limited, so every lookup goes through a [`FetchDedupCache`](caching::FetchDedupCache):
//!
//! - Results are persisted in a [`PersistentStore`](caching::PersistentStore), including the
//!   information that a lookup failed, so failures are only retried after a while.
//! - Concurrent lookups for the same user are coalesced into a single request.
//!
//! The [`avatars`] module wires this up per remote origin, with the actual request being done by
//! an injected [`AvatarFetcher`](avatars::AvatarFetcher).

#[macro_use]
pub mod metrics;

pub mod avatars;
pub mod caching;
pub mod config;
pub mod logging;
