//! Avatars of commit authors, looked up per remote origin.
//!
//! An [`AvatarProvider`] answers avatar lookups for a single [`OriginType`]. It owns a
//! [`FetchDedupCache`](crate::caching::FetchDedupCache) and delegates the actual lookup to an
//! injected [`AvatarFetcher`]. The [`AvatarProviders`] registry picks the provider matching the
//! origin of a repository.

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::caching::CacheItem;

mod gravatar;
mod provider;

pub use gravatar::GravatarFetcher;
pub use provider::{AvatarProvider, AvatarProviders};

/// The author or committer of a commit, identified by name and email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionedUser {
    pub name: String,
    pub email: String,
}

impl ActionedUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Avatar information of an [`ActionedUser`] on some remote origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    pub name: String,
    pub email: String,
    /// Link to the profile of the user.
    pub url: Option<String>,
    /// Link to the avatar image.
    pub avatar_url: Option<String>,
}

/// An avatar without an image is nothing to show.
impl CacheItem for Avatar {
    fn is_usable(&self) -> bool {
        self.avatar_url.is_some()
    }
}

/// The kind of remote a repository is hosted on.
#[derive(Serialize, Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OriginType {
    /// github.com or GitHub Enterprise.
    GitHub,
    /// gitlab.com or a self-hosted GitLab.
    GitLab,
    /// bitbucket.org.
    Bitbucket,
    /// Visual Studio Team Services / Azure DevOps.
    Vsts,
    /// Not a hosting service, avatars are derived from the email address.
    Gravatar,
    /// Any other or unknown remote.
    #[default]
    Other,
}

impl FromStr for OriginType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<OriginType, Infallible> {
        Ok(match s {
            "github" => OriginType::GitHub,
            "gitlab" => OriginType::GitLab,
            "bitbucket" => OriginType::Bitbucket,
            "vsts" => OriginType::Vsts,
            "gravatar" => OriginType::Gravatar,
            _ => OriginType::Other,
        })
    }
}

impl<'de> Deserialize<'de> for OriginType {
    fn deserialize<D>(deserializer: D) -> Result<OriginType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Cow<'de, str> = Deserialize::deserialize(deserializer)?;
        let Ok(origin) = s.parse();
        Ok(origin)
    }
}

impl fmt::Display for OriginType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OriginType::GitHub => write!(f, "github"),
            OriginType::GitLab => write!(f, "gitlab"),
            OriginType::Bitbucket => write!(f, "bitbucket"),
            OriginType::Vsts => write!(f, "vsts"),
            OriginType::Gravatar => write!(f, "gravatar"),
            OriginType::Other => write!(f, "other"),
        }
    }
}

/// An error that happens when looking up an avatar on a remote origin.
///
/// All of these are cached as failures and the lookup is retried later. A user without an
/// avatar is not an error, fetchers report that as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote origin refused the request, typically because of rate limiting.
    ///
    /// The attached string contains the remote origin's response.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The remote origin did not respond in time.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The request failed due to another problem, like connection loss, DNS resolution, or a
    /// 5xx server response.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// Anything else that went wrong, for example an unexpected response body.
    #[error("{0}")]
    Other(String),
}

/// Looks up avatars on a remote origin.
///
/// This is the strategy an [`AvatarProvider`] delegates to. Implementations do not need to
/// care about caching or deduplication, the provider does that for them.
pub trait AvatarFetcher: Send + Sync + 'static {
    /// Looks up the avatar of `user`.
    ///
    /// `proxy` is the configured [`HttpConfig::proxy`](crate::config::HttpConfig::proxy),
    /// which is empty if no proxy should be used.
    ///
    /// Resolves to `None` if the user does not exist or has no avatar on this origin.
    fn fetch<'a>(
        &'a self,
        user: &'a ActionedUser,
        proxy: &'a str,
    ) -> BoxFuture<'a, Result<Option<Avatar>, FetchError>>;
}
