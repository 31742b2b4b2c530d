use std::fmt::Write;

use futures::FutureExt;
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};

use super::{ActionedUser, Avatar, AvatarFetcher, FetchError};

const GRAVATAR_BASE_URL: &str = "https://www.gravatar.com/avatar/";

/// Derives avatars from the email address of a user.
///
/// Gravatar URLs are computed locally, this never talks to the network. Gravatar serves a
/// generated identicon for addresses it does not know.
#[derive(Debug, Clone, Copy, Default)]
pub struct GravatarFetcher;

impl GravatarFetcher {
    /// Returns the Gravatar image URL for `email`, or `None` if the address is blank.
    pub fn avatar_url(email: &str) -> Option<String> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return None;
        }

        let hash = Sha256::digest(email.as_bytes());
        let mut url = String::from(GRAVATAR_BASE_URL);
        for b in hash {
            write!(url, "{b:02x}").unwrap();
        }
        url.push_str("?d=identicon");
        Some(url)
    }
}

impl AvatarFetcher for GravatarFetcher {
    fn fetch<'a>(
        &'a self,
        user: &'a ActionedUser,
        _proxy: &'a str,
    ) -> BoxFuture<'a, Result<Option<Avatar>, FetchError>> {
        let avatar = Self::avatar_url(&user.email).map(|avatar_url| Avatar {
            name: user.name.clone(),
            email: user.email.clone(),
            url: None,
            avatar_url: Some(avatar_url),
        });
        futures::future::ready(Ok(avatar)).boxed()
    }
}
