use std::sync::Arc;
use std::time::Duration;

use avatar_cache::avatars::{
    ActionedUser, AvatarProvider, AvatarProviders, FetchError, GravatarFetcher, OriginType,
};
use avatar_cache::caching::ManualClock;

use crate::{
    ScriptedFetcher, entry_path, hosted_avatar, provider_with_clock, setup_config, start_time,
};

const MINUTE: Duration = Duration::from_secs(60);

fn jane() -> ActionedUser {
    ActionedUser::new("Jane Doe", "jane@example.com")
}

#[tokio::test]
async fn test_avatars_are_persisted() {
    let (config, cache_dir) = setup_config(|_| {});
    let fetcher = ScriptedFetcher::new();
    fetcher.respond("jane@example.com", Ok(Some(hosted_avatar("jane"))));

    let clock = ManualClock::new(start_time());
    let provider = provider_with_clock(OriginType::GitHub, fetcher.clone(), &config, &clock);
    let avatar = provider.get_avatar(&jane()).await.unwrap();
    assert_eq!(avatar.name, "Jane Doe");
    assert_eq!(avatar.email, "jane@example.com");

    let path = entry_path(cache_dir.path(), OriginType::GitHub, &jane());
    let contents = std::fs::read_to_string(path).unwrap();
    insta::assert_snapshot!(contents, @r#"{"value":{"name":"Jane Doe","email":"jane@example.com","url":"https://git.example.com/jane","avatarUrl":"https://avatars.example.com/jane.png"},"succeeded":true,"retry":false,"recordedAt":"2024-01-01T00:00:00Z"}"#);

    // a new provider on the same cache directory does not look the avatar up again
    let provider =
        AvatarProvider::from_config(OriginType::GitHub, fetcher.clone(), &config).unwrap();
    assert_eq!(provider.get_avatar(&jane()).await, Some(avatar));
    assert_eq!(fetcher.calls("jane@example.com"), 1);
}

#[tokio::test]
async fn test_missing_avatars_are_persisted() {
    let (config, _cache_dir) = setup_config(|_| {});
    let fetcher = ScriptedFetcher::new();

    let clock = ManualClock::new(start_time());
    let provider = provider_with_clock(OriginType::GitLab, fetcher.clone(), &config, &clock);
    assert_eq!(provider.get_avatar(&jane()).await, None);

    clock.advance(120 * MINUTE);
    let provider = provider_with_clock(OriginType::GitLab, fetcher.clone(), &config, &clock);
    assert_eq!(provider.get_avatar(&jane()).await, None);
    assert_eq!(fetcher.calls("jane@example.com"), 1);
}

#[tokio::test]
async fn test_failures_are_retried() {
    let (config, cache_dir) = setup_config(|_| {});
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(
        "jane@example.com",
        Err(FetchError::PermissionDenied("API rate limit exceeded".into())),
    );

    let clock = ManualClock::new(start_time());
    let provider = provider_with_clock(OriginType::GitHub, fetcher.clone(), &config, &clock);
    assert_eq!(provider.get_avatar(&jane()).await, None);

    let path = entry_path(cache_dir.path(), OriginType::GitHub, &jane());
    let contents = std::fs::read_to_string(path).unwrap();
    insta::assert_snapshot!(contents, @r#"{"value":null,"succeeded":false,"retry":true,"recordedAt":"2024-01-01T00:00:00Z"}"#);

    // the rate limit is lifted, but the failure is still fresh
    fetcher.respond("jane@example.com", Ok(Some(hosted_avatar("jane"))));
    clock.advance(30 * MINUTE);
    let provider = provider_with_clock(OriginType::GitHub, fetcher.clone(), &config, &clock);
    assert_eq!(provider.get_avatar(&jane()).await, None);
    assert_eq!(fetcher.calls("jane@example.com"), 1);

    clock.advance(31 * MINUTE);
    let avatar = provider.get_avatar(&jane()).await.unwrap();
    assert_eq!(
        avatar.avatar_url.as_deref(),
        Some("https://avatars.example.com/jane.png")
    );
    assert_eq!(fetcher.calls("jane@example.com"), 2);
}

#[tokio::test]
async fn test_retry_window_is_configurable() {
    let (config, _cache_dir) = setup_config(|config| {
        config.caches.avatars.retry_failures_after = 5 * MINUTE;
    });
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(
        "jane@example.com",
        Err(FetchError::Timeout(Duration::from_secs(30))),
    );

    let clock = ManualClock::new(start_time());
    let provider = provider_with_clock(OriginType::Vsts, fetcher.clone(), &config, &clock);
    assert_eq!(provider.get_avatar(&jane()).await, None);

    // the failed lookup is retried well before the default reuse window ends
    clock.advance(6 * MINUTE);
    fetcher.respond("jane@example.com", Ok(Some(hosted_avatar("jane"))));
    let avatar = provider.get_avatar(&jane()).await.unwrap();
    assert_eq!(avatar.email, "jane@example.com");
    assert_eq!(fetcher.calls("jane@example.com"), 2);

    clock.advance(6 * MINUTE);
    assert!(provider.get_avatar(&jane()).await.is_some());
    assert_eq!(fetcher.calls("jane@example.com"), 2);
}

#[tokio::test]
async fn test_concurrent_lookups_across_users() {
    let (config, _cache_dir) = setup_config(|_| {});
    let fetcher = ScriptedFetcher::new();
    let users: Vec<_> = (0..5)
        .map(|i| ActionedUser::new(format!("User {i}"), format!("user{i}@example.com")))
        .collect();
    for (i, user) in users.iter().enumerate() {
        fetcher.respond(&user.email, Ok(Some(hosted_avatar(&format!("user{i}")))));
    }

    let provider = Arc::new(
        AvatarProvider::from_config(OriginType::GitHub, fetcher.clone(), &config).unwrap(),
    );

    // every author shows up on many commits of a history
    let lookups = (0..4).flat_map(|_| users.iter()).map(|user| {
        let provider = Arc::clone(&provider);
        let user = user.clone();
        tokio::spawn(async move { provider.get_avatar(&user).await })
    });
    let avatars = futures::future::join_all(lookups).await;

    assert_eq!(avatars.len(), 20);
    for avatar in avatars {
        assert!(avatar.unwrap().is_some());
    }
    for user in &users {
        assert_eq!(fetcher.calls(&user.email), 1);
    }
    assert_eq!(fetcher.total_calls(), 5);
}

#[tokio::test]
async fn test_providers_are_isolated_per_origin() {
    let (config, cache_dir) = setup_config(|_| {});
    let github = ScriptedFetcher::new();
    github.respond("jane@example.com", Ok(Some(hosted_avatar("jane"))));
    let gitlab = ScriptedFetcher::new();

    let providers = AvatarProviders::new()
        .with_provider(
            AvatarProvider::from_config(OriginType::GitHub, github.clone(), &config).unwrap(),
        )
        .with_provider(
            AvatarProvider::from_config(OriginType::GitLab, gitlab.clone(), &config).unwrap(),
        )
        .with_provider(
            AvatarProvider::from_config(OriginType::Gravatar, Arc::new(GravatarFetcher), &config)
                .unwrap(),
        );

    assert!(providers.get_avatar(OriginType::GitHub, &jane()).await.is_some());
    assert!(providers.get_avatar(OriginType::GitLab, &jane()).await.is_none());
    assert!(providers.get_avatar(OriginType::Gravatar, &jane()).await.is_some());
    assert!(providers.get_avatar(OriginType::Bitbucket, &jane()).await.is_none());

    assert_eq!(github.total_calls(), 1);
    assert_eq!(gitlab.total_calls(), 1);

    for origin in [OriginType::GitHub, OriginType::GitLab, OriginType::Gravatar] {
        assert!(entry_path(cache_dir.path(), origin, &jane()).is_file());
    }
    assert!(!entry_path(cache_dir.path(), OriginType::Bitbucket, &jane()).exists());
}
