use std::sync::Arc;
use std::time::Duration;

use avatar_cache::avatars::{ActionedUser, AvatarProvider, GravatarFetcher, OriginType};
use avatar_cache::config::{Config, LogFormat};

use crate::test;

#[tokio::test]
async fn test_provider_from_config_file() {
    test::setup();
    let dir = test::tempdir();
    let cache_dir = dir.path().join("cache");

    let config_path = dir.path().join("config.yml");
    let yaml = format!(
        r#"
cache_dir: {}
http:
  proxy: http://proxy.example.com:3128
caches:
  avatars:
    retry_failures_after: 10m
logging:
  format: json
"#,
        cache_dir.display()
    );
    std::fs::write(&config_path, yaml).unwrap();

    let config = Config::get(Some(config_path.as_path())).unwrap();
    assert_eq!(config.proxy(), "http://proxy.example.com:3128");
    assert_eq!(
        config.caches.avatars.retry_failures_after,
        Duration::from_secs(600)
    );
    assert_eq!(
        config.caches.avatars.reuse_in_flight_for,
        Duration::from_secs(3600)
    );
    assert_eq!(config.logging.format, LogFormat::Json);

    let fetcher = Arc::new(GravatarFetcher);
    let provider = AvatarProvider::from_config(OriginType::Gravatar, fetcher, &config).unwrap();
    let user = ActionedUser::new("Jane Doe", "jane@example.com");
    assert!(provider.get_avatar(&user).await.is_some());
    assert!(cache_dir.join("avatars").join("gravatar").join("v1").is_dir());
}

#[test]
fn test_missing_config_file() {
    let dir = test::tempdir();
    let path = dir.path().join("missing.yml");
    let result = Config::get(Some(path.as_path()));
    assert!(result.is_err());
}
