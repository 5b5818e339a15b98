use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{Error, Result};
use crate::provider::{OAuthCredentials, Platform, PlatformAdapter, Playlist, Track};

static LOCATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://music\.apple\.com/[a-z]{2}/playlist/[^/?#]+/(pl\.[a-zA-Z0-9\-]+)$").unwrap()
});

/// Validates Apple Music locators; every network operation is unsupported.
#[derive(Default)]
pub struct AppleMusicAdapter;

impl AppleMusicAdapter {
    pub fn new() -> Self {
        Self
    }

    fn unsupported(operation: &'static str) -> Error {
        Error::Unsupported {
            platform: Platform::AppleMusic,
            operation,
        }
    }
}

#[async_trait]
impl PlatformAdapter for AppleMusicAdapter {
    fn platform(&self) -> Platform {
        Platform::AppleMusic
    }

    fn parse_locator(&self, locator: &str) -> Result<String> {
        LOCATOR
            .captures(locator.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidLocator {
                platform: Platform::AppleMusic,
                reason: "expected https://music.apple.com/<country_code>/playlist/<name>/pl.<id>"
                    .to_string(),
            })
    }

    async fn get_playlist(&self, locator: &str) -> Result<Playlist> {
        self.parse_locator(locator)?;
        Err(Self::unsupported("playlist fetch"))
    }

    async fn create_playlist(&self, _playlist: &Playlist, _access_token: &str) -> Result<String> {
        Err(Self::unsupported("playlist creation"))
    }

    async fn lookup_track(&self, _track: &Track) -> Result<Track> {
        Err(Self::unsupported("track search"))
    }

    async fn get_authorization_code(&self, _code: &str) -> Result<OAuthCredentials> {
        Err(Self::unsupported("authorization code exchange"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_grammar() {
        let adapter = AppleMusicAdapter::new();
        assert_eq!(
            adapter
                .parse_locator("https://music.apple.com/us/playlist/afrobeats-hits/pl.dc349df19c6f410d874c197db63ecfed")
                .unwrap(),
            "pl.dc349df19c6f410d874c197db63ecfed"
        );
        assert!(adapter
            .parse_locator("https://music.apple.com/us/album/afrobeats/123")
            .unwrap_err()
            .is_input_error());
    }

    #[tokio::test]
    async fn test_valid_locator_is_unsupported() {
        let err = AppleMusicAdapter::new()
            .get_playlist("https://music.apple.com/gb/playlist/x/pl.abc")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { platform: Platform::AppleMusic, .. }));
    }

    #[tokio::test]
    async fn test_invalid_locator_wins_over_unsupported() {
        let err = AppleMusicAdapter::new()
            .get_playlist("https://music.apple.com/playlist")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidLocator { .. }));
    }

    #[test]
    fn test_requires_access_token() {
        assert!(AppleMusicAdapter::new().requires_access_token());
    }
}
