use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::provider::{OAuthCredentials, Platform, Playlist, Track};

/// Capability contract every streaming platform implements.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Static per-platform fact; never touches the network.
    fn requires_access_token(&self) -> bool {
        self.platform().requires_access_token()
    }

    /// Validate a playlist locator and extract the platform-local id.
    fn parse_locator(&self, locator: &str) -> Result<String>;

    /// Fetch a playlist with every track, following pagination to the end.
    async fn get_playlist(&self, locator: &str) -> Result<Playlist>;

    /// Create `playlist` (already holding destination-side tracks) and
    /// return its public URL.
    async fn create_playlist(&self, playlist: &Playlist, access_token: &str) -> Result<String>;

    /// Top search result for `track`, or `NotFound`.
    async fn lookup_track(&self, track: &Track) -> Result<Track>;

    /// Provider consent page carrying `state`, when the platform has one.
    fn authorization_url(&self, _state: &str) -> Option<String> {
        None
    }

    /// Exchange an OAuth authorization code for credentials.
    async fn get_authorization_code(&self, code: &str) -> Result<OAuthCredentials>;

    fn supports_refresh(&self) -> bool {
        false
    }

    async fn refresh_access_token(&self, _credentials: &OAuthCredentials) -> Result<OAuthCredentials> {
        Err(Error::Unsupported {
            platform: self.platform(),
            operation: "token refresh",
        })
    }
}
