use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Spotify,
    Deezer,
    #[serde(rename = "ytmusic")]
    YTMusic,
    #[serde(rename = "applemusic")]
    AppleMusic,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Spotify,
        Platform::Deezer,
        Platform::YTMusic,
        Platform::AppleMusic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Spotify => "spotify",
            Platform::Deezer => "deezer",
            Platform::YTMusic => "ytmusic",
            Platform::AppleMusic => "applemusic",
        }
    }

    /// Whether writing a playlist on this platform needs a user access token.
    pub fn requires_access_token(&self) -> bool {
        !matches!(self, Platform::YTMusic)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spotify" => Ok(Platform::Spotify),
            "deezer" => Ok(Platform::Deezer),
            "ytmusic" | "youtube-music" => Ok(Platform::YTMusic),
            "applemusic" | "apple-music" | "apple music" => Ok(Platform::AppleMusic),
            other => Err(Error::InvalidInput(format!(
                "unsupported platform `{other}`"
            ))),
        }
    }
}

/// A track as seen by one platform. `id` only means something to the adapter
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds; 0 means the provider issued a non-expiring token.
    pub expires_at: i64,
}

impl OAuthCredentials {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at != 0 && now >= self.expires_at
    }

    pub fn to_payload(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::persistence("serialize credentials", e))
    }

    pub fn from_payload(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| Error::Authentication(format!("stored credentials are corrupt: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse_and_display() {
        for platform in Platform::ALL {
            let parsed: Platform = platform.to_string().parse().unwrap();
            assert_eq!(parsed, platform);
        }
        assert_eq!("Apple Music".parse::<Platform>().unwrap(), Platform::AppleMusic);
        assert!("tidal".parse::<Platform>().unwrap_err().is_input_error());
    }

    #[test]
    fn test_requires_access_token_is_static() {
        assert!(Platform::Spotify.requires_access_token());
        assert!(Platform::Deezer.requires_access_token());
        assert!(Platform::AppleMusic.requires_access_token());
        assert!(!Platform::YTMusic.requires_access_token());
    }

    #[test]
    fn test_credentials_payload_without_refresh_token() {
        let credentials = OAuthCredentials {
            access_token: "abc".to_string(),
            refresh_token: None,
            expires_at: 1_700_000_000,
        };
        let payload = credentials.to_payload().unwrap();
        assert!(!payload.contains("refresh_token"));
        assert_eq!(OAuthCredentials::from_payload(&payload).unwrap(), credentials);
    }

    #[test]
    fn test_credentials_payload_with_refresh_token() {
        let credentials = OAuthCredentials {
            access_token: "abc".to_string(),
            refresh_token: Some("def".to_string()),
            expires_at: 42,
        };
        let payload = credentials.to_payload().unwrap();
        assert_eq!(OAuthCredentials::from_payload(&payload).unwrap(), credentials);
    }

    #[test]
    fn test_corrupt_payload_is_auth_error() {
        let err = OAuthCredentials::from_payload("{not json").unwrap_err();
        assert!(err.is_auth_error());
    }

    #[test]
    fn test_zero_expiry_never_expires() {
        let credentials = OAuthCredentials {
            access_token: "abc".to_string(),
            refresh_token: None,
            expires_at: 0,
        };
        assert!(!credentials.is_expired(i64::MAX));
    }
}
