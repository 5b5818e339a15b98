use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};
use crate::http::{
    ApiFault, ApiRequest, Backoff, RawResponse, ResilientClient, RetryCondition, RetryPolicy,
    Transport,
};
use crate::provider::{OAuthCredentials, Platform, PlatformAdapter, Playlist, Track};
use crate::state::YTMusicConfig;
use crate::utils::text::{clean_artist_name, clean_track_title, natural_join};

static LOCATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://music\.youtube\.com/playlist\?list=([a-zA-Z0-9\-_]+)$").unwrap()
});

/// Adapter over the ytmusicapi sidecar service, which holds the YouTube
/// session itself. Writes are guarded by the sidecar's own bearer token.
pub struct YTMusicAdapter {
    config: YTMusicConfig,
    client: ResilientClient,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    message: String,
    #[serde(default)]
    errors: serde_json::Value,
}

#[derive(Deserialize)]
struct SidecarPlaylist {
    identifier: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    tracks: Vec<SidecarTrack>,
}

#[derive(Deserialize)]
struct SidecarTrack {
    identifier: String,
    title: String,
    #[serde(default)]
    artists: Vec<String>,
}

impl SidecarTrack {
    fn into_track(self) -> Track {
        Track {
            id: self.identifier,
            title: clean_track_title(&self.title),
            artists: self.artists.iter().map(|a| clean_artist_name(a)).collect(),
        }
    }
}

fn parse_envelope(response: &RawResponse) -> Option<ApiFault> {
    let envelope: ErrorEnvelope = serde_json::from_str(&response.body).ok()?;
    let message = match envelope.errors {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
            .collect::<Vec<_>>()
            .join("; "),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    };
    Some(ApiFault {
        code: response.status.as_u16().to_string(),
        kind: envelope.message,
        message,
    })
}

/// `"<title> by A, B and C"`.
fn search_query(track: &Track) -> String {
    if track.artists.is_empty() {
        return track.title.clone();
    }
    format!("{} by {}", track.title, natural_join(&track.artists))
}

impl YTMusicAdapter {
    pub fn new(config: YTMusicConfig, transport: Arc<dyn Transport>) -> Self {
        let client = ResilientClient::new(
            Platform::YTMusic,
            transport,
            Self::retry_policy(),
            parse_envelope,
        );
        Self { config, client }
    }

    /// The sidecar is local; retry connection failures and 5xx briefly.
    pub fn retry_policy() -> RetryPolicy {
        RetryPolicy::new(
            2,
            vec![RetryCondition::TransportFailure, RetryCondition::ServerError],
            Backoff::Fixed(Duration::from_secs(1)),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_api_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PlatformAdapter for YTMusicAdapter {
    fn platform(&self) -> Platform {
        Platform::YTMusic
    }

    fn parse_locator(&self, locator: &str) -> Result<String> {
        LOCATOR
            .captures(locator.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidLocator {
                platform: Platform::YTMusic,
                reason: "expected https://music.youtube.com/playlist?list=<id>".to_string(),
            })
    }

    async fn get_playlist(&self, locator: &str) -> Result<Playlist> {
        self.parse_locator(locator)?;

        let response: Envelope<SidecarPlaylist> = self
            .client
            .send(ApiRequest::post(self.url("/playlists")).json(json!({ "url": locator.trim() })))
            .await?;
        let playlist = response.data;

        info!(playlist = %playlist.identifier, tracks = playlist.tracks.len(), "fetched ytmusic playlist");
        Ok(Playlist {
            id: playlist.identifier,
            title: playlist.title,
            description: playlist.description.unwrap_or_default(),
            tracks: playlist.tracks.into_iter().map(SidecarTrack::into_track).collect(),
        })
    }

    /// `access_token` is ignored; the sidecar authenticates with its own key.
    async fn create_playlist(&self, playlist: &Playlist, _access_token: &str) -> Result<String> {
        let track_ids: Vec<&str> = playlist.tracks.iter().map(|t| t.id.as_str()).collect();
        let mut request = ApiRequest::put(self.url("/playlists"))
            .non_idempotent()
            .json(json!({
                "title": playlist.title,
                "description": playlist.description,
                "track_ids": track_ids,
                "privacy_status": "PUBLIC",
            }));
        if let Some(token) = &self.config.auth_token {
            request = request.bearer(token.clone());
        }

        let response: Envelope<String> = self.client.send(request).await?;
        info!(tracks = track_ids.len(), url = %response.data, "created ytmusic playlist");
        Ok(response.data)
    }

    async fn lookup_track(&self, track: &Track) -> Result<Track> {
        let request = ApiRequest::post(self.url("/tracks/search")).json(json!({
            "q": search_query(track),
            "filter": "songs",
            "limit": 5,
        }));

        let response: Envelope<Vec<SidecarTrack>> = self.client.send(request).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|t| Track {
                id: t.identifier,
                title: t.title,
                artists: t.artists,
            })
            .ok_or_else(|| Error::NotFound(format!("ytmusic: no track matches `{}`", track.title)))
    }

    async fn get_authorization_code(&self, _code: &str) -> Result<OAuthCredentials> {
        Err(Error::Unsupported {
            platform: Platform::YTMusic,
            operation: "authorization code exchange",
        })
    }
}
