use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::http::{
    ApiFault, ApiRequest, Backoff, RawResponse, ResilientClient, RetryCondition, RetryPolicy,
    Transport,
};
use crate::provider::{OAuthCredentials, Platform, PlatformAdapter, Playlist, Track};
use crate::state::{EphemeralCache, SpotifyConfig};
use crate::utils::text::clean_track_title;
use crate::utils::unix_now;

const PLAYLIST_BASE_URL: &str = "https://open.spotify.com/playlist/";
const CLIENT_TOKEN_KEY: &str = "spotifyClientAuthToken";
const ADD_TRACKS_BATCH: usize = 100;
const SEARCH_LIMIT: &str = "5";
const SCOPES: [&str; 4] = [
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "playlist-modify-private",
];

static LOCATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://open\.spotify\.com/playlist/([a-zA-Z0-9]+)(\?si=[a-zA-Z0-9]+)?").unwrap()
});

pub struct SpotifyAdapter {
    config: SpotifyConfig,
    client: ResilientClient,
    token_cache: Arc<EphemeralCache<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_credentials(self) -> OAuthCredentials {
        OAuthCredentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: unix_now() + self.expires_in,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorEnvelope {
    Api { error: ApiError },
    Accounts {
        error: String,
        #[serde(default)]
        error_description: String,
    },
}

#[derive(Deserialize)]
struct ApiError {
    status: u16,
    message: String,
}

#[derive(Deserialize)]
struct PlaylistResponse {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    tracks: TracksPage,
}

#[derive(Deserialize)]
struct TracksPage {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    id: Option<String>,
    name: String,
    artists: Vec<SpotifyArtist>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: SearchTracks,
}

#[derive(Deserialize)]
struct SearchTracks {
    items: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

impl SpotifyTrack {
    fn into_track(self, clean_title: bool) -> Option<Track> {
        let id = self.id?;
        let title = if clean_title {
            clean_track_title(&self.name)
        } else {
            self.name
        };
        Some(Track {
            id,
            title,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
        })
    }
}

fn parse_envelope(response: &RawResponse) -> Option<ApiFault> {
    match serde_json::from_str::<ErrorEnvelope>(&response.body).ok()? {
        ErrorEnvelope::Api { error } => Some(ApiFault {
            code: error.status.to_string(),
            kind: "api_error".to_string(),
            message: error.message,
        }),
        ErrorEnvelope::Accounts {
            error,
            error_description,
        } => Some(ApiFault {
            code: response.status.as_u16().to_string(),
            kind: error,
            message: error_description,
        }),
    }
}

/// `track:<title> artist:<first artist>`; more than one artist term makes
/// the search come back empty.
fn search_query(track: &Track) -> String {
    match track.artists.first() {
        Some(artist) => format!("track:{} artist:{}", track.title, artist),
        None => format!("track:{}", track.title),
    }
}

impl SpotifyAdapter {
    pub fn new(
        config: SpotifyConfig,
        transport: Arc<dyn Transport>,
        token_cache: Arc<EphemeralCache<String>>,
    ) -> Self {
        let client = ResilientClient::new(
            Platform::Spotify,
            transport,
            Self::retry_policy(),
            parse_envelope,
        );
        Self {
            config,
            client,
            token_cache,
        }
    }

    /// Retry on 429, honouring `Retry-After`.
    pub fn retry_policy() -> RetryPolicy {
        RetryPolicy::new(
            3,
            vec![RetryCondition::Status(StatusCode::TOO_MANY_REQUESTS)],
            Backoff::RetryAfter {
                fallback: Duration::from_secs(2),
            },
        )
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_api_url.trim_end_matches('/'), path)
    }

    fn token_url(&self) -> String {
        format!("{}/api/token", self.config.accounts_url.trim_end_matches('/'))
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let request = ApiRequest::post(self.token_url())
            .basic(&self.config.client_id, &self.config.client_secret)
            .form(params);
        self.client.send(request).await
    }

    /// App-level token for catalogue reads, shared by all concurrent lookups.
    async fn client_token(&self) -> Result<String> {
        self.token_cache
            .get_or_try_insert_with(CLIENT_TOKEN_KEY, || async {
                debug!("requesting spotify client credentials token");
                let response = self
                    .token_request(&[("grant_type", "client_credentials")])
                    .await?;
                let ttl = Duration::from_secs(response.expires_in.max(0) as u64);
                Ok::<_, Error>((response.access_token, ttl))
            })
            .await
    }

    async fn current_user_id(&self, access_token: &str) -> Result<String> {
        if !self.config.user_id.is_empty() {
            return Ok(self.config.user_id.clone());
        }
        let me: Created = self
            .client
            .send(ApiRequest::get(self.api_url("/me")).bearer(access_token))
            .await?;
        Ok(me.id)
    }

    async fn add_tracks(&self, playlist_id: &str, tracks: &[Track], access_token: &str) -> Result<()> {
        let url = self.api_url(&format!("/playlists/{playlist_id}/tracks"));

        let batches = tracks.chunks(ADD_TRACKS_BATCH).map(|batch| {
            let uris: Vec<String> = batch
                .iter()
                .map(|t| format!("spotify:track:{}", t.id))
                .collect();
            let request = ApiRequest::post(url.clone())
                .non_idempotent()
                .bearer(access_token)
                .json(json!({ "uris": uris }));
            self.client.send_unit(request)
        });

        for outcome in join_all(batches).await {
            outcome?;
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for SpotifyAdapter {
    fn platform(&self) -> Platform {
        Platform::Spotify
    }

    fn parse_locator(&self, locator: &str) -> Result<String> {
        LOCATOR
            .captures(locator.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidLocator {
                platform: Platform::Spotify,
                reason: "expected https://open.spotify.com/playlist/<id>".to_string(),
            })
    }

    async fn get_playlist(&self, locator: &str) -> Result<Playlist> {
        let id = self.parse_locator(locator)?;
        let token = self.client_token().await?;

        let response: PlaylistResponse = self
            .client
            .send(ApiRequest::get(self.api_url(&format!("/playlists/{id}"))).bearer(&token))
            .await?;

        let mut tracks: Vec<Track> = Vec::new();
        let mut page = response.tracks;
        loop {
            tracks.extend(page.items.into_iter().filter_map(|item| item.track?.into_track(true)));

            let Some(next) = page.next else { break };
            debug!(playlist = %id, fetched = tracks.len(), "following spotify tracks page");
            page = self
                .client
                .send(ApiRequest::get(next).bearer(&token))
                .await?;
        }

        info!(playlist = %id, tracks = tracks.len(), "fetched spotify playlist");
        Ok(Playlist {
            id: response.id,
            title: response.name,
            description: response.description.unwrap_or_default(),
            tracks,
        })
    }

    async fn create_playlist(&self, playlist: &Playlist, access_token: &str) -> Result<String> {
        let user_id = self.current_user_id(access_token).await?;

        let created: Created = self
            .client
            .send(
                ApiRequest::post(self.api_url(&format!("/users/{user_id}/playlists")))
                    .non_idempotent()
                    .bearer(access_token)
                    .json(json!({
                        "name": playlist.title,
                        "description": playlist.description,
                        "public": true,
                    })),
            )
            .await?;

        self.add_tracks(&created.id, &playlist.tracks, access_token)
            .await?;

        info!(playlist = %created.id, tracks = playlist.tracks.len(), "created spotify playlist");
        Ok(format!("{PLAYLIST_BASE_URL}{}", created.id))
    }

    async fn lookup_track(&self, track: &Track) -> Result<Track> {
        let token = self.client_token().await?;
        let request = ApiRequest::get(self.api_url("/search"))
            .bearer(&token)
            .query("q", search_query(track))
            .query("type", "track")
            .query("limit", SEARCH_LIMIT);

        let response: SearchResponse = self.client.send(request).await?;
        response
            .tracks
            .items
            .into_iter()
            .find_map(|t| t.into_track(false))
            .ok_or_else(|| Error::NotFound(format!("spotify: no track matches `{}`", track.title)))
    }

    fn authorization_url(&self, state: &str) -> Option<String> {
        Some(format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.config.accounts_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_url),
            urlencoding::encode(&SCOPES.join(" ")),
            urlencoding::encode(state),
        ))
    }

    async fn get_authorization_code(&self, code: &str) -> Result<OAuthCredentials> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];
        self.token_request(&params)
            .await
            .map(TokenResponse::into_credentials)
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    async fn refresh_access_token(&self, credentials: &OAuthCredentials) -> Result<OAuthCredentials> {
        let refresh = credentials.refresh_token.as_deref().ok_or_else(|| {
            Error::Authentication("no spotify refresh token available".to_string())
        })?;

        let params = [("grant_type", "refresh_token"), ("refresh_token", refresh)];
        let mut refreshed = self.token_request(&params).await?.into_credentials();

        // Spotify doesn't always return a new refresh_token
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = credentials.refresh_token.clone();
        }

        Ok(refreshed)
    }
}
