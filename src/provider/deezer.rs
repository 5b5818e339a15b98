use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::http::{
    ApiFault, ApiRequest, Backoff, RawResponse, ResilientClient, RetryCondition, RetryPolicy,
    Transport,
};
use crate::provider::{OAuthCredentials, Platform, PlatformAdapter, Playlist, Track};
use crate::state::DeezerConfig;
use crate::utils::text::clean_track_title;
use crate::utils::unix_now;

const PLAYLIST_BASE_URL: &str = "https://www.deezer.com/en/playlist/";
const QUOTA_MARKER: &str = "Quota limit exceeded";
const PERMISSIONS: &str = "basic_access,manage_library,offline_access";

static LOCATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://www\.deezer\.com/[a-z]{2}/playlist/(\d+)$").unwrap());

pub struct DeezerAdapter {
    config: DeezerConfig,
    client: ResilientClient,
}

/// Deezer reports most failures, quota included, as HTTP 200 with this body.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: DeezerError,
}

#[derive(Deserialize)]
struct DeezerError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Deserialize)]
struct PlaylistResponse {
    id: u64,
    title: String,
    #[serde(default)]
    description: String,
    tracks: TracksPage,
}

#[derive(Deserialize)]
struct TracksPage {
    data: Vec<DeezerTrack>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct DeezerTrack {
    id: u64,
    title: String,
    artist: DeezerArtist,
}

#[derive(Deserialize)]
struct DeezerArtist {
    name: String,
}

#[derive(Deserialize)]
struct Created {
    id: u64,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    expires: i64,
}

impl From<DeezerTrack> for Track {
    fn from(track: DeezerTrack) -> Self {
        Track {
            id: track.id.to_string(),
            title: clean_track_title(&track.title),
            artists: vec![track.artist.name],
        }
    }
}

fn parse_envelope(response: &RawResponse) -> Option<ApiFault> {
    let envelope: ErrorEnvelope = serde_json::from_str(&response.body).ok()?;
    Some(ApiFault {
        code: envelope.error.code.to_string(),
        kind: envelope.error.kind,
        message: envelope.error.message,
    })
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// `track:"<title>" artist:"<first artist>"`.
fn search_query(track: &Track) -> String {
    match track.artists.first() {
        Some(artist) => format!("track:{} artist:{}", quoted(&track.title), quoted(artist)),
        None => format!("track:{}", quoted(&track.title)),
    }
}

impl DeezerAdapter {
    pub fn new(config: DeezerConfig, transport: Arc<dyn Transport>) -> Self {
        let client = ResilientClient::new(
            Platform::Deezer,
            transport,
            Self::retry_policy(),
            parse_envelope,
        );
        Self { config, client }
    }

    /// Retry when an otherwise successful response carries the quota marker.
    pub fn retry_policy() -> RetryPolicy {
        RetryPolicy::new(
            2,
            vec![RetryCondition::BodyContains {
                status: StatusCode::OK,
                marker: QUOTA_MARKER,
            }],
            Backoff::Jittered {
                floor: Duration::from_secs(2),
                ceiling: Duration::from_secs(5),
            },
        )
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_api_url.trim_end_matches('/'), path)
    }

    fn connect_url(&self, path: &str) -> String {
        format!("{}{}", self.config.connect_url.trim_end_matches('/'), path)
    }

    async fn add_tracks(&self, playlist_id: u64, tracks: &[Track], access_token: &str) -> Result<()> {
        if tracks.is_empty() {
            return Ok(());
        }
        let songs = tracks
            .iter()
            .map(|t| t.id.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let request = ApiRequest::post(self.api_url(&format!("/playlist/{playlist_id}/tracks")))
            .non_idempotent()
            .query("access_token", access_token)
            .query("songs", songs);
        self.client.send_unit(request).await
    }
}

#[async_trait]
impl PlatformAdapter for DeezerAdapter {
    fn platform(&self) -> Platform {
        Platform::Deezer
    }

    fn parse_locator(&self, locator: &str) -> Result<String> {
        LOCATOR
            .captures(locator.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidLocator {
                platform: Platform::Deezer,
                reason: "expected https://www.deezer.com/<country_code>/playlist/<id>".to_string(),
            })
    }

    async fn get_playlist(&self, locator: &str) -> Result<Playlist> {
        let id = self.parse_locator(locator)?;

        let response: PlaylistResponse = self
            .client
            .send(ApiRequest::get(self.api_url(&format!("/playlist/{id}"))))
            .await?;

        let mut tracks: Vec<Track> = Vec::new();
        let mut page = response.tracks;
        loop {
            tracks.extend(page.data.into_iter().map(Track::from));

            let Some(next) = page.next else { break };
            debug!(playlist = %id, fetched = tracks.len(), "following deezer tracks page");
            page = self.client.send(ApiRequest::get(next)).await?;
        }

        info!(playlist = %id, tracks = tracks.len(), "fetched deezer playlist");
        Ok(Playlist {
            id: response.id.to_string(),
            title: response.title,
            description: response.description,
            tracks,
        })
    }

    async fn create_playlist(&self, playlist: &Playlist, access_token: &str) -> Result<String> {
        let created: Created = self
            .client
            .send(
                ApiRequest::post(self.api_url("/user/me/playlists"))
                    .non_idempotent()
                    .query("access_token", access_token)
                    .query("title", playlist.title.clone()),
            )
            .await?;

        self.add_tracks(created.id, &playlist.tracks, access_token)
            .await?;

        info!(playlist = created.id, tracks = playlist.tracks.len(), "created deezer playlist");
        Ok(format!("{PLAYLIST_BASE_URL}{}", created.id))
    }

    async fn lookup_track(&self, track: &Track) -> Result<Track> {
        let request = ApiRequest::get(self.api_url("/search/track")).query("q", search_query(track));
        let page: TracksPage = self.client.send(request).await?;

        page.data
            .into_iter()
            .next()
            .map(Track::from)
            .ok_or_else(|| Error::NotFound(format!("deezer: no track matches `{}`", track.title)))
    }

    fn authorization_url(&self, state: &str) -> Option<String> {
        Some(format!(
            "{}?app_id={}&redirect_uri={}&perms={}&state={}",
            self.connect_url("/auth.php"),
            urlencoding::encode(&self.config.app_id),
            urlencoding::encode(&self.config.redirect_url),
            PERMISSIONS,
            urlencoding::encode(state),
        ))
    }

    async fn get_authorization_code(&self, code: &str) -> Result<OAuthCredentials> {
        let request = ApiRequest::get(self.connect_url("/access_token.php"))
            .query("app_id", self.config.app_id.clone())
            .query("secret", self.config.secret.clone())
            .query("code", code)
            .query("output", "json");

        let response: AccessTokenResponse = self.client.send(request).await?;

        // offline_access tokens come back with `expires: 0`
        let expires_at = match response.expires {
            0 => 0,
            seconds => unix_now() + seconds,
        };
        Ok(OAuthCredentials {
            access_token: response.access_token,
            refresh_token: None,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::http::transport::testing::{json_response, text_response, ScriptedTransport};

    const API: &str = "https://api.deezer.test";

    fn config() -> DeezerConfig {
        DeezerConfig {
            app_id: "app".to_string(),
            secret: "shh".to_string(),
            redirect_url: "http://127.0.0.1:8888/callback".to_string(),
            base_api_url: API.to_string(),
            connect_url: "https://connect.deezer.test/oauth".to_string(),
        }
    }

    fn adapter(transport: Arc<ScriptedTransport>) -> DeezerAdapter {
        DeezerAdapter::new(config(), transport)
    }

    fn tracks(range: std::ops::Range<u64>) -> Vec<Value> {
        range
            .map(|i| json!({ "id": i, "title": format!("Song {i} [Live]"), "artist": { "name": "Asake" } }))
            .collect()
    }

    fn quota() -> Value {
        json!({ "error": { "type": "Exception", "message": "Quota limit exceeded", "code": 4 } })
    }

    #[test]
    fn test_locator_grammar() {
        let adapter = adapter(ScriptedTransport::new(|_| json_response(500, json!({}))));
        assert_eq!(
            adapter
                .parse_locator("https://www.deezer.com/en/playlist/1479458365")
                .unwrap(),
            "1479458365"
        );
        for bad in [
            "https://www.deezer.com/playlist/1479458365",
            "https://www.deezer.com/en/playlist/abc",
            "https://www.deezer.com/en/playlist/1?utm=x",
        ] {
            assert!(adapter.parse_locator(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_get_playlist_follows_next() {
        let transport = ScriptedTransport::new(|request| {
            if request.url.ends_with("/playlist/42") {
                json_response(200, json!({
                    "id": 42,
                    "title": "Street Pop",
                    "description": "",
                    "tracks": { "data": tracks(0..400), "next": format!("{API}/playlist/42/tracks?index=400") },
                }))
            } else {
                json_response(200, json!({ "data": tracks(400..450) }))
            }
        });

        let playlist = adapter(transport)
            .get_playlist("https://www.deezer.com/fr/playlist/42")
            .await
            .unwrap();
        assert_eq!(playlist.id, "42");
        assert_eq!(playlist.tracks.len(), 450);
        assert_eq!(playlist.tracks[449].title, "Song 449");
        assert_eq!(playlist.tracks[0].artists, vec!["Asake".to_string()]);
    }

    #[tokio::test]
    async fn test_create_playlist_uses_created_id() {
        let transport = ScriptedTransport::new(|request| {
            if request.url.ends_with("/user/me/playlists") {
                json_response(200, json!({ "id": 9001 }))
            } else {
                text_response(200, "true")
            }
        });
        let playlist = Playlist {
            id: "source-id".to_string(),
            title: "Copied".to_string(),
            description: String::new(),
            tracks: vec![
                Track { id: "1".to_string(), title: "a".to_string(), artists: vec![] },
                Track { id: "2".to_string(), title: "b".to_string(), artists: vec![] },
            ],
        };

        let url = adapter(transport.clone())
            .create_playlist(&playlist, "user-token")
            .await
            .unwrap();

        assert_eq!(url, "https://www.deezer.com/en/playlist/9001");
        let add = transport
            .requests()
            .into_iter()
            .find(|r| r.url.ends_with("/tracks"))
            .unwrap();
        assert!(add.url.ends_with("/playlist/9001/tracks"));
        assert_eq!(add.query_value("songs"), Some("1,2"));
        assert_eq!(add.query_value("access_token"), Some("user-token"));
    }

    #[tokio::test]
    async fn test_lookup_quotes_first_artist() {
        let transport = ScriptedTransport::new(|_| json_response(200, json!({ "data": tracks(7..9) })));
        let found = adapter(transport.clone())
            .lookup_track(&Track {
                id: "sp1".to_string(),
                title: "Lonely At The Top".to_string(),
                artists: vec!["Asake".to_string(), "Olamide".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(found.id, "7");
        assert_eq!(
            transport.requests()[0].query_value("q"),
            Some(r#"track:"Lonely At The Top" artist:"Asake""#)
        );
    }

    #[tokio::test]
    async fn test_lookup_without_results_is_not_found() {
        let transport = ScriptedTransport::new(|_| json_response(200, json!({ "data": [] })));
        let err = adapter(transport)
            .lookup_track(&Track { id: "x".to_string(), title: "nothing".to_string(), artists: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_in_ok_response_is_never_success() {
        let transport = ScriptedTransport::new(|_| json_response(200, quota()));
        let err = adapter(transport.clone())
            .lookup_track(&Track { id: "x".to_string(), title: "t".to_string(), artists: vec![] })
            .await
            .unwrap_err();

        assert_eq!(transport.requests().len(), 3);
        match err {
            Error::UpstreamUnavailable { platform, source, .. } => {
                assert_eq!(platform, Platform::Deezer);
                assert!(matches!(*source, Error::UpstreamApi { ref kind, .. } if kind == "Exception"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_error_envelope_is_not_retried() {
        let transport = ScriptedTransport::new(|_| {
            json_response(200, json!({ "error": { "type": "DataException", "message": "no data", "code": 800 } }))
        });
        let err = adapter(transport.clone())
            .get_playlist("https://www.deezer.com/en/playlist/1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamApi { ref code, .. } if code == "800"));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_authorization_code_exchange() {
        let transport = ScriptedTransport::new(|_| {
            json_response(200, json!({ "access_token": "dz-token", "expires": 0 }))
        });
        let credentials = adapter(transport.clone())
            .get_authorization_code("the-code")
            .await
            .unwrap();

        assert_eq!(credentials.access_token, "dz-token");
        assert_eq!(credentials.expires_at, 0);
        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://connect.deezer.test/oauth/access_token.php");
        assert_eq!(sent.query_value("output"), Some("json"));
        assert_eq!(sent.query_value("code"), Some("the-code"));
    }

    #[tokio::test]
    async fn test_refresh_is_unsupported() {
        let adapter = adapter(ScriptedTransport::new(|_| json_response(500, json!({}))));
        assert!(!adapter.supports_refresh());
        let err = adapter
            .refresh_access_token(&OAuthCredentials {
                access_token: "a".to_string(),
                refresh_token: None,
                expires_at: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }
}
