use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::provider::{OAuthCredentials, Platform, PlatformAdapter, Playlist, Track};

type LookupFn = dyn Fn(&Track) -> (Duration, Result<Track>) + Send + Sync;

/// In-memory adapter that counts its network-shaped calls.
pub(crate) struct FakeAdapter {
    platform: Platform,
    playlist: Playlist,
    lookup: Box<LookupFn>,
    refresh: bool,
    pub(crate) network_calls: AtomicUsize,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
    pub(crate) created: Mutex<Vec<(Playlist, String)>>,
    pub(crate) refreshed_from: Mutex<Vec<OAuthCredentials>>,
}

pub(crate) fn track(i: usize) -> Track {
    Track {
        id: format!("src{i}"),
        title: format!("Song {i}"),
        artists: vec!["Artist".to_string()],
    }
}

pub(crate) fn playlist(n: usize) -> Playlist {
    Playlist {
        id: "source".to_string(),
        title: "Source".to_string(),
        description: "fixture".to_string(),
        tracks: (0..n).map(track).collect(),
    }
}

impl FakeAdapter {
    pub(crate) fn new(platform: Platform) -> Self {
        Self {
            platform,
            playlist: Playlist::default(),
            lookup: Box::new(move |t| {
                (
                    Duration::ZERO,
                    Ok(Track {
                        id: format!("{platform}:{}", t.id),
                        ..t.clone()
                    }),
                )
            }),
            refresh: false,
            network_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            refreshed_from: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_playlist(mut self, playlist: Playlist) -> Self {
        self.playlist = playlist;
        self
    }

    pub(crate) fn with_lookup(
        mut self,
        lookup: impl Fn(&Track) -> (Duration, Result<Track>) + Send + Sync + 'static,
    ) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    pub(crate) fn with_refresh(mut self) -> Self {
        self.refresh = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn parse_locator(&self, locator: &str) -> Result<String> {
        locator
            .strip_prefix("fake://")
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidLocator {
                platform: self.platform,
                reason: "expected fake://<id>".to_string(),
            })
    }

    async fn get_playlist(&self, locator: &str) -> Result<Playlist> {
        self.parse_locator(locator)?;
        self.touch();
        Ok(self.playlist.clone())
    }

    async fn create_playlist(&self, playlist: &Playlist, access_token: &str) -> Result<String> {
        self.touch();
        self.created
            .lock()
            .unwrap()
            .push((playlist.clone(), access_token.to_string()));
        Ok(format!("https://{}.test/playlist/new", self.platform))
    }

    async fn lookup_track(&self, track: &Track) -> Result<Track> {
        self.touch();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let (delay, outcome) = (self.lookup)(track);
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn authorization_url(&self, state: &str) -> Option<String> {
        Some(format!("https://{}.test/authorize?state={state}", self.platform))
    }

    async fn get_authorization_code(&self, code: &str) -> Result<OAuthCredentials> {
        self.touch();
        Ok(OAuthCredentials {
            access_token: format!("token-for-{code}"),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: 0,
        })
    }

    fn supports_refresh(&self) -> bool {
        self.refresh
    }

    async fn refresh_access_token(&self, credentials: &OAuthCredentials) -> Result<OAuthCredentials> {
        if !self.refresh {
            return Err(Error::Unsupported {
                platform: self.platform,
                operation: "token refresh",
            });
        }
        self.touch();
        self.refreshed_from.lock().unwrap().push(credentials.clone());
        Ok(OAuthCredentials {
            access_token: "refreshed".to_string(),
            refresh_token: None,
            expires_at: i64::MAX,
        })
    }
}
