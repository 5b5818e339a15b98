use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::convert::{MatchReport, TrackMatcher};
use crate::error::{Error, Result};
use crate::http::{ReqwestTransport, Transport};
use crate::provider::{
    AppleMusicAdapter, DeezerAdapter, OAuthCredentials, Platform, PlatformAdapter, Playlist,
    SpotifyAdapter, YTMusicAdapter,
};
use crate::state::{Config, CredentialStore, EphemeralCache};
use crate::utils::crypto::{StateCodec, StateToken};
use crate::utils::unix_now;

/// Result of one playlist conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    pub url: String,
    pub matched: usize,
    pub total: usize,
}

/// Drives conversions end to end and owns the platform dispatch table.
pub struct Aggregator {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    store: Arc<dyn CredentialStore>,
    codec: Option<StateCodec>,
    matcher: TrackMatcher,
}

impl Aggregator {
    pub fn new(
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        store: Arc<dyn CredentialStore>,
        codec: Option<StateCodec>,
        matcher: TrackMatcher,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.platform(), adapter))
            .collect();
        Self {
            adapters,
            store,
            codec,
            matcher,
        }
    }

    /// Wire every production adapter over one shared HTTP transport.
    pub fn from_config(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
        let codec = if config.has_state_keys() {
            Some(config.state_codec()?)
        } else {
            None
        };

        let spotify = SpotifyAdapter::new(
            config.spotify.clone(),
            Arc::clone(&transport),
            Arc::new(EphemeralCache::new()),
        );
        let deezer = DeezerAdapter::new(config.deezer.clone(), Arc::clone(&transport));
        let ytmusic = YTMusicAdapter::new(config.ytmusic.clone(), Arc::clone(&transport));

        let adapters = vec![
            Arc::new(spotify) as Arc<dyn PlatformAdapter>,
            Arc::new(deezer) as Arc<dyn PlatformAdapter>,
            Arc::new(ytmusic) as Arc<dyn PlatformAdapter>,
            Arc::new(AppleMusicAdapter::new()) as Arc<dyn PlatformAdapter>,
        ];

        let matcher = TrackMatcher::new(config.matching.concurrency)
            .with_deadline(config.match_deadline());

        Ok(Self::new(adapters, store, codec, matcher))
    }

    pub fn supported_platforms(&self) -> Vec<Platform> {
        Platform::ALL.to_vec()
    }

    pub fn streaming_platform(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    fn adapter(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>> {
        self.streaming_platform(platform)
            .ok_or_else(|| Error::InvalidInput(format!("no adapter registered for {platform}")))
    }

    fn codec(&self) -> Result<&StateCodec> {
        self.codec.as_ref().ok_or_else(|| {
            Error::InvalidInput("state secret key and initialization vector are not configured".to_string())
        })
    }

    /// Fetch from `source`, match every track on `destination` and create the
    /// resulting playlist there.
    pub async fn convert_playlist(
        &self,
        source: Platform,
        destination: Platform,
        locator: &str,
        access_token: Option<&str>,
    ) -> Result<ConversionReport> {
        if source == destination {
            return Err(Error::InvalidInput(format!(
                "source and destination are both {source}"
            )));
        }
        let source_adapter = self.adapter(source)?;
        let destination_adapter = self.adapter(destination)?;
        source_adapter.parse_locator(locator)?;

        let playlist = source_adapter.get_playlist(locator).await?;
        info!(%source, %destination, tracks = playlist.tracks.len(), "fetched source playlist");

        let access_token = match access_token {
            Some(token) => token.to_string(),
            None if destination_adapter.requires_access_token() => {
                self.stored_access_token(destination_adapter.as_ref()).await?
            }
            None => String::new(),
        };

        let MatchReport {
            tracks,
            total,
            misses,
        } = self
            .matcher
            .match_tracks(Arc::clone(&destination_adapter), &playlist.tracks)
            .await;
        if misses > 0 {
            warn!(%destination, misses, total, "some tracks could not be matched");
        }

        let matched = tracks.len();
        let converted = Playlist { tracks, ..playlist };
        let url = destination_adapter
            .create_playlist(&converted, &access_token)
            .await?;

        info!(%destination, %url, matched, total, "playlist converted");
        Ok(ConversionReport {
            url,
            matched,
            total,
        })
    }

    /// Stored access token for the adapter's platform, refreshed first when
    /// it has expired and the platform can refresh.
    async fn stored_access_token(&self, adapter: &dyn PlatformAdapter) -> Result<String> {
        let platform = adapter.platform();
        let record = self.store.get(platform).await?.ok_or_else(|| {
            Error::Authentication(format!("no stored credentials for {platform}"))
        })?;
        let credentials = record.decode()?;

        if credentials.is_expired(unix_now()) && adapter.supports_refresh() {
            debug!(%platform, "stored access token expired, refreshing");
            let refreshed = self.refresh_with(adapter, &credentials).await?;
            return Ok(refreshed.access_token);
        }

        Ok(credentials.access_token)
    }

    async fn refresh_with(
        &self,
        adapter: &dyn PlatformAdapter,
        current: &OAuthCredentials,
    ) -> Result<OAuthCredentials> {
        let platform = adapter.platform();
        let mut refreshed = adapter.refresh_access_token(current).await?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = current.refresh_token.clone();
        }
        self.store.set(platform, &refreshed).await?;
        info!(%platform, "refreshed stored credentials");
        Ok(refreshed)
    }

    /// Provider consent URL carrying a freshly minted state token.
    pub fn authorization_url(&self, platform: Platform, now: i64) -> Result<String> {
        let adapter = self.adapter(platform)?;
        let state = self.codec()?.encode(platform, now);
        adapter.authorization_url(&state).ok_or(Error::Unsupported {
            platform,
            operation: "oauth authorization",
        })
    }

    pub fn decode_state(&self, state: &str) -> Result<StateToken> {
        self.codec()?.decode(state)
    }

    pub async fn exchange_code(&self, platform: Platform, code: &str) -> Result<OAuthCredentials> {
        self.adapter(platform)?.get_authorization_code(code).await
    }

    /// Handle an OAuth redirect: check the state, exchange the code and
    /// store the credentials.
    pub async fn complete_authorization(
        &self,
        expected: Platform,
        state: &str,
        code: &str,
        now: i64,
    ) -> Result<OAuthCredentials> {
        self.codec()?.verify(state, expected, now)?;
        let credentials = self.exchange_code(expected, code).await?;
        self.store.set(expected, &credentials).await?;
        info!(platform = %expected, "stored new credentials");
        Ok(credentials)
    }

    pub async fn refresh_credentials(&self, platform: Platform) -> Result<OAuthCredentials> {
        let adapter = self.adapter(platform)?;
        if !adapter.supports_refresh() {
            return Err(Error::Unsupported {
                platform,
                operation: "token refresh",
            });
        }
        let record = self.store.get(platform).await?.ok_or_else(|| {
            Error::Authentication(format!("no stored credentials for {platform}"))
        })?;
        self.refresh_with(adapter.as_ref(), &record.decode()?).await
    }

    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }
}
