use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::utils::crypto::StateCodec;

pub const DEFAULT_CONFIG_FILE: &str = "plx.toml";
pub const DEFAULT_REDIRECT_URL: &str = "http://127.0.0.1:8888/callback";
const MAX_STATE_TTL_SECS: u64 = 24 * 60 * 60;
const MAX_MATCH_DEADLINE_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub state: StateConfig,
    pub matching: MatchingConfig,
    pub spotify: SpotifyConfig,
    pub deezer: DeezerConfig,
    pub ytmusic: YTMusicConfig,
}

/// Key material and lifetime of OAuth `state` tokens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Hex encoded, 32 bytes.
    pub secret_key: String,
    /// Hex encoded, 16 bytes.
    pub initialization_vector: String,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub concurrency: usize,
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_id: String,
    pub redirect_url: String,
    pub base_api_url: String,
    pub accounts_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeezerConfig {
    pub app_id: String,
    pub secret: String,
    pub redirect_url: String,
    pub base_api_url: String,
    pub connect_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct YTMusicConfig {
    pub base_api_url: String,
    pub auth_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".plx"),
            state: StateConfig::default(),
            matching: MatchingConfig::default(),
            spotify: SpotifyConfig::default(),
            deezer: DeezerConfig::default(),
            ytmusic: YTMusicConfig::default(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            initialization_vector: String::new(),
            ttl_secs: 60,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            deadline_secs: None,
        }
    }
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            user_id: String::new(),
            redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            base_api_url: "https://api.spotify.com/v1".to_string(),
            accounts_url: "https://accounts.spotify.com".to_string(),
        }
    }
}

impl Default for DeezerConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            secret: String::new(),
            redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            base_api_url: "https://api.deezer.com".to_string(),
            connect_url: "https://connect.deezer.com/oauth".to_string(),
        }
    }
}

impl Default for YTMusicConfig {
    fn default() -> Self {
        Self {
            base_api_url: "http://127.0.0.1:8000/api".to_string(),
            auth_token: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::persistence(&format!("read config {}", path.display()), e))?;
        toml::from_str(&content)
            .map_err(|e| Error::InvalidInput(format!("config {}: {e}", path.display())))
    }

    /// Load the file when present, fall back to defaults, then apply the
    /// process environment on top.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let text = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };

        text("PLX_SECRET_KEY", &mut self.state.secret_key);
        text("PLX_INITIALIZATION_VECTOR", &mut self.state.initialization_vector);
        text("SPOTIFY_CLIENT_ID", &mut self.spotify.client_id);
        text("SPOTIFY_CLIENT_SECRET", &mut self.spotify.client_secret);
        text("SPOTIFY_USER_ID", &mut self.spotify.user_id);
        text("SPOTIFY_REDIRECT_URL", &mut self.spotify.redirect_url);
        text("SPOTIFY_BASE_API_URL", &mut self.spotify.base_api_url);
        text("SPOTIFY_ACCOUNTS_URL", &mut self.spotify.accounts_url);
        text("DEEZER_APP_ID", &mut self.deezer.app_id);
        text("DEEZER_SECRET", &mut self.deezer.secret);
        text("DEEZER_REDIRECT_URL", &mut self.deezer.redirect_url);
        text("DEEZER_BASE_API_URL", &mut self.deezer.base_api_url);
        text("DEEZER_CONNECT_URL", &mut self.deezer.connect_url);
        text("YTMUSIC_BASE_API_URL", &mut self.ytmusic.base_api_url);

        if let Some(token) = lookup("YTMUSIC_AUTH_TOKEN") {
            self.ytmusic.auth_token = Some(token);
        }
        if let Some(dir) = lookup("PLX_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(ttl) = lookup("PLX_STATE_TTL_SECS") {
            self.state.ttl_secs = parse_number("PLX_STATE_TTL_SECS", &ttl)?;
        }
        if let Some(concurrency) = lookup("PLX_MATCH_CONCURRENCY") {
            self.matching.concurrency = parse_number("PLX_MATCH_CONCURRENCY", &concurrency)?;
        }
        if let Some(deadline) = lookup("PLX_MATCH_DEADLINE_SECS") {
            self.matching.deadline_secs = Some(parse_number("PLX_MATCH_DEADLINE_SECS", &deadline)?);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.matching.concurrency == 0 {
            return Err(Error::InvalidInput(
                "match concurrency must be at least 1".to_string(),
            ));
        }
        if self.state.ttl_secs == 0 || self.state.ttl_secs > MAX_STATE_TTL_SECS {
            return Err(Error::InvalidInput(format!(
                "state ttl must be between 1 and {MAX_STATE_TTL_SECS} seconds"
            )));
        }
        if let Some(deadline) = self.matching.deadline_secs {
            if deadline == 0 || deadline > MAX_MATCH_DEADLINE_SECS {
                return Err(Error::InvalidInput(format!(
                    "match deadline must be between 1 and {MAX_MATCH_DEADLINE_SECS} seconds"
                )));
            }
        }
        if self.has_state_keys() {
            self.state_codec()?;
        }
        Ok(())
    }

    pub fn has_state_keys(&self) -> bool {
        !self.state.secret_key.is_empty() || !self.state.initialization_vector.is_empty()
    }

    pub fn state_codec(&self) -> Result<StateCodec> {
        StateCodec::from_hex(
            &self.state.secret_key,
            &self.state.initialization_vector,
            Duration::from_secs(self.state.ttl_secs),
        )
    }

    pub fn match_deadline(&self) -> Option<Duration> {
        self.matching.deadline_secs.map(Duration::from_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{key} must be a number, got `{value}`")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::TempDir;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const IV_HEX: &str = "a0a1a2a3a4a5a6a7a8a9aaabacadaeaf";

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from(".plx"));
        assert_eq!(config.state.ttl_secs, 60);
        assert_eq!(config.matching.concurrency, 16);
        assert_eq!(config.match_deadline(), None);
        assert_eq!(config.spotify.base_api_url, "https://api.spotify.com/v1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plx.toml");
        std::fs::write(&path, "[matching]\nconcurrency = 4\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.matching.concurrency, 4);
        assert_eq!(config.state.ttl_secs, 60);
        assert_eq!(config.deezer.base_api_url, "https://api.deezer.com");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env_of(&[
                ("PLX_SECRET_KEY", KEY_HEX),
                ("PLX_INITIALIZATION_VECTOR", IV_HEX),
                ("PLX_STATE_TTL_SECS", "180"),
                ("PLX_MATCH_DEADLINE_SECS", "30"),
                ("PLX_DATA_DIR", "/tmp/plx"),
                ("DEEZER_APP_ID", "123"),
                ("YTMUSIC_AUTH_TOKEN", "sidecar"),
            ]))
            .unwrap();

        assert_eq!(config.state.ttl_secs, 180);
        assert_eq!(config.match_deadline(), Some(Duration::from_secs(30)));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/plx"));
        assert_eq!(config.deezer.app_id, "123");
        assert_eq!(config.ytmusic.auth_token.as_deref(), Some("sidecar"));
        assert!(config.validate().is_ok());
        assert_eq!(config.state_codec().unwrap().ttl(), Duration::from_secs(180));
    }

    #[test]
    fn test_non_numeric_env_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env_of(&[("PLX_MATCH_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_validate_bounds_deadline_and_ttl() {
        let mut config = Config::default();
        config
            .apply_env(env_of(&[("PLX_MATCH_DEADLINE_SECS", &u64::MAX.to_string())]))
            .unwrap();
        assert!(config.validate().unwrap_err().is_input_error());

        config.matching.deadline_secs = Some(0);
        assert!(config.validate().is_err());

        config.matching.deadline_secs = Some(600);
        assert!(config.validate().is_ok());

        config.state.ttl_secs = u64::MAX;
        assert!(config.validate().unwrap_err().is_input_error());
    }

    #[test]
    fn test_validate_rejects_short_key() {
        let mut config = Config::default();
        config.state.secret_key = "abcd".to_string();
        config.state.initialization_vector = IV_HEX.to_string();
        assert!(config.validate().unwrap_err().is_input_error());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.matching.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
