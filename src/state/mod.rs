mod cache;
mod config;
pub mod credentials;

pub use cache::EphemeralCache;
pub use config::{
    Config, DeezerConfig, MatchingConfig, SpotifyConfig, StateConfig, YTMusicConfig,
    DEFAULT_CONFIG_FILE, DEFAULT_REDIRECT_URL,
};
pub use credentials::{CredentialRecord, CredentialStore, FileCredentialStore, MemoryCredentialStore};
