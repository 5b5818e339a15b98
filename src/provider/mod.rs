pub mod applemusic;
pub mod deezer;
pub mod spotify;
mod traits;
mod types;
pub mod ytmusic;

pub use applemusic::AppleMusicAdapter;
pub use deezer::DeezerAdapter;
pub use spotify::SpotifyAdapter;
pub use traits::PlatformAdapter;
pub use types::*;
pub use ytmusic::YTMusicAdapter;
