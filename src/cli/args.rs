use std::path::PathBuf;

use clap::{Parser, Subcommand};
use plx::Platform;

/// plx - move playlists between streaming platforms
///
/// Fetches a playlist from one service, finds each track on another and
/// creates the matching playlist there.
#[derive(Parser, Debug)]
#[command(name = "plx")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (TOML)
    #[arg(short, long, global = true, default_value = plx::state::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List supported platforms
    Platforms,
    /// Convert a playlist to another platform
    Convert {
        /// Playlist URL on the source platform
        locator: String,
        /// Source platform
        #[arg(short, long)]
        from: Platform,
        /// Destination platform
        #[arg(short, long)]
        to: Platform,
        /// Access token for the destination, instead of stored credentials
        #[arg(long)]
        token: Option<String>,
    },
    /// Authorize plx with a platform
    Auth {
        /// Platform to authorize
        platform: Platform,
    },
    /// Refresh stored credentials
    Refresh {
        platform: Platform,
    },
    /// Show stored credential status
    Status {
        platform: Platform,
    },
    /// Delete stored credentials
    Logout {
        platform: Platform,
    },
}
