//! Playlist conversion between streaming platforms.
//!
//! [`convert::Aggregator`] fetches a playlist through one
//! [`provider::PlatformAdapter`], matches every track on another and creates
//! the result there, using stored OAuth credentials where the destination
//! needs them.

pub mod convert;
pub mod error;
pub mod http;
pub mod provider;
pub mod state;
pub mod utils;

pub use convert::{Aggregator, ConversionReport, MatchReport, TrackMatcher};
pub use error::{Error, Result};
pub use provider::{OAuthCredentials, Platform, PlatformAdapter, Playlist, Track};
