mod aggregator;
#[cfg(test)]
pub(crate) mod fake;
mod matcher;

pub use aggregator::{Aggregator, ConversionReport};
pub use matcher::{MatchReport, TrackMatcher, DEFAULT_CONCURRENCY};
