use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::provider::{PlatformAdapter, Track};

pub const DEFAULT_CONCURRENCY: usize = 16;

/// Outcome of matching a playlist against a destination platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    /// Destination tracks, in source order.
    pub tracks: Vec<Track>,
    pub total: usize,
    pub misses: usize,
}

impl MatchReport {
    pub fn matched(&self) -> usize {
        self.tracks.len()
    }
}

/// Fans `lookup_track` out over every source track. A failed lookup drops
/// that track and never aborts the others.
#[derive(Debug, Clone)]
pub struct TrackMatcher {
    concurrency: usize,
    deadline: Option<Duration>,
}

impl Default for TrackMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl TrackMatcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            deadline: None,
        }
    }

    /// Lookups still pending when `deadline` elapses count as misses.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn match_tracks(
        &self,
        destination: Arc<dyn PlatformAdapter>,
        tracks: &[Track],
    ) -> MatchReport {
        let total = tracks.len();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        // a deadline too far out to represent behaves like no deadline
        let deadline = self.deadline.and_then(|d| Instant::now().checked_add(d));
        let mut tasks = JoinSet::new();

        for (index, track) in tracks.iter().cloned().enumerate() {
            let destination = Arc::clone(&destination);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let lookup = async {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| Error::DeadlineExceeded)?;
                    destination.lookup_track(&track).await
                };

                let outcome: Result<Track> = match deadline {
                    Some(at) => tokio::time::timeout_at(at, lookup)
                        .await
                        .unwrap_or(Err(Error::DeadlineExceeded)),
                    None => lookup.await,
                };
                (index, track, outcome)
            });
        }

        let mut slots: Vec<Option<Track>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(found))) => slots[index] = Some(found),
                Ok((index, source, Err(err))) => {
                    debug!(index, title = %source.title, error = %err, "dropping unmatched track");
                }
                Err(err) => warn!(error = %err, "track lookup task failed"),
            }
        }

        let tracks: Vec<Track> = slots.into_iter().flatten().collect();
        let misses = total - tracks.len();
        info!(
            platform = %destination.platform(),
            matched = tracks.len(),
            total,
            "matched tracks"
        );

        MatchReport {
            tracks,
            total,
            misses,
        }
    }
}
