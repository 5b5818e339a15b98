use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;

use crate::error::{Error, Result};
use crate::http::{ApiRequest, RawResponse};

/// When a call is worth repeating.
#[derive(Debug, Clone)]
pub enum RetryCondition {
    Status(StatusCode),
    /// Providers that report throttling inside an otherwise successful payload.
    BodyContains {
        status: StatusCode,
        marker: &'static str,
    },
    ServerError,
    TransportFailure,
}

impl RetryCondition {
    /// Conditions where the server may already have acted on the request.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, RetryCondition::ServerError | RetryCondition::TransportFailure)
    }

    pub fn matches(&self, outcome: &Result<RawResponse>) -> bool {
        match (self, outcome) {
            (RetryCondition::Status(status), Ok(response)) => response.status == *status,
            (RetryCondition::BodyContains { status, marker }, Ok(response)) => {
                response.status == *status && response.body.contains(marker)
            }
            (RetryCondition::ServerError, Ok(response)) => response.status.is_server_error(),
            (RetryCondition::TransportFailure, Err(Error::Transport(_))) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Backoff {
    Fixed(Duration),
    /// Exponential growth from `floor`, capped at `ceiling`, with random jitter.
    Jittered { floor: Duration, ceiling: Duration },
    /// Honour a numeric `Retry-After` header, else wait `fallback`.
    RetryAfter { fallback: Duration },
}

impl Backoff {
    /// `attempt` is the 1-based number of the call that just failed.
    pub fn delay(&self, attempt: u32, response: Option<&RawResponse>) -> Duration {
        match self {
            Backoff::Fixed(interval) => *interval,
            Backoff::Jittered { floor, ceiling } => {
                let floor_ms = floor.as_millis() as u64;
                let ceiling_ms = (ceiling.as_millis() as u64).max(floor_ms);
                let exponent = attempt.saturating_sub(1).min(16);
                let upper = floor_ms.saturating_mul(1 << exponent).min(ceiling_ms);
                Duration::from_millis(rand::thread_rng().gen_range(floor_ms..=upper))
            }
            Backoff::RetryAfter { fallback } => response
                .and_then(|r| r.header("retry-after"))
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(*fallback),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub conditions: Vec<RetryCondition>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, conditions: Vec<RetryCondition>, backoff: Backoff) -> Self {
        Self {
            max_retries,
            conditions,
            backoff,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Vec::new(), Backoff::Fixed(Duration::ZERO))
    }

    /// Non-idempotent requests are only retried on conditions that prove
    /// the server rejected them, such as a 429.
    pub fn should_retry(&self, request: &ApiRequest, outcome: &Result<RawResponse>) -> bool {
        self.conditions
            .iter()
            .filter(|c| request.idempotent || !c.is_ambiguous())
            .any(|c| c.matches(outcome))
    }
}
