use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::http::{ApiRequest, RawResponse, RetryPolicy, Transport};
use crate::provider::Platform;

/// A provider's structured error, as pulled out of its error envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFault {
    pub code: String,
    pub kind: String,
    pub message: String,
}

/// Recognises a provider's error envelope in a response, success status or not.
pub type EnvelopeParser = fn(&RawResponse) -> Option<ApiFault>;

/// Wraps every outbound call of one adapter with error classification and
/// the provider's retry policy.
#[derive(Clone)]
pub struct ResilientClient {
    platform: Platform,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    envelope: EnvelopeParser,
}

impl ResilientClient {
    pub fn new(
        platform: Platform,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        envelope: EnvelopeParser,
    ) -> Self {
        Self {
            platform,
            transport,
            policy,
            envelope,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Execute and decode the body as `T`; an unrecognised success shape is an
    /// `UnexpectedResponse`.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.execute(request).await?;
        serde_json::from_str(&response.body).map_err(|e| {
            warn!(platform = %self.platform, error = %e, "response did not match the expected shape");
            Error::UnexpectedResponse {
                platform: self.platform,
                status: response.status.as_u16(),
                dump: format!("{e}\n{}", response.dump()),
            }
        })
    }

    pub async fn send_unit(&self, request: ApiRequest) -> Result<()> {
        self.execute(request).await.map(|_| ())
    }

    pub async fn execute(&self, request: ApiRequest) -> Result<RawResponse> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let outcome = self.transport.execute(request.clone()).await;

            if !self.policy.should_retry(&request, &outcome) {
                return match outcome {
                    Ok(response) => self.classify(response),
                    Err(err) => Err(err),
                };
            }

            if attempt > self.policy.max_retries {
                let source = match outcome {
                    Ok(response) => self.failure(response),
                    Err(err) => err,
                };
                warn!(
                    platform = %self.platform,
                    attempts = attempt,
                    error = %source,
                    "retry budget exhausted"
                );
                return Err(Error::UpstreamUnavailable {
                    platform: self.platform,
                    attempts: attempt,
                    source: Box::new(source),
                });
            }

            let delay = self.policy.backoff.delay(attempt, outcome.as_ref().ok());
            debug!(
                platform = %self.platform,
                attempt,
                delay_ms = delay.as_millis() as u64,
                url = %request.url,
                "retrying upstream call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn classify(&self, response: RawResponse) -> Result<RawResponse> {
        if (self.envelope)(&response).is_none() && response.is_success() {
            return Ok(response);
        }
        Err(self.failure(response))
    }

    /// Turn a response that must not count as success into an error, even
    /// when its status claims otherwise.
    fn failure(&self, response: RawResponse) -> Error {
        if let Some(fault) = (self.envelope)(&response) {
            debug!(platform = %self.platform, code = %fault.code, "upstream error envelope");
            return Error::UpstreamApi {
                platform: self.platform,
                code: fault.code,
                kind: fault.kind,
                message: fault.message,
            };
        }
        Error::UnexpectedResponse {
            platform: self.platform,
            status: response.status.as_u16(),
            dump: response.dump(),
        }
    }
}
