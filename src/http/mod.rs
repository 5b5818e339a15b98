mod client;
mod policy;
pub(crate) mod transport;

pub use client::{ApiFault, EnvelopeParser, ResilientClient};
pub use policy::{Backoff, RetryCondition, RetryPolicy};
pub use transport::{ApiRequest, Auth, Body, RawResponse, ReqwestTransport, Transport};
