//! The resilient remote-data client.
//!
//! Every outbound call flows through the same machinery: cache lookup first
//! (hits spend no rate budget), then circuit-breaker admission, token-bucket
//! rate limiting, the transport, and classified retry with backoff. Batched
//! fetches adaptively split oversized chunks on timeout so one problematic
//! identifier cannot take down a whole batch.

mod backoff;
mod breaker;
mod cache;
#[allow(clippy::module_inception)]
mod client;
mod limiter;
mod pagination;
mod transport;

pub use backoff::delay_for;
pub use breaker::{Circuit, CircuitBreaker};
pub use cache::ResponseCache;
pub use client::{BatchFailure, BatchOutcome, ClientSettings, RemoteClient};
pub use limiter::TokenBucket;
pub use pagination::{PageInfo, PageStrategy, PagedResult};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{RemoteRequest, RemoteResponse, Transport};
