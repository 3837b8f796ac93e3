//! Resilient networking for catalog queries
//!
//! Every remote call goes through a [`CatalogClient`], which layers:
//! - a TTL response cache with in-flight request de-duplication
//! - a per-upstream circuit breaker
//! - a pluggable [`Transport`] (reqwest in production)

pub mod breaker;
pub mod cache;
pub mod client;
pub mod transport;

pub use breaker::{BreakerConfig, BreakerEvent, CircuitBreaker, CircuitState};
pub use cache::{CacheValue, ResponseCache, request_key};
pub use client::{CatalogClient, NetworkConfig};
pub use transport::{HttpMethod, HttpRequest, ReqwestTransport, Transport};

/// Failures observable by callers of the network layer.
///
/// `Clone` so a single in-flight result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

impl NetworkError {
    /// True when the call was rejected without touching the network.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, NetworkError::CircuitOpen { .. })
    }

    /// True for an HTTP 404, which catalog lookups treat as "absent".
    pub fn is_not_found(&self) -> bool {
        matches!(self, NetworkError::Status { status: 404, .. })
    }
}
