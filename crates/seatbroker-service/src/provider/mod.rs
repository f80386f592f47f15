//! Outbound team provider: resilience wrapper and HTTP transport.

pub mod circuit;
pub mod gateway;
pub mod http;

pub use circuit::{CircuitBreaker, CircuitState};
pub use gateway::ProviderGateway;
pub use http::HttpTeamProvider;
