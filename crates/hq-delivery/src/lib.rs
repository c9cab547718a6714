//! Outbound HTTP collaborators of the queue
//!
//! - [`GatewayResolver`]: gateway identifier to database address on SServer
//! - [`DeliveryTransport`]: POST/DELETE of a message to its resolved address
//! - [`OriginClient`]: status and relay pushes to HHR-Pro origin servers
//!
//! Outcomes are mapped by a single table in [`classify`].

pub mod classify;
pub mod origin;
pub mod resolver;
pub mod transport;

use std::time::Duration;

pub use classify::{classify, classify_resolve_error, classify_status, DeliveryOutcome};
pub use origin::{HttpOriginClient, OriginClient, OriginError};
pub use resolver::{GatewayResolver, HttpGatewayResolver, ResolveError};
pub use transport::{DeliveryTransport, HttpDeliveryTransport, TransportError};

/// Timeouts shared by every HTTP client of the queue
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// HHR-Pro instances commonly run with self-signed certificates
    pub accept_invalid_certs: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }
}

impl HttpClientConfig {
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
    }
}
