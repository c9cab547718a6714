use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("gateway lookup failed: {0}")]
    Transport(String),
    #[error("gateway lookup returned status {0}")]
    Status(u16),
    #[error("no database for gateway")]
    EmptyAddress,
}

/// Resolves a gateway identifier to its database address on SServer
#[async_trait]
pub trait GatewayResolver: Send + Sync {
    async fn resolve(&self, gateway: &str, app_scope_id: &str) -> Result<String, ResolveError>;
}

/// Queries `{server}/restUrl.rest`
pub struct HttpGatewayResolver {
    client: reqwest::Client,
    server: String,
}

impl HttpGatewayResolver {
    pub fn new(client: reqwest::Client, server: impl Into<String>) -> Self {
        Self {
            client,
            server: server.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GatewayResolver for HttpGatewayResolver {
    async fn resolve(&self, gateway: &str, app_scope_id: &str) -> Result<String, ResolveError> {
        let url = format!("{}/restUrl.rest", self.server);
        debug!(gateway = %gateway, "Resolving gateway database");

        let response = self
            .client
            .get(&url)
            .query(&[("appSri", app_scope_id), ("gateway", gateway)])
            .send()
            .await
            .map_err(|e| {
                warn!(gateway = %gateway, error = %e, "Gateway lookup failed");
                ResolveError::Transport(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ResolveError::Transport(e.to_string()))?;

        if status != 200 {
            return Err(ResolveError::Status(status));
        }

        let address = strip_quotes(&body);
        if address.is_empty() {
            return Err(ResolveError::EmptyAddress);
        }
        Ok(address)
    }
}

/// The directory answers with a JSON string literal
fn strip_quotes(body: &str) -> String {
    body.trim().replace('"', "")
}
