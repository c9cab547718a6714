use async_trait::async_trait;
use hq_common::{HttpMethod, Message};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
}

/// Sends a message to its resolved gateway database, returning the HTTP status
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, address: &str, message: &Message) -> Result<u16, TransportError>;
}

pub struct HttpDeliveryTransport {
    client: reqwest::Client,
    server: String,
}

impl HttpDeliveryTransport {
    pub fn new(client: reqwest::Client, server: impl Into<String>) -> Self {
        Self {
            client,
            server: server.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DeliveryTransport for HttpDeliveryTransport {
    async fn deliver(&self, address: &str, message: &Message) -> Result<u16, TransportError> {
        let url = format!("{}{}/database", self.server, address);
        let body = serde_json::to_string(&message.content)
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let request = match message.method {
            HttpMethod::POST => self.client.post(&url),
            HttpMethod::DELETE => self.client.delete(&url),
        };

        let response = request
            .query(&[("gateway", message.gateway.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        debug!(
            message_id = %message.id,
            method = message.method.as_str(),
            status,
            "Delivery response"
        );
        Ok(status)
    }
}
