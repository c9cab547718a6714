use async_trait::async_trait;
use hq_common::{QueueError, ReceivedRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OriginError {
    #[error("origin server timed out: {0}")]
    Timeout(String),
    #[error("origin server unreachable: {0}")]
    Transport(String),
    #[error("origin server answered {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<OriginError> for QueueError {
    fn from(e: OriginError) -> Self {
        match e {
            OriginError::Timeout(msg) => QueueError::Timeout(msg),
            OriginError::Transport(msg) => QueueError::Transport(msg),
            OriginError::Status { status, .. } => QueueError::UpstreamRejected { status },
        }
    }
}

impl From<reqwest::Error> for OriginError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OriginError::Timeout(e.to_string())
        } else {
            OriginError::Transport(e.to_string())
        }
    }
}

/// Pushes to HHR-Pro origin servers
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// `POST {origin}/api/queue/status`
    async fn push_status(&self, origin: &str, subject: &str, status: bool) -> Result<(), OriginError>;
    /// `POST {origin}/api/queue/received`
    async fn push_received(&self, origin: &str, record: &ReceivedRecord) -> Result<(), OriginError>;
}

#[derive(Serialize)]
struct StatusBody<'a> {
    subject: &'a str,
    status: bool,
}

#[derive(Serialize)]
struct ReceivedBody<'a> {
    id: &'a str,
    datetime: String,
    #[serde(rename = "type")]
    kind: &'a str,
    message: &'a serde_json::Value,
}

impl<'a> From<&'a ReceivedRecord> for ReceivedBody<'a> {
    fn from(record: &'a ReceivedRecord) -> Self {
        Self {
            id: &record.id,
            datetime: record.datetime.to_rfc3339(),
            kind: &record.kind,
            message: &record.message,
        }
    }
}

pub struct HttpOriginClient {
    client: reqwest::Client,
}

impl HttpOriginClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn post(&self, url: String, body: String) -> Result<(), OriginError> {
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(OriginError::Status { status, body });
        }
        debug!(url = %url, "Origin push accepted");
        Ok(())
    }
}

fn endpoint(origin: &str, path: &str) -> String {
    format!("{}{}", origin.trim_end_matches('/'), path)
}

fn encode<T: Serialize>(body: &T) -> Result<String, OriginError> {
    serde_json::to_string(body).map_err(|e| OriginError::Transport(e.to_string()))
}

#[async_trait]
impl OriginClient for HttpOriginClient {
    async fn push_status(&self, origin: &str, subject: &str, status: bool) -> Result<(), OriginError> {
        let body = encode(&StatusBody { subject, status })?;
        self.post(endpoint(origin, "/api/queue/status"), body).await
    }

    async fn push_received(&self, origin: &str, record: &ReceivedRecord) -> Result<(), OriginError> {
        let body = encode(&ReceivedBody::from(record))?;
        self.post(endpoint(origin, "/api/queue/received"), body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hq_common::RelayType;
    use serde_json::json;

    #[test]
    fn test_received_body_shape() {
        let record = ReceivedRecord::new(RelayType::MessageRead, json!({"hhr": "H1", "id": "m1"}));
        let value = serde_json::to_value(ReceivedBody::from(&record)).unwrap();
        assert_eq!(value["type"], "messageRead");
        assert_eq!(value["id"], record.id.as_str());
        assert!(value["datetime"].as_str().unwrap().contains('T'));
        assert!(value.get("transfered").is_none());
    }

    #[test]
    fn test_error_mapping() {
        let err: QueueError = OriginError::Status { status: 503, body: String::new() }.into();
        assert!(matches!(err, QueueError::UpstreamRejected { status: 503 }));
        let err: QueueError = OriginError::Timeout("slow".to_string()).into();
        assert!(matches!(err, QueueError::Timeout(_)));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(endpoint("https://hhr.example/", "/api/queue/status"), "https://hhr.example/api/queue/status");
    }
}
