use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Outbound Message Types
// ============================================================================

/// HTTP verb used to deliver a message to its gateway database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpMethod {
    POST,
    DELETE,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::POST => "POST",
            HttpMethod::DELETE => "DELETE",
        }
    }
}

/// Message pushed by an HHR-Pro instance, waiting to be forwarded to SServer.
///
/// `send` stays absent while the message is pending. Once set the message is
/// resolved (delivered or terminally failed) and leaves the backlog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub subject: String,
    pub gateway: String,
    pub method: HttpMethod,
    pub content: Vec<serde_json::Value>,
    /// Origin HHR-Pro server of the message
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub init: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub datetime: DateTime<Utc>,
    /// Admission order, breaks ties between messages of the same millisecond
    #[serde(default)]
    pub seq: u64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub send: Option<DateTime<Utc>>,
    /// Last HTTP status returned by the gateway database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Network error text when no HTTP status was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Producer payload accepted by `addMsg`, after schema validation
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub key: Option<String>,
    pub server: String,
    pub subject: String,
    pub gateway: String,
    #[serde(default)]
    pub init: Option<bool>,
    pub method: HttpMethod,
    pub content: Vec<serde_json::Value>,
}

static ADMISSION_SEQ: AtomicU64 = AtomicU64::new(0);

impl Message {
    pub fn admit(new: NewMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject: new.subject,
            gateway: new.gateway,
            method: new.method,
            content: new.content,
            server: new.server,
            key: new.key,
            init: new.init.unwrap_or(false),
            datetime: Utc::now(),
            seq: ADMISSION_SEQ.fetch_add(1, Ordering::Relaxed),
            send: None,
            code: None,
            error: None,
        }
    }

    /// Creation order: `datetime`, then admission sequence
    pub fn creation_key(&self) -> (DateTime<Utc>, u64) {
        (self.datetime, self.seq)
    }

    pub fn is_pending(&self) -> bool {
        self.send.is_none()
    }

    /// Stamp the delivery outcome. After this the message is resolved.
    pub fn mark_sent(&mut self, code: Option<u16>, error: Option<String>) {
        self.send = Some(Utc::now());
        self.code = code;
        self.error = error;
    }
}

// ============================================================================
// Publisher & Subject Status
// ============================================================================

/// Credential of a producer allowed to push messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Publisher {
    pub key: String,
}

impl Publisher {
    pub fn generate() -> Self {
        Self { key: uuid::Uuid::new_v4().to_string() }
    }
}

/// Last known delivery status of a subject ("hhr" record).
///
/// `status` is `None` right after an init message reset it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectStatus {
    pub subject: String,
    pub server: String,
    pub status: Option<bool>,
}

// ============================================================================
// Inbound Relay Types
// ============================================================================

/// Kind of message relayed from SServer back to an HHR-Pro instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RelayType {
    MessageRead,
    SymptomsSelf,
    Symptoms,
    Measures,
}

impl RelayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayType::MessageRead => "messageRead",
            RelayType::SymptomsSelf => "symptomsSelf",
            RelayType::Symptoms => "symptoms",
            RelayType::Measures => "measures",
        }
    }
}

impl fmt::Display for RelayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "messageRead" => Ok(RelayType::MessageRead),
            "symptomsSelf" => Ok(RelayType::SymptomsSelf),
            "symptoms" => Ok(RelayType::Symptoms),
            "measures" => Ok(RelayType::Measures),
            other => Err(QueueError::UnknownType(other.to_string())),
        }
    }
}

/// Message received from SServer, persisted before any relay attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceivedRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub datetime: DateTime<Utc>,
    /// Stored as the raw type string so records written by other versions stay readable
    #[serde(rename = "type")]
    pub kind: String,
    pub message: serde_json::Value,
    #[serde(rename = "transfered", default, skip_serializing_if = "Option::is_none")]
    pub transferred: Option<bool>,
    #[serde(
        rename = "transfertDate",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub transferred_at: Option<DateTime<Utc>>,
}

impl ReceivedRecord {
    pub fn new(kind: RelayType, message: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            datetime: Utc::now(),
            kind: kind.as_str().to_string(),
            message,
            transferred: None,
            transferred_at: None,
        }
    }

    /// Subject identifier the record must be relayed to
    pub fn hhr(&self) -> Option<&str> {
        self.message.get("hhr").and_then(|v| v.as_str())
    }

    pub fn mark_transferred(&mut self) {
        self.transferred = Some(true);
        self.transferred_at = Some(Utc::now());
    }
}

// ============================================================================
// Queue Status & Listing
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub draining: u64,
    pub pending: u64,
}

/// Snapshot of the queue engine state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub running: bool,
    pub draining: bool,
    pub pending_more: bool,
    pub counts: StatusCounts,
}

/// Selection applied by `getMessages`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageFilter {
    /// Pending messages only
    #[default]
    None,
    Sent,
    All,
    /// Resolved messages rejected with a 400
    Error,
}

impl MessageFilter {
    /// Unknown or missing values fall back to pending messages
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("sent") => MessageFilter::Sent,
            Some("all") => MessageFilter::All,
            Some("error") => MessageFilter::Error,
            _ => MessageFilter::None,
        }
    }
}

/// One page of messages, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    /// Total number of messages matching the filter
    pub nb: u64,
    pub pg: u32,
    pub offset: u32,
    pub items: Vec<Message>,
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("not authorized")]
    Unauthorized,

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("bad format: {}", .detail.join("; "))]
    BadFormat { detail: Vec<String> },

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("unknown hhr: {0}")]
    UnknownSubject(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream rejected with status {status}")]
    UpstreamRejected { status: u16 },

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl QueueError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn bad_format(detail: Vec<String>) -> Self {
        Self::BadFormat { detail }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
