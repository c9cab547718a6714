//! Message Store
//!
//! One trait per collection owned by the queue:
//! - `messages`: outbound backlog (Queue Engine)
//! - `hhr`: subject status records (Status Notifier)
//! - `publisher`: producer credentials (Publisher Registry)
//! - `received`: inbound relay records (Relay Engine)
//!
//! Every mutation is a single-document operation; no transaction spans two
//! documents.

pub mod memory;
#[cfg(feature = "mongo")]
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hq_common::{Message, MessageFilter, MessagePage, Publisher, QueueError, ReceivedRecord, SubjectStatus};
use thiserror::Error;

pub use memory::MemoryStore;
#[cfg(feature = "mongo")]
pub use mongo::MongoStores;

#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "mongo")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        QueueError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outbound backlog, ordered by `datetime`
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: &Message) -> Result<()>;
    /// Replace the stored document with the same id, inserting it if missing
    async fn save(&self, message: &Message) -> Result<()>;
    /// Number of messages without `send`
    async fn count_pending(&self) -> Result<u64>;
    /// Every message without `send`, oldest first
    async fn fetch_pending(&self) -> Result<Vec<Message>>;
    /// One page of messages matching `filter`, newest first. `page` starts at 1.
    async fn list(&self, filter: MessageFilter, page: u32, page_size: u32) -> Result<MessagePage>;
    async fn remove(&self, id: &str) -> Result<bool>;
    /// Remove every message without `send`, returning how many were removed
    async fn remove_pending(&self) -> Result<u64>;
    /// Discard the whole collection, resolved messages included
    async fn drop_all(&self) -> Result<()>;
}

/// One status record per subject
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn find(&self, subject: &str) -> Result<Option<SubjectStatus>>;
    async fn upsert(&self, status: &SubjectStatus) -> Result<()>;
}

#[async_trait]
pub trait PublisherStore: Send + Sync {
    async fn insert(&self, publisher: &Publisher) -> Result<()>;
    async fn find_all(&self) -> Result<Vec<Publisher>>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn remove(&self, key: &str) -> Result<bool>;
}

#[async_trait]
pub trait ReceivedStore: Send + Sync {
    async fn insert(&self, record: &ReceivedRecord) -> Result<()>;
    async fn save(&self, record: &ReceivedRecord) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<ReceivedRecord>>;
    /// Records not yet transferred and created strictly before `cutoff`, oldest first
    async fn find_untransferred_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReceivedRecord>>;
}

/// Offset of the first item of `page` (1-based)
pub(crate) fn page_offset(page: u32, page_size: u32) -> u64 {
    page.saturating_sub(1) as u64 * page_size as u64
}
