//! In-memory stores for development and tests

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hq_common::{Message, MessageFilter, MessagePage, Publisher, ReceivedRecord, SubjectStatus};
use parking_lot::Mutex;

use crate::{page_offset, MessageStore, PublisherStore, ReceivedStore, Result, StatusStore, StoreError};

/// Single in-process store backing all four collections
#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<Message>>,
    statuses: Mutex<Vec<SubjectStatus>>,
    publishers: Mutex<Vec<Publisher>>,
    received: Mutex<Vec<ReceivedRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, simulating a lost database
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }
}

fn matches_filter(message: &Message, filter: MessageFilter) -> bool {
    match filter {
        MessageFilter::None => message.is_pending(),
        MessageFilter::Sent => !message.is_pending(),
        MessageFilter::All => true,
        MessageFilter::Error => !message.is_pending() && message.code == Some(400),
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: &Message) -> Result<()> {
        self.check_writable()?;
        self.messages.lock().push(message.clone());
        Ok(())
    }

    async fn save(&self, message: &Message) -> Result<()> {
        self.check_writable()?;
        let mut messages = self.messages.lock();
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message.clone(),
            None => messages.push(message.clone()),
        }
        Ok(())
    }

    async fn count_pending(&self) -> Result<u64> {
        Ok(self.messages.lock().iter().filter(|m| m.is_pending()).count() as u64)
    }

    async fn fetch_pending(&self) -> Result<Vec<Message>> {
        let mut pending: Vec<Message> = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(Message::creation_key);
        Ok(pending)
    }

    async fn list(&self, filter: MessageFilter, page: u32, page_size: u32) -> Result<MessagePage> {
        let mut matching: Vec<Message> = self
            .messages
            .lock()
            .iter()
            .filter(|m| matches_filter(m, filter))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.creation_key().cmp(&a.creation_key()));

        let nb = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page_offset(page, page_size) as usize)
            .take(page_size as usize)
            .collect();

        Ok(MessagePage {
            nb,
            pg: page,
            offset: page_size,
            items,
        })
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        let mut messages = self.messages.lock();
        let before = messages.len();
        messages.retain(|m| m.id != id);
        Ok(messages.len() < before)
    }

    async fn remove_pending(&self) -> Result<u64> {
        self.check_writable()?;
        let mut messages = self.messages.lock();
        let before = messages.len();
        messages.retain(|m| !m.is_pending());
        Ok((before - messages.len()) as u64)
    }

    async fn drop_all(&self) -> Result<()> {
        self.check_writable()?;
        self.messages.lock().clear();
        Ok(())
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn find(&self, subject: &str) -> Result<Option<SubjectStatus>> {
        Ok(self.statuses.lock().iter().find(|s| s.subject == subject).cloned())
    }

    async fn upsert(&self, status: &SubjectStatus) -> Result<()> {
        self.check_writable()?;
        let mut statuses = self.statuses.lock();
        match statuses.iter_mut().find(|s| s.subject == status.subject) {
            Some(existing) => *existing = status.clone(),
            None => statuses.push(status.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl PublisherStore for MemoryStore {
    async fn insert(&self, publisher: &Publisher) -> Result<()> {
        self.check_writable()?;
        self.publishers.lock().push(publisher.clone());
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<Publisher>> {
        Ok(self.publishers.lock().clone())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.publishers.lock().iter().any(|p| p.key == key))
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.check_writable()?;
        let mut publishers = self.publishers.lock();
        let before = publishers.len();
        publishers.retain(|p| p.key != key);
        Ok(publishers.len() < before)
    }
}

#[async_trait]
impl ReceivedStore for MemoryStore {
    async fn insert(&self, record: &ReceivedRecord) -> Result<()> {
        self.check_writable()?;
        self.received.lock().push(record.clone());
        Ok(())
    }

    async fn save(&self, record: &ReceivedRecord) -> Result<()> {
        self.check_writable()?;
        let mut received = self.received.lock();
        match received.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => received.push(record.clone()),
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ReceivedRecord>> {
        Ok(self.received.lock().iter().find(|r| r.id == id).cloned())
    }

    async fn find_untransferred_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReceivedRecord>> {
        let mut stale: Vec<ReceivedRecord> = self
            .received
            .lock()
            .iter()
            .filter(|r| r.transferred.is_none() && r.datetime < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.datetime);
        Ok(stale)
    }
}
