//! MongoDB backed stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use hq_common::{Message, MessageFilter, MessagePage, Publisher, ReceivedRecord, SubjectStatus};
use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::info;

use crate::{page_offset, MessageStore, PublisherStore, ReceivedStore, Result, StatusStore};

const MESSAGES: &str = "messages";
const STATUSES: &str = "hhr";
const PUBLISHERS: &str = "publisher";
const RECEIVED: &str = "received";

/// Handles on every collection of the queue database
pub struct MongoStores {
    pub messages: MongoMessageStore,
    pub statuses: MongoStatusStore,
    pub publishers: MongoPublisherStore,
    pub received: MongoReceivedStore,
}

impl MongoStores {
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 }).await?;
        info!(database = %database, "Connected to MongoDB");
        Ok(Self::new(&db))
    }

    pub fn new(db: &Database) -> Self {
        Self {
            messages: MongoMessageStore::new(db),
            statuses: MongoStatusStore::new(db),
            publishers: MongoPublisherStore::new(db),
            received: MongoReceivedStore::new(db),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        self.messages
            .collection
            .create_index(IndexModel::builder().keys(doc! { "datetime": 1, "seq": 1 }).build())
            .await?;
        self.statuses
            .collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "subject": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        self.publishers
            .collection
            .create_index(IndexModel::builder().keys(doc! { "key": 1 }).build())
            .await?;
        self.received
            .collection
            .create_index(IndexModel::builder().keys(doc! { "transfered": 1, "datetime": 1 }).build())
            .await?;
        info!("MongoDB indexes ensured");
        Ok(())
    }
}

fn pending_filter() -> Document {
    doc! { "send": { "$exists": false } }
}

fn list_filter(filter: MessageFilter) -> Document {
    match filter {
        MessageFilter::None => pending_filter(),
        MessageFilter::Sent => doc! { "send": { "$exists": true } },
        MessageFilter::All => doc! {},
        MessageFilter::Error => doc! { "send": { "$exists": true }, "code": 400 },
    }
}

// ============================================================================
// Messages
// ============================================================================

pub struct MongoMessageStore {
    collection: Collection<Message>,
}

impl MongoMessageStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(MESSAGES),
        }
    }
}

#[async_trait]
impl MessageStore for MongoMessageStore {
    async fn insert(&self, message: &Message) -> Result<()> {
        self.collection.insert_one(message).await?;
        Ok(())
    }

    async fn save(&self, message: &Message) -> Result<()> {
        self.collection
            .replace_one(doc! { "_id": &message.id }, message)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn count_pending(&self) -> Result<u64> {
        Ok(self.collection.count_documents(pending_filter()).await?)
    }

    async fn fetch_pending(&self) -> Result<Vec<Message>> {
        let cursor = self
            .collection
            .find(pending_filter())
            .sort(doc! { "datetime": 1, "seq": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list(&self, filter: MessageFilter, page: u32, page_size: u32) -> Result<MessagePage> {
        let query = list_filter(filter);
        let nb = self.collection.count_documents(query.clone()).await?;
        let cursor = self
            .collection
            .find(query)
            .sort(doc! { "datetime": -1, "seq": -1 })
            .skip(page_offset(page, page_size))
            .limit(page_size as i64)
            .await?;
        let items = cursor.try_collect().await?;

        Ok(MessagePage {
            nb,
            pg: page,
            offset: page_size,
            items,
        })
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn remove_pending(&self) -> Result<u64> {
        let result = self.collection.delete_many(pending_filter()).await?;
        Ok(result.deleted_count)
    }

    async fn drop_all(&self) -> Result<()> {
        self.collection.drop().await?;
        Ok(())
    }
}

// ============================================================================
// Subject statuses
// ============================================================================

pub struct MongoStatusStore {
    collection: Collection<SubjectStatus>,
}

impl MongoStatusStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(STATUSES),
        }
    }
}

#[async_trait]
impl StatusStore for MongoStatusStore {
    async fn find(&self, subject: &str) -> Result<Option<SubjectStatus>> {
        Ok(self.collection.find_one(doc! { "subject": subject }).await?)
    }

    async fn upsert(&self, status: &SubjectStatus) -> Result<()> {
        self.collection
            .replace_one(doc! { "subject": &status.subject }, status)
            .upsert(true)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Publishers
// ============================================================================

pub struct MongoPublisherStore {
    collection: Collection<Publisher>,
}

impl MongoPublisherStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(PUBLISHERS),
        }
    }
}

#[async_trait]
impl PublisherStore for MongoPublisherStore {
    async fn insert(&self, publisher: &Publisher) -> Result<()> {
        self.collection.insert_one(publisher).await?;
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<Publisher>> {
        let cursor = self.collection.find(doc! {}).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let count = self.collection.count_documents(doc! { "key": key }).await?;
        Ok(count > 0)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "key": key }).await?;
        Ok(result.deleted_count > 0)
    }
}

// ============================================================================
// Received records
// ============================================================================

pub struct MongoReceivedStore {
    collection: Collection<ReceivedRecord>,
}

impl MongoReceivedStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(RECEIVED),
        }
    }
}

#[async_trait]
impl ReceivedStore for MongoReceivedStore {
    async fn insert(&self, record: &ReceivedRecord) -> Result<()> {
        self.collection.insert_one(record).await?;
        Ok(())
    }

    async fn save(&self, record: &ReceivedRecord) -> Result<()> {
        self.collection
            .replace_one(doc! { "_id": &record.id }, record)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ReceivedRecord>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_untransferred_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReceivedRecord>> {
        // datetime is stored as epoch milliseconds
        let filter = doc! {
            "transfered": { "$exists": false },
            "datetime": { "$lt": cutoff.timestamp_millis() },
        };
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "datetime": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }
}
