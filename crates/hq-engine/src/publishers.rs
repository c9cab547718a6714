//! Publisher Registry

use std::sync::Arc;

use hq_common::{Publisher, QueueError, Result};
use hq_store::PublisherStore;
use tracing::info;

use crate::auth::AdminKey;

pub struct PublisherRegistry {
    store: Arc<dyn PublisherStore>,
    admin_key: AdminKey,
}

impl PublisherRegistry {
    pub fn new(store: Arc<dyn PublisherStore>, admin_key: AdminKey) -> Self {
        Self { store, admin_key }
    }

    pub async fn create(&self, admin_key: Option<&str>) -> Result<Publisher> {
        self.admin_key.check(admin_key)?;
        let publisher = Publisher::generate();
        self.store.insert(&publisher).await?;
        info!("Publisher created");
        Ok(publisher)
    }

    pub async fn list(&self, admin_key: Option<&str>) -> Result<Vec<Publisher>> {
        self.admin_key.check(admin_key)?;
        Ok(self.store.find_all().await?)
    }

    pub async fn revoke(&self, admin_key: Option<&str>, publisher_key: &str) -> Result<()> {
        self.admin_key.check(admin_key)?;
        if !self.store.remove(publisher_key).await? {
            return Err(QueueError::not_found("publisher", publisher_key));
        }
        info!("Publisher revoked");
        Ok(())
    }

    /// Whether `key` belongs to a registered publisher
    pub async fn is_registered(&self, key: &str) -> Result<bool> {
        Ok(self.store.exists(key).await?)
    }
}
