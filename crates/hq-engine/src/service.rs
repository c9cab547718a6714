//! Queue Service - the operations exposed to the HTTP layer and the scheduler

use std::sync::Arc;

use hq_common::{
    Message, MessageFilter, MessagePage, NewMessage, Publisher, QueueError, QueueStatus, ReceivedRecord, Result,
    SubjectStatus, DEFAULT_PAGE_SIZE,
};
use hq_config::QueueConfig;
use hq_delivery::{
    DeliveryTransport, GatewayResolver, HttpClientConfig, HttpDeliveryTransport, HttpGatewayResolver,
    HttpOriginClient, OriginClient,
};
use hq_store::{MessageStore, PublisherStore, ReceivedStore, StatusStore};
use serde_json::Value;
use tracing::{info, warn};

use crate::attempt::DeliveryAttempt;
use crate::auth::AdminKey;
use crate::engine::QueueEngine;
use crate::notifier::StatusNotifier;
use crate::publishers::PublisherRegistry;
use crate::relay::{RelayEngine, SweepReport};
use crate::schema::OUTBOUND_MESSAGE;

/// Store handles, one per collection
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub statuses: Arc<dyn StatusStore>,
    pub publishers: Arc<dyn PublisherStore>,
    pub received: Arc<dyn ReceivedStore>,
}

/// Remote services the queue talks to
#[derive(Clone)]
pub struct Remotes {
    pub resolver: Arc<dyn GatewayResolver>,
    pub transport: Arc<dyn DeliveryTransport>,
    pub origin: Arc<dyn OriginClient>,
}

impl Remotes {
    /// HTTP collaborators for the configured SServer
    pub fn http(config: &QueueConfig) -> Result<Self> {
        let sserver = HttpClientConfig {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            accept_invalid_certs: false,
        }
        .build_client()
        .map_err(|e| QueueError::Config(e.to_string()))?;

        let origin = HttpClientConfig {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            accept_invalid_certs: config.accept_invalid_certs,
        }
        .build_client()
        .map_err(|e| QueueError::Config(e.to_string()))?;

        Ok(Self {
            resolver: Arc::new(HttpGatewayResolver::new(sserver.clone(), config.server_base())),
            transport: Arc::new(HttpDeliveryTransport::new(sserver, config.server_base())),
            origin: Arc::new(HttpOriginClient::new(origin)),
        })
    }
}

pub struct QueueService {
    engine: QueueEngine,
    notifier: Arc<StatusNotifier>,
    publishers: PublisherRegistry,
    relay: RelayEngine,
}

impl QueueService {
    pub fn new(config: &QueueConfig, stores: Stores, remotes: Remotes) -> Self {
        let admin_key = AdminKey::new(config.key.clone());
        let notifier = Arc::new(StatusNotifier::new(stores.statuses.clone(), remotes.origin.clone()));
        let attempt = DeliveryAttempt::new(
            remotes.resolver,
            remotes.transport,
            notifier.clone(),
            config.app_scope_id.clone(),
        );

        Self {
            engine: QueueEngine::new(stores.messages, attempt, admin_key.clone(), config.pacing()),
            publishers: PublisherRegistry::new(stores.publishers, admin_key),
            relay: RelayEngine::new(stores.received, notifier.clone(), remotes.origin, config.retry_window()),
            notifier,
        }
    }

    // ========================================================================
    // Queue state
    // ========================================================================

    pub fn status(&self) -> QueueStatus {
        self.engine.status()
    }

    pub async fn start(&self, key: Option<&str>) -> Result<QueueStatus> {
        self.engine.start(key).await
    }

    pub async fn stop(&self, key: Option<&str>) -> Result<QueueStatus> {
        self.engine.stop(key).await
    }

    pub async fn reset(&self, key: Option<&str>) -> Result<QueueStatus> {
        self.engine.reset(key).await
    }

    // ========================================================================
    // Outbound messages
    // ========================================================================

    /// Validate and queue a message pushed by an HHR-Pro instance
    pub async fn add_msg(&self, payload: Value) -> Result<Message> {
        OUTBOUND_MESSAGE.validate(&payload)?;
        let new: NewMessage =
            serde_json::from_value(payload).map_err(|e| QueueError::bad_format(vec![e.to_string()]))?;

        if let Some(key) = new.key.as_deref() {
            if !self.publishers.is_registered(key).await? {
                warn!(subject = %new.subject, "Message rejected, unknown publisher key");
                return Err(QueueError::Unauthorized);
            }
        }

        if new.init == Some(true) {
            self.notifier.reset_status(&new.server, &new.subject).await?;
        }

        self.engine.admit(Message::admit(new)).await
    }

    pub async fn get_messages(
        &self,
        page: Option<u32>,
        page_size: Option<u32>,
        filter: Option<&str>,
    ) -> Result<MessagePage> {
        let page_size = match page_size {
            Some(0) | None => DEFAULT_PAGE_SIZE,
            Some(n) => n,
        };
        self.engine
            .messages(MessageFilter::parse(filter), page.unwrap_or(1), page_size)
            .await
    }

    pub async fn del_message(&self, id: &str) -> Result<()> {
        self.engine.delete_message(id).await
    }

    pub async fn clear_pending(&self) -> Result<u64> {
        self.engine.clear_pending().await
    }

    // ========================================================================
    // Publishers
    // ========================================================================

    pub async fn get_publishers(&self, key: Option<&str>) -> Result<Vec<Publisher>> {
        self.publishers.list(key).await
    }

    pub async fn create_publisher(&self, key: Option<&str>) -> Result<Publisher> {
        self.publishers.create(key).await
    }

    pub async fn revoke_publisher(&self, key: Option<&str>, publisher: &str) -> Result<()> {
        self.publishers.revoke(key, publisher).await
    }

    // ========================================================================
    // Relay & scheduler hooks
    // ========================================================================

    pub async fn relay_msg(&self, kind: &str, message: Value) -> Result<ReceivedRecord> {
        self.relay.relay(kind, message).await
    }

    pub async fn get_hhr(&self, subject: &str) -> Result<Option<SubjectStatus>> {
        self.notifier.get_hhr(subject).await
    }

    /// Re-trigger the outbound drain
    pub async fn resend_queue(&self) -> Result<()> {
        self.engine.trigger().await
    }

    pub async fn sweep_stale(&self) -> Result<SweepReport> {
        self.relay.sweep_stale().await
    }

    /// Pick up the backlog left by a previous process
    pub async fn recover(&self) -> Result<()> {
        let pending = self.engine.messages(MessageFilter::None, 1, 1).await?.nb;
        info!(pending, "Recovering outbound backlog");
        self.engine.trigger().await
    }
}
