//! One delivery attempt: resolve the gateway, send, classify, notify

use std::sync::Arc;

use hq_common::Message;
use hq_delivery::{classify, classify_resolve_error, DeliveryOutcome, DeliveryTransport, GatewayResolver};
use tracing::{debug, warn};

use crate::notifier::StatusNotifier;

/// Result of [`DeliveryAttempt::run`]
#[derive(Debug)]
pub enum Attempt {
    /// Delivered (200) or rejected (400/404). The message carries its `send`
    /// stamp and must be persisted.
    Resolved { message: Message, outcome: DeliveryOutcome },
    /// Left pending, nothing to persist
    Deferred,
    /// Network error, 500, unexpected status or unusable gateway. The caller
    /// applies the `init` policy.
    Failed { code: Option<u16>, error: Option<String> },
}

pub struct DeliveryAttempt {
    resolver: Arc<dyn GatewayResolver>,
    transport: Arc<dyn DeliveryTransport>,
    notifier: Arc<StatusNotifier>,
    app_scope_id: String,
}

impl DeliveryAttempt {
    pub fn new(
        resolver: Arc<dyn GatewayResolver>,
        transport: Arc<dyn DeliveryTransport>,
        notifier: Arc<StatusNotifier>,
        app_scope_id: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            transport,
            notifier,
            app_scope_id: app_scope_id.into(),
        }
    }

    pub async fn run(&self, mut message: Message) -> Attempt {
        let address = match self.resolver.resolve(&message.gateway, &self.app_scope_id).await {
            Ok(address) => address,
            Err(e) => {
                let outcome = classify_resolve_error(&e);
                warn!(message_id = %message.id, gateway = %message.gateway, error = %e, "Gateway resolution failed");
                record(outcome);
                return match outcome {
                    DeliveryOutcome::Failed => Attempt::Failed {
                        code: None,
                        error: Some(e.to_string()),
                    },
                    _ => Attempt::Deferred,
                };
            }
        };

        let result = self.transport.deliver(&address, &message).await;
        let outcome = classify(&result);
        record(outcome);

        let (code, error) = match result {
            Ok(status) => (Some(status), None),
            Err(e) => (None, Some(e.to_string())),
        };

        match outcome {
            DeliveryOutcome::Delivered => {
                debug!(message_id = %message.id, "Message delivered");
                self.notify(&message, true).await;
                message.mark_sent(code, error);
                Attempt::Resolved { message, outcome }
            }
            DeliveryOutcome::Rejected => {
                warn!(message_id = %message.id, gateway = %message.gateway, code = ?code, "Message rejected by gateway");
                self.notify(&message, false).await;
                message.mark_sent(code, error);
                Attempt::Resolved { message, outcome }
            }
            DeliveryOutcome::Failed => {
                warn!(
                    message_id = %message.id,
                    gateway = %message.gateway,
                    code = ?code,
                    error = ?error,
                    "Delivery failed"
                );
                self.notify(&message, false).await;
                Attempt::Failed { code, error }
            }
            DeliveryOutcome::Deferred => {
                debug!(message_id = %message.id, code = ?code, "Delivery deferred");
                Attempt::Deferred
            }
        }
    }

    async fn notify(&self, message: &Message, status: bool) {
        if let Err(e) = self
            .notifier
            .return_status(&message.server, &message.subject, status)
            .await
        {
            warn!(subject = %message.subject, error = %e, "Could not record subject status");
        }
    }
}

fn record(outcome: DeliveryOutcome) {
    metrics::counter!("hq_delivery_total", "outcome" => outcome.as_str()).increment(1);
}
