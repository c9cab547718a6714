//! Relay Engine
//!
//! Reverse flow: messages coming from SServer are stored first, then checked,
//! matched to the origin server of their subject and pushed there.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hq_common::{QueueError, ReceivedRecord, RelayType, Result};
use hq_delivery::OriginClient;
use hq_store::ReceivedStore;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::notifier::StatusNotifier;
use crate::schema::validate_received;

/// Outcome of one stale-record sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub transferred: usize,
    pub failed: usize,
}

pub struct RelayEngine {
    store: Arc<dyn ReceivedStore>,
    notifier: Arc<StatusNotifier>,
    origin: Arc<dyn OriginClient>,
    retry_window: Duration,
}

impl RelayEngine {
    pub fn new(
        store: Arc<dyn ReceivedStore>,
        notifier: Arc<StatusNotifier>,
        origin: Arc<dyn OriginClient>,
        retry_window: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            origin,
            retry_window,
        }
    }

    /// Store, validate and push a message received from SServer
    pub async fn relay(&self, kind: &str, message: Value) -> Result<ReceivedRecord> {
        let kind: RelayType = kind.parse()?;
        let record = ReceivedRecord::new(kind, message);
        self.store.insert(&record).await?;
        debug!(record_id = %record.id, kind = %kind, "Received message stored");
        self.transmit(record).await
    }

    /// Retry every record still untransferred after the retry window
    pub async fn sweep_stale(&self) -> Result<SweepReport> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.retry_window.as_secs() as i64);
        let stale = self.store.find_untransferred_before(cutoff).await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..Default::default()
        };
        for record in stale {
            let id = record.id.clone();
            match self.transmit(record).await {
                Ok(_) => report.transferred += 1,
                Err(e) => {
                    debug!(record_id = %id, error = %e, "Stale record still not relayed");
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                transferred = report.transferred,
                failed = report.failed,
                "Stale received messages swept"
            );
        }
        Ok(report)
    }

    async fn transmit(&self, mut record: ReceivedRecord) -> Result<ReceivedRecord> {
        if let Err(e) = validate_received(&record.kind, &record.message) {
            warn!(record_id = %record.id, kind = %record.kind, error = %e, "Received message schema error");
            outcome("bad_format");
            return Err(e);
        }

        let hhr = record.hhr().unwrap_or_default().to_string();
        let Some(subject) = self.notifier.get_hhr(&hhr).await? else {
            warn!(record_id = %record.id, hhr = %hhr, "Unknown hhr");
            outcome("unknown_subject");
            return Err(QueueError::UnknownSubject(hhr));
        };

        if let Err(e) = self.origin.push_received(&subject.server, &record).await {
            warn!(record_id = %record.id, server = %subject.server, error = %e, "Relay push failed");
            outcome("push_failed");
            return Err(e.into());
        }

        record.mark_transferred();
        self.store.save(&record).await?;
        outcome("transferred");
        debug!(record_id = %record.id, server = %subject.server, "Received message relayed");
        Ok(record)
    }
}

fn outcome(label: &'static str) {
    metrics::counter!("hq_relay_total", "outcome" => label).increment(1);
}
