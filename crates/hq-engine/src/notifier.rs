//! Status Notifier
//!
//! Keeps one status record per subject and tells the subject's origin server
//! when the status changes.

use std::sync::Arc;

use hq_common::{Result, SubjectStatus};
use hq_delivery::OriginClient;
use hq_store::StatusStore;
use tracing::{debug, info, warn};

pub struct StatusNotifier {
    store: Arc<dyn StatusStore>,
    origin: Arc<dyn OriginClient>,
}

impl StatusNotifier {
    pub fn new(store: Arc<dyn StatusStore>, origin: Arc<dyn OriginClient>) -> Self {
        Self { store, origin }
    }

    /// Record `status` for `subject` and push it to `server`.
    ///
    /// No-op when the stored status already equals `status`. Push failures are
    /// logged and do not fail the call.
    pub async fn return_status(&self, server: &str, subject: &str, status: bool) -> Result<()> {
        if let Some(current) = self.store.find(subject).await? {
            if current.status == Some(status) {
                debug!(subject = %subject, status, "Status unchanged");
                return Ok(());
            }
        }

        self.store
            .upsert(&SubjectStatus {
                subject: subject.to_string(),
                server: server.to_string(),
                status: Some(status),
            })
            .await?;
        info!(subject = %subject, status, "Subject status updated");

        metrics::counter!("hq_status_notifications_total").increment(1);
        if let Err(e) = self.origin.push_status(server, subject, status).await {
            warn!(subject = %subject, server = %server, error = %e, "Status notification failed");
        }
        Ok(())
    }

    /// Status record of `subject`, `None` when it never reported
    pub async fn get_hhr(&self, subject: &str) -> Result<Option<SubjectStatus>> {
        Ok(self.store.find(subject).await?)
    }

    /// Forget the last known status of `subject`, remembering its origin server
    pub async fn reset_status(&self, server: &str, subject: &str) -> Result<()> {
        self.store
            .upsert(&SubjectStatus {
                subject: subject.to_string(),
                server: server.to_string(),
                status: None,
            })
            .await?;
        debug!(subject = %subject, server = %server, "Subject status reset");
        Ok(())
    }
}
