//! Retry Scheduler - periodic entry points of the queue
//!
//! Every tick:
//! - re-triggers the outbound drain (picks up deferred and `init` messages)
//! - sweeps stale received records

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::service::QueueService;

pub struct RetryScheduler {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl RetryScheduler {
    pub fn start(service: Arc<QueueService>, interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = Vec::new();

        // Outbound resend
        {
            let service = service.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            debug!("Resending queue");
                            if let Err(e) = service.resend_queue().await {
                                error!(error = %e, "Queue resend failed");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            info!("Queue resender shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        // Inbound sweep
        {
            let mut shutdown_rx = shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            debug!("Sweeping stale received messages");
                            if let Err(e) = service.sweep_stale().await {
                                error!(error = %e, "Stale sweep failed");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            info!("Stale sweeper shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        info!(interval_secs = interval.as_secs(), "Retry scheduler started");
        Self { shutdown_tx, handles }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Retry scheduler stopped");
    }
}
