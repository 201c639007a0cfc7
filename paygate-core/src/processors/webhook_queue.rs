//! Background poller of the webhook delivery queue.
//!
//! Every tick spawns one task that loads the due entries and spawns one
//! delivery per entry. A webhook id that already has a delivery in flight is
//! skipped until the next tick. Once the lock is held the entry is reloaded,
//! and it is dropped if another delivery deleted or rescheduled it after it
//! was loaded.

use crate::config::WebhookQueueConfig;
use crate::framework::StoreError;
use crate::processors::webhook_sender::{PlainMessage, WebhookSender};
use crate::utils::InFlightLocks;
use kanau::processor::Processor;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// What one poll did.
#[derive(Debug, Default)]
pub struct PollReport {
    /// Spawned deliveries. Dropping the handles does not cancel them.
    pub dispatched: Vec<JoinHandle<()>>,
    /// Entries whose webhook already had a delivery in flight.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct WebhookQueue {
    sender: Arc<WebhookSender>,
    locks: Arc<InFlightLocks>,
    poll_interval: Duration,
    batch_size: i64,
}

impl WebhookQueue {
    pub fn new(
        sender: Arc<WebhookSender>,
        locks: Arc<InFlightLocks>,
        config: &WebhookQueueConfig,
    ) -> Self {
        Self {
            sender,
            locks,
            poll_interval: config.poll_interval,
            batch_size: config.batch_size,
        }
    }

    pub fn locks(&self) -> &Arc<InFlightLocks> {
        &self.locks
    }

    /// Load due entries and spawn a delivery for each unlocked webhook.
    pub async fn poll_once(&self) -> Result<PollReport, StoreError> {
        let entries = self
            .sender
            .storage()
            .due_webhooks(OffsetDateTime::now_utc(), self.batch_size)
            .await?;

        let mut report = PollReport::default();
        for entry in entries {
            let Some(guard) = self.locks.try_lock(entry.webhook_id) else {
                debug!(
                    webhook_id = %entry.webhook_id,
                    queue_id = entry.id,
                    "Delivery already in flight, skipping"
                );
                report.skipped += 1;
                continue;
            };

            let sender = self.sender.clone();
            report.dispatched.push(tokio::spawn(async move {
                let queue_id = entry.id;
                let webhook_id = guard.webhook_id();
                let entry = match sender.storage().get_queue_entry(queue_id).await {
                    Ok(Some(current)) if !current.changed_since(&entry) => current,
                    Ok(_) => {
                        debug!(
                            queue_id,
                            webhook_id = %webhook_id,
                            "Entry delivered or rescheduled since it was loaded, skipping"
                        );
                        return;
                    }
                    Err(e) => {
                        error!(
                            queue_id,
                            webhook_id = %webhook_id,
                            error = %e,
                            "Failed to reload webhook queue entry"
                        );
                        return;
                    }
                };
                if let Err(e) = sender.process(PlainMessage::from(entry)).await {
                    error!(
                        queue_id,
                        webhook_id = %webhook_id,
                        error = %e,
                        "Failed to record webhook delivery"
                    );
                }
                drop(guard);
            }));
        }

        if !report.dispatched.is_empty() || report.skipped > 0 {
            debug!(
                dispatched = report.dispatched.len(),
                skipped = report.skipped,
                "Webhook queue polled"
            );
        }
        Ok(report)
    }

    /// Run the poller until the shutdown signal fires.
    ///
    /// Deliveries already in flight are left to finish.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Webhook queue started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Webhook queue received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let queue = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = queue.poll_once().await {
                            error!(error = %e, "Failed to poll webhook queue");
                        }
                    });
                }
            }
        }

        info!("Webhook queue shutdown complete");
    }
}
