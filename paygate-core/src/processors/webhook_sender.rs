//! WebhookSender processor.
//!
//! The WebhookSender is responsible for:
//! - POSTing one signed payload to a merchant endpoint
//! - Deciding success from the `{"success": bool}` response body
//! - Writing one send-history row per attempt, before touching the queue
//! - Deleting, rescheduling (exponential backoff) or retiring queue entries
//!
//! Manual sends (admin resend, test webhook) go through the same path with
//! `PlainMessage::id == None` and never touch the queue.

use crate::entities::WebhookEvent;
use crate::entities::stores::{Store, StoreWebhook};
use crate::entities::webhooks::{
    NewWebhookSendHistory, RescheduleWebhookQueueEntry, WebhookQueueEntry, WebhookSendHistory,
};
use crate::config::WebhookQueueConfig;
use crate::framework::{Storage, StoreError};
use bytes::Bytes;
use kanau::processor::Processor;
use paygate_sdk::objects::{TestWebhookPayload, WebhookEventName, WebhookResponse};
use paygate_sdk::signature::{SIGNATURE_HEADER, SignedPayload, sign_payload};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

/// Base delay of the backoff, in seconds.
const RETRY_BASE_DELAY_SECS: i64 = 60;

/// Upper bound of the backoff: 30 days. Keeps `last_sent_at + seconds_delay`
/// inside the range of a Postgres timestamp.
pub const MAX_RETRY_DELAY_SECS: i64 = 30 * 24 * 60 * 60;

/// Longest response body kept in the send history.
const MAX_RECORDED_BODY: usize = 8 * 1024;

/// Errors that stop a delivery from being recorded.
///
/// Failed HTTP attempts are not errors; they are reported through
/// [`DeliveryOutcome`].
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// One delivery attempt, either from the queue or manual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainMessage {
    /// Queue row id. `None` for manual sends.
    pub id: Option<i64>,
    pub webhook_id: Uuid,
    pub store_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub url: String,
    pub event: WebhookEvent,
    pub payload: Bytes,
    pub signature: String,
    pub retries_count: i32,
}

impl From<WebhookQueueEntry> for PlainMessage {
    fn from(entry: WebhookQueueEntry) -> Self {
        Self {
            id: Some(entry.id),
            webhook_id: entry.webhook_id,
            store_id: entry.store_id,
            transaction_id: entry.transaction_id,
            url: entry.url,
            event: entry.event,
            payload: Bytes::from(entry.payload),
            signature: entry.signature,
            retries_count: entry.retries_count,
        }
    }
}

impl PlainMessage {
    /// Replay a recorded attempt, signed with the store's current secret.
    pub fn resend(history: WebhookSendHistory, store: &Store) -> Self {
        let signature = sign_payload(&history.request_payload, store.webhook_secret.as_bytes());
        Self {
            id: None,
            webhook_id: history.webhook_id,
            store_id: history.store_id,
            transaction_id: history.transaction_id,
            url: history.url,
            event: history.event,
            payload: Bytes::from(history.request_payload),
            signature,
            retries_count: 0,
        }
    }

    /// Fixed sample payload for checking a merchant endpoint.
    pub fn test(
        webhook: &StoreWebhook,
        store: &Store,
        now: OffsetDateTime,
    ) -> Result<Self, serde_json::Error> {
        let body = TestWebhookPayload {
            event: WebhookEventName::Test,
            store_id: store.id,
            webhook_id: webhook.id,
            timestamp: now.unix_timestamp(),
        };
        let signed = SignedPayload::new(&body, store.webhook_secret.as_bytes())?;
        Ok(Self {
            id: None,
            webhook_id: webhook.id,
            store_id: store.id,
            transaction_id: None,
            url: webhook.url.clone(),
            event: signed.event.into(),
            payload: signed.json,
            signature: signed.signature,
            retries_count: 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint answered `{"success": true}`. Queue entry deleted.
    Delivered,
    /// Failed, will be retried after `seconds_delay`.
    Rescheduled { retries_count: i32, seconds_delay: i64 },
    /// Failed for the last allowed time. Queue entry deleted.
    Abandoned { retries_count: i32 },
    /// Manual send failed.
    Failed,
}

struct Attempt {
    success: bool,
    status: Option<u16>,
    body: Option<String>,
}

/// WebhookSender delivers webhook payloads to merchant endpoints.
pub struct WebhookSender {
    storage: Arc<dyn Storage>,
    http_client: reqwest::Client,
    max_tries: i32,
}

impl WebhookSender {
    pub fn new(storage: Arc<dyn Storage>, config: &WebhookQueueConfig) -> Result<Self, WebhookError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            storage,
            http_client,
            max_tries: config.max_tries,
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    async fn send(&self, message: &PlainMessage) -> Attempt {
        let response = self
            .http_client
            .post(&message.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(SIGNATURE_HEADER, &message.signature)
            .body(message.payload.clone())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    webhook_id = %message.webhook_id,
                    url = %message.url,
                    error = %e,
                    "Webhook request failed"
                );
                return Attempt {
                    success: false,
                    status: None,
                    body: Some(e.to_string()),
                };
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    webhook_id = %message.webhook_id,
                    status,
                    error = %e,
                    "Failed to read webhook response"
                );
                return Attempt {
                    success: false,
                    status: Some(status),
                    body: None,
                };
            }
        };

        let success = match serde_json::from_str::<WebhookResponse>(&body) {
            Ok(decoded) => decoded.success,
            Err(e) => {
                warn!(
                    webhook_id = %message.webhook_id,
                    status,
                    error = %e,
                    "Webhook response is not a valid acknowledgement"
                );
                false
            }
        };

        Attempt {
            success,
            status: Some(status),
            body: Some(truncate_body(body)),
        }
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_RECORDED_BODY {
        let mut end = MAX_RECORDED_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

/// Delay before the next attempt after `retries_count` consecutive failures:
/// `60 * 2^retries_count` seconds, capped at [`MAX_RETRY_DELAY_SECS`].
pub fn calculate_retry_delay(retries_count: i32) -> i64 {
    let exponent = u32::try_from(retries_count).unwrap_or(0);
    RETRY_BASE_DELAY_SECS
        .saturating_mul(2i64.saturating_pow(exponent))
        .min(MAX_RETRY_DELAY_SECS)
}

impl Processor<PlainMessage> for WebhookSender {
    type Output = DeliveryOutcome;
    type Error = WebhookError;

    #[tracing::instrument(skip_all, err, fields(webhook_id = %message.webhook_id, queue_id = ?message.id))]
    async fn process(&self, message: PlainMessage) -> Result<DeliveryOutcome, WebhookError> {
        let attempt = self.send(&message).await;

        self.storage
            .insert_send_history(NewWebhookSendHistory {
                webhook_id: message.webhook_id,
                store_id: message.store_id,
                transaction_id: message.transaction_id,
                url: message.url.clone(),
                event: message.event,
                request_payload: message.payload.to_vec(),
                response_body: attempt.body,
                response_status: attempt.status.map(i32::from),
                is_success: attempt.success,
            })
            .await?;

        let Some(queue_id) = message.id else {
            info!(success = attempt.success, event = %message.event, "Manual webhook sent");
            return Ok(if attempt.success {
                DeliveryOutcome::Delivered
            } else {
                DeliveryOutcome::Failed
            });
        };

        if attempt.success {
            self.storage.delete_queue_entry(queue_id).await?;
            info!(event = %message.event, "Webhook delivered");
            return Ok(DeliveryOutcome::Delivered);
        }

        let retries_count = message.retries_count.saturating_add(1);
        if retries_count >= self.max_tries {
            self.storage.delete_queue_entry(queue_id).await?;
            warn!(
                event = %message.event,
                retries_count,
                "Webhook delivery abandoned after max tries"
            );
            return Ok(DeliveryOutcome::Abandoned { retries_count });
        }

        let seconds_delay = calculate_retry_delay(retries_count);
        self.storage
            .reschedule_queue_entry(RescheduleWebhookQueueEntry {
                id: queue_id,
                seconds_delay,
                retries_count,
                last_sent_at: OffsetDateTime::now_utc(),
            })
            .await?;
        warn!(
            event = %message.event,
            retries_count,
            seconds_delay,
            "Webhook delivery failed, rescheduled"
        );
        Ok(DeliveryOutcome::Rescheduled {
            retries_count,
            seconds_delay,
        })
    }
}
