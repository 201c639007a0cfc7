mod support;

use async_trait::async_trait;
use axum::http::StatusCode;
use kanau::processor::Processor;
use paygate_core::config::WebhookQueueConfig;
use paygate_core::entities::WebhookEvent;
use paygate_core::entities::stores::{Store, StoreWebhook};
use paygate_core::entities::webhooks::{
    NewWebhookSendHistory, RescheduleWebhookQueueEntry, WebhookQueueEntry, WebhookSendHistory,
};
use paygate_core::framework::memory::MemoryStorage;
use paygate_core::framework::{IsolationLevel, Storage, StoreError, UnitOfWork};
use paygate_core::processors::{
    DeliveryOutcome, HandleDepositCallback, PlainMessage, WebhookQueue, WebhookSender,
};
use paygate_core::utils::InFlightLocks;
use paygate_sdk::objects::TransactionStatus;
use paygate_sdk::signature::verify_payload;
use std::sync::Arc;
use std::time::Duration;
use support::*;
use time::OffsetDateTime;
use uuid::Uuid;

const ACK: &str = r#"{"success":true}"#;

fn config() -> WebhookQueueConfig {
    WebhookQueueConfig {
        max_tries: 3,
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Harness with one confirmed deposit queued for `url`.
async fn queued(url: &str) -> (Harness, WebhookSender) {
    let harness = Harness::new(url).await;
    harness
        .processor
        .process(HandleDepositCallback(deposit("dd01", "10", TransactionStatus::Confirmed)))
        .await
        .unwrap();
    let sender = WebhookSender::new(harness.storage.clone(), &config()).unwrap();
    (harness, sender)
}

async fn head(harness: &Harness) -> WebhookQueueEntry {
    harness.storage.snapshot().await.webhook_queue[0].clone()
}

/// Storage whose `due_webhooks` answers with a fixed, possibly outdated,
/// list of entries. Stands in for a poll that read the queue before an
/// overlapping delivery finished.
struct StaleDueList {
    inner: Arc<MemoryStorage>,
    due: Vec<WebhookQueueEntry>,
}

#[async_trait]
impl Storage for StaleDueList {
    async fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn UnitOfWork>, StoreError> {
        self.inner.begin(isolation).await
    }

    async fn due_webhooks(
        &self,
        _now: OffsetDateTime,
        _limit: i64,
    ) -> Result<Vec<WebhookQueueEntry>, StoreError> {
        Ok(self.due.clone())
    }

    async fn get_queue_entry(&self, id: i64) -> Result<Option<WebhookQueueEntry>, StoreError> {
        self.inner.get_queue_entry(id).await
    }

    async fn insert_send_history(&self, row: NewWebhookSendHistory) -> Result<i64, StoreError> {
        self.inner.insert_send_history(row).await
    }

    async fn delete_queue_entry(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete_queue_entry(id).await
    }

    async fn reschedule_queue_entry(
        &self,
        update: RescheduleWebhookQueueEntry,
    ) -> Result<(), StoreError> {
        self.inner.reschedule_queue_entry(update).await
    }

    async fn get_send_history(&self, id: i64) -> Result<Option<WebhookSendHistory>, StoreError> {
        self.inner.get_send_history(id).await
    }

    async fn get_store_webhook(
        &self,
        webhook_id: Uuid,
    ) -> Result<Option<StoreWebhook>, StoreError> {
        self.inner.get_store_webhook(webhook_id).await
    }

    async fn get_store(&self, store_id: Uuid) -> Result<Option<Store>, StoreError> {
        self.inner.get_store(store_id).await
    }
}

/// Queue polling through a `StaleDueList` that still lists `due`.
fn stale_queue(harness: &Harness, due: Vec<WebhookQueueEntry>) -> WebhookQueue {
    let storage = Arc::new(StaleDueList {
        inner: harness.storage.clone(),
        due,
    });
    let sender = WebhookSender::new(storage, &config()).unwrap();
    WebhookQueue::new(Arc::new(sender), Arc::new(InFlightLocks::new()), &config())
}

#[tokio::test]
async fn test_successful_delivery_removes_entry() {
    let receiver = spawn_receiver(StatusCode::OK, ACK).await;
    let (harness, sender) = queued(&receiver.url).await;
    let entry = head(&harness).await;

    let outcome = sender.process(PlainMessage::from(entry.clone())).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);

    let hits = receiver.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].body.as_ref(), entry.payload.as_slice());
    assert_eq!(hits[0].content_type.as_deref(), Some("application/json"));
    let signature = hits[0].signature.as_deref().unwrap();
    verify_payload(&hits[0].body, signature, WEBHOOK_SECRET.as_bytes()).unwrap();

    let state = harness.storage.snapshot().await;
    assert!(state.webhook_queue.is_empty());
    assert_eq!(state.webhook_history.len(), 1);
    let history = &state.webhook_history[0];
    assert!(history.is_success);
    assert_eq!(history.response_status, Some(200));
    assert_eq!(history.event, WebhookEvent::DepositReceived);
    assert_eq!(history.transaction_id, entry.transaction_id);
}

#[tokio::test]
async fn test_failures_back_off_then_abandon() {
    let receiver = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
    let (harness, sender) = queued(&receiver.url).await;

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let entry = head(&harness).await;
        outcomes.push(sender.process(PlainMessage::from(entry)).await.unwrap());
    }

    assert_eq!(
        outcomes,
        vec![
            DeliveryOutcome::Rescheduled {
                retries_count: 1,
                seconds_delay: 120
            },
            DeliveryOutcome::Rescheduled {
                retries_count: 2,
                seconds_delay: 240
            },
            DeliveryOutcome::Abandoned { retries_count: 3 },
        ]
    );

    let state = harness.storage.snapshot().await;
    assert!(state.webhook_queue.is_empty());
    assert_eq!(state.webhook_history.len(), 3);
    assert!(state.webhook_history.iter().all(|h| !h.is_success));
    assert!(
        state
            .webhook_history
            .iter()
            .all(|h| h.response_status == Some(500))
    );
    assert_eq!(state.webhook_history[0].response_body.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_rescheduled_entry_is_not_due_yet() {
    let receiver = spawn_receiver(StatusCode::OK, r#"{"success":false}"#).await;
    let (harness, sender) = queued(&receiver.url).await;

    let outcome = sender.process(PlainMessage::from(head(&harness).await)).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Rescheduled { .. }));

    let entry = head(&harness).await;
    assert_eq!(entry.retries_count, 1);
    assert!(!entry.is_due(OffsetDateTime::now_utc()));

    let queue = WebhookQueue::new(Arc::new(sender), Arc::new(InFlightLocks::new()), &config());
    let report = queue.poll_once().await.unwrap();
    assert!(report.dispatched.is_empty());
    assert_eq!(report.skipped, 0);
    assert_eq!(receiver.hits().len(), 1);
}

#[tokio::test]
async fn test_plain_text_ack_is_a_failure() {
    let receiver = spawn_receiver(StatusCode::OK, "OK").await;
    let (harness, sender) = queued(&receiver.url).await;

    let outcome = sender.process(PlainMessage::from(head(&harness).await)).await.unwrap();

    assert_eq!(
        outcome,
        DeliveryOutcome::Rescheduled {
            retries_count: 1,
            seconds_delay: 120
        }
    );
    let state = harness.storage.snapshot().await;
    assert_eq!(state.webhook_queue.len(), 1);
    assert_eq!(state.webhook_history[0].response_status, Some(200));
    assert_eq!(state.webhook_history[0].response_body.as_deref(), Some("OK"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_failure() {
    let (harness, sender) = queued("http://127.0.0.1:9/hook").await;

    let outcome = sender.process(PlainMessage::from(head(&harness).await)).await.unwrap();

    assert!(matches!(outcome, DeliveryOutcome::Rescheduled { retries_count: 1, .. }));
    let state = harness.storage.snapshot().await;
    assert_eq!(state.webhook_history.len(), 1);
    assert_eq!(state.webhook_history[0].response_status, None);
}

#[tokio::test]
async fn test_in_flight_webhook_is_skipped() {
    let receiver = spawn_receiver(StatusCode::OK, ACK).await;
    let (harness, sender) = queued(&receiver.url).await;
    let queue = WebhookQueue::new(Arc::new(sender), Arc::new(InFlightLocks::new()), &config());

    let guard = queue.locks().try_lock(WEBHOOK_ID).unwrap();
    let report = queue.poll_once().await.unwrap();
    assert!(report.dispatched.is_empty());
    assert_eq!(report.skipped, 1);
    assert!(receiver.hits().is_empty());

    drop(guard);
    assert!(!queue.locks().is_held(WEBHOOK_ID));
    let report = queue.poll_once().await.unwrap();
    assert_eq!(report.dispatched.len(), 1);
    for handle in report.dispatched {
        handle.await.unwrap();
    }

    assert_eq!(receiver.hits().len(), 1);
    assert!(harness.storage.snapshot().await.webhook_queue.is_empty());
    assert!(!queue.locks().is_held(WEBHOOK_ID));
}

#[tokio::test]
async fn test_stale_poll_skips_delivered_entry() {
    let receiver = spawn_receiver(StatusCode::OK, ACK).await;
    let (harness, sender) = queued(&receiver.url).await;
    let loaded = harness.storage.snapshot().await.webhook_queue;

    let outcome = sender.process(PlainMessage::from(loaded[0].clone())).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);

    let queue = stale_queue(&harness, loaded);
    let report = queue.poll_once().await.unwrap();
    assert_eq!(report.dispatched.len(), 1);
    for handle in report.dispatched {
        handle.await.unwrap();
    }

    assert_eq!(receiver.hits().len(), 1);
    assert_eq!(harness.storage.snapshot().await.webhook_history.len(), 1);
    assert!(!queue.locks().is_held(WEBHOOK_ID));
}

#[tokio::test]
async fn test_stale_poll_skips_rescheduled_entry() {
    let receiver = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
    let (harness, sender) = queued(&receiver.url).await;
    let loaded = harness.storage.snapshot().await.webhook_queue;

    let outcome = sender.process(PlainMessage::from(loaded[0].clone())).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Rescheduled { retries_count: 1, .. }));

    let queue = stale_queue(&harness, loaded);
    let report = queue.poll_once().await.unwrap();
    for handle in report.dispatched {
        handle.await.unwrap();
    }

    assert_eq!(receiver.hits().len(), 1);
    let state = harness.storage.snapshot().await;
    assert_eq!(state.webhook_history.len(), 1);
    assert_eq!(state.webhook_queue.len(), 1);
    assert_eq!(state.webhook_queue[0].retries_count, 1);
}

#[tokio::test]
async fn test_manual_sends_leave_queue_untouched() {
    let receiver = spawn_receiver(StatusCode::OK, ACK).await;
    let (harness, sender) = queued(&receiver.url).await;

    let message = PlainMessage::test(&webhook(&receiver.url), &store(), OffsetDateTime::now_utc())
        .unwrap();
    assert_eq!(message.id, None);
    assert_eq!(message.event, WebhookEvent::Test);
    let outcome = sender.process(message).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);

    let state = harness.storage.snapshot().await;
    assert_eq!(state.webhook_queue.len(), 1);
    assert_eq!(state.webhook_history.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&receiver.hits()[0].body).unwrap();
    assert_eq!(body["event"], "test");
    assert_eq!(body["webhook_id"], WEBHOOK_ID.to_string());

    let history = sender
        .storage()
        .get_send_history(state.webhook_history[0].id)
        .await
        .unwrap()
        .unwrap();
    let outcome = sender
        .process(PlainMessage::resend(history, &store()))
        .await
        .unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);

    let hits = receiver.hits();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].body, hits[1].body);
    verify_payload(
        &hits[1].body,
        hits[1].signature.as_deref().unwrap(),
        WEBHOOK_SECRET.as_bytes(),
    )
    .unwrap();
    let state = harness.storage.snapshot().await;
    assert_eq!(state.webhook_queue.len(), 1);
    assert_eq!(state.webhook_history.len(), 2);
}

#[tokio::test]
async fn test_failed_manual_send() {
    let receiver = spawn_receiver(StatusCode::BAD_GATEWAY, "").await;
    let (harness, sender) = queued(&receiver.url).await;

    let message = PlainMessage::test(&webhook(&receiver.url), &store(), OffsetDateTime::now_utc())
        .unwrap();
    assert_eq!(sender.process(message).await.unwrap(), DeliveryOutcome::Failed);

    let state = harness.storage.snapshot().await;
    assert_eq!(state.webhook_queue[0].retries_count, 0);
    assert_eq!(state.webhook_history[0].response_status, Some(502));
}

#[tokio::test]
async fn test_run_loop_delivers_and_stops() {
    let receiver = spawn_receiver(StatusCode::OK, ACK).await;
    let (harness, sender) = queued(&receiver.url).await;
    let config = WebhookQueueConfig {
        poll_interval: Duration::from_millis(20),
        ..config()
    };
    let queue = WebhookQueue::new(Arc::new(sender), Arc::new(InFlightLocks::new()), &config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(queue.run(shutdown_rx));

    tokio::time::timeout(Duration::from_secs(5), async {
        while !harness.storage.snapshot().await.webhook_queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receiver.hits().len(), 1);
}
