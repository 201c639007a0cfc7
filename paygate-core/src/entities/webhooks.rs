//! Webhook delivery queue and send history.
//!
//! Queue rows are written inside the unit of work that produced the event and
//! are owned by the delivery poller afterwards. History rows are append-only:
//! one per attempt, queued or manual.

use crate::entities::WebhookEvent;
use crate::framework::postgres::PgStorage;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WebhookQueueEntry {
    pub id: i64,
    pub webhook_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub store_id: Uuid,
    pub url: String,
    pub event: WebhookEvent,
    pub payload: Vec<u8>,
    pub signature: String,
    pub seconds_delay: i64,
    pub last_sent_at: OffsetDateTime,
    pub retries_count: i32,
    pub created_at: OffsetDateTime,
}

impl WebhookQueueEntry {
    /// `None` when the delay runs past the representable range.
    pub fn due_at(&self) -> Option<OffsetDateTime> {
        self.last_sent_at
            .checked_add(time::Duration::seconds(self.seconds_delay))
    }

    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.due_at().is_some_and(|due| due <= now)
    }

    /// True when an attempt was recorded on this entry after `loaded` was read.
    pub fn changed_since(&self, loaded: &WebhookQueueEntry) -> bool {
        self.retries_count != loaded.retries_count || self.last_sent_at != loaded.last_sent_at
    }
}

#[derive(Debug, Clone)]
pub struct NewWebhookQueueEntry {
    pub webhook_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub store_id: Uuid,
    pub url: String,
    pub event: WebhookEvent,
    pub payload: Vec<u8>,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WebhookSendHistory {
    pub id: i64,
    pub webhook_id: Uuid,
    pub store_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub url: String,
    pub event: WebhookEvent,
    pub request_payload: Vec<u8>,
    pub response_body: Option<String>,
    pub response_status: Option<i32>,
    pub is_success: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewWebhookSendHistory {
    pub webhook_id: Uuid,
    pub store_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub url: String,
    pub event: WebhookEvent,
    pub request_payload: Vec<u8>,
    pub response_body: Option<String>,
    pub response_status: Option<i32>,
    pub is_success: bool,
}

const QUEUE_COLUMNS: &str = "id, webhook_id, transaction_id, store_id, url, event, payload, \
    signature, seconds_delay, last_sent_at, retries_count, created_at";

const HISTORY_COLUMNS: &str = "id, webhook_id, store_id, transaction_id, url, event, \
    request_payload, response_body, response_status, is_success, created_at";

impl WebhookQueueEntry {
    /// Enqueued entries are due immediately.
    #[tracing::instrument(skip_all, err, name = "SQL:EnqueueWebhook")]
    pub async fn enqueue<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        new: &NewWebhookQueueEntry,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO webhook_queue (
                webhook_id, transaction_id, store_id, url, event, payload, signature,
                seconds_delay, last_sent_at, retries_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, NOW(), 0)
            RETURNING id
            "#,
        )
        .bind(new.webhook_id)
        .bind(new.transaction_id)
        .bind(new.store_id)
        .bind(&new.url)
        .bind(new.event)
        .bind(&new.payload)
        .bind(&new.signature)
        .fetch_one(conn)
        .await
    }

    /// Whether this `(url, event, transaction)` was already queued or sent.
    #[tracing::instrument(skip_all, err, name = "SQL:WebhookAlreadySent")]
    pub async fn already_sent<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        url: &str,
        event: WebhookEvent,
        transaction_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM webhook_queue
                WHERE url = $1 AND event = $2 AND transaction_id = $3
            ) OR EXISTS (
                SELECT 1 FROM webhook_send_history
                WHERE url = $1 AND event = $2 AND transaction_id = $3
            )
            "#,
        )
        .bind(url)
        .bind(event)
        .bind(transaction_id)
        .fetch_one(conn)
        .await
    }
}

/// Entries whose delay has elapsed at `now`, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct GetDueWebhookQueueEntries {
    pub now: OffsetDateTime,
    pub limit: i64,
}

impl Processor<GetDueWebhookQueueEntries> for PgStorage {
    type Output = Vec<WebhookQueueEntry>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDueWebhookQueueEntries")]
    async fn process(
        &self,
        query: GetDueWebhookQueueEntries,
    ) -> Result<Vec<WebhookQueueEntry>, sqlx::Error> {
        sqlx::query_as::<_, WebhookQueueEntry>(&format!(
            r#"
            SELECT {QUEUE_COLUMNS}
            FROM webhook_queue
            WHERE last_sent_at + make_interval(secs => seconds_delay) <= $1
            ORDER BY id ASC
            LIMIT $2
            "#
        ))
        .bind(query.now)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GetWebhookQueueEntry {
    pub id: i64,
}

impl Processor<GetWebhookQueueEntry> for PgStorage {
    type Output = Option<WebhookQueueEntry>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWebhookQueueEntry")]
    async fn process(
        &self,
        query: GetWebhookQueueEntry,
    ) -> Result<Option<WebhookQueueEntry>, sqlx::Error> {
        sqlx::query_as::<_, WebhookQueueEntry>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM webhook_queue WHERE id = $1"
        ))
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteWebhookQueueEntry {
    pub id: i64,
}

impl Processor<DeleteWebhookQueueEntry> for PgStorage {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteWebhookQueueEntry")]
    async fn process(&self, cmd: DeleteWebhookQueueEntry) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM webhook_queue WHERE id = $1")
            .bind(cmd.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RescheduleWebhookQueueEntry {
    pub id: i64,
    pub seconds_delay: i64,
    pub retries_count: i32,
    pub last_sent_at: OffsetDateTime,
}

impl Processor<RescheduleWebhookQueueEntry> for PgStorage {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RescheduleWebhookQueueEntry")]
    async fn process(&self, cmd: RescheduleWebhookQueueEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET seconds_delay = $2, retries_count = $3, last_sent_at = $4
            WHERE id = $1
            "#,
        )
        .bind(cmd.id)
        .bind(cmd.seconds_delay)
        .bind(cmd.retries_count)
        .bind(cmd.last_sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InsertWebhookSendHistory(pub NewWebhookSendHistory);

impl Processor<InsertWebhookSendHistory> for PgStorage {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertWebhookSendHistory")]
    async fn process(&self, cmd: InsertWebhookSendHistory) -> Result<i64, sqlx::Error> {
        let row = cmd.0;
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO webhook_send_history (
                webhook_id, store_id, transaction_id, url, event, request_payload,
                response_body, response_status, is_success
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(row.webhook_id)
        .bind(row.store_id)
        .bind(row.transaction_id)
        .bind(&row.url)
        .bind(row.event)
        .bind(&row.request_payload)
        .bind(&row.response_body)
        .bind(row.response_status)
        .bind(row.is_success)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GetWebhookSendHistory {
    pub id: i64,
}

impl Processor<GetWebhookSendHistory> for PgStorage {
    type Output = Option<WebhookSendHistory>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWebhookSendHistory")]
    async fn process(
        &self,
        query: GetWebhookSendHistory,
    ) -> Result<Option<WebhookSendHistory>, sqlx::Error> {
        sqlx::query_as::<_, WebhookSendHistory>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM webhook_send_history WHERE id = $1"
        ))
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_entry_due_after_delay() {
        let entry = WebhookQueueEntry {
            id: 1,
            webhook_id: Uuid::nil(),
            transaction_id: None,
            store_id: Uuid::nil(),
            url: "http://localhost/hook".to_string(),
            event: WebhookEvent::DepositReceived,
            payload: b"{}".to_vec(),
            signature: String::new(),
            seconds_delay: 120,
            last_sent_at: datetime!(2026-01-01 00:00:00 UTC),
            retries_count: 1,
            created_at: datetime!(2026-01-01 00:00:00 UTC),
        };
        assert!(!entry.is_due(datetime!(2026-01-01 00:01:59 UTC)));
        assert!(entry.is_due(datetime!(2026-01-01 00:02:00 UTC)));

        let saturated = WebhookQueueEntry {
            seconds_delay: i64::MAX,
            ..entry
        };
        assert_eq!(saturated.due_at(), None);

        assert!(!saturated.changed_since(&saturated.clone()));
        let retried = WebhookQueueEntry {
            retries_count: 2,
            ..saturated.clone()
        };
        assert!(retried.changed_since(&saturated));
        assert!(!saturated.is_due(datetime!(2100-01-01 00:00:00 UTC)));
    }
}
