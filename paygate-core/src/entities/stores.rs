use crate::entities::WebhookEvent;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    /// Deposits below this USD value do not trigger webhooks.
    pub minimal_payment_usd: Decimal,
    /// Key for the `X-Sign` HMAC on every webhook of this store.
    pub webhook_secret: String,
}

/// A merchant endpoint subscribed to a set of webhook events.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoreWebhook {
    pub id: Uuid,
    pub store_id: Uuid,
    pub url: String,
    pub events: Vec<WebhookEvent>,
}

impl StoreWebhook {
    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        self.events.contains(&event)
    }
}

impl Store {
    #[tracing::instrument(skip_all, err, name = "SQL:GetStore")]
    pub async fn get<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        store_id: Uuid,
    ) -> Result<Option<Store>, sqlx::Error> {
        sqlx::query_as::<_, Store>(
            r#"
            SELECT id, name, minimal_payment_usd, webhook_secret
            FROM stores
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(store_id)
        .fetch_optional(conn)
        .await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:IsCurrencyEnabled")]
    pub async fn is_currency_enabled<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        store_id: Uuid,
        currency_id: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM store_currencies
                WHERE store_id = $1 AND currency_id = $2
            )
            "#,
        )
        .bind(store_id)
        .bind(currency_id)
        .fetch_one(conn)
        .await
    }
}

impl StoreWebhook {
    #[tracing::instrument(skip_all, err, name = "SQL:GetStoreWebhook")]
    pub async fn get<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        webhook_id: Uuid,
    ) -> Result<Option<StoreWebhook>, sqlx::Error> {
        sqlx::query_as::<_, StoreWebhook>(
            r#"
            SELECT id, store_id, url, events
            FROM store_webhooks
            WHERE id = $1
            "#,
        )
        .bind(webhook_id)
        .fetch_optional(conn)
        .await
    }

    /// All webhooks of a store that subscribe to `event`.
    #[tracing::instrument(skip_all, err, name = "SQL:GetStoreWebhooksForEvent")]
    pub async fn for_event<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        store_id: Uuid,
        event: WebhookEvent,
    ) -> Result<Vec<StoreWebhook>, sqlx::Error> {
        sqlx::query_as::<_, StoreWebhook>(
            r#"
            SELECT id, store_id, url, events
            FROM store_webhooks
            WHERE store_id = $1 AND $2 = ANY(events)
            ORDER BY created_at ASC
            "#,
        )
        .bind(store_id)
        .bind(event)
        .fetch_all(conn)
        .await
    }
}
