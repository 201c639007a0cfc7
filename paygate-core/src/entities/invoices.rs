use paygate_sdk::objects::InvoiceStatus as SdkInvoiceStatus;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

/// Invoice status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `paygate_sdk::objects::InvoiceStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "invoice_status")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Expired,
    Cancelled,
}

impl From<InvoiceStatus> for SdkInvoiceStatus {
    fn from(value: InvoiceStatus) -> Self {
        match value {
            InvoiceStatus::Pending => SdkInvoiceStatus::Pending,
            InvoiceStatus::PartiallyPaid => SdkInvoiceStatus::PartiallyPaid,
            InvoiceStatus::Paid => SdkInvoiceStatus::Paid,
            InvoiceStatus::Expired => SdkInvoiceStatus::Expired,
            InvoiceStatus::Cancelled => SdkInvoiceStatus::Cancelled,
        }
    }
}

impl From<SdkInvoiceStatus> for InvoiceStatus {
    fn from(value: SdkInvoiceStatus) -> Self {
        match value {
            SdkInvoiceStatus::Pending => InvoiceStatus::Pending,
            SdkInvoiceStatus::PartiallyPaid => InvoiceStatus::PartiallyPaid,
            SdkInvoiceStatus::Paid => InvoiceStatus::Paid,
            SdkInvoiceStatus::Expired => InvoiceStatus::Expired,
            SdkInvoiceStatus::Cancelled => InvoiceStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub store_id: Uuid,
    pub order_id: Option<String>,
    pub status: InvoiceStatus,
    pub amount_usd: Decimal,
    pub updated_at: OffsetDateTime,
}

impl Invoice {
    #[tracing::instrument(skip_all, err, name = "SQL:GetInvoice")]
    pub async fn get<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, sqlx::Error> {
        sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, store_id, order_id, status, amount_usd, updated_at
            FROM invoices
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(conn)
        .await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:UpdateInvoiceStatus")]
    pub async fn update_status<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<Invoice>, sqlx::Error> {
        sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, store_id, order_id, status, amount_usd, updated_at
            "#,
        )
        .bind(invoice_id)
        .bind(status)
        .fetch_optional(conn)
        .await
    }
}
