use paygate_sdk::objects::{SystemTransactionItem, TransferStatus as SdkTransferStatus};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "withdrawal_status")]
pub enum WithdrawalStatus {
    New,
    InProgress,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    /// Only withdrawals still waiting on the chain can be completed by a
    /// transfer callback.
    pub fn awaits_transfer(self) -> bool {
        matches!(self, WithdrawalStatus::New | WithdrawalStatus::InProgress)
    }
}

/// Merchant withdrawal from a processing wallet, keyed by the engine's
/// `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub store_id: Uuid,
    pub currency_id: String,
    pub address_to: String,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub request_id: Uuid,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "transfer_status")]
pub enum TransferStatus {
    New,
    Processing,
    Completed,
    Failed,
}

impl From<SdkTransferStatus> for TransferStatus {
    fn from(value: SdkTransferStatus) -> Self {
        match value {
            SdkTransferStatus::New => TransferStatus::New,
            SdkTransferStatus::Processing => TransferStatus::Processing,
            SdkTransferStatus::Completed => TransferStatus::Completed,
            SdkTransferStatus::Failed => TransferStatus::Failed,
        }
    }
}

/// Coarse progress shown to merchants, derived from [`TransferStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "transfer_stage")]
pub enum TransferStage {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl From<TransferStatus> for TransferStage {
    fn from(value: TransferStatus) -> Self {
        match value {
            TransferStatus::New => TransferStage::Pending,
            TransferStatus::Processing => TransferStage::InProgress,
            TransferStatus::Completed => TransferStage::Completed,
            TransferStatus::Failed => TransferStage::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Transfer {
    pub id: Uuid,
    pub request_id: Uuid,
    pub store_id: Uuid,
    pub status: TransferStatus,
    pub stage: TransferStage,
    pub step: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferStatusUpdate {
    pub request_id: Uuid,
    pub status: TransferStatus,
    pub stage: TransferStage,
    pub step: String,
    pub error_message: Option<String>,
}

/// A system sub-transaction with its amounts parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSystemTransaction {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub tx_hash: String,
    pub bandwidth_amount: Decimal,
    pub energy_amount: Decimal,
    pub native_token_amount: Decimal,
    pub native_token_fee: Decimal,
    pub tx_type: String,
    pub status: String,
    pub step: String,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid decimal in field {field}: {value:?}")]
pub struct InvalidSystemTransaction {
    pub field: &'static str,
    pub value: String,
}

fn parse_amount(field: &'static str, value: &str) -> Result<Decimal, InvalidSystemTransaction> {
    Decimal::from_str(value.trim()).map_err(|_| InvalidSystemTransaction {
        field,
        value: value.to_string(),
    })
}

impl TryFrom<&SystemTransactionItem> for NewSystemTransaction {
    type Error = InvalidSystemTransaction;

    fn try_from(item: &SystemTransactionItem) -> Result<Self, Self::Error> {
        Ok(Self {
            id: item.id,
            transfer_id: item.transfer_id,
            tx_hash: item.tx_hash.clone(),
            bandwidth_amount: parse_amount("bandwidth_amount", &item.bandwidth_amount)?,
            energy_amount: parse_amount("energy_amount", &item.energy_amount)?,
            native_token_amount: parse_amount("native_token_amount", &item.native_token_amount)?,
            native_token_fee: parse_amount("native_token_fee", &item.native_token_fee)?,
            tx_type: item.tx_type.clone(),
            status: item.status.clone(),
            step: item.step.clone(),
        })
    }
}

impl Withdrawal {
    #[tracing::instrument(skip_all, err, name = "SQL:FindWithdrawalByRequestId")]
    pub async fn find_by_request_id<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        request_id: Uuid,
    ) -> Result<Option<Withdrawal>, sqlx::Error> {
        sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT id, store_id, currency_id, address_to, amount, status, request_id, tx_hash
            FROM withdrawals
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(conn)
        .await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:CompleteWithdrawal")]
    pub async fn complete<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        withdrawal_id: Uuid,
        tx_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE withdrawals
            SET status = 'completed', tx_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(withdrawal_id)
        .bind(tx_hash)
        .execute(conn)
        .await?;
        Ok(())
    }
}

impl Transfer {
    /// Returns `false` when no transfer has this `request_id`.
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateTransferStatus")]
    pub async fn update_status<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        update: &TransferStatusUpdate,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = $2, stage = $3, step = $4, error_message = $5, updated_at = NOW()
            WHERE request_id = $1
            "#,
        )
        .bind(update.request_id)
        .bind(update.status)
        .bind(update.stage)
        .bind(&update.step)
        .bind(&update.error_message)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertManySystemTransactions")]
    pub async fn insert_system_transactions<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        items: &[NewSystemTransaction],
    ) -> Result<u64, sqlx::Error> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO system_transactions (id, transfer_id, tx_hash, bandwidth_amount, \
             energy_amount, native_token_amount, native_token_fee, tx_type, status, step) ",
        );
        builder.push_values(items, |mut row, item| {
            row.push_bind(item.id)
                .push_bind(item.transfer_id)
                .push_bind(&item.tx_hash)
                .push_bind(item.bandwidth_amount)
                .push_bind(item.energy_amount)
                .push_bind(item.native_token_amount)
                .push_bind(item.native_token_fee)
                .push_bind(&item.tx_type)
                .push_bind(&item.status)
                .push_bind(&item.step);
        });
        let result = builder.build().execute(conn).await?;
        Ok(result.rows_affected())
    }
}
