use crate::entities::ChainName;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "transaction_type")]
pub enum TransactionType {
    Deposit,
    WithdrawalFromProcessing,
    TransferFromHotWallet,
}

/// Confirmed ledger row. Unique on `(tx_hash, bc_uniq_key)`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub store_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub receipt_id: Option<Uuid>,
    pub currency_id: String,
    pub blockchain: ChainName,
    pub tx_type: TransactionType,
    pub tx_hash: String,
    pub bc_uniq_key: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
    pub fee: Decimal,
    pub fee_usd: Decimal,
    pub network_created_at: OffsetDateTime,
    pub is_system: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub store_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub receipt_id: Option<Uuid>,
    pub currency_id: String,
    pub blockchain: ChainName,
    pub tx_type: TransactionType,
    pub tx_hash: String,
    pub bc_uniq_key: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
    pub fee: Decimal,
    pub fee_usd: Decimal,
    pub network_created_at: OffsetDateTime,
    pub is_system: bool,
}

impl NewTransaction {
    pub fn into_transaction(self, id: Uuid, created_at: OffsetDateTime) -> Transaction {
        Transaction {
            id,
            store_id: self.store_id,
            wallet_id: self.wallet_id,
            receipt_id: self.receipt_id,
            currency_id: self.currency_id,
            blockchain: self.blockchain,
            tx_type: self.tx_type,
            tx_hash: self.tx_hash,
            bc_uniq_key: self.bc_uniq_key,
            from_address: self.from_address,
            to_address: self.to_address,
            amount: self.amount,
            amount_usd: self.amount_usd,
            fee: self.fee,
            fee_usd: self.fee_usd,
            network_created_at: self.network_created_at,
            is_system: self.is_system,
            created_at,
        }
    }
}

/// A deposit seen on chain but not yet final. Never promoted in place: the
/// confirmed callback creates a separate [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UnconfirmedTransaction {
    pub id: Uuid,
    pub store_id: Uuid,
    pub wallet_id: Uuid,
    pub currency_id: String,
    pub blockchain: ChainName,
    pub tx_type: TransactionType,
    pub tx_hash: String,
    pub bc_uniq_key: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
    pub network_created_at: OffsetDateTime,
    pub is_system: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUnconfirmedTransaction {
    pub store_id: Uuid,
    pub wallet_id: Uuid,
    pub currency_id: String,
    pub blockchain: ChainName,
    pub tx_type: TransactionType,
    pub tx_hash: String,
    pub bc_uniq_key: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
    pub network_created_at: OffsetDateTime,
    pub is_system: bool,
}

impl NewUnconfirmedTransaction {
    pub fn into_unconfirmed(self, id: Uuid, created_at: OffsetDateTime) -> UnconfirmedTransaction {
        UnconfirmedTransaction {
            id,
            store_id: self.store_id,
            wallet_id: self.wallet_id,
            currency_id: self.currency_id,
            blockchain: self.blockchain,
            tx_type: self.tx_type,
            tx_hash: self.tx_hash,
            bc_uniq_key: self.bc_uniq_key,
            from_address: self.from_address,
            to_address: self.to_address,
            amount: self.amount,
            amount_usd: self.amount_usd,
            network_created_at: self.network_created_at,
            is_system: self.is_system,
            created_at,
        }
    }
}

/// Merchant-facing receipt for a confirmed user deposit.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Receipt {
    pub id: Uuid,
    pub store_id: Uuid,
    pub currency_id: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub store_id: Uuid,
    pub currency_id: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
}

const TRANSACTION_COLUMNS: &str = "id, store_id, wallet_id, receipt_id, currency_id, blockchain, \
    tx_type, tx_hash, bc_uniq_key, from_address, to_address, amount, amount_usd, fee, fee_usd, \
    network_created_at, is_system, created_at";

const UNCONFIRMED_COLUMNS: &str = "id, store_id, wallet_id, currency_id, blockchain, tx_type, \
    tx_hash, bc_uniq_key, from_address, to_address, amount, amount_usd, network_created_at, \
    is_system, created_at";

impl Transaction {
    #[tracing::instrument(skip_all, err, name = "SQL:FindTransaction")]
    pub async fn find<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        tx_hash: &str,
        bc_uniq_key: &str,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE tx_hash = $1 AND bc_uniq_key = $2"
        ))
        .bind(tx_hash)
        .bind(bc_uniq_key)
        .fetch_optional(conn)
        .await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:CreateTransaction")]
    pub async fn create<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        new: NewTransaction,
    ) -> Result<Transaction, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(&format!(
            r#"
            INSERT INTO transactions (
                id, store_id, wallet_id, receipt_id, currency_id, blockchain, tx_type,
                tx_hash, bc_uniq_key, from_address, to_address, amount, amount_usd,
                fee, fee_usd, network_created_at, is_system
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(new.store_id)
        .bind(new.wallet_id)
        .bind(new.receipt_id)
        .bind(&new.currency_id)
        .bind(new.blockchain)
        .bind(new.tx_type)
        .bind(&new.tx_hash)
        .bind(&new.bc_uniq_key)
        .bind(&new.from_address)
        .bind(&new.to_address)
        .bind(new.amount)
        .bind(new.amount_usd)
        .bind(new.fee)
        .bind(new.fee_usd)
        .bind(new.network_created_at)
        .bind(new.is_system)
        .fetch_one(conn)
        .await
    }
}

impl UnconfirmedTransaction {
    #[tracing::instrument(skip_all, err, name = "SQL:FindUnconfirmedTransaction")]
    pub async fn find<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        tx_hash: &str,
        bc_uniq_key: &str,
    ) -> Result<Option<UnconfirmedTransaction>, sqlx::Error> {
        sqlx::query_as::<_, UnconfirmedTransaction>(&format!(
            "SELECT {UNCONFIRMED_COLUMNS} FROM unconfirmed_transactions \
             WHERE tx_hash = $1 AND bc_uniq_key = $2"
        ))
        .bind(tx_hash)
        .bind(bc_uniq_key)
        .fetch_optional(conn)
        .await
    }

    /// Insert the row unless one already exists for the same
    /// `(tx_hash, bc_uniq_key)`. Returns `None` when the insert was skipped.
    #[tracing::instrument(skip_all, err, name = "SQL:InsertUnconfirmedTransaction")]
    pub async fn insert_if_absent<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        new: &NewUnconfirmedTransaction,
    ) -> Result<Option<UnconfirmedTransaction>, sqlx::Error> {
        sqlx::query_as::<_, UnconfirmedTransaction>(&format!(
            r#"
            INSERT INTO unconfirmed_transactions (
                id, store_id, wallet_id, currency_id, blockchain, tx_type, tx_hash,
                bc_uniq_key, from_address, to_address, amount, amount_usd,
                network_created_at, is_system
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (tx_hash, bc_uniq_key) DO NOTHING
            RETURNING {UNCONFIRMED_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(new.store_id)
        .bind(new.wallet_id)
        .bind(&new.currency_id)
        .bind(new.blockchain)
        .bind(new.tx_type)
        .bind(&new.tx_hash)
        .bind(&new.bc_uniq_key)
        .bind(&new.from_address)
        .bind(&new.to_address)
        .bind(new.amount)
        .bind(new.amount_usd)
        .bind(new.network_created_at)
        .bind(new.is_system)
        .fetch_optional(conn)
        .await
    }
}

impl Receipt {
    #[tracing::instrument(skip_all, err, name = "SQL:CreateReceipt")]
    pub async fn create<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        new: NewReceipt,
    ) -> Result<Receipt, sqlx::Error> {
        sqlx::query_as::<_, Receipt>(
            r#"
            INSERT INTO receipts (id, store_id, currency_id, amount, amount_usd)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, store_id, currency_id, amount, amount_usd, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(new.store_id)
        .bind(&new.currency_id)
        .bind(new.amount)
        .bind(new.amount_usd)
        .fetch_one(conn)
        .await
    }
}
