use crate::entities::ChainName;
use uuid::Uuid;

/// A store-owned address on one chain.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub store_id: Uuid,
    pub blockchain: ChainName,
    pub address: String,
}

/// Request for the balance worker to recalculate one address/currency pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdateJob {
    pub blockchain: ChainName,
    pub address: String,
    pub currency_id: String,
}

impl Wallet {
    #[tracing::instrument(skip_all, err, name = "SQL:FindWalletByAddress")]
    pub async fn find_by_address<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        blockchain: ChainName,
        address: &str,
    ) -> Result<Option<Wallet>, sqlx::Error> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, store_id, blockchain, address
            FROM wallets
            WHERE blockchain = $1 AND address = $2
            "#,
        )
        .bind(blockchain)
        .bind(address)
        .fetch_optional(conn)
        .await
    }
}

impl BalanceUpdateJob {
    /// Queue the recalculation. Pending jobs for the same pair are merged.
    #[tracing::instrument(skip_all, err, name = "SQL:EnqueueBalanceUpdate")]
    pub async fn enqueue<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        job: &BalanceUpdateJob,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO balance_update_jobs (blockchain, address, currency_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (blockchain, address, currency_id) WHERE processed_at IS NULL
            DO NOTHING
            "#,
        )
        .bind(job.blockchain)
        .bind(&job.address)
        .bind(&job.currency_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}
