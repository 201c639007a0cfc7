use crate::entities::ChainName;

/// A coin or token the processing engine can move.
///
/// Tokens carry their contract address; the chain's native coin has none.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Currency {
    pub id: String,
    pub code: String,
    pub blockchain: ChainName,
    pub contract_address: Option<String>,
    pub decimals: i16,
    pub is_native: bool,
}

impl Currency {
    /// Same lookup rule as [`Currency::find`], applied to an in-memory value.
    pub fn matches(&self, blockchain: ChainName, contract_address: Option<&str>) -> bool {
        if self.blockchain != blockchain {
            return false;
        }
        match (contract_address, self.contract_address.as_deref()) {
            (Some(wanted), Some(own)) => wanted.eq_ignore_ascii_case(own),
            (None, _) => self.is_native,
            (Some(_), None) => false,
        }
    }

    /// Resolve a currency from the chain and an optional contract address.
    ///
    /// `None` resolves the chain's native coin. Contract addresses are compared
    /// case-insensitively.
    #[tracing::instrument(skip_all, err, name = "SQL:FindCurrency")]
    pub async fn find<'e>(
        conn: impl sqlx::PgExecutor<'e>,
        blockchain: ChainName,
        contract_address: Option<&str>,
    ) -> Result<Option<Currency>, sqlx::Error> {
        let currency = match contract_address {
            Some(contract) => {
                sqlx::query_as::<_, Currency>(
                    r#"
                    SELECT id, code, blockchain, contract_address, decimals, is_native
                    FROM currencies
                    WHERE blockchain = $1 AND lower(contract_address) = lower($2)
                    "#,
                )
                .bind(blockchain)
                .bind(contract)
                .fetch_optional(conn)
                .await?
            }
            None => {
                sqlx::query_as::<_, Currency>(
                    r#"
                    SELECT id, code, blockchain, contract_address, decimals, is_native
                    FROM currencies
                    WHERE blockchain = $1 AND is_native = true
                    "#,
                )
                .bind(blockchain)
                .fetch_optional(conn)
                .await?
            }
        };
        Ok(currency)
    }
}
