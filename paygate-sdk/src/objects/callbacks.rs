//! Notifications posted by the blockchain-processing engine.
//!
//! Numeric fields arrive as decimal strings and are parsed by the receiver,
//! so a malformed value only fails the callback that carries it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blockchains::{Blockchain, WalletType};

/// Confirmation state of an on-chain transaction as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    WaitingConfirmations,
    InMempool,
    Confirmed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TransactionStatus {
    /// `waiting_confirmations` and `in_mempool` are provisional; every other
    /// status is final.
    pub fn is_unconfirmed(self) -> bool {
        matches!(
            self,
            TransactionStatus::WaitingConfirmations | TransactionStatus::InMempool
        )
    }
}

/// Deposit or transfer notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCallback {
    pub blockchain: Blockchain,
    pub hash: String,
    #[serde(default)]
    pub request_id: Option<Uuid>,
    /// RFC 3339 timestamp of the block (or mempool sighting).
    pub network_created_at: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: String,
    pub fee: String,
    #[serde(default)]
    pub contract_address: Option<String>,
    pub status: TransactionStatus,
    pub is_system: bool,
    pub confirmations: u64,
    pub tx_uniq_key: String,
    #[serde(default)]
    pub external_wallet_id: Option<String>,
    pub wallet_type: WalletType,
    pub kind: String,
}

/// Lifecycle of an outbound transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    New,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::New => write!(f, "new"),
            TransferStatus::Processing => write!(f, "processing"),
            TransferStatus::Completed => write!(f, "completed"),
            TransferStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Sub-transaction the engine performed on behalf of a transfer
/// (resource delegation, fee burn, activation, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemTransactionItem {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub tx_hash: String,
    pub bandwidth_amount: String,
    pub energy_amount: String,
    pub native_token_amount: String,
    pub native_token_fee: String,
    pub tx_type: String,
    pub status: String,
    pub step: String,
}

/// Transfer status change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatusCallback {
    pub kind: String,
    pub status: TransferStatus,
    #[serde(default)]
    pub system_transactions: Vec<SystemTransactionItem>,
    pub step: String,
    #[serde(default)]
    pub error_message: Option<String>,
    pub request_id: Uuid,
}
