//! Storage seam.
//!
//! [`Storage`] is the long-lived handle shared by the processors. Anything that
//! must be atomic with a ledger write goes through a [`UnitOfWork`] obtained
//! from [`Storage::begin`]; the delivery queue works outside of one.

pub mod memory;
pub mod postgres;

use crate::entities::WebhookEvent;
use crate::entities::currencies::Currency;
use crate::entities::invoices::{Invoice, InvoiceStatus};
use crate::entities::stores::{Store, StoreWebhook};
use crate::entities::transactions::{
    NewReceipt, NewTransaction, NewUnconfirmedTransaction, Receipt, Transaction,
    UnconfirmedTransaction,
};
use crate::entities::transfers::{NewSystemTransaction, TransferStatusUpdate, Withdrawal};
use crate::entities::wallets::{BalanceUpdateJob, Wallet};
use crate::entities::webhooks::{
    NewWebhookQueueEntry, NewWebhookSendHistory, RescheduleWebhookQueueEntry, WebhookQueueEntry,
    WebhookSendHistory,
};
use crate::entities::ChainName;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    Serializable,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Serialization failures and unique violations. The caller may retry
    /// the whole request.
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict(_) => true,
            StoreError::Database(sqlx::Error::Database(e)) => {
                matches!(e.code().as_deref(), Some("40001") | Some("23505"))
            }
            StoreError::Database(_) => false,
        }
    }
}

/// One atomic unit of database work.
///
/// Dropping a unit without calling [`UnitOfWork::commit`] discards it.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_transaction(
        &mut self,
        tx_hash: &str,
        bc_uniq_key: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn find_unconfirmed_transaction(
        &mut self,
        tx_hash: &str,
        bc_uniq_key: &str,
    ) -> Result<Option<UnconfirmedTransaction>, StoreError>;

    async fn find_currency(
        &mut self,
        blockchain: ChainName,
        contract_address: Option<&str>,
    ) -> Result<Option<Currency>, StoreError>;

    async fn find_wallet(
        &mut self,
        blockchain: ChainName,
        address: &str,
    ) -> Result<Option<Wallet>, StoreError>;

    async fn get_store(&mut self, store_id: Uuid) -> Result<Option<Store>, StoreError>;

    async fn is_currency_enabled(
        &mut self,
        store_id: Uuid,
        currency_id: &str,
    ) -> Result<bool, StoreError>;

    async fn store_webhooks(
        &mut self,
        store_id: Uuid,
        event: WebhookEvent,
    ) -> Result<Vec<StoreWebhook>, StoreError>;

    async fn find_withdrawal(&mut self, request_id: Uuid)
    -> Result<Option<Withdrawal>, StoreError>;

    async fn find_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError>;

    async fn webhook_already_sent(
        &mut self,
        url: &str,
        event: WebhookEvent,
        transaction_id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Returns the existing row when one is already stored for the same
    /// `(tx_hash, bc_uniq_key)`.
    async fn create_unconfirmed_transaction(
        &mut self,
        new: NewUnconfirmedTransaction,
    ) -> Result<UnconfirmedTransaction, StoreError>;

    async fn create_receipt(&mut self, new: NewReceipt) -> Result<Receipt, StoreError>;

    async fn create_transaction(&mut self, new: NewTransaction) -> Result<Transaction, StoreError>;

    async fn enqueue_balance_update(&mut self, job: BalanceUpdateJob) -> Result<(), StoreError>;

    async fn complete_withdrawal(
        &mut self,
        withdrawal_id: Uuid,
        tx_hash: &str,
    ) -> Result<(), StoreError>;

    /// Returns `false` when no transfer matches the request id.
    async fn update_transfer_status(
        &mut self,
        update: TransferStatusUpdate,
    ) -> Result<bool, StoreError>;

    async fn insert_system_transactions(
        &mut self,
        items: Vec<NewSystemTransaction>,
    ) -> Result<u64, StoreError>;

    async fn update_invoice_status(
        &mut self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<Invoice>, StoreError>;

    /// A failed enqueue leaves the rest of the unit usable.
    async fn enqueue_webhook(&mut self, entry: NewWebhookQueueEntry) -> Result<i64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn due_webhooks(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<WebhookQueueEntry>, StoreError>;

    async fn get_queue_entry(&self, id: i64) -> Result<Option<WebhookQueueEntry>, StoreError>;

    async fn insert_send_history(&self, row: NewWebhookSendHistory) -> Result<i64, StoreError>;

    async fn delete_queue_entry(&self, id: i64) -> Result<(), StoreError>;

    async fn reschedule_queue_entry(
        &self,
        update: RescheduleWebhookQueueEntry,
    ) -> Result<(), StoreError>;

    async fn get_send_history(&self, id: i64) -> Result<Option<WebhookSendHistory>, StoreError>;

    async fn get_store_webhook(&self, webhook_id: Uuid)
    -> Result<Option<StoreWebhook>, StoreError>;

    async fn get_store(&self, store_id: Uuid) -> Result<Option<Store>, StoreError>;
}
