use super::{IsolationLevel, Storage, StoreError, UnitOfWork};
use crate::entities::ChainName;
use crate::entities::WebhookEvent;
use crate::entities::currencies::Currency;
use crate::entities::invoices::{Invoice, InvoiceStatus};
use crate::entities::stores::{Store, StoreWebhook};
use crate::entities::transactions::{
    NewReceipt, NewTransaction, NewUnconfirmedTransaction, Receipt, Transaction,
    UnconfirmedTransaction,
};
use crate::entities::transfers::{NewSystemTransaction, Transfer, TransferStatusUpdate, Withdrawal};
use crate::entities::wallets::{BalanceUpdateJob, Wallet};
use crate::entities::webhooks::{
    DeleteWebhookQueueEntry, GetDueWebhookQueueEntries, GetWebhookQueueEntry, GetWebhookSendHistory,
    InsertWebhookSendHistory, NewWebhookQueueEntry, NewWebhookSendHistory,
    RescheduleWebhookQueueEntry, WebhookQueueEntry, WebhookSendHistory,
};
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::{PgPool, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgStorage {
    pub pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgUnitOfWork {
    pub tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self.pool.begin().await?;
        if isolation == IsolationLevel::Serializable {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;
        }
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn due_webhooks(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<WebhookQueueEntry>, StoreError> {
        Ok(self.process(GetDueWebhookQueueEntries { now, limit }).await?)
    }

    async fn get_queue_entry(&self, id: i64) -> Result<Option<WebhookQueueEntry>, StoreError> {
        Ok(self.process(GetWebhookQueueEntry { id }).await?)
    }

    async fn insert_send_history(&self, row: NewWebhookSendHistory) -> Result<i64, StoreError> {
        Ok(self.process(InsertWebhookSendHistory(row)).await?)
    }

    async fn delete_queue_entry(&self, id: i64) -> Result<(), StoreError> {
        Ok(self.process(DeleteWebhookQueueEntry { id }).await?)
    }

    async fn reschedule_queue_entry(
        &self,
        update: RescheduleWebhookQueueEntry,
    ) -> Result<(), StoreError> {
        Ok(self.process(update).await?)
    }

    async fn get_send_history(&self, id: i64) -> Result<Option<WebhookSendHistory>, StoreError> {
        Ok(self.process(GetWebhookSendHistory { id }).await?)
    }

    async fn get_store_webhook(
        &self,
        webhook_id: Uuid,
    ) -> Result<Option<StoreWebhook>, StoreError> {
        Ok(StoreWebhook::get(&self.pool, webhook_id).await?)
    }

    async fn get_store(&self, store_id: Uuid) -> Result<Option<Store>, StoreError> {
        Ok(Store::get(&self.pool, store_id).await?)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_transaction(
        &mut self,
        tx_hash: &str,
        bc_uniq_key: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(Transaction::find(&mut *self.tx, tx_hash, bc_uniq_key).await?)
    }

    async fn find_unconfirmed_transaction(
        &mut self,
        tx_hash: &str,
        bc_uniq_key: &str,
    ) -> Result<Option<UnconfirmedTransaction>, StoreError> {
        Ok(UnconfirmedTransaction::find(&mut *self.tx, tx_hash, bc_uniq_key).await?)
    }

    async fn find_currency(
        &mut self,
        blockchain: ChainName,
        contract_address: Option<&str>,
    ) -> Result<Option<Currency>, StoreError> {
        Ok(Currency::find(&mut *self.tx, blockchain, contract_address).await?)
    }

    async fn find_wallet(
        &mut self,
        blockchain: ChainName,
        address: &str,
    ) -> Result<Option<Wallet>, StoreError> {
        Ok(Wallet::find_by_address(&mut *self.tx, blockchain, address).await?)
    }

    async fn get_store(&mut self, store_id: Uuid) -> Result<Option<Store>, StoreError> {
        Ok(Store::get(&mut *self.tx, store_id).await?)
    }

    async fn is_currency_enabled(
        &mut self,
        store_id: Uuid,
        currency_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(Store::is_currency_enabled(&mut *self.tx, store_id, currency_id).await?)
    }

    async fn store_webhooks(
        &mut self,
        store_id: Uuid,
        event: WebhookEvent,
    ) -> Result<Vec<StoreWebhook>, StoreError> {
        Ok(StoreWebhook::for_event(&mut *self.tx, store_id, event).await?)
    }

    async fn find_withdrawal(
        &mut self,
        request_id: Uuid,
    ) -> Result<Option<Withdrawal>, StoreError> {
        Ok(Withdrawal::find_by_request_id(&mut *self.tx, request_id).await?)
    }

    async fn find_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(Invoice::get(&mut *self.tx, invoice_id).await?)
    }

    async fn webhook_already_sent(
        &mut self,
        url: &str,
        event: WebhookEvent,
        transaction_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(WebhookQueueEntry::already_sent(&mut *self.tx, url, event, transaction_id).await?)
    }

    async fn create_unconfirmed_transaction(
        &mut self,
        new: NewUnconfirmedTransaction,
    ) -> Result<UnconfirmedTransaction, StoreError> {
        if let Some(created) = UnconfirmedTransaction::insert_if_absent(&mut *self.tx, &new).await? {
            return Ok(created);
        }
        UnconfirmedTransaction::find(&mut *self.tx, &new.tx_hash, &new.bc_uniq_key)
            .await?
            .ok_or_else(|| {
                StoreError::Conflict(format!(
                    "unconfirmed transaction {} vanished after conflicting insert",
                    new.tx_hash
                ))
            })
    }

    async fn create_receipt(&mut self, new: NewReceipt) -> Result<Receipt, StoreError> {
        Ok(Receipt::create(&mut *self.tx, new).await?)
    }

    async fn create_transaction(&mut self, new: NewTransaction) -> Result<Transaction, StoreError> {
        Ok(Transaction::create(&mut *self.tx, new).await?)
    }

    async fn enqueue_balance_update(&mut self, job: BalanceUpdateJob) -> Result<(), StoreError> {
        Ok(BalanceUpdateJob::enqueue(&mut *self.tx, &job).await?)
    }

    async fn complete_withdrawal(
        &mut self,
        withdrawal_id: Uuid,
        tx_hash: &str,
    ) -> Result<(), StoreError> {
        Ok(Withdrawal::complete(&mut *self.tx, withdrawal_id, tx_hash).await?)
    }

    async fn update_transfer_status(
        &mut self,
        update: TransferStatusUpdate,
    ) -> Result<bool, StoreError> {
        Ok(Transfer::update_status(&mut *self.tx, &update).await?)
    }

    async fn insert_system_transactions(
        &mut self,
        items: Vec<NewSystemTransaction>,
    ) -> Result<u64, StoreError> {
        Ok(Transfer::insert_system_transactions(&mut *self.tx, &items).await?)
    }

    async fn update_invoice_status(
        &mut self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<Invoice>, StoreError> {
        Ok(Invoice::update_status(&mut *self.tx, invoice_id, status).await?)
    }

    async fn enqueue_webhook(&mut self, entry: NewWebhookQueueEntry) -> Result<i64, StoreError> {
        // Savepoint, so a failed insert does not poison the outer transaction.
        let mut savepoint = sqlx::Acquire::begin(&mut self.tx).await?;
        match WebhookQueueEntry::enqueue(&mut *savepoint, &entry).await {
            Ok(id) => {
                savepoint.commit().await?;
                Ok(id)
            }
            Err(e) => {
                savepoint.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.rollback().await?)
    }
}
