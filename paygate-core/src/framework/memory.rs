//! In-memory storage.
//!
//! A unit of work holds the store lock for its whole lifetime and edits a
//! private copy of the state, so units are serializable by construction and a
//! dropped or rolled back unit leaves no trace.

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
use crate::entities::transfers::{
    NewSystemTransaction, Transfer, TransferStatusUpdate, Withdrawal, WithdrawalStatus,
};
use crate::entities::wallets::{BalanceUpdateJob, Wallet};
use crate::entities::webhooks::{
    NewWebhookQueueEntry, NewWebhookSendHistory, RescheduleWebhookQueueEntry, WebhookQueueEntry,
    WebhookSendHistory,
};
use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub currencies: Vec<Currency>,
    pub stores: Vec<Store>,
    /// `(store_id, currency_id)` pairs.
    pub store_currencies: Vec<(Uuid, String)>,
    pub store_webhooks: Vec<StoreWebhook>,
    pub wallets: Vec<Wallet>,
    pub transactions: Vec<Transaction>,
    pub unconfirmed_transactions: Vec<UnconfirmedTransaction>,
    pub receipts: Vec<Receipt>,
    pub balance_update_jobs: Vec<BalanceUpdateJob>,
    pub withdrawals: Vec<Withdrawal>,
    pub transfers: Vec<Transfer>,
    pub system_transactions: Vec<NewSystemTransaction>,
    pub invoices: Vec<Invoice>,
    pub webhook_queue: Vec<WebhookQueueEntry>,
    pub webhook_history: Vec<WebhookSendHistory>,
    /// Last issued queue id.
    pub next_queue_id: i64,
    /// Last issued history id.
    pub next_history_id: i64,
}

impl MemoryState {
    fn next_queue_id(&mut self) -> i64 {
        self.next_queue_id += 1;
        self.next_queue_id
    }

    fn next_history_id(&mut self) -> i64 {
        self.next_history_id += 1;
        self.next_history_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new(state: MemoryState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Edit the committed state directly.
    pub async fn update<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut state)
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self, _isolation: IsolationLevel) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn due_webhooks(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<WebhookQueueEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<_> = state
            .webhook_queue
            .iter()
            .filter(|entry| entry.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|entry| entry.id);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn get_queue_entry(&self, id: i64) -> Result<Option<WebhookQueueEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.webhook_queue.iter().find(|e| e.id == id).cloned())
    }

    async fn insert_send_history(&self, row: NewWebhookSendHistory) -> Result<i64, StoreError> {
        let mut state = self.state.lock().await;
        let id = state.next_history_id();
        state.webhook_history.push(WebhookSendHistory {
            id,
            webhook_id: row.webhook_id,
            store_id: row.store_id,
            transaction_id: row.transaction_id,
            url: row.url,
            event: row.event,
            request_payload: row.request_payload,
            response_body: row.response_body,
            response_status: row.response_status,
            is_success: row.is_success,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(id)
    }

    async fn delete_queue_entry(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.webhook_queue.retain(|entry| entry.id != id);
        Ok(())
    }

    async fn reschedule_queue_entry(
        &self,
        update: RescheduleWebhookQueueEntry,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.webhook_queue.iter_mut().find(|e| e.id == update.id) {
            entry.seconds_delay = update.seconds_delay;
            entry.retries_count = update.retries_count;
            entry.last_sent_at = update.last_sent_at;
        }
        Ok(())
    }

    async fn get_send_history(&self, id: i64) -> Result<Option<WebhookSendHistory>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.webhook_history.iter().find(|h| h.id == id).cloned())
    }

    async fn get_store_webhook(
        &self,
        webhook_id: Uuid,
    ) -> Result<Option<StoreWebhook>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .store_webhooks
            .iter()
            .find(|w| w.id == webhook_id)
            .cloned())
    }

    async fn get_store(&self, store_id: Uuid) -> Result<Option<Store>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.stores.iter().find(|s| s.id == store_id).cloned())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_transaction(
        &mut self,
        tx_hash: &str,
        bc_uniq_key: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .working
            .transactions
            .iter()
            .find(|t| t.tx_hash == tx_hash && t.bc_uniq_key == bc_uniq_key)
            .cloned())
    }

    async fn find_unconfirmed_transaction(
        &mut self,
        tx_hash: &str,
        bc_uniq_key: &str,
    ) -> Result<Option<UnconfirmedTransaction>, StoreError> {
        Ok(self
            .working
            .unconfirmed_transactions
            .iter()
            .find(|t| t.tx_hash == tx_hash && t.bc_uniq_key == bc_uniq_key)
            .cloned())
    }

    async fn find_currency(
        &mut self,
        blockchain: ChainName,
        contract_address: Option<&str>,
    ) -> Result<Option<Currency>, StoreError> {
        Ok(self
            .working
            .currencies
            .iter()
            .find(|c| c.matches(blockchain, contract_address))
            .cloned())
    }

    async fn find_wallet(
        &mut self,
        blockchain: ChainName,
        address: &str,
    ) -> Result<Option<Wallet>, StoreError> {
        Ok(self
            .working
            .wallets
            .iter()
            .find(|w| w.blockchain == blockchain && w.address == address)
            .cloned())
    }

    async fn get_store(&mut self, store_id: Uuid) -> Result<Option<Store>, StoreError> {
        Ok(self.working.stores.iter().find(|s| s.id == store_id).cloned())
    }

    async fn is_currency_enabled(
        &mut self,
        store_id: Uuid,
        currency_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .working
            .store_currencies
            .iter()
            .any(|(store, currency)| *store == store_id && currency == currency_id))
    }

    async fn store_webhooks(
        &mut self,
        store_id: Uuid,
        event: WebhookEvent,
    ) -> Result<Vec<StoreWebhook>, StoreError> {
        Ok(self
            .working
            .store_webhooks
            .iter()
            .filter(|w| w.store_id == store_id && w.subscribes_to(event))
            .cloned()
            .collect())
    }

    async fn find_withdrawal(
        &mut self,
        request_id: Uuid,
    ) -> Result<Option<Withdrawal>, StoreError> {
        Ok(self
            .working
            .withdrawals
            .iter()
            .find(|w| w.request_id == request_id)
            .cloned())
    }

    async fn find_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .working
            .invoices
            .iter()
            .find(|i| i.id == invoice_id)
            .cloned())
    }

    async fn webhook_already_sent(
        &mut self,
        url: &str,
        event: WebhookEvent,
        transaction_id: Uuid,
    ) -> Result<bool, StoreError> {
        let queued = self.working.webhook_queue.iter().any(|e| {
            e.url == url && e.event == event && e.transaction_id == Some(transaction_id)
        });
        let sent = self.working.webhook_history.iter().any(|h| {
            h.url == url && h.event == event && h.transaction_id == Some(transaction_id)
        });
        Ok(queued || sent)
    }

    async fn create_unconfirmed_transaction(
        &mut self,
        new: NewUnconfirmedTransaction,
    ) -> Result<UnconfirmedTransaction, StoreError> {
        if let Some(existing) = self
            .find_unconfirmed_transaction(&new.tx_hash, &new.bc_uniq_key)
            .await?
        {
            return Ok(existing);
        }
        let row = new.into_unconfirmed(Uuid::now_v7(), OffsetDateTime::now_utc());
        self.working.unconfirmed_transactions.push(row.clone());
        Ok(row)
    }

    async fn create_receipt(&mut self, new: NewReceipt) -> Result<Receipt, StoreError> {
        let receipt = Receipt {
            id: Uuid::now_v7(),
            store_id: new.store_id,
            currency_id: new.currency_id,
            amount: new.amount,
            amount_usd: new.amount_usd,
            created_at: OffsetDateTime::now_utc(),
        };
        self.working.receipts.push(receipt.clone());
        Ok(receipt)
    }

    async fn create_transaction(&mut self, new: NewTransaction) -> Result<Transaction, StoreError> {
        if self
            .find_transaction(&new.tx_hash, &new.bc_uniq_key)
            .await?
            .is_some()
        {
            return Err(StoreError::Conflict(format!(
                "transaction {}/{} already exists",
                new.tx_hash, new.bc_uniq_key
            )));
        }
        let row = new.into_transaction(Uuid::now_v7(), OffsetDateTime::now_utc());
        self.working.transactions.push(row.clone());
        Ok(row)
    }

    async fn enqueue_balance_update(&mut self, job: BalanceUpdateJob) -> Result<(), StoreError> {
        if !self.working.balance_update_jobs.contains(&job) {
            self.working.balance_update_jobs.push(job);
        }
        Ok(())
    }

    async fn complete_withdrawal(
        &mut self,
        withdrawal_id: Uuid,
        tx_hash: &str,
    ) -> Result<(), StoreError> {
        if let Some(withdrawal) = self
            .working
            .withdrawals
            .iter_mut()
            .find(|w| w.id == withdrawal_id)
        {
            withdrawal.status = WithdrawalStatus::Completed;
            withdrawal.tx_hash = Some(tx_hash.to_string());
        }
        Ok(())
    }

    async fn update_transfer_status(
        &mut self,
        update: TransferStatusUpdate,
    ) -> Result<bool, StoreError> {
        let Some(transfer) = self
            .working
            .transfers
            .iter_mut()
            .find(|t| t.request_id == update.request_id)
        else {
            return Ok(false);
        };
        transfer.status = update.status;
        transfer.stage = update.stage;
        transfer.step = Some(update.step);
        transfer.error_message = update.error_message;
        Ok(true)
    }

    async fn insert_system_transactions(
        &mut self,
        items: Vec<NewSystemTransaction>,
    ) -> Result<u64, StoreError> {
        let count = items.len() as u64;
        self.working.system_transactions.extend(items);
        Ok(count)
    }

    async fn update_invoice_status(
        &mut self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<Invoice>, StoreError> {
        let Some(invoice) = self
            .working
            .invoices
            .iter_mut()
            .find(|i| i.id == invoice_id)
        else {
            return Ok(None);
        };
        invoice.status = status;
        invoice.updated_at = OffsetDateTime::now_utc();
        Ok(Some(invoice.clone()))
    }

    async fn enqueue_webhook(&mut self, entry: NewWebhookQueueEntry) -> Result<i64, StoreError> {
        let id = self.working.next_queue_id();
        let now = OffsetDateTime::now_utc();
        self.working.webhook_queue.push(WebhookQueueEntry {
            id,
            webhook_id: entry.webhook_id,
            transaction_id: entry.transaction_id,
            store_id: entry.store_id,
            url: entry.url,
            event: entry.event,
            payload: entry.payload,
            signature: entry.signature,
            seconds_delay: 0,
            last_sent_at: now,
            retries_count: 0,
            created_at: now,
        });
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
