mod support;

use async_trait::async_trait;
use kanau::processor::Processor;
use paygate_core::entities::WebhookEvent;
use paygate_core::entities::invoices::InvoiceStatus;
use paygate_core::entities::transactions::TransactionType;
use paygate_core::entities::transfers::{TransferStage, TransferStatus, WithdrawalStatus};
use paygate_core::events::{DomainEvent, EventHandler, EventType, HandlerError};
use paygate_core::framework::UnitOfWork;
use paygate_core::processors::{
    CallbackError, ChangeInvoiceStatus, HandleDepositCallback, HandleTransferCallback,
    HandleTransferStatusCallback, InvoiceProcessor, ReceiptLogger,
};
use paygate_sdk::objects::{
    SystemTransactionItem, TransactionStatus, TransferStatus as SdkTransferStatus,
    TransferStatusCallback, WalletType,
};
use paygate_sdk::signature::verify_payload;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use support::*;
use uuid::Uuid;

const HOOK_URL: &str = "http://127.0.0.1:9/hook";

/// Collects the receipt ids of every `DepositReceiptSent` it sees.
#[derive(Default)]
struct ReceiptRecorder {
    receipts: Mutex<Vec<Uuid>>,
}

impl ReceiptRecorder {
    async fn attach(harness: &Harness) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        harness
            .listener
            .register(EventType::DepositReceiptSent, recorder.clone())
            .await;
        Arc::new(ReceiptLogger).register(&harness.listener).await;
        recorder
    }

    fn receipts(&self) -> Vec<Uuid> {
        self.receipts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for ReceiptRecorder {
    async fn handle(
        &self,
        event: &DomainEvent,
        _uow: &mut dyn UnitOfWork,
    ) -> Result<(), HandlerError> {
        if let DomainEvent::DepositReceiptSent(e) = event {
            self.receipts.lock().unwrap().push(e.receipt.id);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_duplicate_deposit_is_idempotent() {
    let harness = Harness::new(HOOK_URL).await;
    let callback = deposit("aa01", "10", TransactionStatus::Confirmed);

    harness
        .processor
        .process(HandleDepositCallback(callback.clone()))
        .await
        .unwrap();
    harness
        .processor
        .process(HandleDepositCallback(callback))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.transactions.len(), 1);
    assert_eq!(state.receipts.len(), 1);
    assert_eq!(state.webhook_queue.len(), 1);
}

#[tokio::test]
async fn test_zero_amount_deposit_is_noop() {
    let harness = Harness::new(HOOK_URL).await;

    harness
        .processor
        .process(HandleDepositCallback(deposit("aa02", "0", TransactionStatus::Confirmed)))
        .await
        .unwrap();
    harness
        .processor
        .process(HandleDepositCallback(deposit("aa03", "0.000", TransactionStatus::InMempool)))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert!(state.transactions.is_empty());
    assert!(state.unconfirmed_transactions.is_empty());
    assert!(state.balance_update_jobs.is_empty());
    assert!(state.webhook_queue.is_empty());
}

#[tokio::test]
async fn test_confirmed_deposit_writes_ledger_and_queues_webhook() {
    let harness = Harness::new(HOOK_URL).await;
    let recorder = ReceiptRecorder::attach(&harness).await;

    harness
        .processor
        .process(HandleDepositCallback(deposit("aa04", "10", TransactionStatus::Confirmed)))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.transactions.len(), 1);
    assert_eq!(state.receipts.len(), 1);
    let tx = &state.transactions[0];
    assert_eq!(tx.tx_type, TransactionType::Deposit);
    assert_eq!(tx.receipt_id, Some(state.receipts[0].id));
    assert_eq!(tx.amount_usd, Decimal::from(10));
    assert_eq!(tx.store_id, STORE_ID);
    assert_eq!(state.balance_update_jobs.len(), 1);
    assert_eq!(state.balance_update_jobs[0].address, WALLET_ADDRESS);
    assert_eq!(state.balance_update_jobs[0].currency_id, "usdt_tron");

    assert_eq!(state.webhook_queue.len(), 1);
    let entry = &state.webhook_queue[0];
    assert_eq!(entry.event, WebhookEvent::DepositReceived);
    assert_eq!(entry.transaction_id, Some(tx.id));
    assert_eq!(entry.webhook_id, WEBHOOK_ID);
    assert_eq!(entry.retries_count, 0);
    assert_eq!(entry.seconds_delay, 0);
    verify_payload(&entry.payload, &entry.signature, WEBHOOK_SECRET.as_bytes()).unwrap();

    let body: serde_json::Value = serde_json::from_slice(&entry.payload).unwrap();
    assert_eq!(body["event"], "deposit_received");
    assert_eq!(body["tx_hash"], "aa04");
    assert_eq!(body["is_confirmed"], true);
    assert_eq!(body["network_created_at"], 1_767_323_045);

    assert_eq!(recorder.receipts(), vec![state.receipts[0].id]);
}

#[tokio::test]
async fn test_deposit_below_store_minimum_is_not_queued() {
    let harness = Harness::new(HOOK_URL).await;

    harness
        .processor
        .process(HandleDepositCallback(deposit("aa05", "2", TransactionStatus::Confirmed)))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.transactions.len(), 1);
    assert!(state.webhook_queue.is_empty());
}

#[tokio::test]
async fn test_deposit_in_disabled_currency_is_not_queued() {
    let harness = Harness::new(HOOK_URL).await;
    let mut callback = deposit("aa06", "100", TransactionStatus::Confirmed);
    callback.contract_address = None;

    harness
        .processor
        .process(HandleDepositCallback(callback))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.transactions.len(), 1);
    assert_eq!(state.transactions[0].currency_id, "trx_tron");
    assert_eq!(state.transactions[0].amount_usd, Decimal::from(25));
    assert!(state.webhook_queue.is_empty());
}

#[tokio::test]
async fn test_unconfirmed_redelivery_queues_once() {
    let harness = Harness::new(HOOK_URL).await;
    let callback = deposit("aa07", "10", TransactionStatus::InMempool);

    for _ in 0..2 {
        harness
            .processor
            .process(HandleDepositCallback(callback.clone()))
            .await
            .unwrap();
    }

    let state = harness.storage.snapshot().await;
    assert!(state.transactions.is_empty());
    assert_eq!(state.unconfirmed_transactions.len(), 1);
    assert_eq!(state.webhook_queue.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&state.webhook_queue[0].payload).unwrap();
    assert_eq!(body["event"], "deposit_unconfirmed");
    assert_eq!(body["unconfirmed_tx_hash"], "aa07");
    assert_eq!(body["is_confirmed"], false);
    assert!(body.get("tx_hash").is_none());

    harness
        .processor
        .process(HandleDepositCallback(deposit("aa07", "10", TransactionStatus::Confirmed)))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.transactions.len(), 1);
    assert_eq!(state.unconfirmed_transactions.len(), 1);
    assert_eq!(state.webhook_queue.len(), 2);
    assert_eq!(state.webhook_queue[1].event, WebhookEvent::DepositReceived);
}

#[tokio::test]
async fn test_system_deposit_has_no_receipt() {
    let harness = Harness::new(HOOK_URL).await;
    let mut callback = deposit("aa08", "10", TransactionStatus::Confirmed);
    callback.is_system = true;
    let recorder = ReceiptRecorder::attach(&harness).await;

    harness
        .processor
        .process(HandleDepositCallback(callback))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.transactions.len(), 1);
    assert!(state.transactions[0].receipt_id.is_none());
    assert!(state.receipts.is_empty());
    assert!(recorder.receipts().is_empty());
}

#[tokio::test]
async fn test_deposit_to_unknown_wallet_fails() {
    let harness = Harness::new(HOOK_URL).await;
    let mut callback = deposit("aa09", "10", TransactionStatus::Confirmed);
    callback.to_address = "TSomebodyElse".to_string();

    let err = harness
        .processor
        .process(HandleDepositCallback(callback))
        .await
        .unwrap_err();

    assert!(matches!(err, CallbackError::WalletNotFound { .. }));
    assert!(err.is_data_error());
    assert!(harness.storage.snapshot().await.transactions.is_empty());
}

#[tokio::test]
async fn test_malformed_amount_fails_only_that_call() {
    let harness = Harness::new(HOOK_URL).await;

    let err = harness
        .processor
        .process(HandleDepositCallback(deposit("aa10", "ten", TransactionStatus::Confirmed)))
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::InvalidDecimal { field: "amount", .. }));

    harness
        .processor
        .process(HandleDepositCallback(deposit("aa11", "10", TransactionStatus::Confirmed)))
        .await
        .unwrap();
    assert_eq!(harness.storage.snapshot().await.transactions.len(), 1);
}

#[tokio::test]
async fn test_processing_transfer_without_withdrawal_is_dropped() {
    let harness = Harness::new(HOOK_URL).await;
    let mut callback = transfer("bb01", "7", "0", WalletType::Processing);
    callback.request_id = Some(Uuid::new_v4());

    harness
        .processor
        .process(HandleTransferCallback(callback))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert!(state.transactions.is_empty());
    assert!(state.balance_update_jobs.is_empty());
    assert!(state.webhook_queue.is_empty());
}

#[tokio::test]
async fn test_processing_transfer_completes_withdrawal() {
    let harness = Harness::new(HOOK_URL).await;
    let mut callback = transfer("bb02", "7", "1.5", WalletType::Processing);
    callback.request_id = Some(WITHDRAWAL_REQUEST_ID);

    harness
        .processor
        .process(HandleTransferCallback(callback))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.transactions.len(), 1);
    let tx = &state.transactions[0];
    assert_eq!(tx.tx_type, TransactionType::WithdrawalFromProcessing);
    assert_eq!(tx.fee_usd, Decimal::new(375, 3));
    assert_eq!(state.withdrawals[0].status, WithdrawalStatus::Completed);
    assert_eq!(state.withdrawals[0].tx_hash.as_deref(), Some("bb02"));
    assert_eq!(state.balance_update_jobs.len(), 1);
    assert_eq!(state.balance_update_jobs[0].address, WALLET_ADDRESS);

    assert_eq!(state.webhook_queue.len(), 1);
    let entry = &state.webhook_queue[0];
    assert_eq!(entry.event, WebhookEvent::WithdrawalFromProcessingReceived);
    let body: serde_json::Value = serde_json::from_slice(&entry.payload).unwrap();
    assert_eq!(body["withdrawal_id"], WITHDRAWAL_ID.to_string());
    assert_eq!(body["address_to"], "TCustomer");
}

#[tokio::test]
async fn test_hot_wallet_token_transfer_refreshes_native_balance() {
    let harness = Harness::new(HOOK_URL).await;

    harness
        .processor
        .process(HandleTransferCallback(transfer("bb03", "3", "1.5", WalletType::Hot)))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.transactions.len(), 1);
    assert_eq!(
        state.transactions[0].tx_type,
        TransactionType::TransferFromHotWallet
    );
    let currencies: Vec<_> = state
        .balance_update_jobs
        .iter()
        .map(|job| job.currency_id.as_str())
        .collect();
    assert_eq!(currencies, vec!["usdt_tron", "trx_tron"]);
    assert!(state.webhook_queue.is_empty());
}

#[tokio::test]
async fn test_unconfirmed_transfer_is_noop() {
    let harness = Harness::new(HOOK_URL).await;
    let mut callback = transfer("bb04", "3", "0", WalletType::Hot);
    callback.status = TransactionStatus::WaitingConfirmations;

    harness
        .processor
        .process(HandleTransferCallback(callback))
        .await
        .unwrap();

    assert!(harness.storage.snapshot().await.transactions.is_empty());
}

#[tokio::test]
async fn test_unsupported_wallet_type_is_rejected() {
    let harness = Harness::new(HOOK_URL).await;

    let err = harness
        .processor
        .process(HandleTransferCallback(transfer("bb05", "3", "0", WalletType::Cold)))
        .await
        .unwrap_err();

    assert!(matches!(err, CallbackError::UnsupportedWalletType(WalletType::Cold)));
    assert!(harness.storage.snapshot().await.transactions.is_empty());
}

fn system_item(fee: &str) -> SystemTransactionItem {
    SystemTransactionItem {
        id: Uuid::new_v4(),
        transfer_id: Uuid::from_u128(0x7f01),
        tx_hash: "cc01".to_string(),
        bandwidth_amount: "345".to_string(),
        energy_amount: "65000".to_string(),
        native_token_amount: "0".to_string(),
        native_token_fee: fee.to_string(),
        tx_type: "delegate_resources".to_string(),
        status: "success".to_string(),
        step: "delegate".to_string(),
    }
}

fn status_callback(items: Vec<SystemTransactionItem>) -> TransferStatusCallback {
    TransferStatusCallback {
        kind: "transfer_from_processing".to_string(),
        status: SdkTransferStatus::Completed,
        system_transactions: items,
        step: "done".to_string(),
        error_message: None,
        request_id: TRANSFER_REQUEST_ID,
    }
}

#[tokio::test]
async fn test_status_callback_updates_transfer() {
    let harness = Harness::new(HOOK_URL).await;

    harness
        .processor
        .process(HandleTransferStatusCallback(status_callback(vec![
            system_item("1.1"),
            system_item("0"),
        ])))
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.transfers[0].status, TransferStatus::Completed);
    assert_eq!(state.transfers[0].stage, TransferStage::Completed);
    assert_eq!(state.transfers[0].step.as_deref(), Some("done"));
    assert_eq!(state.system_transactions.len(), 2);
}

#[tokio::test]
async fn test_status_callback_with_malformed_item_writes_nothing() {
    let harness = Harness::new(HOOK_URL).await;

    let err = harness
        .processor
        .process(HandleTransferStatusCallback(status_callback(vec![
            system_item("1.1"),
            system_item("n/a"),
        ])))
        .await
        .unwrap_err();

    assert!(matches!(err, CallbackError::InvalidSystemTransaction(_)));
    let state = harness.storage.snapshot().await;
    assert_eq!(state.transfers[0].status, TransferStatus::New);
    assert!(state.system_transactions.is_empty());
}

#[tokio::test]
async fn test_status_callback_for_unknown_transfer() {
    let harness = Harness::new(HOOK_URL).await;
    let mut callback = status_callback(vec![system_item("1")]);
    callback.request_id = Uuid::new_v4();

    let err = harness
        .processor
        .process(HandleTransferStatusCallback(callback))
        .await
        .unwrap_err();

    assert!(matches!(err, CallbackError::TransferNotFound(_)));
    assert!(harness.storage.snapshot().await.system_transactions.is_empty());
}

struct Failing;

#[async_trait]
impl EventHandler for Failing {
    async fn handle(
        &self,
        _event: &DomainEvent,
        _uow: &mut dyn UnitOfWork,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::Failed("downstream unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_failing_handler_rolls_back_ledger_write() {
    let harness = Harness::new(HOOK_URL).await;
    harness
        .listener
        .register(EventType::DepositReceived, Arc::new(Failing))
        .await;

    let err = harness
        .processor
        .process(HandleDepositCallback(deposit("aa12", "10", TransactionStatus::Confirmed)))
        .await
        .unwrap_err();

    match err {
        CallbackError::Fire(fire) => assert_eq!(fire.failures.len(), 1),
        other => panic!("unexpected error: {other}"),
    }
    let state = harness.storage.snapshot().await;
    assert!(state.transactions.is_empty());
    assert!(state.receipts.is_empty());
    assert!(state.balance_update_jobs.is_empty());
    assert!(state.webhook_queue.is_empty());
}

#[tokio::test]
async fn test_invoice_status_change_queues_webhook() {
    let harness = Harness::new(HOOK_URL).await;
    let invoices = InvoiceProcessor::new(harness.storage.clone(), harness.listener.clone());

    let invoice = invoices
        .process(ChangeInvoiceStatus {
            invoice_id: INVOICE_ID,
            status: InvoiceStatus::Paid,
        })
        .await
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);

    invoices
        .process(ChangeInvoiceStatus {
            invoice_id: INVOICE_ID,
            status: InvoiceStatus::Paid,
        })
        .await
        .unwrap();

    let state = harness.storage.snapshot().await;
    assert_eq!(state.webhook_queue.len(), 1);
    let entry = &state.webhook_queue[0];
    assert_eq!(entry.event, WebhookEvent::InvoiceStatusChanged);
    assert_eq!(entry.transaction_id, None);
    let body: serde_json::Value = serde_json::from_slice(&entry.payload).unwrap();
    assert_eq!(body["status"], "paid");
    assert_eq!(body["previous_status"], "pending");
    assert_eq!(body["order_id"], "order-42");
}
