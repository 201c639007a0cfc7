#![allow(dead_code)]

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use bytes::Bytes;
use paygate_core::entities::currencies::Currency;
use paygate_core::entities::invoices::{Invoice, InvoiceStatus};
use paygate_core::entities::stores::{Store, StoreWebhook};
use paygate_core::entities::transfers::{
    Transfer, TransferStage, TransferStatus, Withdrawal, WithdrawalStatus,
};
use paygate_core::entities::wallets::Wallet;
use paygate_core::entities::{ChainName, WebhookEvent};
use paygate_core::events::Listener;
use paygate_core::framework::memory::{MemoryState, MemoryStorage};
use paygate_core::processors::{CallbackProcessor, WebhookDispatcher};
use paygate_core::rates::StaticRates;
use paygate_sdk::objects::{Blockchain, TransactionCallback, TransactionStatus, WalletType};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const STORE_ID: Uuid = Uuid::from_u128(0x5701);
pub const WEBHOOK_ID: Uuid = Uuid::from_u128(0xeb01);
pub const WALLET_ID: Uuid = Uuid::from_u128(0xa001);
pub const WITHDRAWAL_ID: Uuid = Uuid::from_u128(0xd001);
pub const WITHDRAWAL_REQUEST_ID: Uuid = Uuid::from_u128(0x4e01);
pub const TRANSFER_REQUEST_ID: Uuid = Uuid::from_u128(0x7e01);
pub const INVOICE_ID: Uuid = Uuid::from_u128(0x1701);

pub const WALLET_ADDRESS: &str = "TStoreWallet";
pub const USDT_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
pub const WEBHOOK_SECRET: &str = "store-webhook-secret";

pub fn store() -> Store {
    Store {
        id: STORE_ID,
        name: "Test Store".to_string(),
        minimal_payment_usd: Decimal::from(5),
        webhook_secret: WEBHOOK_SECRET.to_string(),
    }
}

pub fn webhook(url: &str) -> StoreWebhook {
    StoreWebhook {
        id: WEBHOOK_ID,
        store_id: STORE_ID,
        url: url.to_string(),
        events: vec![
            WebhookEvent::DepositReceived,
            WebhookEvent::DepositUnconfirmed,
            WebhookEvent::WithdrawalFromProcessingReceived,
            WebhookEvent::InvoiceStatusChanged,
        ],
    }
}

/// One store on Tron with USDT enabled, one wallet and one webhook.
pub fn seed(webhook_url: &str) -> MemoryState {
    MemoryState {
        currencies: vec![
            Currency {
                id: "trx_tron".to_string(),
                code: "TRX".to_string(),
                blockchain: ChainName::Tron,
                contract_address: None,
                decimals: 6,
                is_native: true,
            },
            Currency {
                id: "usdt_tron".to_string(),
                code: "USDT".to_string(),
                blockchain: ChainName::Tron,
                contract_address: Some(USDT_CONTRACT.to_string()),
                decimals: 6,
                is_native: false,
            },
        ],
        stores: vec![store()],
        store_currencies: vec![(STORE_ID, "usdt_tron".to_string())],
        store_webhooks: vec![webhook(webhook_url)],
        wallets: vec![Wallet {
            id: WALLET_ID,
            store_id: STORE_ID,
            blockchain: ChainName::Tron,
            address: WALLET_ADDRESS.to_string(),
        }],
        withdrawals: vec![Withdrawal {
            id: WITHDRAWAL_ID,
            store_id: STORE_ID,
            currency_id: "usdt_tron".to_string(),
            address_to: "TCustomer".to_string(),
            amount: Decimal::from(7),
            status: WithdrawalStatus::InProgress,
            request_id: WITHDRAWAL_REQUEST_ID,
            tx_hash: None,
        }],
        transfers: vec![Transfer {
            id: Uuid::from_u128(0x7f01),
            request_id: TRANSFER_REQUEST_ID,
            store_id: STORE_ID,
            status: TransferStatus::New,
            stage: TransferStage::Pending,
            step: None,
            error_message: None,
        }],
        invoices: vec![Invoice {
            id: INVOICE_ID,
            store_id: STORE_ID,
            order_id: Some("order-42".to_string()),
            status: InvoiceStatus::Pending,
            amount_usd: Decimal::from(25),
            updated_at: time::OffsetDateTime::UNIX_EPOCH,
        }],
        ..Default::default()
    }
}

pub fn rates() -> StaticRates {
    StaticRates::default()
        .with_rate("usdt_tron", Decimal::ONE)
        .with_rate("trx_tron", Decimal::new(25, 2))
}

pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub listener: Arc<Listener>,
    pub processor: CallbackProcessor,
}

impl Harness {
    pub async fn new(webhook_url: &str) -> Self {
        let storage = Arc::new(MemoryStorage::new(seed(webhook_url)));
        let listener = Arc::new(Listener::new());
        Arc::new(WebhookDispatcher::new()).register(&listener).await;
        let processor = CallbackProcessor::new(storage.clone(), listener.clone(), Arc::new(rates()));
        Self {
            storage,
            listener,
            processor,
        }
    }
}

pub fn deposit(hash: &str, amount: &str, status: TransactionStatus) -> TransactionCallback {
    TransactionCallback {
        blockchain: Blockchain::Tron,
        hash: hash.to_string(),
        request_id: None,
        network_created_at: "2026-01-02T03:04:05Z".to_string(),
        from_address: "TCustomer".to_string(),
        to_address: WALLET_ADDRESS.to_string(),
        amount: amount.to_string(),
        fee: "0".to_string(),
        contract_address: Some(USDT_CONTRACT.to_string()),
        status,
        is_system: false,
        confirmations: if status.is_unconfirmed() { 0 } else { 20 },
        tx_uniq_key: "0".to_string(),
        external_wallet_id: None,
        wallet_type: WalletType::Hot,
        kind: "deposit".to_string(),
    }
}

pub fn transfer(hash: &str, amount: &str, fee: &str, wallet_type: WalletType) -> TransactionCallback {
    TransactionCallback {
        blockchain: Blockchain::Tron,
        hash: hash.to_string(),
        request_id: None,
        network_created_at: "2026-01-02T03:04:05Z".to_string(),
        from_address: WALLET_ADDRESS.to_string(),
        to_address: "TCustomer".to_string(),
        amount: amount.to_string(),
        fee: fee.to_string(),
        contract_address: Some(USDT_CONTRACT.to_string()),
        status: TransactionStatus::Confirmed,
        is_system: false,
        confirmations: 20,
        tx_uniq_key: "0".to_string(),
        external_wallet_id: None,
        wallet_type,
        kind: "transfer".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub signature: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

type ReceiverState = (Arc<Mutex<Vec<Hit>>>, StatusCode, &'static str);

/// Local webhook endpoint answering every request with `status` and `body`.
pub struct Receiver {
    pub url: String,
    pub hits: Arc<Mutex<Vec<Hit>>>,
}

impl Receiver {
    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }
}

async fn receive(
    State((hits, status, body)): State<ReceiverState>,
    headers: HeaderMap,
    payload: Bytes,
) -> (StatusCode, &'static str) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    hits.lock().unwrap().push(Hit {
        signature: header("x-sign"),
        content_type: header("content-type"),
        body: payload,
    });
    (status, body)
}

pub async fn spawn_receiver(status: StatusCode, body: &'static str) -> Receiver {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/hook", post(receive))
        .with_state((hits.clone(), status, body));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Receiver {
        url: format!("http://{addr}/hook"),
        hits,
    }
}
