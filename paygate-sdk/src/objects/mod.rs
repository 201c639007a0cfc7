pub mod blockchains;
pub mod callbacks;
pub mod webhook;

pub use blockchains::{Blockchain, WalletType};
pub use callbacks::{
    SystemTransactionItem, TransactionCallback, TransactionStatus, TransferStatus,
    TransferStatusCallback,
};
pub use webhook::{
    DepositWebhookPayload, InvoiceStatus, InvoiceWebhookPayload, TestWebhookPayload,
    UnconfirmedDepositWebhookPayload, WebhookEventName, WebhookPayload, WebhookResponse,
    WithdrawalWebhookPayload,
};
