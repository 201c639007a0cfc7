//! Processors of the delivery pipeline.
//!
//! - `CallbackProcessor`: ingests engine callbacks, fires domain events
//! - `InvoiceProcessor`: changes invoice status, fires `InvoiceStatusChanged`
//! - `WebhookDispatcher`: event handler, queues merchant webhooks
//! - `ReceiptLogger`: event handler, logs issued receipts
//! - `WebhookSender`: delivers one queued or manual webhook
//! - `WebhookQueue`: polls the queue and spawns deliveries

pub mod callbacks;
pub mod invoices;
pub mod receipts;
pub mod webhook_dispatch;
pub mod webhook_queue;
pub mod webhook_sender;

pub use callbacks::{
    CallbackError, CallbackProcessor, HandleDepositCallback, HandleTransferCallback,
    HandleTransferStatusCallback,
};
pub use invoices::{ChangeInvoiceStatus, InvoiceError, InvoiceProcessor};
pub use receipts::ReceiptLogger;
pub use webhook_dispatch::WebhookDispatcher;
pub use webhook_queue::{PollReport, WebhookQueue};
pub use webhook_sender::{
    DeliveryOutcome, MAX_RETRY_DELAY_SECS, PlainMessage, WebhookError, WebhookSender,
    calculate_retry_delay,
};
