//! Event type definitions.
//!
//! Events carry the rows their handlers need. Handlers run inside the
//! producer's unit of work, so these rows match what the handlers can read.

use crate::entities::currencies::Currency;
use crate::entities::invoices::{Invoice, InvoiceStatus};
use crate::entities::stores::Store;
use crate::entities::transactions::{Receipt, Transaction, UnconfirmedTransaction};
use crate::entities::transfers::Withdrawal;
use crate::entities::WebhookEvent;
use rust_decimal::Decimal;

/// Routing key of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    DepositReceived,
    DepositUnconfirmed,
    DepositReceiptSent,
    WithdrawalFromProcessingReceived,
    InvoiceStatusChanged,
}

impl EventType {
    /// Merchant-facing webhook name, for events that have one.
    pub fn webhook_event(self) -> Option<WebhookEvent> {
        match self {
            EventType::DepositReceived => Some(WebhookEvent::DepositReceived),
            EventType::DepositUnconfirmed => Some(WebhookEvent::DepositUnconfirmed),
            EventType::WithdrawalFromProcessingReceived => {
                Some(WebhookEvent::WithdrawalFromProcessingReceived)
            }
            EventType::InvoiceStatusChanged => Some(WebhookEvent::InvoiceStatusChanged),
            EventType::DepositReceiptSent => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::DepositReceived => write!(f, "deposit_received"),
            EventType::DepositUnconfirmed => write!(f, "deposit_unconfirmed"),
            EventType::DepositReceiptSent => write!(f, "deposit_receipt_sent"),
            EventType::WithdrawalFromProcessingReceived => {
                write!(f, "withdrawal_from_processing_received")
            }
            EventType::InvoiceStatusChanged => write!(f, "invoice_status_changed"),
        }
    }
}

/// A confirmed deposit was written to the ledger.
#[derive(Debug, Clone)]
pub struct DepositReceived {
    pub transaction: Transaction,
    pub store: Store,
    pub currency: Currency,
}

/// A deposit was seen on chain but is not final yet.
#[derive(Debug, Clone)]
pub struct DepositUnconfirmed {
    pub transaction: UnconfirmedTransaction,
    pub store: Store,
    pub currency: Currency,
}

/// A receipt was issued for a confirmed user deposit.
#[derive(Debug, Clone)]
pub struct DepositReceiptSent {
    pub transaction: Transaction,
    pub receipt: Receipt,
    pub store: Store,
    pub currency: Currency,
    pub exchange_rate: Decimal,
    pub fee_usd: Decimal,
}

/// A withdrawal from the processing wallet landed on chain.
#[derive(Debug, Clone)]
pub struct WithdrawalFromProcessingReceived {
    pub transaction: Transaction,
    pub withdrawal: Withdrawal,
    pub store: Store,
    pub currency: Currency,
}

#[derive(Debug, Clone)]
pub struct InvoiceStatusChanged {
    pub invoice: Invoice,
    pub previous_status: InvoiceStatus,
    pub store: Store,
}

#[derive(Debug, Clone)]
pub enum DomainEvent {
    DepositReceived(DepositReceived),
    DepositUnconfirmed(DepositUnconfirmed),
    DepositReceiptSent(DepositReceiptSent),
    WithdrawalFromProcessingReceived(WithdrawalFromProcessingReceived),
    InvoiceStatusChanged(InvoiceStatusChanged),
}

impl DomainEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            DomainEvent::DepositReceived(_) => EventType::DepositReceived,
            DomainEvent::DepositUnconfirmed(_) => EventType::DepositUnconfirmed,
            DomainEvent::DepositReceiptSent(_) => EventType::DepositReceiptSent,
            DomainEvent::WithdrawalFromProcessingReceived(_) => {
                EventType::WithdrawalFromProcessingReceived
            }
            DomainEvent::InvoiceStatusChanged(_) => EventType::InvoiceStatusChanged,
        }
    }

    /// Human readable one-liner for logs.
    pub fn description(&self) -> String {
        match self {
            DomainEvent::DepositReceived(e) => format!(
                "deposit {} {} received on {} (tx {})",
                e.transaction.amount, e.currency.code, e.transaction.blockchain, e.transaction.tx_hash
            ),
            DomainEvent::DepositUnconfirmed(e) => format!(
                "unconfirmed deposit {} {} seen on {} (tx {})",
                e.transaction.amount, e.currency.code, e.transaction.blockchain, e.transaction.tx_hash
            ),
            DomainEvent::DepositReceiptSent(e) => format!(
                "receipt {} issued for {} {} at rate {}",
                e.receipt.id, e.receipt.amount, e.currency.code, e.exchange_rate
            ),
            DomainEvent::WithdrawalFromProcessingReceived(e) => format!(
                "withdrawal {} of {} {} sent to {} (tx {})",
                e.withdrawal.id,
                e.transaction.amount,
                e.currency.code,
                e.withdrawal.address_to,
                e.transaction.tx_hash
            ),
            DomainEvent::InvoiceStatusChanged(e) => format!(
                "invoice {} changed from {:?} to {:?}",
                e.invoice.id, e.previous_status, e.invoice.status
            ),
        }
    }
}
