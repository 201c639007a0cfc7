//! In-process event bus.
//!
//! # Event Flow
//!
//! 1. Callback ingestion writes ledger rows inside a unit of work
//! 2. It fires a [`DomainEvent`] through the shared [`Listener`], passing the
//!    same unit of work along
//! 3. Handlers (webhook dispatch, receipt logging) run in ascending id order
//!    and write through that unit of work
//! 4. The unit commits only when every handler succeeded
//!
//! Events are ephemeral. They live for one `fire` call and are never stored.

pub mod listener;
pub mod types;

pub use listener::{EventHandler, FireError, HandlerError, HandlerId, Listener, ListenerError};
pub use types::{
    DepositReceiptSent, DepositReceived, DepositUnconfirmed, DomainEvent, EventType,
    InvoiceStatusChanged, WithdrawalFromProcessingReceived,
};
