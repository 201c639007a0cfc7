use crate::events::{DomainEvent, EventHandler, EventType, HandlerError, HandlerId, Listener};
use crate::framework::UnitOfWork;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Writes an audit log line for every issued deposit receipt.
#[derive(Debug, Default)]
pub struct ReceiptLogger;

impl ReceiptLogger {
    pub async fn register(self: Arc<Self>, listener: &Listener) -> HandlerId {
        listener.register(EventType::DepositReceiptSent, self).await
    }
}

#[async_trait]
impl EventHandler for ReceiptLogger {
    async fn handle(
        &self,
        event: &DomainEvent,
        _uow: &mut dyn UnitOfWork,
    ) -> Result<(), HandlerError> {
        if let DomainEvent::DepositReceiptSent(e) = event {
            info!(
                receipt_id = %e.receipt.id,
                store_id = %e.store.id,
                transaction_id = %e.transaction.id,
                currency = %e.currency.code,
                amount = %e.receipt.amount,
                amount_usd = %e.receipt.amount_usd,
                exchange_rate = %e.exchange_rate,
                fee_usd = %e.fee_usd,
                "Deposit receipt issued"
            );
        }
        Ok(())
    }
}
