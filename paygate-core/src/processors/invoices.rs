//! Invoice status changes.
//!
//! Changing the status fires `InvoiceStatusChanged` in the same unit of work,
//! so the merchant webhook is queued only if the change commits.

use crate::entities::invoices::{Invoice, InvoiceStatus};
use crate::events::{DomainEvent, FireError, InvoiceStatusChanged, Listener};
use crate::framework::{IsolationLevel, Storage, StoreError, UnitOfWork};
use kanau::processor::Processor;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("invoice not found: {0}")]
    NotFound(Uuid),

    #[error("store not found: {0}")]
    StoreNotFound(Uuid),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("event dispatch failed: {0}")]
    Fire(#[from] FireError),
}

#[derive(Debug, Clone, Copy)]
pub struct ChangeInvoiceStatus {
    pub invoice_id: Uuid,
    pub status: InvoiceStatus,
}

pub struct InvoiceProcessor {
    storage: Arc<dyn Storage>,
    listener: Arc<Listener>,
}

impl InvoiceProcessor {
    pub fn new(storage: Arc<dyn Storage>, listener: Arc<Listener>) -> Self {
        Self { storage, listener }
    }

    async fn change_status(
        &self,
        cmd: ChangeInvoiceStatus,
        uow: &mut dyn UnitOfWork,
    ) -> Result<Invoice, InvoiceError> {
        let current = uow
            .find_invoice(cmd.invoice_id)
            .await?
            .ok_or(InvoiceError::NotFound(cmd.invoice_id))?;
        if current.status == cmd.status {
            debug!(invoice_id = %current.id, status = ?current.status, "Invoice status unchanged");
            return Ok(current);
        }

        let store = uow
            .get_store(current.store_id)
            .await?
            .ok_or(InvoiceError::StoreNotFound(current.store_id))?;
        let updated = uow
            .update_invoice_status(cmd.invoice_id, cmd.status)
            .await?
            .ok_or(InvoiceError::NotFound(cmd.invoice_id))?;

        let event = DomainEvent::InvoiceStatusChanged(InvoiceStatusChanged {
            invoice: updated.clone(),
            previous_status: current.status,
            store,
        });
        self.listener.fire(&event, uow).await?;

        info!(
            invoice_id = %updated.id,
            previous_status = ?current.status,
            status = ?updated.status,
            "Invoice status changed"
        );
        Ok(updated)
    }
}

impl Processor<ChangeInvoiceStatus> for InvoiceProcessor {
    type Output = Invoice;
    type Error = InvoiceError;

    #[tracing::instrument(skip_all, err, fields(invoice_id = %cmd.invoice_id))]
    async fn process(&self, cmd: ChangeInvoiceStatus) -> Result<Invoice, InvoiceError> {
        let mut uow = self.storage.begin(IsolationLevel::ReadCommitted).await?;
        match self.change_status(cmd, uow.as_mut()).await {
            Ok(invoice) => {
                uow.commit().await?;
                Ok(invoice)
            }
            Err(e) => {
                if let Err(rollback_error) = uow.rollback().await {
                    warn!(error = %rollback_error, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}
