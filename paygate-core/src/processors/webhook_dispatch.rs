//! Event handlers that turn domain events into queued merchant webhooks.
//!
//! Runs inside the producer's unit of work, so a queued entry commits or
//! rolls back together with the ledger rows that caused it.

use crate::entities::WebhookEvent;
use crate::entities::stores::Store;
use crate::entities::webhooks::NewWebhookQueueEntry;
use crate::events::{DomainEvent, EventHandler, EventType, HandlerError, HandlerId, Listener};
use crate::framework::UnitOfWork;
use async_trait::async_trait;
use paygate_sdk::objects::{
    DepositWebhookPayload, InvoiceWebhookPayload, UnconfirmedDepositWebhookPayload,
    WebhookEventName, WebhookPayload, WithdrawalWebhookPayload,
};
use paygate_sdk::signature::SignedPayload;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Event types served by [`WebhookDispatcher`].
pub const DISPATCHED_EVENTS: [EventType; 4] = [
    EventType::DepositReceived,
    EventType::DepositUnconfirmed,
    EventType::WithdrawalFromProcessingReceived,
    EventType::InvoiceStatusChanged,
];

#[derive(Debug, Default)]
pub struct WebhookDispatcher;

/// A signed payload ready to be queued for every subscribed webhook.
struct Outgoing<'a> {
    store: &'a Store,
    event: WebhookEvent,
    /// Set for transaction events; enables the duplicate-send check.
    transaction_id: Option<Uuid>,
    signed: SignedPayload,
}

impl<'a> Outgoing<'a> {
    fn new<T: WebhookPayload>(
        store: &'a Store,
        transaction_id: Option<Uuid>,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        let signed = SignedPayload::new(body, store.webhook_secret.as_bytes())?;
        Ok(Self {
            store,
            event: signed.event.into(),
            transaction_id,
            signed,
        })
    }
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Register for every event in [`DISPATCHED_EVENTS`].
    pub async fn register(self: Arc<Self>, listener: &Listener) -> Vec<HandlerId> {
        let mut ids = Vec::with_capacity(DISPATCHED_EVENTS.len());
        for event_type in DISPATCHED_EVENTS {
            ids.push(listener.register(event_type, self.clone()).await);
        }
        ids
    }

    /// Returns `None` when the store filters the event out.
    async fn prepare<'e>(
        &self,
        event: &'e DomainEvent,
        uow: &mut dyn UnitOfWork,
    ) -> Result<Option<Outgoing<'e>>, HandlerError> {
        match event {
            DomainEvent::DepositReceived(e) => {
                let tx = &e.transaction;
                if !currency_enabled(uow, &e.store, &tx.currency_id).await?
                    || !meets_minimum(&e.store, tx.amount_usd, &tx.tx_hash)
                {
                    return Ok(None);
                }
                let body = DepositWebhookPayload {
                    event: WebhookEventName::DepositReceived,
                    id: tx.id,
                    store_id: tx.store_id,
                    wallet_id: tx.wallet_id.unwrap_or_default(),
                    currency_id: tx.currency_id.clone(),
                    blockchain: tx.blockchain.into(),
                    tx_hash: tx.tx_hash.clone(),
                    from_address: tx.from_address.clone(),
                    to_address: tx.to_address.clone(),
                    amount: tx.amount,
                    amount_usd: tx.amount_usd,
                    network_created_at: tx.network_created_at.unix_timestamp(),
                    is_confirmed: true,
                };
                Ok(Some(Outgoing::new(&e.store, Some(tx.id), &body)?))
            }
            DomainEvent::DepositUnconfirmed(e) => {
                let tx = &e.transaction;
                if !currency_enabled(uow, &e.store, &tx.currency_id).await?
                    || !meets_minimum(&e.store, tx.amount_usd, &tx.tx_hash)
                {
                    return Ok(None);
                }
                let body = UnconfirmedDepositWebhookPayload {
                    event: WebhookEventName::DepositUnconfirmed,
                    id: tx.id,
                    store_id: tx.store_id,
                    wallet_id: tx.wallet_id,
                    currency_id: tx.currency_id.clone(),
                    blockchain: tx.blockchain.into(),
                    tx_hash: tx.tx_hash.clone(),
                    from_address: tx.from_address.clone(),
                    to_address: tx.to_address.clone(),
                    amount: tx.amount,
                    amount_usd: tx.amount_usd,
                    network_created_at: tx.network_created_at.unix_timestamp(),
                    is_confirmed: false,
                };
                Ok(Some(Outgoing::new(&e.store, Some(tx.id), &body)?))
            }
            DomainEvent::WithdrawalFromProcessingReceived(e) => {
                let tx = &e.transaction;
                if !currency_enabled(uow, &e.store, &tx.currency_id).await? {
                    return Ok(None);
                }
                let body = WithdrawalWebhookPayload {
                    event: WebhookEventName::WithdrawalFromProcessingReceived,
                    id: tx.id,
                    store_id: tx.store_id,
                    withdrawal_id: e.withdrawal.id,
                    currency_id: tx.currency_id.clone(),
                    blockchain: tx.blockchain.into(),
                    tx_hash: tx.tx_hash.clone(),
                    address_to: e.withdrawal.address_to.clone(),
                    amount: tx.amount,
                    amount_usd: tx.amount_usd,
                    fee: tx.fee,
                    network_created_at: tx.network_created_at.unix_timestamp(),
                };
                Ok(Some(Outgoing::new(&e.store, Some(tx.id), &body)?))
            }
            DomainEvent::InvoiceStatusChanged(e) => {
                let body = InvoiceWebhookPayload {
                    event: WebhookEventName::InvoiceStatusChanged,
                    invoice_id: e.invoice.id,
                    store_id: e.invoice.store_id,
                    order_id: e.invoice.order_id.clone(),
                    status: e.invoice.status.into(),
                    previous_status: e.previous_status.into(),
                    amount_usd: e.invoice.amount_usd,
                    timestamp: e.invoice.updated_at.unix_timestamp(),
                };
                Ok(Some(Outgoing::new(&e.store, None, &body)?))
            }
            DomainEvent::DepositReceiptSent(_) => Ok(None),
        }
    }
}

async fn currency_enabled(
    uow: &mut dyn UnitOfWork,
    store: &Store,
    currency_id: &str,
) -> Result<bool, HandlerError> {
    let enabled = uow.is_currency_enabled(store.id, currency_id).await?;
    if !enabled {
        info!(
            store_id = %store.id,
            currency_id = %currency_id,
            "Currency not enabled for store, skipping webhooks"
        );
    }
    Ok(enabled)
}

fn meets_minimum(store: &Store, amount_usd: Decimal, tx_hash: &str) -> bool {
    let meets = amount_usd >= store.minimal_payment_usd;
    if !meets {
        info!(
            store_id = %store.id,
            tx_hash = %tx_hash,
            amount_usd = %amount_usd,
            minimal_payment_usd = %store.minimal_payment_usd,
            "Deposit below store minimum, skipping webhooks"
        );
    }
    meets
}

#[async_trait]
impl EventHandler for WebhookDispatcher {
    async fn handle(
        &self,
        event: &DomainEvent,
        uow: &mut dyn UnitOfWork,
    ) -> Result<(), HandlerError> {
        let Some(outgoing) = self.prepare(event, uow).await? else {
            return Ok(());
        };

        let webhooks = uow.store_webhooks(outgoing.store.id, outgoing.event).await?;
        if webhooks.is_empty() {
            debug!(
                store_id = %outgoing.store.id,
                event = %outgoing.event,
                "No webhooks subscribed"
            );
            return Ok(());
        }

        for webhook in webhooks {
            if let Some(transaction_id) = outgoing.transaction_id {
                let duplicate = uow
                    .webhook_already_sent(&webhook.url, outgoing.event, transaction_id)
                    .await?;
                if duplicate {
                    info!(
                        webhook_id = %webhook.id,
                        event = %outgoing.event,
                        transaction_id = %transaction_id,
                        "Webhook already queued or sent, skipping"
                    );
                    continue;
                }
            }

            let entry = NewWebhookQueueEntry {
                webhook_id: webhook.id,
                transaction_id: outgoing.transaction_id,
                store_id: outgoing.store.id,
                url: webhook.url.clone(),
                event: outgoing.event,
                payload: outgoing.signed.json.to_vec(),
                signature: outgoing.signed.signature.clone(),
            };
            match uow.enqueue_webhook(entry).await {
                Ok(queue_id) => info!(
                    webhook_id = %webhook.id,
                    queue_id,
                    event = %outgoing.event,
                    "Webhook queued"
                ),
                Err(e) => error!(
                    webhook_id = %webhook.id,
                    event = %outgoing.event,
                    error = %e,
                    "Failed to queue webhook"
                ),
            }
        }
        Ok(())
    }
}
