//! Callback ingestion.
//!
//! Turns deposit, transfer and transfer-status notifications from the
//! processing engine into ledger rows. Every callback runs in one serializable
//! unit of work together with the handlers of the events it fires, and is
//! all-or-nothing: any error rolls the whole unit back.
//!
//! Redelivered callbacks are detected by `(tx_hash, tx_uniq_key)` and answered
//! with `Ok` without writing anything.

use crate::entities::ChainName;
use crate::entities::currencies::Currency;
use crate::entities::transactions::{
    NewReceipt, NewTransaction, NewUnconfirmedTransaction, TransactionType,
};
use crate::entities::transfers::{
    InvalidSystemTransaction, NewSystemTransaction, TransferStatus, TransferStatusUpdate,
    WithdrawalStatus,
};
use crate::entities::wallets::BalanceUpdateJob;
use crate::events::{
    DepositReceiptSent, DepositReceived, DepositUnconfirmed, DomainEvent, FireError, Listener,
    WithdrawalFromProcessingReceived,
};
use crate::framework::{IsolationLevel, Storage, StoreError, UnitOfWork};
use crate::rates::{RateError, RateProvider};
use kanau::processor::Processor;
use paygate_sdk::objects::{TransactionCallback, TransferStatusCallback, WalletType};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid decimal in field {field}: {value:?}")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("invalid network_created_at timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("currency not found on {blockchain} (contract {contract_address:?})")]
    CurrencyNotFound {
        blockchain: ChainName,
        contract_address: Option<String>,
    },

    #[error("wallet not found on {blockchain}: {address}")]
    WalletNotFound { blockchain: ChainName, address: String },

    #[error("store not found: {0}")]
    StoreNotFound(Uuid),

    #[error("rate lookup failed: {0}")]
    Rate(#[from] RateError),

    #[error("event dispatch failed: {0}")]
    Fire(#[from] FireError),

    #[error("unsupported wallet type: {0}")]
    UnsupportedWalletType(WalletType),

    #[error("transfer not found for request {0}")]
    TransferNotFound(Uuid),

    #[error(transparent)]
    InvalidSystemTransaction(#[from] InvalidSystemTransaction),
}

impl CallbackError {
    /// Errors caused by the callback's content rather than by the backend.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            CallbackError::InvalidDecimal { .. }
                | CallbackError::InvalidTimestamp(_)
                | CallbackError::CurrencyNotFound { .. }
                | CallbackError::WalletNotFound { .. }
                | CallbackError::StoreNotFound(_)
                | CallbackError::UnsupportedWalletType(_)
                | CallbackError::TransferNotFound(_)
                | CallbackError::InvalidSystemTransaction(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CallbackError::Store(e) if e.is_conflict())
    }
}

/// A deposit into a store wallet, confirmed or not.
#[derive(Debug, Clone)]
pub struct HandleDepositCallback(pub TransactionCallback);

/// An outbound transfer from a processing or hot wallet.
#[derive(Debug, Clone)]
pub struct HandleTransferCallback(pub TransactionCallback);

#[derive(Debug, Clone)]
pub struct HandleTransferStatusCallback(pub TransferStatusCallback);

pub struct CallbackProcessor {
    storage: Arc<dyn Storage>,
    listener: Arc<Listener>,
    rates: Arc<dyn RateProvider>,
}

struct Pricing {
    rate: Decimal,
    amount_usd: Decimal,
    fee_usd: Decimal,
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, CallbackError> {
    Decimal::from_str(value.trim()).map_err(|_| CallbackError::InvalidDecimal {
        field,
        value: value.to_string(),
    })
}

fn parse_timestamp(value: &str) -> Result<OffsetDateTime, CallbackError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|_| CallbackError::InvalidTimestamp(value.to_string()))
}

fn to_usd(field: &'static str, value: Decimal, rate: Decimal) -> Result<Decimal, CallbackError> {
    value
        .checked_mul(rate)
        .ok_or_else(|| CallbackError::InvalidDecimal {
            field,
            value: value.to_string(),
        })
}

/// Commit on success, roll back otherwise.
async fn finish<T>(
    uow: Box<dyn UnitOfWork>,
    result: Result<T, CallbackError>,
) -> Result<T, CallbackError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = uow.rollback().await {
                warn!(error = %rollback_error, "Rollback failed");
            }
            Err(error)
        }
    }
}

impl CallbackProcessor {
    pub fn new(
        storage: Arc<dyn Storage>,
        listener: Arc<Listener>,
        rates: Arc<dyn RateProvider>,
    ) -> Self {
        Self {
            storage,
            listener,
            rates,
        }
    }

    async fn resolve_currency(
        &self,
        uow: &mut dyn UnitOfWork,
        blockchain: ChainName,
        contract_address: Option<&str>,
    ) -> Result<Currency, CallbackError> {
        uow.find_currency(blockchain, contract_address)
            .await?
            .ok_or_else(|| CallbackError::CurrencyNotFound {
                blockchain,
                contract_address: contract_address.map(str::to_string),
            })
    }

    /// The fee is paid in the chain's native coin, so it is priced with the
    /// native rate.
    async fn price(
        &self,
        uow: &mut dyn UnitOfWork,
        currency: &Currency,
        amount: Decimal,
        fee: Decimal,
    ) -> Result<Pricing, CallbackError> {
        let rate = self.rates.usd_rate(currency).await?;
        let fee_rate = if fee.is_zero() || currency.is_native {
            rate
        } else {
            let native = self.resolve_currency(uow, currency.blockchain, None).await?;
            self.rates.usd_rate(&native).await?
        };
        Ok(Pricing {
            rate,
            amount_usd: to_usd("amount", amount, rate)?,
            fee_usd: to_usd("fee", fee, fee_rate)?,
        })
    }

    async fn ingest_deposit(
        &self,
        callback: &TransactionCallback,
        uow: &mut dyn UnitOfWork,
    ) -> Result<(), CallbackError> {
        let amount = parse_decimal("amount", &callback.amount)?;
        let fee = parse_decimal("fee", &callback.fee)?;
        if amount.is_zero() {
            info!(tx_hash = %callback.hash, "Ignoring zero-amount deposit");
            return Ok(());
        }

        if uow
            .find_transaction(&callback.hash, &callback.tx_uniq_key)
            .await?
            .is_some()
        {
            info!(tx_hash = %callback.hash, "Deposit already processed");
            return Ok(());
        }

        let network_created_at = parse_timestamp(&callback.network_created_at)?;
        let blockchain = ChainName::from(callback.blockchain);
        let currency = self
            .resolve_currency(uow, blockchain, callback.contract_address.as_deref())
            .await?;
        let wallet = uow
            .find_wallet(blockchain, &callback.to_address)
            .await?
            .ok_or_else(|| CallbackError::WalletNotFound {
                blockchain,
                address: callback.to_address.clone(),
            })?;
        let store = uow
            .get_store(wallet.store_id)
            .await?
            .ok_or(CallbackError::StoreNotFound(wallet.store_id))?;
        let pricing = self.price(uow, &currency, amount, fee).await?;

        if callback.status.is_unconfirmed() {
            let transaction = uow
                .create_unconfirmed_transaction(NewUnconfirmedTransaction {
                    store_id: store.id,
                    wallet_id: wallet.id,
                    currency_id: currency.id.clone(),
                    blockchain,
                    tx_type: TransactionType::Deposit,
                    tx_hash: callback.hash.clone(),
                    bc_uniq_key: callback.tx_uniq_key.clone(),
                    from_address: callback.from_address.clone(),
                    to_address: callback.to_address.clone(),
                    amount,
                    amount_usd: pricing.amount_usd,
                    network_created_at,
                    is_system: callback.is_system,
                })
                .await?;
            debug!(
                tx_hash = %callback.hash,
                unconfirmed_id = %transaction.id,
                confirmations = callback.confirmations,
                "Stored unconfirmed deposit"
            );
            if !callback.is_system {
                let event = DomainEvent::DepositUnconfirmed(DepositUnconfirmed {
                    transaction,
                    store,
                    currency,
                });
                self.listener.fire(&event, uow).await?;
            }
            return Ok(());
        }

        let receipt = if callback.is_system {
            None
        } else {
            Some(
                uow.create_receipt(NewReceipt {
                    store_id: store.id,
                    currency_id: currency.id.clone(),
                    amount,
                    amount_usd: pricing.amount_usd,
                })
                .await?,
            )
        };

        let transaction = uow
            .create_transaction(NewTransaction {
                store_id: store.id,
                wallet_id: Some(wallet.id),
                receipt_id: receipt.as_ref().map(|r| r.id),
                currency_id: currency.id.clone(),
                blockchain,
                tx_type: TransactionType::Deposit,
                tx_hash: callback.hash.clone(),
                bc_uniq_key: callback.tx_uniq_key.clone(),
                from_address: callback.from_address.clone(),
                to_address: callback.to_address.clone(),
                amount,
                amount_usd: pricing.amount_usd,
                fee,
                fee_usd: pricing.fee_usd,
                network_created_at,
                is_system: callback.is_system,
            })
            .await?;

        uow.enqueue_balance_update(BalanceUpdateJob {
            blockchain,
            address: callback.to_address.clone(),
            currency_id: currency.id.clone(),
        })
        .await?;

        let event = DomainEvent::DepositReceived(DepositReceived {
            transaction: transaction.clone(),
            store: store.clone(),
            currency: currency.clone(),
        });
        self.listener.fire(&event, uow).await?;

        if let Some(receipt) = receipt {
            let event = DomainEvent::DepositReceiptSent(DepositReceiptSent {
                transaction: transaction.clone(),
                receipt,
                store,
                currency,
                exchange_rate: pricing.rate,
                fee_usd: pricing.fee_usd,
            });
            self.listener.fire(&event, uow).await?;
        }

        info!(
            tx_hash = %transaction.tx_hash,
            transaction_id = %transaction.id,
            store_id = %transaction.store_id,
            amount = %transaction.amount,
            "Deposit recorded"
        );
        Ok(())
    }

    async fn ingest_transfer(
        &self,
        callback: &TransactionCallback,
        uow: &mut dyn UnitOfWork,
    ) -> Result<(), CallbackError> {
        if callback.status.is_unconfirmed() {
            debug!(tx_hash = %callback.hash, "Ignoring unconfirmed transfer");
            return Ok(());
        }

        let amount = parse_decimal("amount", &callback.amount)?;
        let fee = parse_decimal("fee", &callback.fee)?;

        if uow
            .find_transaction(&callback.hash, &callback.tx_uniq_key)
            .await?
            .is_some()
        {
            info!(tx_hash = %callback.hash, "Transfer already processed");
            return Ok(());
        }

        let network_created_at = parse_timestamp(&callback.network_created_at)?;
        let blockchain = ChainName::from(callback.blockchain);
        let currency = self
            .resolve_currency(uow, blockchain, callback.contract_address.as_deref())
            .await?;

        let parsed = ParsedTransfer {
            callback,
            blockchain,
            currency,
            amount,
            fee,
            network_created_at,
        };

        match callback.wallet_type {
            WalletType::Processing => self.ingest_processing_withdrawal(parsed, uow).await,
            WalletType::Hot => self.ingest_hot_wallet_transfer(parsed, uow).await,
            other => Err(CallbackError::UnsupportedWalletType(other)),
        }
    }

    async fn ingest_processing_withdrawal(
        &self,
        transfer: ParsedTransfer<'_>,
        uow: &mut dyn UnitOfWork,
    ) -> Result<(), CallbackError> {
        let callback = transfer.callback;
        let Some(request_id) = callback.request_id else {
            warn!(tx_hash = %callback.hash, "Processing transfer without request id, dropping");
            return Ok(());
        };
        let Some(mut withdrawal) = uow.find_withdrawal(request_id).await? else {
            warn!(
                tx_hash = %callback.hash,
                request_id = %request_id,
                "No withdrawal for processing transfer, dropping"
            );
            return Ok(());
        };
        if !withdrawal.status.awaits_transfer() {
            warn!(
                tx_hash = %callback.hash,
                withdrawal_id = %withdrawal.id,
                status = ?withdrawal.status,
                "Withdrawal is already final, dropping transfer"
            );
            return Ok(());
        }

        let store = uow
            .get_store(withdrawal.store_id)
            .await?
            .ok_or(CallbackError::StoreNotFound(withdrawal.store_id))?;
        let pricing = self
            .price(uow, &transfer.currency, transfer.amount, transfer.fee)
            .await?;
        let wallet_id = uow
            .find_wallet(transfer.blockchain, &callback.from_address)
            .await?
            .map(|w| w.id);

        let transaction = uow
            .create_transaction(transfer.new_transaction(
                store.id,
                wallet_id,
                TransactionType::WithdrawalFromProcessing,
                &pricing,
            ))
            .await?;

        uow.complete_withdrawal(withdrawal.id, &callback.hash).await?;
        withdrawal.status = WithdrawalStatus::Completed;
        withdrawal.tx_hash = Some(callback.hash.clone());

        uow.enqueue_balance_update(BalanceUpdateJob {
            blockchain: transfer.blockchain,
            address: callback.from_address.clone(),
            currency_id: transfer.currency.id.clone(),
        })
        .await?;

        info!(
            tx_hash = %transaction.tx_hash,
            withdrawal_id = %withdrawal.id,
            store_id = %store.id,
            "Withdrawal from processing wallet recorded"
        );

        let event = DomainEvent::WithdrawalFromProcessingReceived(WithdrawalFromProcessingReceived {
            transaction,
            withdrawal,
            store,
            currency: transfer.currency,
        });
        self.listener.fire(&event, uow).await?;
        Ok(())
    }

    async fn ingest_hot_wallet_transfer(
        &self,
        transfer: ParsedTransfer<'_>,
        uow: &mut dyn UnitOfWork,
    ) -> Result<(), CallbackError> {
        let callback = transfer.callback;
        let wallet = uow
            .find_wallet(transfer.blockchain, &callback.from_address)
            .await?
            .ok_or_else(|| CallbackError::WalletNotFound {
                blockchain: transfer.blockchain,
                address: callback.from_address.clone(),
            })?;
        let pricing = self
            .price(uow, &transfer.currency, transfer.amount, transfer.fee)
            .await?;

        let transaction = uow
            .create_transaction(transfer.new_transaction(
                wallet.store_id,
                Some(wallet.id),
                TransactionType::TransferFromHotWallet,
                &pricing,
            ))
            .await?;

        uow.enqueue_balance_update(BalanceUpdateJob {
            blockchain: transfer.blockchain,
            address: callback.from_address.clone(),
            currency_id: transfer.currency.id.clone(),
        })
        .await?;

        let sdk_chain = paygate_sdk::objects::Blockchain::from(transfer.blockchain);
        if transfer.fee > Decimal::ZERO
            && !transfer.currency.is_native
            && sdk_chain.pays_fees_in_native_token()
        {
            let native = self
                .resolve_currency(uow, transfer.blockchain, None)
                .await?;
            uow.enqueue_balance_update(BalanceUpdateJob {
                blockchain: transfer.blockchain,
                address: callback.from_address.clone(),
                currency_id: native.id,
            })
            .await?;
        }

        info!(
            tx_hash = %transaction.tx_hash,
            wallet_id = %wallet.id,
            "Transfer from hot wallet recorded"
        );
        Ok(())
    }

    async fn ingest_transfer_status(
        &self,
        callback: &TransferStatusCallback,
        uow: &mut dyn UnitOfWork,
    ) -> Result<u64, CallbackError> {
        let items = callback
            .system_transactions
            .iter()
            .map(NewSystemTransaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let status = TransferStatus::from(callback.status);
        let found = uow
            .update_transfer_status(TransferStatusUpdate {
                request_id: callback.request_id,
                status,
                stage: status.into(),
                step: callback.step.clone(),
                error_message: callback.error_message.clone(),
            })
            .await?;
        if !found {
            return Err(CallbackError::TransferNotFound(callback.request_id));
        }

        Ok(uow.insert_system_transactions(items).await?)
    }
}

/// Fields shared by both transfer branches.
struct ParsedTransfer<'a> {
    callback: &'a TransactionCallback,
    blockchain: ChainName,
    currency: Currency,
    amount: Decimal,
    fee: Decimal,
    network_created_at: OffsetDateTime,
}

impl ParsedTransfer<'_> {
    fn new_transaction(
        &self,
        store_id: Uuid,
        wallet_id: Option<Uuid>,
        tx_type: TransactionType,
        pricing: &Pricing,
    ) -> NewTransaction {
        NewTransaction {
            store_id,
            wallet_id,
            receipt_id: None,
            currency_id: self.currency.id.clone(),
            blockchain: self.blockchain,
            tx_type,
            tx_hash: self.callback.hash.clone(),
            bc_uniq_key: self.callback.tx_uniq_key.clone(),
            from_address: self.callback.from_address.clone(),
            to_address: self.callback.to_address.clone(),
            amount: self.amount,
            amount_usd: pricing.amount_usd,
            fee: self.fee,
            fee_usd: pricing.fee_usd,
            network_created_at: self.network_created_at,
            is_system: self.callback.is_system,
        }
    }
}

impl Processor<HandleDepositCallback> for CallbackProcessor {
    type Output = ();
    type Error = CallbackError;

    #[tracing::instrument(skip_all, err, fields(tx_hash = %cmd.0.hash))]
    async fn process(&self, cmd: HandleDepositCallback) -> Result<(), CallbackError> {
        let mut uow = self.storage.begin(IsolationLevel::Serializable).await?;
        let result = self.ingest_deposit(&cmd.0, uow.as_mut()).await;
        finish(uow, result).await
    }
}

impl Processor<HandleTransferCallback> for CallbackProcessor {
    type Output = ();
    type Error = CallbackError;

    #[tracing::instrument(skip_all, err, fields(tx_hash = %cmd.0.hash))]
    async fn process(&self, cmd: HandleTransferCallback) -> Result<(), CallbackError> {
        let mut uow = self.storage.begin(IsolationLevel::Serializable).await?;
        let result = self.ingest_transfer(&cmd.0, uow.as_mut()).await;
        finish(uow, result).await
    }
}

impl Processor<HandleTransferStatusCallback> for CallbackProcessor {
    type Output = ();
    type Error = CallbackError;

    #[tracing::instrument(skip_all, err, fields(request_id = %cmd.0.request_id))]
    async fn process(&self, cmd: HandleTransferStatusCallback) -> Result<(), CallbackError> {
        let mut uow = self.storage.begin(IsolationLevel::Serializable).await?;
        let result = self.ingest_transfer_status(&cmd.0, uow.as_mut()).await;
        let inserted = finish(uow, result).await?;
        info!(
            request_id = %cmd.0.request_id,
            status = %cmd.0.status,
            system_transactions = inserted,
            "Transfer status updated"
        );
        Ok(())
    }
}
