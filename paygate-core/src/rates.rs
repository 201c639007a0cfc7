//! USD conversion rates.
//!
//! Rate lookup is an external concern. [`StaticRates`] serves fixed values
//! from the config file.

use crate::entities::currencies::Currency;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("no USD rate available for {0}")]
    NotAvailable(String),
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Price of one unit of `currency` in USD.
    async fn usd_rate(&self, currency: &Currency) -> Result<Decimal, RateError>;
}

/// Rates keyed by currency id, falling back to the currency code.
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    rates: HashMap<String, Decimal>,
}

impl StaticRates {
    pub fn new(rates: HashMap<String, Decimal>) -> Self {
        Self { rates }
    }

    pub fn with_rate(mut self, key: impl Into<String>, rate: Decimal) -> Self {
        self.rates.insert(key.into(), rate);
        self
    }
}

#[async_trait]
impl RateProvider for StaticRates {
    async fn usd_rate(&self, currency: &Currency) -> Result<Decimal, RateError> {
        self.rates
            .get(&currency.id)
            .or_else(|| self.rates.get(&currency.code))
            .copied()
            .ok_or_else(|| RateError::NotAvailable(currency.id.clone()))
    }
}
