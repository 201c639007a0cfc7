pub mod currencies;
pub mod invoices;
pub mod stores;
pub mod transactions;
pub mod transfers;
pub mod wallets;
pub mod webhooks;

use paygate_sdk::objects::{Blockchain as SdkBlockchain, WebhookEventName};

/// Blockchain name for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `paygate_sdk::objects::Blockchain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "blockchain")]
pub enum ChainName {
    Bitcoin,
    Litecoin,
    Ethereum,
    Bsc,
    Polygon,
    Arbitrum,
    Tron,
}

impl From<ChainName> for SdkBlockchain {
    fn from(value: ChainName) -> Self {
        match value {
            ChainName::Bitcoin => SdkBlockchain::Bitcoin,
            ChainName::Litecoin => SdkBlockchain::Litecoin,
            ChainName::Ethereum => SdkBlockchain::Ethereum,
            ChainName::Bsc => SdkBlockchain::Bsc,
            ChainName::Polygon => SdkBlockchain::Polygon,
            ChainName::Arbitrum => SdkBlockchain::Arbitrum,
            ChainName::Tron => SdkBlockchain::Tron,
        }
    }
}

impl From<SdkBlockchain> for ChainName {
    fn from(value: SdkBlockchain) -> Self {
        match value {
            SdkBlockchain::Bitcoin => ChainName::Bitcoin,
            SdkBlockchain::Litecoin => ChainName::Litecoin,
            SdkBlockchain::Ethereum => ChainName::Ethereum,
            SdkBlockchain::Bsc => ChainName::Bsc,
            SdkBlockchain::Polygon => ChainName::Polygon,
            SdkBlockchain::Arbitrum => ChainName::Arbitrum,
            SdkBlockchain::Tron => ChainName::Tron,
        }
    }
}

impl std::fmt::Display for ChainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkBlockchain::from(*self).fmt(f)
    }
}

/// Webhook event name for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `paygate_sdk::objects::WebhookEventName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "webhook_event")]
pub enum WebhookEvent {
    DepositReceived,
    DepositUnconfirmed,
    WithdrawalFromProcessingReceived,
    InvoiceStatusChanged,
    Test,
}

impl From<WebhookEvent> for WebhookEventName {
    fn from(value: WebhookEvent) -> Self {
        match value {
            WebhookEvent::DepositReceived => WebhookEventName::DepositReceived,
            WebhookEvent::DepositUnconfirmed => WebhookEventName::DepositUnconfirmed,
            WebhookEvent::WithdrawalFromProcessingReceived => {
                WebhookEventName::WithdrawalFromProcessingReceived
            }
            WebhookEvent::InvoiceStatusChanged => WebhookEventName::InvoiceStatusChanged,
            WebhookEvent::Test => WebhookEventName::Test,
        }
    }
}

impl From<WebhookEventName> for WebhookEvent {
    fn from(value: WebhookEventName) -> Self {
        match value {
            WebhookEventName::DepositReceived => WebhookEvent::DepositReceived,
            WebhookEventName::DepositUnconfirmed => WebhookEvent::DepositUnconfirmed,
            WebhookEventName::WithdrawalFromProcessingReceived => {
                WebhookEvent::WithdrawalFromProcessingReceived
            }
            WebhookEventName::InvoiceStatusChanged => WebhookEvent::InvoiceStatusChanged,
            WebhookEventName::Test => WebhookEvent::Test,
        }
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        WebhookEventName::from(*self).fmt(f)
    }
}
