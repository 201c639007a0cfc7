//! Webhook payload types delivered to merchant endpoints.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blockchains::Blockchain;

/// Event names a store webhook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventName {
    DepositReceived,
    DepositUnconfirmed,
    WithdrawalFromProcessingReceived,
    InvoiceStatusChanged,
    /// Only used by manual test sends.
    Test,
}

impl WebhookEventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventName::DepositReceived => "deposit_received",
            WebhookEventName::DepositUnconfirmed => "deposit_unconfirmed",
            WebhookEventName::WithdrawalFromProcessingReceived => {
                "withdrawal_from_processing_received"
            }
            WebhookEventName::InvoiceStatusChanged => "invoice_status_changed",
            WebhookEventName::Test => "test",
        }
    }
}

impl std::fmt::Display for WebhookEventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookEventName {
    type Err = UnknownEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit_received" => Ok(WebhookEventName::DepositReceived),
            "deposit_unconfirmed" => Ok(WebhookEventName::DepositUnconfirmed),
            "withdrawal_from_processing_received" => {
                Ok(WebhookEventName::WithdrawalFromProcessingReceived)
            }
            "invoice_status_changed" => Ok(WebhookEventName::InvoiceStatusChanged),
            "test" => Ok(WebhookEventName::Test),
            other => Err(UnknownEventName(other.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown webhook event name: {0}")]
pub struct UnknownEventName(pub String);

/// Implemented by every payload that can be delivered as a webhook.
pub trait WebhookPayload: Serialize {
    fn event(&self) -> WebhookEventName;
}

/// Webhook payload for a confirmed deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositWebhookPayload {
    pub event: WebhookEventName,
    pub id: Uuid,
    pub store_id: Uuid,
    pub wallet_id: Uuid,
    pub currency_id: String,
    pub blockchain: Blockchain,
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
    pub network_created_at: i64,
    pub is_confirmed: bool,
}

impl WebhookPayload for DepositWebhookPayload {
    fn event(&self) -> WebhookEventName {
        self.event
    }
}

/// Webhook payload for a deposit still waiting for confirmations.
///
/// Entity fields carry the `unconfirmed_` prefix so merchants cannot mistake
/// them for a settled transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnconfirmedDepositWebhookPayload {
    pub event: WebhookEventName,
    #[serde(rename = "unconfirmed_id")]
    pub id: Uuid,
    pub store_id: Uuid,
    #[serde(rename = "unconfirmed_wallet_id")]
    pub wallet_id: Uuid,
    #[serde(rename = "unconfirmed_currency_id")]
    pub currency_id: String,
    #[serde(rename = "unconfirmed_blockchain")]
    pub blockchain: Blockchain,
    #[serde(rename = "unconfirmed_tx_hash")]
    pub tx_hash: String,
    #[serde(rename = "unconfirmed_from_address")]
    pub from_address: String,
    #[serde(rename = "unconfirmed_to_address")]
    pub to_address: String,
    #[serde(rename = "unconfirmed_amount")]
    pub amount: Decimal,
    #[serde(rename = "unconfirmed_amount_usd")]
    pub amount_usd: Decimal,
    #[serde(rename = "unconfirmed_network_created_at")]
    pub network_created_at: i64,
    pub is_confirmed: bool,
}

impl WebhookPayload for UnconfirmedDepositWebhookPayload {
    fn event(&self) -> WebhookEventName {
        self.event
    }
}

/// Webhook payload for a withdrawal executed from the processing wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalWebhookPayload {
    pub event: WebhookEventName,
    pub id: Uuid,
    pub store_id: Uuid,
    pub withdrawal_id: Uuid,
    pub currency_id: String,
    pub blockchain: Blockchain,
    pub tx_hash: String,
    pub address_to: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
    pub fee: Decimal,
    pub network_created_at: i64,
}

impl WebhookPayload for WithdrawalWebhookPayload {
    fn event(&self) -> WebhookEventName {
        self.event
    }
}

/// Invoice status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `paygate-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Expired,
    Cancelled,
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceStatus::Pending => write!(f, "pending"),
            InvoiceStatus::PartiallyPaid => write!(f, "partially_paid"),
            InvoiceStatus::Paid => write!(f, "paid"),
            InvoiceStatus::Expired => write!(f, "expired"),
            InvoiceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Webhook payload for invoice status change events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceWebhookPayload {
    pub event: WebhookEventName,
    pub invoice_id: Uuid,
    pub store_id: Uuid,
    pub order_id: Option<String>,
    pub status: InvoiceStatus,
    pub previous_status: InvoiceStatus,
    pub amount_usd: Decimal,
    pub timestamp: i64,
}

impl WebhookPayload for InvoiceWebhookPayload {
    fn event(&self) -> WebhookEventName {
        self.event
    }
}

/// Fixed payload for the admin "send test webhook" action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestWebhookPayload {
    pub event: WebhookEventName,
    pub store_id: Uuid,
    pub webhook_id: Uuid,
    pub timestamp: i64,
}

impl WebhookPayload for TestWebhookPayload {
    fn event(&self) -> WebhookEventName {
        self.event
    }
}

/// Envelope merchants answer webhooks with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
}
