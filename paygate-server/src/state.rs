//! Application state shared across all request handlers.

use crate::config::AdminToken;
use paygate_core::framework::Storage;
use paygate_core::processors::{CallbackProcessor, InvoiceProcessor, WebhookSender};
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub callbacks: Arc<CallbackProcessor>,
    pub invoices: Arc<InvoiceProcessor>,
    /// Used for manual sends from the admin API.
    pub sender: Arc<WebhookSender>,
    pub admin_token: Arc<AdminToken>,
}
