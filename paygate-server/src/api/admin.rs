//! Admin API handlers.
//!
//! These endpoints require the `X-Admin-Token` header.
//!
//! # Endpoints
//!
//! - `POST /webhooks/history/{history_id}/resend` – replay a recorded delivery
//! - `POST /webhooks/{webhook_id}/test`           – send a sample payload
//! - `POST /invoices/{invoice_id}/status`         – change an invoice's status

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use kanau::processor::Processor;
use paygate_core::framework::StoreError;
use paygate_core::processors::{
    ChangeInvoiceStatus, DeliveryOutcome, InvoiceError, PlainMessage, WebhookError,
};
use paygate_sdk::objects::InvoiceStatus;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/webhooks/history/{history_id}/resend",
            post(resend_webhook),
        )
        .route("/webhooks/{webhook_id}/test", post(test_webhook))
        .route("/invoices/{invoice_id}/status", post(change_invoice_status))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManualSendResponse {
    pub success: bool,
}

impl From<DeliveryOutcome> for ManualSendResponse {
    fn from(outcome: DeliveryOutcome) -> Self {
        Self {
            success: outcome == DeliveryOutcome::Delivered,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceStatusRequest {
    pub status: InvoiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub invoice_id: Uuid,
    pub store_id: Uuid,
    pub status: InvoiceStatus,
    pub updated_at: i64,
}

/// `POST /webhooks/history/{history_id}/resend`: replay a recorded
/// delivery, signed with the store's current secret.
async fn resend_webhook(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(history_id): Path<i64>,
) -> Result<impl IntoResponse, AdminApiError> {
    let history = state
        .storage
        .get_send_history(history_id)
        .await?
        .ok_or(AdminApiError::NotFound)?;
    let store = state
        .storage
        .get_store(history.store_id)
        .await?
        .ok_or(AdminApiError::NotFound)?;

    let outcome = state
        .sender
        .process(PlainMessage::resend(history, &store))
        .await?;
    Ok(Json(ManualSendResponse::from(outcome)))
}

/// `POST /webhooks/{webhook_id}/test`: send a fixed sample payload.
async fn test_webhook(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(webhook_id): Path<Uuid>,
) -> Result<impl IntoResponse, AdminApiError> {
    let webhook = state
        .storage
        .get_store_webhook(webhook_id)
        .await?
        .ok_or(AdminApiError::NotFound)?;
    let store = state
        .storage
        .get_store(webhook.store_id)
        .await?
        .ok_or(AdminApiError::NotFound)?;

    let message = PlainMessage::test(&webhook, &store, OffsetDateTime::now_utc())
        .map_err(WebhookError::from)?;
    let outcome = state.sender.process(message).await?;
    Ok(Json(ManualSendResponse::from(outcome)))
}

/// `POST /invoices/{invoice_id}/status`: change an invoice's status and
/// queue the `invoice_status_changed` webhook.
async fn change_invoice_status(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<InvoiceStatusRequest>,
) -> Result<impl IntoResponse, AdminApiError> {
    let invoice = state
        .invoices
        .process(ChangeInvoiceStatus {
            invoice_id,
            status: request.status.into(),
        })
        .await?;
    Ok(Json(InvoiceResponse {
        invoice_id: invoice.id,
        store_id: invoice.store_id,
        status: invoice.status.into(),
        updated_at: invoice.updated_at.unix_timestamp(),
    }))
}

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum AdminApiError {
    Store(StoreError),
    Webhook(WebhookError),
    Invoice(InvoiceError),
    NotFound,
}

impl From<StoreError> for AdminApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<WebhookError> for AdminApiError {
    fn from(e: WebhookError) -> Self {
        Self::Webhook(e)
    }
}

impl From<InvoiceError> for AdminApiError {
    fn from(e: InvoiceError) -> Self {
        match e {
            InvoiceError::NotFound(_) | InvoiceError::StoreNotFound(_) => Self::NotFound,
            other => Self::Invoice(other),
        }
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminApiError::Store(e) => {
                tracing::error!(error = %e, "Admin API storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AdminApiError::Webhook(e) => {
                tracing::error!(error = %e, "Admin API webhook error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AdminApiError::Invoice(e) => {
                tracing::error!(error = %e, "Admin API invoice error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AdminApiError::NotFound => {
                (StatusCode::NOT_FOUND, "resource not found").into_response()
            }
        }
    }
}
