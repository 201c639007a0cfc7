//! Callback API handlers.
//!
//! These endpoints are called by the blockchain-processing engine.
//!
//! # Endpoints
//!
//! - `POST /deposit`         – deposit into a store wallet
//! - `POST /transfer`        – outbound transfer from a processing or hot wallet
//! - `POST /transfer-status` – transfer request status change

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use kanau::processor::Processor;
use paygate_core::processors::{
    CallbackError, HandleDepositCallback, HandleTransferCallback, HandleTransferStatusCallback,
};
use paygate_sdk::objects::{TransactionCallback, TransferStatusCallback};
use serde::Serialize;

use crate::state::AppState;

/// Build the Callback API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deposit", post(deposit))
        .route("/transfer", post(transfer))
        .route("/transfer-status", post(transfer_status))
}

#[derive(Debug, Serialize)]
struct CallbackResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CallbackResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            success: true,
            error: None,
        })
    }
}

async fn deposit(
    State(state): State<AppState>,
    Json(callback): Json<TransactionCallback>,
) -> Result<impl IntoResponse, CallbackApiError> {
    state
        .callbacks
        .process(HandleDepositCallback(callback))
        .await?;
    Ok(CallbackResponse::ok())
}

async fn transfer(
    State(state): State<AppState>,
    Json(callback): Json<TransactionCallback>,
) -> Result<impl IntoResponse, CallbackApiError> {
    state
        .callbacks
        .process(HandleTransferCallback(callback))
        .await?;
    Ok(CallbackResponse::ok())
}

async fn transfer_status(
    State(state): State<AppState>,
    Json(callback): Json<TransferStatusCallback>,
) -> Result<impl IntoResponse, CallbackApiError> {
    state
        .callbacks
        .process(HandleTransferStatusCallback(callback))
        .await?;
    Ok(CallbackResponse::ok())
}

/// Maps ingestion failures to status codes. The engine retries on anything
/// but 2xx.
#[derive(Debug)]
pub(crate) struct CallbackApiError(CallbackError);

impl From<CallbackError> for CallbackApiError {
    fn from(e: CallbackError) -> Self {
        Self(e)
    }
}

impl IntoResponse for CallbackApiError {
    fn into_response(self) -> axum::response::Response {
        let error = self.0;
        let status = if error.is_data_error() {
            tracing::warn!(error = %error, "Rejected callback");
            StatusCode::BAD_REQUEST
        } else if error.is_conflict() {
            tracing::warn!(error = %error, "Callback hit a serialization conflict");
            StatusCode::CONFLICT
        } else {
            tracing::error!(error = %error, "Callback processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = CallbackResponse {
            success: false,
            error: Some(error.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
