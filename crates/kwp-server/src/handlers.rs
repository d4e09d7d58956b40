//! HTTP Handlers

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

use kwp_core::ProductId;
use kwp_ledger::LedgerError;
use kwp_payments::{GatewayEvent, PaymentError};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub products: Vec<&'static str>,
    pub stripe_configured: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub order_id: String,
    pub gift_code: String,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_sales: u64,
    pub total_revenue_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    code: &str,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn payment_error_response(err: &PaymentError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match err {
        PaymentError::VerificationFailed(_) => (StatusCode::BAD_REQUEST, "VERIFICATION_FAILED"),
        PaymentError::WebhookSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
        PaymentError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
        PaymentError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "PAYMENTS_DISABLED"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "FULFILLMENT_FAILED"),
    };
    error_response(status, err.user_message(), code)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health/status endpoint listing available products
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        products: ProductId::all().iter().map(|p| p.as_str()).collect(),
        stripe_configured: state.stripe_configured,
    })
}

/// Create a hosted checkout session
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, Json<ErrorResponse>)> {
    let email = match payload.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => email.to_string(),
        _ => return Err(error_response(StatusCode::BAD_REQUEST, "Missing email", "MISSING_EMAIL")),
    };

    let product = match payload.product.as_deref() {
        None => ProductId::RecoveryRoadmap,
        Some(raw) => ProductId::parse(raw).ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("Unknown product: {raw}"),
                "UNKNOWN_PRODUCT",
            )
        })?,
    };

    let session = state
        .gateway
        .create_session(&email, product)
        .await
        .map_err(|e| {
            tracing::error!(product = %product, error = %e, "Checkout session creation failed");
            payment_error_response(&e)
        })?;

    Ok(Json(CreateSessionResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}

/// Pull path: verify a session after redirect and fulfill it
pub async fn verify_recovery(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let receipt = state
        .coordinator
        .fulfill(&payload.session_id)
        .await
        .map_err(|e| {
            tracing::warn!(session_id = %payload.session_id, error = %e, "Fulfillment refused");
            payment_error_response(&e)
        })?;

    Ok(Json(VerifyResponse {
        order_id: receipt.order_id,
        gift_code: receipt.gift_code,
    }))
}

/// Push path: signed completion event from the payment gateway
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, (StatusCode, Json<ErrorResponse>)> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "Missing signature header",
                "MISSING_SIGNATURE",
            )
        })?;

    // Signature check happens before any ledger access
    let event = state.gateway.verify_webhook(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Webhook rejected");
        payment_error_response(&e)
    })?;

    match event {
        GatewayEvent::CheckoutCompleted { session_id } => {
            // 5xx on failure so the gateway's at-least-once redelivery
            // completes the purchase later
            let receipt = state.coordinator.fulfill(&session_id).await.map_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "Webhook fulfillment failed");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Fulfillment failed",
                    "FULFILLMENT_FAILED",
                )
            })?;
            tracing::info!(
                order_id = %receipt.order_id,
                already_fulfilled = receipt.already_fulfilled,
                "Webhook fulfillment complete"
            );
        }
        GatewayEvent::Ignored { event_type } => {
            tracing::debug!(event_type = %event_type, "Ignoring webhook event");
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

/// Redeem a gift code
pub async fn redeem_gift(
    State(state): State<AppState>,
    Json(payload): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.ledger.redeem(&payload.code, &payload.email) {
        Ok(_) => Ok(Json(RedeemResponse { success: true })),
        Err(LedgerError::NotFound(_)) => Err(error_response(
            StatusCode::NOT_FOUND,
            "Invalid code",
            "CODE_NOT_FOUND",
        )),
        Err(LedgerError::AlreadyRedeemed(_)) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "Code already used",
            "CODE_ALREADY_REDEEMED",
        )),
        Err(e) => {
            tracing::error!(error = %e, "Redemption failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred processing your request.",
                "LEDGER_ERROR",
            ))
        }
    }
}

/// Reporting: stats recomputed from the purchase ledger
pub async fn stats(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let stats = state.ledger.stats().map_err(|e| {
        tracing::error!(error = %e, "Stats aggregation failed");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "An error occurred processing your request.",
            "LEDGER_ERROR",
        )
    })?;

    Ok(Json(StatsResponse {
        total_sales: stats.total_sales,
        total_revenue_cents: stats.total_revenue_cents,
    }))
}
