//! # Payment Routes
//!
//! ```text
//! cash:    POST /sales/{id}/payments/cash ─────────────────────► captured
//!
//! card:    POST /sales/{id}/payments/card-sessions ──► pending
//!          POST /card-sessions/{id}/confirm ─────────► authorized
//!          POST /card-sessions/{id}/capture ─────────► captured
//!
//! wallet:  POST /sales/{id}/payments/wallet-sessions ► awaiting customer
//!          POST /wallet-sessions/{id}/confirm ───────► captured
//! ```
//!
//! A payment that brings the balance to zero completes the sale.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use bistro_core::payment::WalletProvider;
use bistro_core::{CardSession, MobilePaymentSession};
use bistro_db::PaymentRecorded;

use crate::error::ApiResult;
use crate::services::payment_service::{
    CashPaymentRequest, CashPaymentResponse, ConfirmCardRequest, ConfirmWalletRequest,
    CreateCardSessionRequest, CreateWalletSessionRequest, RefundRequest, RefundResponse,
    SalePayments,
};
use crate::services::PaymentService;
use crate::state::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/sales/{id}/payments", get(sale_payments))
        .route("/sales/{id}/payments/cash", post(pay_cash))
        .route("/sales/{id}/payments/card-sessions", post(create_card_session))
        .route(
            "/sales/{id}/payments/wallet-sessions",
            post(create_wallet_session),
        )
        .route("/card-sessions/{id}", get(get_card_session))
        .route("/card-sessions/{id}/confirm", post(confirm_card_session))
        .route("/card-sessions/{id}/capture", post(capture_card_session))
        .route("/card-sessions/{id}/cancel", post(cancel_card_session))
        .route("/wallets/providers", get(wallet_providers))
        .route("/wallet-sessions/{id}", get(wallet_status))
        .route("/wallet-sessions/{id}/confirm", post(confirm_wallet_session))
        .route("/wallet-sessions/{id}/cancel", post(cancel_wallet_session))
        .route("/payments/{id}/refund", post(refund))
}

async fn sale_payments(
    State(state): State<SharedState>,
    Path(sale_id): Path<String>,
) -> ApiResult<Json<SalePayments>> {
    Ok(Json(PaymentService::new(&state).sale_payments(&sale_id).await?))
}

async fn pay_cash(
    State(state): State<SharedState>,
    Path(sale_id): Path<String>,
    Json(request): Json<CashPaymentRequest>,
) -> ApiResult<(StatusCode, Json<CashPaymentResponse>)> {
    let response = PaymentService::new(&state).pay_cash(&sale_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

// =============================================================================
// Card
// =============================================================================

async fn create_card_session(
    State(state): State<SharedState>,
    Path(sale_id): Path<String>,
    Json(request): Json<CreateCardSessionRequest>,
) -> ApiResult<(StatusCode, Json<CardSession>)> {
    let session = PaymentService::new(&state)
        .create_card_session(&sale_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_card_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CardSession>> {
    Ok(Json(PaymentService::new(&state).get_card_session(&id).await?))
}

async fn confirm_card_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ConfirmCardRequest>,
) -> ApiResult<Json<CardSession>> {
    Ok(Json(
        PaymentService::new(&state)
            .confirm_card_session(&id, request)
            .await?,
    ))
}

async fn capture_card_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PaymentRecorded>> {
    Ok(Json(PaymentService::new(&state).capture_card_session(&id).await?))
}

async fn cancel_card_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CardSession>> {
    Ok(Json(PaymentService::new(&state).cancel_card_session(&id).await?))
}

// =============================================================================
// Mobile wallets
// =============================================================================

async fn wallet_providers(State(state): State<SharedState>) -> Json<Vec<WalletProvider>> {
    Json(PaymentService::new(&state).wallet_providers().to_vec())
}

async fn create_wallet_session(
    State(state): State<SharedState>,
    Path(sale_id): Path<String>,
    Json(request): Json<CreateWalletSessionRequest>,
) -> ApiResult<(StatusCode, Json<MobilePaymentSession>)> {
    let session = PaymentService::new(&state)
        .create_wallet_session(&sale_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn wallet_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MobilePaymentSession>> {
    Ok(Json(PaymentService::new(&state).wallet_status(&id).await?))
}

async fn confirm_wallet_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ConfirmWalletRequest>,
) -> ApiResult<Json<PaymentRecorded>> {
    Ok(Json(
        PaymentService::new(&state)
            .confirm_wallet_session(&id, request)
            .await?,
    ))
}

async fn cancel_wallet_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MobilePaymentSession>> {
    Ok(Json(PaymentService::new(&state).cancel_wallet_session(&id).await?))
}

// =============================================================================
// Refunds
// =============================================================================

async fn refund(
    State(state): State<SharedState>,
    Path(transaction_id): Path<String>,
    Json(request): Json<RefundRequest>,
) -> ApiResult<(StatusCode, Json<RefundResponse>)> {
    let response = PaymentService::new(&state)
        .refund(&transaction_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}
