use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use payout_cell::models::PayoutProvider;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    BankSettlementRequest, CardWebhookEvent, MobileMoneyCallback, PaypalWebhookEvent,
    ReconcileOutcome, SettlementEvent,
};
use crate::services::reconciler::SettlementReconciler;
use crate::services::signature::{
    verify_card_signature, verify_mobile_money_token, verify_paypal_signature,
};

// ==============================================================================
// PROVIDER WEBHOOKS (PUBLIC ROUTES, SIGNATURE AUTHENTICATED)
// ==============================================================================

/// Card rail settlement webhook. Acknowledges with 2xx for everything the
/// reconciler handled, matched or not - the rail retries aggressively on
/// anything else.
#[axum::debug_handler]
pub async fn card_settlement_webhook(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("x-card-signature")
        .and_then(|value| value.to_str().ok());
    verify_card_signature(&state, &body, signature)?;

    let event: CardWebhookEvent = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid card webhook payload: {}", e)))?;

    let settlement = SettlementEvent {
        provider: PayoutProvider::Card,
        reference: event.data.transfer_code.clone().or(event.data.reference),
        amount: event.data.amount,
        status_token: event.data.status.unwrap_or_else(|| event.event.clone()),
        event_id: Some(event.event),
    };

    let reconciler = SettlementReconciler::new(&state);
    let outcome = reconciler.reconcile(settlement).await?;

    Ok(Json(json!({
        "received": true,
        "outcome": outcome
    })))
}

#[axum::debug_handler]
pub async fn paypal_settlement_webhook(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("paypal-transmission-sig")
        .and_then(|value| value.to_str().ok());
    verify_paypal_signature(&state, &body, signature)?;

    let event: PaypalWebhookEvent = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid PayPal webhook payload: {}", e)))?;

    let amount = event
        .resource
        .payout_item
        .as_ref()
        .and_then(|item| item.amount.as_ref())
        .and_then(|amount| amount.value.parse::<f64>().ok());

    let settlement = SettlementEvent {
        provider: PayoutProvider::Paypal,
        reference: event.resource.payout_batch_id.clone(),
        amount,
        status_token: event
            .resource
            .transaction_status
            .unwrap_or_else(|| event.event_type.clone()),
        event_id: event.id.or(Some(event.event_type)),
    };

    let reconciler = SettlementReconciler::new(&state);
    let outcome = reconciler.reconcile(settlement).await?;

    Ok(Json(json!({
        "received": true,
        "outcome": outcome
    })))
}

/// Mobile-money B2C result callback. The rail offers no payload signature and
/// may omit our correlation id entirely, which is why the reconciler keeps an
/// amount-tolerance fallback for this provider only. Always answers the
/// rail's native ack shape.
#[axum::debug_handler]
pub async fn mobile_money_settlement_webhook(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok());
    verify_mobile_money_token(&state, authorization)?;

    let callback: MobileMoneyCallback = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid mobile money payload: {}", e)))?;
    let result = callback.result;

    let settlement = SettlementEvent {
        provider: PayoutProvider::MobileMoney,
        reference: result
            .conversation_id
            .clone()
            .or(result.originator_conversation_id.clone())
            .or(result.transaction_id.clone()),
        amount: result.transaction_amount(),
        status_token: result.result_code.to_string(),
        event_id: result.transaction_id.clone(),
    };

    let reconciler = SettlementReconciler::new(&state);
    reconciler.reconcile(settlement).await?;

    Ok(Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Accepted"
    })))
}

// ==============================================================================
// MANUAL BANK SETTLEMENT (ADMIN ROUTE)
// ==============================================================================

/// The bank rail has no webhook; an admin confirms the transfer outcome here
/// and it flows through the same reconciler as the automated rails. Internal
/// callers get real errors instead of the webhook-style soft acknowledgment.
#[axum::debug_handler]
pub async fn confirm_bank_settlement(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<BankSettlementRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth(
            "Only administrators can confirm bank settlements".to_string(),
        ));
    }

    if request.provider_reference.trim().is_empty() {
        return Err(AppError::ValidationError(
            "provider_reference must not be empty".to_string(),
        ));
    }

    let detail = format!(
        "manual confirmation by admin {}{}",
        user.id,
        request
            .reason
            .as_deref()
            .map(|reason| format!(": {}", reason))
            .unwrap_or_default()
    );

    let settlement = SettlementEvent {
        provider: PayoutProvider::BankTransfer,
        reference: Some(request.provider_reference),
        amount: None,
        status_token: request.outcome.as_token().to_string(),
        event_id: Some(detail),
    };

    let reconciler = SettlementReconciler::new(&state);
    let outcome = reconciler.reconcile(settlement).await?;

    match outcome {
        ReconcileOutcome::NotFound => Err(AppError::NotFound(
            "No payout matches that provider reference".to_string(),
        )),
        outcome => Ok(Json(json!(outcome))),
    }
}
