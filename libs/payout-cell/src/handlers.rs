use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    BulkActionRequest, CreateManualPayoutRequest, GeneratePayoutsRequest, PayoutCommand,
    PayoutListFilters, PayoutProvider, PayoutStatus,
};
use crate::services::{
    calculator::PayoutCalculator, export::PayoutExportService, lifecycle::PayoutLifecycleService,
    store::PayoutStore,
};

// Query parameters for the list/export surfaces
#[derive(Debug, Deserialize)]
pub struct PayoutListQuery {
    pub status: Option<PayoutStatus>,
    pub provider: Option<PayoutProvider>,
    pub doctor_id: Option<Uuid>,
    pub period_from: Option<DateTime<Utc>>,
    pub period_to: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub skip: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub status: Option<PayoutStatus>,
}

// ==============================================================================
// DOCTOR/ADMIN QUERY SURFACES
// ==============================================================================

#[axum::debug_handler]
pub async fn list_payouts(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PayoutListQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() && !user.is_doctor() {
        return Err(AppError::Auth("Not authorized to view payouts".to_string()));
    }

    // Doctors only ever see their own payouts, whatever the query says.
    let doctor_id = if user.is_admin() {
        query.doctor_id
    } else {
        Some(
            Uuid::parse_str(&user.id)
                .map_err(|_| AppError::BadRequest("Invalid user id".to_string()))?,
        )
    };

    let filters = PayoutListFilters {
        doctor_id,
        status: query.status,
        provider: query.provider,
        period_from: query.period_from,
        period_to: query.period_to,
        limit: query.limit,
        skip: query.skip,
    };

    let store = PayoutStore::new(&state);
    let payouts = store.list_payouts(&filters, Some(token)).await?;

    Ok(Json(json!({
        "payouts": payouts,
        "total": payouts.len()
    })))
}

#[axum::debug_handler]
pub async fn get_payout(
    State(state): State<Arc<AppConfig>>,
    Path(payout_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let store = PayoutStore::new(&state);

    let payout = store.get_payout(payout_id, Some(token)).await?;

    if !user.is_admin() && payout.doctor_id.to_string() != user.id {
        return Err(AppError::Auth(
            "Not authorized to view this payout".to_string(),
        ));
    }

    let items = store.get_items(payout_id, Some(token)).await?;

    Ok(Json(json!({
        "payout": payout,
        "items": items
    })))
}

// ==============================================================================
// ADMIN LIFECYCLE ACTIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn payout_action(
    State(state): State<Arc<AppConfig>>,
    Path(payout_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(command): Json<PayoutCommand>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() {
        return Err(AppError::Auth(
            "Only administrators can act on payouts".to_string(),
        ));
    }

    let lifecycle = PayoutLifecycleService::new(&state);

    let payout = match command {
        PayoutCommand::Approve => lifecycle.approve(payout_id, &user.id, Some(token)).await?,
        PayoutCommand::Trigger => lifecycle.trigger(payout_id, Some(token)).await?,
        PayoutCommand::ManualOverride { status, reason } => {
            lifecycle
                .manual_override(payout_id, status, &reason, &user.id, Some(token))
                .await?
        }
    };

    Ok(Json(json!(payout)))
}

#[axum::debug_handler]
pub async fn bulk_action(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BulkActionRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() {
        return Err(AppError::Auth(
            "Only administrators can act on payouts".to_string(),
        ));
    }

    if request.payout_ids.is_empty() {
        return Err(AppError::ValidationError(
            "payout_ids must not be empty".to_string(),
        ));
    }

    let lifecycle = PayoutLifecycleService::new(&state);
    let results = lifecycle
        .bulk(request.action, &request.payout_ids, &user.id, Some(token))
        .await;

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;

    Ok(Json(json!({
        "results": results,
        "succeeded": succeeded,
        "failed": failed
    })))
}

#[axum::debug_handler]
pub async fn generate_payouts(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(_auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<GeneratePayoutsRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth(
            "Only administrators can generate payouts".to_string(),
        ));
    }

    let calculator = PayoutCalculator::new(&state);
    let created = calculator
        .compute_for_period(request.period_start, request.period_end)
        .await?;

    Ok(Json(json!({
        "created": created,
        "period_start": request.period_start,
        "period_end": request.period_end
    })))
}

#[axum::debug_handler]
pub async fn create_manual_payout(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateManualPayoutRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() {
        return Err(AppError::Auth(
            "Only administrators can create manual payouts".to_string(),
        ));
    }

    let lifecycle = PayoutLifecycleService::new(&state);
    let payout = lifecycle
        .create_manual_payout(request, &user.id, Some(token))
        .await?;

    Ok(Json(json!(payout)))
}

#[axum::debug_handler]
pub async fn export_payouts(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let token = auth.token();

    if !user.is_admin() {
        return Err(AppError::Auth(
            "Only administrators can export payouts".to_string(),
        ));
    }

    let export = PayoutExportService::new(&state);
    let csv = export.export_csv(query.status, Some(token)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"payouts.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}
