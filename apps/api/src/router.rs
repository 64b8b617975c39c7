use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use payout_cell::router::payout_routes;
use settlement_cell::router::settlement_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "TeleCare Payouts API is running!" }))
        .nest("/payouts", payout_routes(state.clone()))
        .nest("/settlements", settlement_routes(state.clone()))
}
