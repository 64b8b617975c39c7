use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn payout_routes(state: Arc<AppConfig>) -> Router {
    // Every payout surface requires authentication; role checks live in the
    // handlers because doctors may list and read their own payouts.
    let protected_routes = Router::new()
        .route("/", get(handlers::list_payouts))
        .route("/generate", post(handlers::generate_payouts))
        .route("/manual", post(handlers::create_manual_payout))
        .route("/bulk", post(handlers::bulk_action))
        .route("/export", get(handlers::export_payouts))
        .route("/{payout_id}", get(handlers::get_payout))
        .route("/{payout_id}/action", post(handlers::payout_action))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
