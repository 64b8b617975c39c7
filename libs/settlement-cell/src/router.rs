use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn settlement_routes(state: Arc<AppConfig>) -> Router {
    // Webhooks authenticate with provider signatures, not user tokens.
    let webhook_routes = Router::new()
        .route("/webhooks/card", post(handlers::card_settlement_webhook))
        .route("/webhooks/paypal", post(handlers::paypal_settlement_webhook))
        .route(
            "/webhooks/mobile-money",
            post(handlers::mobile_money_settlement_webhook),
        );

    let protected_routes = Router::new()
        .route("/bank", post(handlers::confirm_bank_settlement))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(webhook_routes)
        .merge(protected_routes)
        .with_state(state)
}
