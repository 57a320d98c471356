//! HTTP surface: router assembly.

pub mod handlers;

use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/webhooks/payments", post(handlers::webhooks::receive_payment_webhook))
        .method_not_allowed_fallback(handlers::webhooks::method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
