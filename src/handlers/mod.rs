mod account;
mod checkout;
mod generate;
mod sync;
mod webhooks;

pub use account::*;
pub use checkout::*;
pub use generate::*;
pub use sync::*;
pub use webhooks::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(rate_limit: RateLimitConfig) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Webhooks carry their own authentication (signature verification)
        // and must never be rate limited away from the processor.
        .route("/webhooks/processor", post(handle_processor_webhook))
        .merge(
            Router::new()
                .route("/signup", post(signup))
                .route("/checkout", post(initiate_checkout))
                .layer(rate_limit::strict_layer(rate_limit.strict_rpm)),
        )
        .merge(
            Router::new()
                .route("/checkout/sync", post(sync_checkout))
                .route("/generate", post(generate))
                .route("/account", get(get_account))
                .route("/account/creations", get(list_creations))
                .route("/account/events", get(account_events))
                .layer(rate_limit::standard_layer(rate_limit.standard_rpm)),
        )
}
