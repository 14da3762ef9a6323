//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, health, scheduled};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    // Scheduled campaign routes
    let scheduled_routes = Router::new()
        .route(
            "/",
            get(scheduled::list_scheduled).post(scheduled::create_scheduled),
        )
        .route("/run", post(scheduled::run_scheduler))
        .route("/:id", get(scheduled::get_scheduled))
        .route("/:id/cancel", post(scheduled::cancel_scheduled));

    // Campaign history and on-demand sends
    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/send", post(campaigns::send_campaign));

    let api_v1 = Router::new()
        .nest("/scheduled", scheduled_routes)
        .nest("/campaigns", campaign_routes);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
