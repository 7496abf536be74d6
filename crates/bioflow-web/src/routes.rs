//! API routes (spec §6, prefix `/api/v1`). Grounded on
//! `ferrumdeck::gateway::routes::build_router`'s nesting/layering shape,
//! stripped of the auth/rate-limit middleware this single-tenant engine
//! has no use for.

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest(
            "/api/v1",
            Router::new()
                .route("/workflows", get(handlers::workflows::list_workflows))
                .route("/workflows", post(handlers::workflows::create_workflow))
                .route("/workflows/{id}", get(handlers::workflows::get_workflow))
                .route("/workflows/{id}/run", post(handlers::workflows::run_workflow))
                .route("/runs", get(handlers::runs::list_runs))
                .route("/runs/{id}", get(handlers::runs::get_run))
                .route("/runs/{id}", delete(handlers::runs::delete_run))
                .route("/runs/{id}/steps", get(handlers::runs::list_steps))
                .route("/runs/{id}/logs/{step}", get(handlers::runs::get_log))
                .route("/runs/{id}/resume", post(handlers::runs::resume_run))
                .route("/runs/{id}/cancel", post(handlers::runs::cancel_run)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
