//! The axum REST control plane: submit runs, inspect their state, and
//! browse the artifacts they produced.

mod error;
mod handlers;
mod templates;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use forgeline_orchestrator::Orchestrator;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state, handed to every handler via axum's
/// `State` extractor.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// The HTTP server's route assembly. This control plane has no
/// auth/rate-limit middleware to layer conditionally.
pub struct HttpServer;

impl HttpServer {
    pub fn build(orchestrator: Arc<Orchestrator>) -> Router {
        let state = Arc::new(AppState { orchestrator });

        Router::new()
            .route("/api/generate", post(handlers::generate))
            .route("/api/runs", get(handlers::list_runs))
            .route("/api/runs/{run_id}", get(handlers::get_run))
            .route("/api/runs/{run_id}/cancel", post(handlers::cancel_run))
            .route("/api/runs/{run_id}/logs", get(handlers::run_logs))
            .route("/api/artifacts", get(handlers::list_artifacts))
            .route("/api/output/{run_id}/{*path}", get(handlers::read_output))
            .route("/api/templates", get(handlers::list_templates))
            .route("/api/docs/rag", get(handlers::docs_rag))
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}
