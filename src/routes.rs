use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers;
use crate::state::AppState;

/// The full application router. Used by the server binary and the HTTP tests.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/changes/detect", post(handlers::detect_changes))
        .route("/changes/apply", post(handlers::apply_changes))
        .route("/revert", post(handlers::revert))
        .route("/backup", post(handlers::backup))
        .route("/versions", get(handlers::list_versions))
        .route("/history", get(handlers::list_history));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
