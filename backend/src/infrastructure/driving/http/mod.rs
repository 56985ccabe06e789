pub mod error;
pub mod sessions;
pub mod signaling;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::path::Path;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::infrastructure::AppState;

/// Signaling, session inspection and the viewer page
pub fn create_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let api = Router::new()
        .route("/health", get(sessions::health_check))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:id", delete(sessions::close_session));

    Router::new()
        .route("/offer", post(signaling::offer))
        .nest("/api", api)
        .fallback_service(ServeDir::new(static_dir.as_ref()).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
