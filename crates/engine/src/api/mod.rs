//! Axum wiring: HTTP endpoints, the WebSocket accept/runtime path, and the
//! `AppState` everything above is built on (spec.md §6.3).

pub mod http;
pub mod ws;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;

use crate::infrastructure::agent::AgentPort;
use crate::infrastructure::hub::ConnectionHub;
use crate::infrastructure::image::ImageService;
use crate::infrastructure::state_store::StateStore;

/// Everything a request handler needs, shared across every connection and
/// request (spec.md §9 "Globals": the connection table lives on `hub`).
pub struct AppState {
    pub state_store: StateStore,
    pub agent: Arc<dyn AgentPort>,
    pub image: Arc<dyn ImageService>,
    pub hub: Arc<ConnectionHub>,
    pub project_dir: PathBuf,
}

pub fn router(state: Arc<AppState>, static_root: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/adventure/new", post(http::create_adventure))
        .route("/adventure/:id", get(http::get_adventure))
        .route("/api/health", get(http::health))
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    if let Some(root) = static_root {
        router = router
            .nest_service("/backgrounds", ServeDir::new(root.join("backgrounds")))
            .fallback_service(ServeDir::new(root));
    }

    router
}
