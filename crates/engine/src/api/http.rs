//! Plain HTTP endpoints (spec.md §6.3): adventure creation, the
//! unauthenticated metadata read, and a liveness probe.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use taleforge_domain::AdventureMetadata;

use super::AppState;
use crate::infrastructure::state_store::StateStoreError;

#[derive(Serialize)]
pub struct NewAdventureResponse {
    #[serde(rename = "adventureId")]
    adventure_id: String,
    #[serde(rename = "sessionToken")]
    session_token: String,
}

pub async fn create_adventure(State(state): State<Arc<AppState>>) -> Result<Json<NewAdventureResponse>, (StatusCode, String)> {
    let handle = state
        .state_store
        .create()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(NewAdventureResponse {
        adventure_id: handle.adventure().id.to_string(),
        session_token: handle.adventure().session_token.to_string(),
    }))
}

pub async fn get_adventure(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<AdventureMetadata>, (StatusCode, String)> {
    state
        .state_store
        .load_metadata(&id)
        .map(Json)
        .map_err(|e| match e {
            StateStoreError::InvalidId | StateStoreError::NotFound => {
                (StatusCode::NOT_FOUND, "adventure not found".to_string())
            }
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        })
}

pub async fn health() -> &'static str {
    "ok"
}
