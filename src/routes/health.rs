use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;

use crate::state::AppState;

/// Liveness plus the folder stores this instance can serve.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let stores: Vec<String> = std::iter::once(state.folders.backend())
        .chain(state.drive_folders.as_ref().map(|resolver| resolver.backend()))
        .map(|backend| backend.to_string())
        .collect();
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "staffhub", "stores": stores })),
    )
}
