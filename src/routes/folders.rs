use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    folders::{FolderBackend, FolderMetadata, FolderRecord, Resolution},
    pagination::{paginate, Page, PageParams},
    state::AppState,
};

/// Which store and parent scope a request works against.
#[derive(Debug, Default, Deserialize)]
pub struct FolderTarget {
    #[serde(default)]
    pub store: FolderBackend,
    #[serde(default)]
    pub parent_scope: Option<String>,
}

#[derive(Deserialize)]
pub struct ResolveFolderRequest {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub target: FolderTarget,
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub backend: FolderBackend,
    pub parent_scope: String,
    #[serde(flatten)]
    pub resolution: Resolution,
}

pub async fn resolve_folder(
    State(state): State<AppState>,
    Json(payload): Json<ResolveFolderRequest>,
) -> AppResult<Json<ResolveResponse>> {
    let backend = payload.target.store;
    let resolver = state.resolver(backend)?;
    let parent_scope = state.parent_scope(backend, payload.target.parent_scope.as_deref())?;

    let metadata = FolderMetadata {
        name: payload.name.unwrap_or_default(),
        department: payload.department,
        position: payload.position,
        phone: payload.phone,
    };
    let resolution = resolver
        .resolve(&parent_scope, &payload.email, metadata)
        .await?;

    Ok(Json(ResolveResponse {
        backend,
        parent_scope,
        resolution,
    }))
}

pub async fn list_folders(
    State(state): State<AppState>,
    Query(target): Query<FolderTarget>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Page<FolderRecord>>> {
    let resolver = state.resolver(target.store)?;
    let parent_scope = state.parent_scope(target.store, target.parent_scope.as_deref())?;

    let folders = resolver.list(&parent_scope).await?;
    Ok(Json(paginate(folders, page)))
}

/// Parses an optional JSON body. Only an empty body falls back to the
/// default; anything else must parse.
pub(crate) fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("invalid request body: {err}")))
}
