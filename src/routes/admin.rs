use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    admin::{self, ImportReport, ImportRequest, ProvisionReport},
    error::AppResult,
    folders::{DuplicateGroup, FolderBackend},
    state::AppState,
};

use super::folders::{optional_body, FolderTarget};

#[derive(Debug, Default, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(flatten)]
    pub target: FolderTarget,
}

#[derive(Serialize)]
pub struct DuplicateReport {
    pub backend: FolderBackend,
    pub parent_scope: String,
    pub duplicates: Vec<DuplicateGroup>,
}

pub async fn import_employees(
    State(state): State<AppState>,
    Json(payload): Json<ImportRequest>,
) -> AppResult<Json<ImportReport>> {
    let mut conn = state.db()?;
    let report = admin::import_employees(&mut conn, &payload)?;
    Ok(Json(report))
}

pub async fn provision_company_folders(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<ProvisionReport>> {
    let request: ProvisionRequest = optional_body(&body)?;
    let backend = request.target.store;
    let resolver = state.resolver(backend)?;
    let parent_scope = state.parent_scope(backend, request.target.parent_scope.as_deref())?;

    let (_, staff) = {
        let mut conn = state.db()?;
        admin::load_active_employees(&mut conn, company_id)?
    };

    let report =
        admin::provision_folders(resolver, company_id, &parent_scope, &staff, request.dry_run)
            .await;
    Ok(Json(report))
}

pub async fn list_duplicate_folders(
    State(state): State<AppState>,
    Query(target): Query<FolderTarget>,
) -> AppResult<Json<DuplicateReport>> {
    let resolver = state.resolver(target.store)?;
    let parent_scope = state.parent_scope(target.store, target.parent_scope.as_deref())?;
    let duplicates = resolver.duplicates(&parent_scope).await?;

    Ok(Json(DuplicateReport {
        backend: target.store,
        parent_scope,
        duplicates,
    }))
}
