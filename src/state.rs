use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    folders::{FolderBackend, FolderResolver, FolderStore, PgFolderStore},
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub folders: Arc<FolderResolver>,
    pub drive_folders: Option<Arc<FolderResolver>>,
    pub jwt: JwtService,
}

impl AppState {
    /// The database-backed resolver is always available; the drive resolver
    /// only when a drive store is supplied.
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        drive_store: Option<Arc<dyn FolderStore>>,
        jwt: JwtService,
    ) -> Self {
        let timeout = config.store_timeout();
        let folders = Arc::new(FolderResolver::new(
            Arc::new(PgFolderStore::new(pool.clone())),
            timeout,
        ));
        let drive_folders =
            drive_store.map(|store| Arc::new(FolderResolver::new(store, timeout)));

        Self {
            pool,
            config: Arc::new(config),
            folders,
            drive_folders,
            jwt,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn resolver(&self, backend: FolderBackend) -> AppResult<&Arc<FolderResolver>> {
        match backend {
            FolderBackend::Database => Ok(&self.folders),
            FolderBackend::Drive => self
                .drive_folders
                .as_ref()
                .ok_or_else(|| AppError::bad_request("drive store is not configured")),
        }
    }

    /// Falls back to the configured default scope for `backend`. Scopes longer
    /// than the stored column allows are rejected.
    pub fn parent_scope(&self, backend: FolderBackend, requested: Option<&str>) -> AppResult<String> {
        let scope = requested
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match backend {
                FolderBackend::Database => self.config.default_parent_scope.clone(),
                FolderBackend::Drive => self.config.default_drive_scope().to_string(),
            });
        check_parent_scope(scope)
    }
}

pub const MAX_PARENT_SCOPE_LEN: usize = 255;

fn check_parent_scope(scope: String) -> AppResult<String> {
    if scope.chars().count() > MAX_PARENT_SCOPE_LEN {
        return Err(AppError::bad_request(format!(
            "parent_scope must be at most {MAX_PARENT_SCOPE_LEN} characters"
        )));
    }
    Ok(scope)
}
