use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use staffhub::auth::jwt::JwtService;
use staffhub::auth::password::hash_password;
use staffhub::config::{AppConfig, DEFAULT_DRIVE_API_URL, DEFAULT_PARENT_SCOPE};
use staffhub::db::{self, PgPool};
use staffhub::folders::{
    CreateOutcome, FolderBackend, FolderMetadata, FolderRecord, FolderStore, StoreResult,
};
use staffhub::identity::IdentityKey;
use staffhub::models::NewUser;
use staffhub::routes;
use staffhub::state::AppState;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const DRIVE_ROOT: &str = "drive-root";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Drive stand-in that, like the real API, never rejects a second folder for
/// the same owner.
#[derive(Default)]
pub struct FakeDriveStore {
    folders: Mutex<Vec<FolderRecord>>,
    creates: AtomicUsize,
}

#[async_trait]
impl FolderStore for FakeDriveStore {
    fn backend(&self) -> FolderBackend {
        FolderBackend::Drive
    }

    async fn find_by_owner(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
    ) -> StoreResult<Option<FolderRecord>> {
        let guard = self.folders.lock().await;
        Ok(guard
            .iter()
            .find(|f| f.parent_scope == parent_scope && f.owner_email == owner.as_str())
            .cloned())
    }

    async fn create_if_absent(
        &self,
        parent_scope: &str,
        owner: &IdentityKey,
        metadata: &FolderMetadata,
    ) -> StoreResult<CreateOutcome> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let folder = FolderRecord {
            id: format!("drive-{n}"),
            parent_scope: parent_scope.to_string(),
            owner_email: owner.to_string(),
            metadata: metadata.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.folders.lock().await.push(folder.clone());
        Ok(CreateOutcome::Created(folder))
    }

    async fn update_metadata(
        &self,
        folder: &FolderRecord,
        metadata: &FolderMetadata,
    ) -> StoreResult<FolderRecord> {
        let mut guard = self.folders.lock().await;
        let stored = guard
            .iter_mut()
            .find(|f| f.id == folder.id)
            .ok_or_else(|| staffhub::folders::StoreError::NotFound(folder.id.clone()))?;
        stored.metadata = metadata.clone();
        stored.updated_at = Some(Utc::now());
        Ok(stored.clone())
    }

    async fn list(&self, parent_scope: &str) -> StoreResult<Vec<FolderRecord>> {
        let guard = self.folders.lock().await;
        Ok(guard
            .iter()
            .filter(|f| f.parent_scope == parent_scope)
            .cloned()
            .collect())
    }
}

impl FakeDriveStore {
    #[allow(dead_code)]
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Seeds a folder directly, bypassing the resolver.
    #[allow(dead_code)]
    pub async fn seed(&self, parent_scope: &str, owner_email: &str, name: &str) {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.folders.lock().await.push(FolderRecord {
            id: format!("drive-{n}"),
            parent_scope: parent_scope.to_string(),
            owner_email: owner_email.to_string(),
            metadata: FolderMetadata {
                name: name.to_string(),
                ..Default::default()
            },
            created_at: None,
            updated_at: None,
        });
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    drive: Arc<FakeDriveStore>,
}

impl TestApp {
    /// Returns `None` when `TEST_DATABASE_URL` is unset so database-backed
    /// flows are skipped on machines without Postgres.
    pub async fn try_new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping");
            return Ok(None);
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: 8,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            default_parent_scope: DEFAULT_PARENT_SCOPE.to_string(),
            store_timeout_seconds: 5,
            drive_api_url: DEFAULT_DRIVE_API_URL.to_string(),
            drive_access_token: None,
            drive_root_folder_id: Some(DRIVE_ROOT.to_string()),
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let drive = Arc::new(FakeDriveStore::default());
        let drive_for_state: Arc<dyn FolderStore> = drive.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, Some(drive_for_state), jwt);
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            drive,
        }))
    }

    #[allow(dead_code)]
    pub fn drive(&self) -> Arc<FakeDriveStore> {
        self.drive.clone()
    }

    pub async fn insert_user(&self, username: &str, password: &str, role: &str) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let password_hash = hash_password(&password)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                username,
                password_hash,
                role,
            };
            diesel::insert_into(staffhub::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = read_json(response).await?;
        Ok(parsed.access_token)
    }

    /// Seeds an administrator and returns a bearer token for it.
    #[allow(dead_code)]
    pub async fn admin_token(&self) -> Result<String> {
        self.insert_user("hr-admin", "hr-pass", "admin").await?;
        self.login_token("hr-admin", "hr-pass").await
    }

    #[allow(dead_code)]
    pub async fn folder_rows(&self, parent_scope: &str, owner_email: &str) -> Result<i64> {
        let parent_scope = parent_scope.to_string();
        let owner_email = owner_email.to_string();
        self.with_conn(move |conn| {
            use staffhub::schema::employee_folders::dsl;
            let count = dsl::employee_folders
                .filter(dsl::parent_scope.eq(&parent_scope))
                .filter(dsl::owner_email.eq(&owner_email))
                .count()
                .get_result(conn)
                .context("failed to count folders")?;
            Ok(count)
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    /// Posts a raw body, for requests whose JSON payload is optional.
    #[allow(dead_code)]
    pub async fn post_bytes(
        &self,
        path: &str,
        body: Vec<u8>,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).with_context(|| {
        format!(
            "unexpected response body: {}",
            String::from_utf8_lossy(&body)
        )
    })
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(db::MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        conn.batch_execute(
            "TRUNCATE TABLE employee_folders, employees, companies, users RESTART IDENTITY CASCADE;",
        )
        .context("failed to truncate tables")?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}
