use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_PARENT_SCOPE: &str = "ROOT";
pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub cors_allowed_origin: Option<String>,
    pub default_parent_scope: String,
    pub store_timeout_seconds: u64,
    pub drive_api_url: String,
    pub drive_access_token: Option<String>,
    pub drive_root_folder_id: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "staffhub".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "staffhub-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let default_parent_scope = env::var("DEFAULT_PARENT_SCOPE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_PARENT_SCOPE.to_string());
        let store_timeout_seconds = env::var("STORE_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .context("STORE_TIMEOUT_SECONDS must be an integer")?;
        let drive_api_url =
            env::var("DRIVE_API_URL").unwrap_or_else(|_| DEFAULT_DRIVE_API_URL.to_string());
        let drive_access_token = env::var("DRIVE_ACCESS_TOKEN")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let drive_root_folder_id = env::var("DRIVE_ROOT_FOLDER_ID").ok();

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            cors_allowed_origin,
            default_parent_scope,
            store_timeout_seconds,
            drive_api_url,
            drive_access_token,
            drive_root_folder_id,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_seconds.max(1))
    }

    pub fn drive_enabled(&self) -> bool {
        self.drive_access_token.is_some()
    }

    /// Parent scope used by drive resolutions that do not name one.
    pub fn default_drive_scope(&self) -> &str {
        self.drive_root_folder_id
            .as_deref()
            .unwrap_or(&self.default_parent_scope)
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
