use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use staffhub::{
    auth::jwt::JwtService,
    config::AppConfig,
    db,
    folders::{DriveFolderStore, FolderStore},
    routes,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    info!(
        database = %config.redacted_database_url(),
        default_parent_scope = %config.default_parent_scope,
        store_timeout_seconds = config.store_timeout().as_secs(),
        drive_enabled = config.drive_enabled(),
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || db::run_migrations(&pool))
            .await
            .context("migration task panicked")??;
    }

    let drive_store: Option<Arc<dyn FolderStore>> = match config.drive_access_token.as_deref() {
        Some(token) => {
            let store = DriveFolderStore::new(&config.drive_api_url, token)?;
            info!(api = %config.drive_api_url, "drive folder store enabled");
            Some(Arc::new(store))
        }
        None => None,
    };

    let jwt = JwtService::from_config(&config)?;
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;

    let state = AppState::new(pool, config, drive_store, jwt);
    let app = routes::create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "staffhub listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
