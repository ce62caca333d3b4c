use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod admin;
pub mod auth;
pub mod companies;
pub mod employees;
pub mod folders;
pub mod health;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .filter_map(|value| match value.parse::<HeaderValue>() {
                Ok(header) => Some(header),
                Err(_) => {
                    warn!(origin = value, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let companies_routes = Router::new()
        .route(
            "/",
            get(companies::list_companies).post(companies::create_company),
        )
        .route("/:id", get(companies::get_company));

    let employees_routes = Router::new()
        .route(
            "/",
            get(employees::list_employees).post(employees::create_employee),
        )
        .route(
            "/:id",
            get(employees::get_employee).patch(employees::update_employee),
        )
        .route("/:id/folder", post(employees::resolve_employee_folder));

    let folders_routes = Router::new()
        .route("/", get(folders::list_folders))
        .route("/resolve", post(folders::resolve_folder));

    let admin_routes = Router::new()
        .route("/employees/import", post(admin::import_employees))
        .route(
            "/companies/:id/provision-folders",
            post(admin::provision_company_folders),
        )
        .route("/folders/duplicates", get(admin::list_duplicate_folders));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/companies", companies_routes)
        .nest("/api/employees", employees_routes)
        .nest("/api/folders", folders_routes)
        .nest("/api/admin", admin_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}
