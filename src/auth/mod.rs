pub mod jwt;
pub mod password;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// The only role allowed to manage staff records and folders.
pub const ROLE_ADMIN: &str = "admin";

/// The HR administrator behind a request. Extracting it enforces both a valid
/// bearer token and the admin role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ROLE_ADMIN)
    }

    /// Rejects signed-in accounts that lack the admin role with 403.
    pub fn require_admin(self) -> Result<Self, AppError> {
        if self.is_admin() {
            return Ok(self);
        }
        warn!(
            user_id = %self.user_id,
            username = %self.username,
            role = %self.role,
            "staff directory access denied"
        );
        Err(AppError::new(
            StatusCode::FORBIDDEN,
            format!("role '{}' cannot manage the staff directory", self.role),
        ))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_owned();
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    warn!(%path, "request without bearer token");
                    AppError::unauthorized()
                })?;

        let claims = state.jwt.verify_token(bearer.token()).map_err(|err| {
            warn!(%path, error = %err, "bearer token rejected");
            AppError::unauthorized()
        })?;

        AuthenticatedUser {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        }
        .require_admin()
    }
}
