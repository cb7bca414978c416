//! Header contract with the upstream gateway collaborator.
//!
//! `X-Request-ID` correlates logs and error envelopes (one is generated
//! when absent). `X-User-Name` is trusted only when the gateway also set
//! `X-Authenticated`; otherwise the caller must present a Bearer token,
//! which is verified locally.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use super::response::ApiError;
use super::state::AppState;
use crate::entities::UserRole;
use crate::error::CoreError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const AUTHENTICATED_HEADER: &str = "x-authenticated";

/// Per-request correlation id.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

fn request_id_from(parts: &Parts) -> String {
    parts
        .headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestContext {
            request_id: request_id_from(parts),
        })
    }
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let request_id = request_id_from(parts);
        resolve_user(parts, state).map_err(|err| ApiError::from_core(err, &request_id))
    }
}

fn resolve_user(parts: &Parts, state: &AppState) -> Result<AuthUser, CoreError> {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    };

    // Gateway-authenticated path.
    if header(AUTHENTICATED_HEADER).is_some() {
        if let Some(username) = header(USER_NAME_HEADER) {
            let role = header(USER_ROLE_HEADER)
                .and_then(UserRole::parse)
                .unwrap_or(UserRole::Customer);
            return Ok(AuthUser {
                username: username.to_string(),
                role,
            });
        }
    }

    // Bearer token path.
    let token = header("authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(CoreError::InvalidCredentials)?;
    let claims = state.tokens.verify(token)?;
    let role = UserRole::parse(&claims.role).unwrap_or(UserRole::Customer);
    Ok(AuthUser {
        username: claims.sub,
        role,
    })
}
