//! Registration, login and profile handlers.

use axum::extract::{Json, State};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use validator::Validate;

use crate::auth::{password, ACCESS_TOKEN_LIFETIME_SECS};
use crate::entities::{Balance, User, UserRole};
use crate::error::CoreError;
use crate::gateway::extract::{AuthUser, RequestContext};
use crate::gateway::response::{created, ok, ApiError, ApiResult};
use crate::gateway::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 30))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub last_name: String,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub marketing_emails_consent: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub marketing_emails_consent: Option<bool>,
}

/// What the API returns for a user; the password hash never leaves.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub marketing_emails_consent: bool,
    pub role: UserRole,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            date_of_birth: user.date_of_birth,
            marketing_emails_consent: user.marketing_emails_consent,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

fn validate_username(username: &str) -> Result<(), CoreError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(CoreError::Validation(
            "username may contain only letters, digits and underscore".to_string(),
        ))
    }
}

/// `POST /auth/register` - create the User and its zero Balance. The two
/// writes are not atomic at the store; a balance failure after the user
/// write is logged critical and surfaced retryable, and registration of
/// the same username then completes the missing balance row.
pub async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<UserProfile> {
    let run = async {
        req.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        validate_username(&req.username)?;
        password::validate_policy(&req.password)?;

        let now = Utc::now();
        let user = User {
            username: req.username.clone(),
            email: req.email.clone(),
            password_hash: password::hash(&req.password)?,
            first_name: req.first_name.clone(),
            last_name: req.last_name.clone(),
            phone: req.phone.clone(),
            date_of_birth: req.date_of_birth,
            marketing_emails_consent: req.marketing_emails_consent.unwrap_or(false),
            role: UserRole::Customer,
            created_at: now,
            updated_at: now,
        };
        let user = state.users.create(user).await?;

        if let Err(err) = state
            .balances
            .create_balance(Balance::new_zero(&user.username))
            .await
        {
            // The user row exists but the balance does not; the account is
            // unusable until this is repaired.
            error!(username = %user.username, %err,
                "registration left a user without a balance row");
            return Err(CoreError::StoreUnavailable(
                "registration could not be completed, retry".to_string(),
            ));
        }

        info!(username = %user.username, "user registered");
        Ok(UserProfile::from(user))
    };
    match run.await {
        Ok(profile) => created(profile),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<LoginRequest>,
) -> ApiResult<TokenResponse> {
    let run = async {
        let user = state
            .users
            .authenticate(&req.username, &req.password)
            .await?;
        let access_token = state.tokens.issue(&user.username, user.role)?;
        info!(username = %user.username, "login succeeded");
        Ok(TokenResponse {
            access_token,
            token_type: "bearer",
            expires_in: ACCESS_TOKEN_LIFETIME_SECS,
        })
    };
    match run.await {
        Ok(token) => ok(token),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `GET /auth/me`
pub async fn me(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
) -> ApiResult<UserProfile> {
    match state.users.get_by_username(&auth.username).await {
        Ok(user) => ok(UserProfile::from(user)),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `PUT /auth/me` - non-identity fields only.
pub async fn update_me(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<UserProfile> {
    let run = async {
        req.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let mut user = state.users.get_by_username(&auth.username).await?;
        if let Some(first_name) = req.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = req.last_name {
            user.last_name = last_name;
        }
        if let Some(phone) = req.phone {
            user.phone = Some(phone);
        }
        if let Some(date_of_birth) = req.date_of_birth {
            user.date_of_birth = Some(date_of_birth);
        }
        if let Some(consent) = req.marketing_emails_consent {
            user.marketing_emails_consent = consent;
        }
        let user = state.users.update(user).await?;
        Ok(UserProfile::from(user))
    };
    match run.await {
        Ok(profile) => ok(profile),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}
