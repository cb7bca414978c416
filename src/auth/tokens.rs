//! Access token issue/verify. HS256, one hour lifetime.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::entities::UserRole;
use crate::error::CoreError;

pub const ACCESS_TOKEN_LIFETIME_SECS: i64 = 3600;
const TOKEN_TYPE_ACCESS: &str = "access_token";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Username.
    pub sub: String,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(rename = "type")]
    pub token_type: String,
}

pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenManager {
    pub fn new(secret: &str) -> Self {
        TokenManager {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, username: &str, role: UserRole) -> Result<String, CoreError> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            role: role.as_str().to_string(),
            exp: (now + Duration::seconds(ACCESS_TOKEN_LIFETIME_SECS)).timestamp() as usize,
            iat: now.timestamp() as usize,
            token_type: TOKEN_TYPE_ACCESS.to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| CoreError::InternalError(format!("token encoding failed: {e}")))
    }

    /// Decode and validate. Anything wrong with the token - signature,
    /// expiry, wrong type - is an authentication failure.
    pub fn verify(&self, token: &str) -> Result<Claims, CoreError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|_| CoreError::InvalidCredentials)?;
        if data.claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(CoreError::InvalidCredentials);
        }
        Ok(data.claims)
    }
}
