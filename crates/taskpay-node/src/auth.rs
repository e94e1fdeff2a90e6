use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json, RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use taskpay_ledger::UserId;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User id
    pub exp: u64,     // Expiry time
    pub iat: u64,     // Issued at
    pub role: String, // "user" or "admin"
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiry: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String) -> Self {
        Self {
            jwt_secret,
            token_expiry: Duration::from_secs(7 * 24 * 3600),
        }
    }

    pub fn create_token(&self, user_id: UserId, role: Role) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| AuthError::Internal)?
            .as_secs();

        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + self.token_expiry.as_secs(),
            iat: now,
            role: role.as_str().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )
        .map_err(|_| AuthError::Internal)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        if self.jwt_secret.is_empty() {
            // No secret configured: nothing can authenticate.
            return Err(AuthError::InvalidToken);
        }
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidToken)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    fn from_claim(role: &str) -> Self {
        if role.eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

/// Authenticated caller identity, extracted from the bearer token on every
/// ledger-affecting request.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::MissingToken => (StatusCode::UNAUTHORIZED, "missing bearer token"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid bearer token"),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "auth failure"),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingToken)?;

        let config = AuthConfig::from_ref(state);
        let claims = config.validate_token(bearer.token())?;
        let user_id = UserId::parse(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        Ok(Identity {
            user_id,
            role: Role::from_claim(&claims.role),
        })
    }
}
