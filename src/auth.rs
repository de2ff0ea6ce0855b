use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AppResult},
    models::{Role, TokenPair, User},
    repository::RepositoryState,
};

/// TokenType
///
/// Access and refresh tokens are signed with the same key; this claim keeps one
/// from being accepted where the other is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims
///
/// JWT payload for both halves of a token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: i64,
    pub token_type: TokenType,
    pub exp: i64,
    pub iat: i64,
    /// Unique token id.
    pub jti: String,
}

/// AuthUser
///
/// The resolved identity behind an authenticated request. Role and superuser
/// flag are read from storage on every request, so role changes apply immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub is_superuser: bool,
}

impl AuthUser {
    pub fn effective_role(&self) -> Role {
        if self.is_superuser { Role::Admin } else { self.role }
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        AuthUser {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            is_superuser: user.is_superuser,
        }
    }
}

/// resolve_actor
///
/// Works out who, if anyone, is making the request:
/// 1. `Env::Local` only: an `x-user-id` header naming an existing user.
/// 2. No `Authorization` header: anonymous (`Ok(None)`).
/// 3. Otherwise the header must carry a valid, unexpired access token whose
///    subject still exists, or the request is rejected with 401.
pub async fn resolve_actor<S>(parts: &Parts, state: &S) -> AppResult<Option<AuthUser>>
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    let repo = RepositoryState::from_ref(state);
    let config = AppConfig::from_ref(state);

    if config.env == Env::Local {
        let bypass_id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<i64>().ok());
        if let Some(user_id) = bypass_id {
            if let Some(user) = repo.get_user(user_id).await? {
                return Ok(Some(AuthUser::from(&user)));
            }
        }
    }

    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = decode_token(token, TokenType::Access, &config)?;

    let user = repo
        .get_user(claims.sub)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Some(AuthUser::from(&user)))
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_actor(parts, state)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}

fn sign(user_id: i64, token_type: TokenType, lifetime: Duration, secret: &str) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        token_type,
        exp: (now + lifetime).timestamp(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("token signing failed: {e}")))
}

/// Mints an access/refresh pair for `user_id` with the configured lifetimes.
pub fn issue_token_pair(user_id: i64, config: &AppConfig) -> AppResult<TokenPair> {
    let access = sign(
        user_id,
        TokenType::Access,
        Duration::minutes(config.access_token_minutes),
        &config.jwt_secret,
    )?;
    let refresh = sign(
        user_id,
        TokenType::Refresh,
        Duration::days(config.refresh_token_days),
        &config.jwt_secret,
    )?;
    Ok(TokenPair { access, refresh })
}

/// Verifies signature and expiry and checks the token is of the `expected` kind.
pub fn decode_token(token: &str, expected: TokenType, config: &AppConfig) -> AppResult<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!("token rejected: {:?}", e.kind());
        AppError::Unauthorized
    })?;

    if data.claims.token_type != expected {
        return Err(AppError::Unauthorized);
    }
    Ok(data.claims)
}

/// A fresh single-use confirmation code.
pub fn generate_confirmation_code() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_pair_round_trips() {
        let config = AppConfig::default();
        let pair = issue_token_pair(42, &config).unwrap();

        let access = decode_token(&pair.access, TokenType::Access, &config).unwrap();
        assert_eq!(access.sub, 42);
        let refresh = decode_token(&pair.refresh, TokenType::Refresh, &config).unwrap();
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let config = AppConfig::default();
        let pair = issue_token_pair(1, &config).unwrap();

        assert!(decode_token(&pair.refresh, TokenType::Access, &config).is_err());
        assert!(decode_token(&pair.access, TokenType::Refresh, &config).is_err());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let config = AppConfig::default();
        let other = AppConfig {
            jwt_secret: "another-secret-entirely".to_string(),
            ..AppConfig::default()
        };
        let pair = issue_token_pair(1, &other).unwrap();
        assert!(matches!(
            decode_token(&pair.access, TokenType::Access, &config),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = AppConfig::default();
        let stale = sign(1, TokenType::Access, Duration::minutes(-10), &config.jwt_secret).unwrap();
        assert!(decode_token(&stale, TokenType::Access, &config).is_err());
    }

    #[test]
    fn superuser_resolves_to_admin() {
        let root = User {
            is_superuser: true,
            ..User::default()
        };
        assert_eq!(AuthUser::from(&root).effective_role(), Role::Admin);
        assert_eq!(AuthUser::from(&User::default()).effective_role(), Role::User);
    }

    #[test]
    fn confirmation_codes_are_unique() {
        let a = generate_confirmation_code();
        let b = generate_confirmation_code();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
