use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    exp: usize,
}

/// Authenticated caller identity, delivered by the auth collaborator as a
/// Bearer JWT. Handlers that mutate anything take this as an extractor.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
}

/// Like [`AuthUser`] but never rejects; anonymous callers yield `None`.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

pub fn create_token(
    user_id: i32,
    email: &str,
    jwt_secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
        + 24 * 60 * 60; // 24 hours
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: expiration,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<AuthUser, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;
    let id = token_data
        .claims
        .sub
        .parse::<i32>()
        .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;
    Ok(AuthUser {
        id,
        email: token_data.claims.email,
    })
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;
        validate_token(token, &state.config.jwt_secret)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user =
            bearer_token(parts).and_then(|t| validate_token(t, &state.config.jwt_secret).ok());
        Ok(MaybeAuthUser(user))
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub user_id: i32,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Development stand-in for the external auth subsystem: mints a token for
/// an arbitrary identity. A real deployment routes logins elsewhere.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    if !req.email.contains('@') {
        return Err(ApiError::Validation("Enter a valid email address".to_string()));
    }
    let token = create_token(req.user_id, &req.email, &state.config.jwt_secret)
        .map_err(|e| ApiError::Internal(format!("token creation failed: {e}")))?;
    Ok(Json(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let token = create_token(42, "seller@example.com", "test-secret").unwrap();
        let user = validate_token(&token, "test-secret").unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.email, "seller@example.com");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_token(42, "seller@example.com", "test-secret").unwrap();
        assert!(validate_token(&token, "other-secret").is_err());
    }
}
