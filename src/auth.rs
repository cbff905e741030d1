/// Authentication: signed bearer credentials and request extractors
///
/// Credential issuance (login, registration) lives outside the engine; this
/// module only signs tokens for tooling and tests and verifies the bearer
/// credentials presented by API and gateway clients.
use crate::{
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::{SkeinError, SkeinResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims carried by a bearer credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a bearer token for a user
pub fn sign_token(user_id: &str, secret: &str, ttl_hours: i64) -> SkeinResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| SkeinError::Jwt(format!("Failed to sign token: {}", e)))
}

/// Verify a bearer token and return its claims
pub fn verify_token(token: &str, secret: &str) -> SkeinResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| SkeinError::Authentication(format!("Invalid token: {}", e)))
}

/// Authenticated context - extracts and validates the bearer credential
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = SkeinError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| SkeinError::Authentication("Missing authorization header".to_string()))?;

        let claims = verify_token(&token, &state.config.auth.jwt_secret)?;

        // The subject must still exist
        let user = state
            .users
            .get_user(&claims.sub)
            .await
            .map_err(|_| SkeinError::Authentication("Unknown user".to_string()))?;

        Ok(AuthContext { user_id: user.id })
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    /// Viewer id for feed enrichment, when present
    pub fn viewer_id(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.user_id.as_str())
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = SkeinError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match AuthContext::from_request_parts(parts, state).await {
            Ok(auth) => Some(auth),
            Err(_) => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn sign_and_verify_round_trips() {
        let token = sign_token("user-1", SECRET, 1).unwrap();
        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_token("user-1", SECRET, 1).unwrap();
        assert!(verify_token(&token, "another-secret-another-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign_token("user-1", SECRET, -1).unwrap();
        assert!(verify_token(&token, SECRET).is_err());
    }
}
