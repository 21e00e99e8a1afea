use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use serde::{Deserialize, Serialize};

/// Claims carried by an access token. Doubles as an axum extractor:
/// any handler taking `claims: Claims` only runs with a valid Bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID (users.id, as a string)
    pub sub: String,
    /// Username at issue time
    pub username: String,
    /// Issue time, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
}

impl Claims {
    /// Numeric user id. Tokens are always issued with a numeric sub;
    /// a non-numeric sub means a foreign/corrupt token.
    pub fn user_id(&self) -> Result<i64, StatusCode> {
        self.sub.parse().map_err(|_| StatusCode::UNAUTHORIZED)
    }
}

impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Authorization: Bearer <token>
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(StatusCode::UNAUTHORIZED)?;

        // The router middleware stashes the signing key in extensions;
        // a missing key is a wiring bug, not a client error
        let jwt_secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

        let validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(&jwt_secret.0),
            &validation,
        )
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(token_data.claims)
    }
}

/// Signing key wrapper placed in request extensions by the router middleware.
#[derive(Clone)]
pub struct JwtSecret(pub Vec<u8>);
