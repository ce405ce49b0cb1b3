//! Request/response types for auth endpoints.

use crate::engine::TokenPair;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const TOKEN_TYPE_BEARER: &str = "bearer";

/// Either `email` + `password`, or `provider_id_token` (with an optional
/// `provider`, defaulting to `google`).
#[derive(ToSchema, Deserialize, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub provider_id_token: Option<String>,
    pub provider: Option<String>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field(
                "provider_id_token",
                &self.provider_id_token.as_ref().map(|_| "***"),
            )
            .field("provider", &self.provider)
            .finish()
    }
}

#[derive(ToSchema, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access.token,
            refresh_token: pair.refresh.value.expose_secret().to_string(),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: pair.access.expires_in_seconds,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub subject: String,
    pub email: String,
    pub provider: String,
    /// Access token expiry as unix seconds.
    pub expires_at: i64,
}
