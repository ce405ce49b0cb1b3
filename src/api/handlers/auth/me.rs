use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::error::{error_response, REAUTHENTICATION_REQUIRED};
use super::types::MeResponse;
use super::utils::bearer_token;
use crate::engine::AuthOrchestrator;

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    security(("bearer_access_token" = [])),
    responses(
        (status = 200, description = "Identity behind the access token", body = MeResponse),
        (status = 401, description = "Missing or invalid access token", body = String)
    ),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, auth: Extension<Arc<AuthOrchestrator>>) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            REAUTHENTICATION_REQUIRED.to_string(),
        )
            .into_response();
    };

    match auth.authenticate(token) {
        Ok(claims) => (
            StatusCode::OK,
            Json(MeResponse {
                subject: claims.sub,
                email: claims.email,
                provider: claims.provider.as_str().to_string(),
                expires_at: claims.exp,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
