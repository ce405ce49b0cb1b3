use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::error::error_response;
use super::types::{RefreshTokenRequest, TokenResponse};
use crate::api::ClientIp;
use crate::engine::{AuthOrchestrator, RequestContext};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Refresh token rotated", body = TokenResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Re-authentication required", body = String),
        (status = 429, description = "Rate limited; see Retry-After", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh(
    client_ip: ClientIp,
    auth: Extension<Arc<AuthOrchestrator>>,
    payload: Option<Json<RefreshTokenRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let refresh_token = request.refresh_token.trim();
    if refresh_token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing refresh_token".to_string()).into_response();
    }

    let context = RequestContext::from_ip(client_ip.to_key());
    match auth.refresh(refresh_token, &context).await {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => error_response(&err),
    }
}
