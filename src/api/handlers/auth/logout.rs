use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::debug;

use super::error::error_response;
use super::types::RefreshTokenRequest;
use crate::api::ClientIp;
use crate::engine::{AuthError, AuthOrchestrator, RequestContext};

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = RefreshTokenRequest,
    responses(
        (status = 204, description = "Token family revoked, or nothing left to revoke"),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Re-authentication required", body = String),
        (status = 429, description = "Rate limited; see Retry-After", body = String)
    ),
    tag = "auth"
)]
pub async fn logout(
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
    match auth.logout(refresh_token, &context).await {
        Ok(revoked) => {
            debug!(family_id = %revoked.family_id, revoked = revoked.revoked, "logged out");
            StatusCode::NO_CONTENT.into_response()
        }
        // Already revoked or never issued: logout is idempotent.
        Err(AuthError::TokenUnknown) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}
