//! Password and provider sign-in.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use std::sync::Arc;

use super::error::error_response;
use super::types::{LoginRequest, TokenResponse};
use super::utils::valid_email;
use crate::api::ClientIp;
use crate::engine::{AuthOrchestrator, LoginCredentials, Provider, RequestContext};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; a new token family was started", body = TokenResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Authentication failed", body = String),
        (status = 429, description = "Rate limited; see Retry-After", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    client_ip: ClientIp,
    auth: Extension<Arc<AuthOrchestrator>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let credentials = match credentials_from(request) {
        Ok(credentials) => credentials,
        Err(message) => return (StatusCode::BAD_REQUEST, message.to_string()).into_response(),
    };

    let context = RequestContext::from_ip(client_ip.to_key());
    match auth.login(credentials, &context).await {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => error_response(&err),
    }
}

fn credentials_from(request: LoginRequest) -> Result<LoginCredentials, &'static str> {
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    let email = non_empty(request.email);
    let password = request.password.filter(|v| !v.is_empty());
    let id_token = non_empty(request.provider_id_token);

    match (email, password, id_token) {
        (None, None, Some(id_token)) => {
            let provider = match request.provider.as_deref() {
                None => Provider::Google,
                Some(tag) => match Provider::parse(tag) {
                    Some(Provider::Password) | None => return Err("Unsupported provider"),
                    Some(provider) => provider,
                },
            };
            Ok(LoginCredentials::ProviderToken {
                provider,
                id_token: SecretString::from(id_token),
            })
        }
        (Some(email), Some(password), None) => {
            if !valid_email(&email) {
                return Err("Invalid email");
            }
            Ok(LoginCredentials::Password {
                email,
                password: SecretString::from(password),
            })
        }
        (_, _, Some(_)) => Err("Use either email and password or provider_id_token"),
        _ => Err("Missing credentials"),
    }
}
