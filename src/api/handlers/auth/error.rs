//! Collapse engine failures into the two client-facing messages.

use crate::engine::AuthError;
use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

pub(crate) const AUTHENTICATION_FAILED: &str = "Authentication failed";
pub(crate) const REAUTHENTICATION_REQUIRED: &str = "Re-authentication required";

pub(crate) fn error_response(err: &AuthError) -> Response {
    match err {
        AuthError::Throttled { retry_after } => {
            // Round up so clients never retry early.
            let seconds = retry_after
                .as_secs()
                .saturating_add(u64::from(retry_after.subsec_nanos() > 0))
                .max(1);
            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, AUTHENTICATION_FAILED.to_string()).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
            response
        }
        AuthError::InvalidCredentials | AuthError::InvalidProvider => {
            debug!(kind = err.kind(), "authentication failed");
            (StatusCode::UNAUTHORIZED, AUTHENTICATION_FAILED.to_string()).into_response()
        }
        AuthError::TokenUnknown
        | AuthError::TokenExpired
        | AuthError::ReuseDetected { .. }
        | AuthError::TokenInvalid => {
            debug!(kind = err.kind(), "token rejected");
            (
                StatusCode::UNAUTHORIZED,
                REAUTHENTICATION_REQUIRED.to_string(),
            )
                .into_response()
        }
        AuthError::MalformedDigest
        | AuthError::Hashing
        | AuthError::Storage(_)
        | AuthError::Internal(_) => {
            error!(kind = err.kind(), "auth request failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
                .into_response()
        }
    }
}
