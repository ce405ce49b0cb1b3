use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failure taxonomy of the engine.
///
/// Several variants collapse into the same client-facing message at the HTTP
/// boundary; the distinction only survives in telemetry (see [`AuthError::kind`]).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid provider claims")]
    InvalidProvider,
    #[error("too many attempts, retry after {}s", retry_after.as_secs())]
    Throttled { retry_after: Duration },
    #[error("unknown refresh token")]
    TokenUnknown,
    #[error("refresh token expired")]
    TokenExpired,
    #[error("refresh token reuse detected in family {family_id}")]
    ReuseDetected { family_id: Uuid },
    #[error("invalid access token")]
    TokenInvalid,
    #[error("malformed password digest")]
    MalformedDigest,
    #[error("password hashing failed")]
    Hashing,
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Refresh-path failures that all mean "sign in again" to the client.
    #[must_use]
    pub const fn is_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::TokenUnknown | Self::TokenExpired | Self::ReuseDetected { .. }
        )
    }

    /// Stable label for logs and alerting.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidProvider => "invalid_provider",
            Self::Throttled { .. } => "throttled",
            Self::TokenUnknown => "token_unknown",
            Self::TokenExpired => "token_expired",
            Self::ReuseDetected { .. } => "reuse_detected",
            Self::TokenInvalid => "token_invalid",
            Self::MalformedDigest => "malformed_digest",
            Self::Hashing => "hashing",
            Self::Storage(_) => "storage",
            Self::Internal(_) => "internal",
        }
    }
}
