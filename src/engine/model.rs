//! Domain records shared by the engine components.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable, opaque account identifier. The same account keeps the same subject
/// regardless of which provider authenticated it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh subject for an account created on first provider sign-in.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Password,
    Google,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Google => "google",
        }
    }

    /// Parse a provider tag from storage or an incoming request.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "password" => Some(Self::Password),
            "google" => Some(Self::Google),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated subject. Owned by the account system; the engine only reads it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: SubjectId,
    pub email: String,
    pub provider: Provider,
}

/// Version tag of the stored password digest format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct HashVersion(pub i16);

impl HashVersion {
    /// argon2id in PHC string format.
    pub const ARGON2ID_V1: Self = Self(1);
}

/// Password-path credential, read during verification.
#[derive(Clone, Debug)]
pub struct CredentialRecord {
    pub subject: SubjectId,
    pub email: String,
    pub password_hash: String,
    pub hash_version: HashVersion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Rotated,
    Revoked,
}

impl TokenStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Rotated => "rotated",
            Self::Revoked => "revoked",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "rotated" => Some(Self::Rotated),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// Persisted refresh-token row. The raw value never appears here, only its hash.
#[derive(Clone, Debug)]
pub struct RefreshTokenRecord {
    pub token_id: Uuid,
    pub token_hash: Vec<u8>,
    pub family_id: Uuid,
    pub identity: Identity,
    pub status: TokenStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Refresh token as handed to the client.
#[derive(Debug)]
pub struct IssuedRefreshToken {
    pub value: SecretString,
    pub family_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct IssuedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: i64,
}

#[derive(Debug)]
pub struct TokenPair {
    pub identity: Identity,
    pub access: IssuedAccessToken,
    pub refresh: IssuedRefreshToken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn provider_parse_is_case_insensitive() {
        assert_eq!(Provider::parse(" Google "), Some(Provider::Google));
        assert_eq!(Provider::parse("password"), Some(Provider::Password));
        assert_eq!(Provider::parse("github"), None);
    }

    #[test]
    fn token_status_round_trips_through_text() {
        for status in [TokenStatus::Active, TokenStatus::Rotated, TokenStatus::Revoked] {
            assert_eq!(TokenStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TokenStatus::parse("ACTIVE"), None);
    }

    #[test]
    fn record_expiry_is_inclusive() {
        let now = Utc::now();
        let record = RefreshTokenRecord {
            token_id: Uuid::new_v4(),
            token_hash: vec![1, 2, 3],
            family_id: Uuid::new_v4(),
            identity: Identity {
                subject: SubjectId::new("s-1"),
                email: "a@example.com".to_string(),
                provider: Provider::Password,
            },
            status: TokenStatus::Active,
            issued_at: now - Duration::minutes(1),
            expires_at: now,
        };
        assert!(record.is_expired_at(now));
        assert!(!record.is_expired_at(now - Duration::seconds(1)));
    }
}
