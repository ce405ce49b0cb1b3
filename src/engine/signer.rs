//! Access-token signing and verification.
//!
//! Tokens are HS256 JWTs carrying a `kid` header. New tokens are always signed
//! with the current key; verification also accepts a short list of retired keys
//! so tokens minted before a key rotation stay valid until they expire.

use crate::engine::{
    error::AuthError,
    model::{Identity, IssuedAccessToken, Provider, SubjectId},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use uuid::Uuid;

pub const MAX_RETIRED_KEYS: usize = 3;
pub const ACCESS_TOKEN_TYPE: &str = "access";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub provider: Provider,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
    pub typ: String,
}

impl AccessClaims {
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            subject: SubjectId::new(self.sub.clone()),
            email: self.email.clone(),
            provider: self.provider,
        }
    }
}

#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    secret: SecretString,
}

impl SigningKey {
    /// # Errors
    /// Returns [`AuthError::Internal`] for an empty key id or secret.
    pub fn new(kid: impl Into<String>, secret: SecretString) -> Result<Self, AuthError> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            return Err(AuthError::Internal("signing key id is empty".to_string()));
        }
        if secret.expose_secret().is_empty() {
            return Err(AuthError::Internal(format!("signing key {kid} is empty")));
        }
        Ok(Self { kid, secret })
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.secret.expose_secret().as_bytes())
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.secret.expose_secret().as_bytes())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// The current signing key plus recently retired verification-only keys,
/// newest first.
#[derive(Clone, Debug)]
pub struct SigningKeySet {
    current: SigningKey,
    retired: Vec<SigningKey>,
}

impl SigningKeySet {
    #[must_use]
    pub fn new(current: SigningKey) -> Self {
        Self {
            current,
            retired: Vec::new(),
        }
    }

    /// # Errors
    /// Returns [`AuthError::Internal`] when more than [`MAX_RETIRED_KEYS`] are
    /// given or a key id is used twice.
    pub fn with_retired(mut self, retired: Vec<SigningKey>) -> Result<Self, AuthError> {
        if retired.len() > MAX_RETIRED_KEYS {
            return Err(AuthError::Internal(format!(
                "at most {MAX_RETIRED_KEYS} retired signing keys are supported"
            )));
        }
        for (index, key) in retired.iter().enumerate() {
            let duplicate = key.kid == self.current.kid
                || retired[..index].iter().any(|other| other.kid == key.kid);
            if duplicate {
                return Err(AuthError::Internal(format!(
                    "duplicate signing key id {}",
                    key.kid
                )));
            }
        }
        self.retired = retired;
        Ok(self)
    }

    /// Promote `next` to current; the previous current key becomes the newest
    /// retired key and the oldest retired key drops off.
    #[must_use]
    pub fn rotate(mut self, next: SigningKey) -> Self {
        let previous = std::mem::replace(&mut self.current, next);
        self.retired.retain(|key| key.kid != self.current.kid);
        self.retired.insert(0, previous);
        self.retired.truncate(MAX_RETIRED_KEYS);
        self
    }

    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.current.kid
    }

    fn find(&self, kid: &str) -> Option<&SigningKey> {
        std::iter::once(&self.current)
            .chain(self.retired.iter())
            .find(|key| key.kid == kid)
    }
}

#[derive(Clone, Debug)]
pub struct TokenSigner {
    keys: SigningKeySet,
    issuer: String,
}

impl TokenSigner {
    #[must_use]
    pub fn new(keys: SigningKeySet, issuer: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a fresh access token for `identity` valid for `ttl`.
    ///
    /// # Errors
    /// Returns [`AuthError::Internal`] if the TTL is out of range or encoding fails.
    pub fn sign(&self, identity: &Identity, ttl: Duration) -> Result<IssuedAccessToken, AuthError> {
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|_| AuthError::Internal("access token ttl out of range".to_string()))?;
        let now = Utc::now();
        let expires_at = now + ttl;
        let claims = AccessClaims {
            sub: identity.subject.to_string(),
            email: identity.email.clone(),
            provider: identity.provider,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
        };
        let token = self.sign_claims(&claims)?;
        Ok(IssuedAccessToken {
            token,
            expires_at,
            expires_in_seconds: ttl.num_seconds(),
        })
    }

    /// # Errors
    /// Returns [`AuthError::Internal`] if encoding fails.
    pub fn sign_claims(&self, claims: &AccessClaims) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.keys.current.kid.clone());
        encode(&header, claims, &self.keys.current.encoding_key())
            .map_err(|err| AuthError::Internal(format!("failed to sign access token: {err}")))
    }

    /// # Errors
    /// Returns [`AuthError::TokenInvalid`] for any structural, signature, key,
    /// issuer, type, or time-window failure.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::TokenInvalid)?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError::TokenInvalid);
        }
        let kid = header.kid.ok_or(AuthError::TokenInvalid)?;
        let key = self.keys.find(&kid).ok_or(AuthError::TokenInvalid)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        let data = decode::<AccessClaims>(token, &key.decoding_key(), &validation)
            .map_err(|_| AuthError::TokenInvalid)?;
        if data.claims.typ != ACCESS_TOKEN_TYPE {
            return Err(AuthError::TokenInvalid);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
pub(crate) fn test_signer(kid: &str, secret: &str) -> TokenSigner {
    let key = SigningKey {
        kid: kid.to_string(),
        secret: SecretString::from(secret.to_string()),
    };
    TokenSigner::new(SigningKeySet::new(key), "authkeep")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            subject: SubjectId::new("subject-1"),
            email: "alice@example.com".to_string(),
            provider: Provider::Password,
        }
    }

    fn key(kid: &str, secret: &str) -> Result<SigningKey, AuthError> {
        SigningKey::new(kid, SecretString::from(secret.to_string()))
    }

    #[test]
    fn sign_then_verify_returns_claims() -> Result<(), AuthError> {
        let signer = test_signer("k1", "secret-one");
        let issued = signer.sign(&identity(), Duration::from_secs(900))?;
        assert_eq!(issued.expires_in_seconds, 900);

        let claims = signer.verify(&issued.token)?;
        assert_eq!(claims.identity(), identity());
        assert_eq!(claims.iss, "authkeep");
        assert_eq!(claims.typ, ACCESS_TOKEN_TYPE);
        assert_eq!(claims.exp - claims.iat, 900);
        Ok(())
    }

    #[test]
    fn header_carries_current_kid() -> Result<(), AuthError> {
        let signer = test_signer("k7", "secret");
        let issued = signer.sign(&identity(), Duration::from_secs(60))?;
        let header = decode_header(&issued.token).map_err(|_| AuthError::TokenInvalid)?;
        assert_eq!(header.kid.as_deref(), Some("k7"));
        Ok(())
    }

    #[test]
    fn expired_token_is_invalid() -> Result<(), AuthError> {
        let signer = test_signer("k1", "secret");
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: "subject-1".to_string(),
            email: "alice@example.com".to_string(),
            provider: Provider::Password,
            iss: "authkeep".to_string(),
            iat: now - 120,
            nbf: now - 120,
            exp: now - 60,
            jti: "jti".to_string(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
        };
        let token = signer.sign_claims(&claims)?;
        assert!(matches!(signer.verify(&token), Err(AuthError::TokenInvalid)));
        Ok(())
    }

    #[test]
    fn not_yet_valid_token_is_invalid() -> Result<(), AuthError> {
        let signer = test_signer("k1", "secret");
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: "subject-1".to_string(),
            email: "alice@example.com".to_string(),
            provider: Provider::Password,
            iss: "authkeep".to_string(),
            iat: now,
            nbf: now + 600,
            exp: now + 900,
            jti: "jti".to_string(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
        };
        let token = signer.sign_claims(&claims)?;
        assert!(matches!(signer.verify(&token), Err(AuthError::TokenInvalid)));
        Ok(())
    }

    #[test]
    fn wrong_type_or_issuer_is_invalid() -> Result<(), AuthError> {
        let signer = test_signer("k1", "secret");
        let issued = signer.sign(&identity(), Duration::from_secs(60))?;
        let mut claims = signer.verify(&issued.token)?;

        claims.typ = "refresh".to_string();
        let token = signer.sign_claims(&claims)?;
        assert!(matches!(signer.verify(&token), Err(AuthError::TokenInvalid)));

        let other_issuer = TokenSigner::new(signer.keys.clone(), "someone-else");
        assert!(matches!(
            other_issuer.verify(&issued.token),
            Err(AuthError::TokenInvalid)
        ));
        Ok(())
    }

    #[test]
    fn tampered_or_garbage_tokens_are_invalid() -> Result<(), AuthError> {
        let signer = test_signer("k1", "secret");
        let issued = signer.sign(&identity(), Duration::from_secs(60))?;
        let mut tampered = issued.token.clone();
        tampered.push('x');
        assert!(matches!(signer.verify(&tampered), Err(AuthError::TokenInvalid)));
        assert!(matches!(signer.verify("not.a.jwt"), Err(AuthError::TokenInvalid)));
        assert!(matches!(signer.verify(""), Err(AuthError::TokenInvalid)));

        let other = test_signer("k1", "different-secret");
        assert!(matches!(other.verify(&issued.token), Err(AuthError::TokenInvalid)));
        Ok(())
    }

    #[test]
    fn retired_keys_verify_but_never_sign() -> Result<(), AuthError> {
        let old = TokenSigner::new(SigningKeySet::new(key("k1", "old-secret")?), "authkeep");
        let token = old.sign(&identity(), Duration::from_secs(60))?.token;

        let rotated_keys = SigningKeySet::new(key("k1", "old-secret")?).rotate(key("k2", "new-secret")?);
        assert_eq!(rotated_keys.current_kid(), "k2");
        let current = TokenSigner::new(rotated_keys, "authkeep");
        assert!(current.verify(&token).is_ok());

        let fresh = current.sign(&identity(), Duration::from_secs(60))?.token;
        let header = decode_header(&fresh).map_err(|_| AuthError::TokenInvalid)?;
        assert_eq!(header.kid.as_deref(), Some("k2"));
        Ok(())
    }

    #[test]
    fn rotation_keeps_bounded_history() -> Result<(), AuthError> {
        let mut keys = SigningKeySet::new(key("k0", "s0")?);
        for index in 1..=5 {
            keys = keys.rotate(key(&format!("k{index}"), &format!("s{index}"))?);
        }
        assert_eq!(keys.current_kid(), "k5");
        assert_eq!(keys.retired.len(), MAX_RETIRED_KEYS);
        assert!(keys.find("k4").is_some());
        assert!(keys.find("k2").is_some());
        assert!(keys.find("k1").is_none());
        Ok(())
    }

    #[test]
    fn key_set_rejects_duplicates_and_overflow() -> Result<(), AuthError> {
        let duplicate = SigningKeySet::new(key("k1", "a")?).with_retired(vec![key("k1", "b")?]);
        assert!(duplicate.is_err());

        let overflow = SigningKeySet::new(key("k0", "a")?).with_retired(vec![
            key("k1", "b")?,
            key("k2", "c")?,
            key("k3", "d")?,
            key("k4", "e")?,
        ]);
        assert!(overflow.is_err());
        assert!(SigningKey::new("", SecretString::from("x".to_string())).is_err());
        assert!(SigningKey::new("k1", SecretString::from(String::new())).is_err());
        Ok(())
    }
}
