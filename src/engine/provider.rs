//! External identity provider claim validation.
//!
//! The provider token's signature and expiry are checked before the claims get
//! here. Validators only check claim shape, audience, and issuer, and extract
//! the provider-side subject.

use crate::engine::{error::AuthError, model::Provider};
use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Decoded claims of a provider ID token, tagged with the provider that issued it.
#[derive(Clone, Debug)]
pub struct ProviderClaims {
    pub provider: Provider,
    pub claims: Value,
}

/// A provider-verified subject, ready to be linked to an internal account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSubject {
    pub provider: Provider,
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Checks a raw provider ID token (signature, expiry) and decodes its claims.
///
/// Runs after rate limiting, so implementations may do network work.
#[async_trait]
pub trait ProviderTokenVerifier: Send + Sync {
    /// # Errors
    /// Returns [`AuthError::InvalidProvider`] for any token that cannot be trusted.
    async fn verify(&self, provider: Provider, id_token: &str) -> Result<ProviderClaims, AuthError>;
}

pub trait ClaimValidator: Send + Sync {
    fn provider(&self) -> Provider;

    /// # Errors
    /// Returns [`AuthError::InvalidProvider`] when any required claim is
    /// missing or does not match.
    fn validate(&self, claims: &Value) -> Result<ProviderSubject, AuthError>;
}

#[derive(Clone, Debug)]
pub struct GoogleClaimValidator {
    client_ids: Vec<String>,
}

impl GoogleClaimValidator {
    #[must_use]
    pub fn new(client_ids: Vec<String>) -> Self {
        Self { client_ids }
    }

    fn audience_matches(&self, aud: &Value) -> bool {
        match aud {
            Value::String(aud) => self.client_ids.iter().any(|id| id == aud),
            Value::Array(values) => values
                .iter()
                .filter_map(Value::as_str)
                .any(|aud| self.client_ids.iter().any(|id| id == aud)),
            _ => false,
        }
    }
}

fn required_str<'a>(claims: &'a Value, name: &str) -> Result<&'a str, AuthError> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::InvalidProvider)
}

/// Google sends `email_verified` as a boolean, older tokens as a string.
fn email_verified(claims: &Value) -> bool {
    match claims.get("email_verified") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

impl ClaimValidator for GoogleClaimValidator {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn validate(&self, claims: &Value) -> Result<ProviderSubject, AuthError> {
        let subject = required_str(claims, "sub")?;
        let issuer = required_str(claims, "iss")?;
        let email = required_str(claims, "email")?;
        let aud = claims.get("aud").ok_or(AuthError::InvalidProvider)?;

        if self.client_ids.is_empty() || !self.audience_matches(aud) {
            return Err(AuthError::InvalidProvider);
        }
        if !GOOGLE_ISSUERS.contains(&issuer) {
            return Err(AuthError::InvalidProvider);
        }
        if !email_verified(claims) {
            return Err(AuthError::InvalidProvider);
        }

        Ok(ProviderSubject {
            provider: Provider::Google,
            subject: subject.to_string(),
            email: email.to_lowercase(),
            display_name: claims
                .get("name")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        })
    }
}

/// Validators keyed by the provider tag on the incoming request.
#[derive(Clone, Default)]
pub struct ClaimValidators {
    validators: HashMap<Provider, Arc<dyn ClaimValidator>>,
}

impl ClaimValidators {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, validator: Arc<dyn ClaimValidator>) -> Self {
        self.validators.insert(validator.provider(), validator);
        self
    }

    /// # Errors
    /// Returns [`AuthError::InvalidProvider`] when no validator is registered
    /// for the claims' provider or validation fails.
    pub fn validate(&self, claims: &ProviderClaims) -> Result<ProviderSubject, AuthError> {
        let validator = self
            .validators
            .get(&claims.provider)
            .ok_or(AuthError::InvalidProvider)?;
        validator.validate(&claims.claims)
    }
}
