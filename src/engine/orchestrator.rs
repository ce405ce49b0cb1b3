//! Per-request entry points: login, refresh, logout.
//!
//! Every operation consults the rate limiter before doing any credential or
//! token work.

use crate::engine::{
    config::AuthConfig,
    error::AuthError,
    issuer::{RevokedFamily, TokenIssuer},
    model::{Identity, Provider, SubjectId, TokenPair},
    provider::{ProviderClaims, ProviderTokenVerifier},
    rate_limit::{RateLimitAction, RateLimitDecision, RateLimitKey, RateLimitKeyScope, RateLimiter},
    secret::fingerprint,
    signer::AccessClaims,
    verifier::{normalize_email, CredentialVerifier},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument};

#[derive(Debug)]
pub enum LoginCredentials {
    Password {
        email: String,
        password: SecretString,
    },
    /// Provider ID-token claims whose signature and expiry were already verified.
    Provider(ProviderClaims),
    /// Raw provider ID token, checked by the configured [`ProviderTokenVerifier`].
    ProviderToken {
        provider: Provider,
        id_token: SecretString,
    },
}

impl LoginCredentials {
    fn account_hint(&self) -> Option<String> {
        let email = match self {
            Self::Password { email, .. } => Some(email.as_str()),
            Self::Provider(claims) => claims.claims.get("email").and_then(Value::as_str),
            Self::ProviderToken { .. } => None,
        };
        email
            .map(normalize_email)
            .filter(|email| !email.is_empty())
    }

    /// Bucket scoped to what was presented, for callers with neither a known
    /// address nor an account hint. Never shared between unrelated callers.
    fn credential_key(&self) -> RateLimitKey {
        let presented = match self {
            Self::Password { email, .. } => normalize_email(email),
            Self::Provider(claims) => claims.claims.to_string(),
            Self::ProviderToken { id_token, .. } => id_token.expose_secret().to_string(),
        };
        RateLimitKey::Token(fingerprint(&presented))
    }
}

/// Transport facts about the caller.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub client_ip: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn from_ip(client_ip: Option<String>) -> Self {
        Self { client_ip }
    }
}

pub struct AuthOrchestrator {
    config: AuthConfig,
    limiter: Arc<dyn RateLimiter>,
    verifier: CredentialVerifier,
    issuer: TokenIssuer,
    provider_tokens: Option<Arc<dyn ProviderTokenVerifier>>,
}

impl AuthOrchestrator {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        limiter: Arc<dyn RateLimiter>,
        verifier: CredentialVerifier,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            config,
            limiter,
            verifier,
            issuer,
            provider_tokens: None,
        }
    }

    /// Accept [`LoginCredentials::ProviderToken`] logins.
    #[must_use]
    pub fn with_provider_tokens(mut self, verifier: Arc<dyn ProviderTokenVerifier>) -> Self {
        self.provider_tokens = Some(verifier);
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authenticate with a password or provider claims and start a new token family.
    ///
    /// # Errors
    /// [`AuthError::Throttled`] before any credential work when a login bucket
    /// is exhausted; otherwise whatever verification or issuing reports.
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        credentials: LoginCredentials,
        context: &RequestContext,
    ) -> Result<TokenPair, AuthError> {
        let keys = self.login_keys(&credentials, context);
        self.gate(&keys, RateLimitAction::Login)?;

        let identity = match credentials {
            LoginCredentials::Password { email, password } => {
                self.verifier
                    .verify_password(&email, password.expose_secret())
                    .await
            }
            LoginCredentials::Provider(claims) => self.verifier.verify_provider_claims(&claims).await,
            LoginCredentials::ProviderToken { provider, id_token } => {
                self.verify_provider_token(provider, &id_token).await
            }
        }
        .inspect_err(|err| debug!(kind = err.kind(), "login rejected"))?;

        if self.config.clear_on_success() {
            for key in &keys {
                self.limiter.clear(key, RateLimitAction::Login);
            }
        }

        let pair = self.issuer.issue(&identity).await?;
        info!(subject = %identity.subject, provider = %identity.provider, "login succeeded");
        Ok(pair)
    }

    /// # Errors
    /// [`AuthError::Throttled`], or the rotation failure from [`TokenIssuer::rotate`].
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        context: &RequestContext,
    ) -> Result<TokenPair, AuthError> {
        let key = Self::token_key(refresh_token, context);
        self.gate(std::slice::from_ref(&key), RateLimitAction::Refresh)?;
        self.issuer
            .rotate(refresh_token)
            .await
            .inspect_err(|err| debug!(kind = err.kind(), "refresh rejected"))
    }

    /// # Errors
    /// [`AuthError::Throttled`], or [`AuthError::TokenUnknown`] for unknown or
    /// already revoked tokens.
    #[instrument(skip_all)]
    pub async fn logout(
        &self,
        refresh_token: &str,
        context: &RequestContext,
    ) -> Result<RevokedFamily, AuthError> {
        let key = Self::token_key(refresh_token, context);
        self.gate(std::slice::from_ref(&key), RateLimitAction::Logout)?;
        self.issuer.revoke(refresh_token).await
    }

    /// Verify a bearer access token.
    ///
    /// # Errors
    /// [`AuthError::TokenInvalid`] for any verification failure.
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        self.issuer.verify_access(access_token)
    }

    /// Administrative action: revoke every refresh token the subject holds.
    ///
    /// # Errors
    /// [`AuthError::Storage`] if the store fails.
    pub async fn revoke_subject(&self, subject: &SubjectId) -> Result<u64, AuthError> {
        self.issuer.revoke_subject(subject).await
    }

    /// Convenience for resource handlers that only need the identity.
    ///
    /// # Errors
    /// [`AuthError::TokenInvalid`] for any verification failure.
    pub fn identity(&self, access_token: &str) -> Result<Identity, AuthError> {
        self.authenticate(access_token).map(|claims| claims.identity())
    }

    async fn verify_provider_token(
        &self,
        provider: Provider,
        id_token: &SecretString,
    ) -> Result<Identity, AuthError> {
        let tokens = self
            .provider_tokens
            .as_ref()
            .ok_or(AuthError::InvalidProvider)?;
        let claims = tokens.verify(provider, id_token.expose_secret()).await?;
        self.verifier.verify_provider_claims(&claims).await
    }

    fn login_keys(&self, credentials: &LoginCredentials, context: &RequestContext) -> Vec<RateLimitKey> {
        let ip = context.client_ip.clone().map(RateLimitKey::Ip);
        let account = credentials.account_hint().map(RateLimitKey::Account);
        let keys: Vec<RateLimitKey> = match self.config.key_scope() {
            RateLimitKeyScope::Ip => ip.or(account).into_iter().collect(),
            RateLimitKeyScope::Account => account.or(ip).into_iter().collect(),
            RateLimitKeyScope::Combined => ip.into_iter().chain(account).collect(),
        };
        if keys.is_empty() {
            vec![credentials.credential_key()]
        } else {
            keys
        }
    }

    fn token_key(refresh_token: &str, context: &RequestContext) -> RateLimitKey {
        context
            .client_ip
            .clone()
            .map_or_else(|| RateLimitKey::Token(fingerprint(refresh_token)), RateLimitKey::Ip)
    }

    /// Record the attempt in every bucket; the longest wait wins.
    fn gate(&self, keys: &[RateLimitKey], action: RateLimitAction) -> Result<(), AuthError> {
        let mut retry_after: Option<Duration> = None;
        for key in keys {
            if let RateLimitDecision::Throttled { retry_after: wait } =
                self.limiter.check_and_record(key, action)
            {
                retry_after = Some(retry_after.map_or(wait, |current| current.max(wait)));
            }
        }
        match retry_after {
            Some(retry_after) => {
                info!(action = action.as_str(), retry_after = retry_after.as_secs(), "rate limited");
                Err(AuthError::Throttled { retry_after })
            }
            None => Ok(()),
        }
    }
}
