//! Google ID token verification against Google's published signing keys.
//!
//! Keys are cached for a configurable TTL. A stale cache triggers a refresh; if
//! the refresh fails the last known keys stay in use. An unknown `kid` forces a
//! refresh at most once per cooldown period, so forged tokens cannot make us
//! hammer the JWKS endpoint.

use crate::engine::{
    error::AuthError,
    model::Provider,
    provider::{ProviderClaims, ProviderTokenVerifier},
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header,
    jwk::{Jwk, JwkSet},
    Algorithm, DecodingKey, Validation,
};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

const JWKS_REFRESH_COOLDOWN: Duration = Duration::from_secs(30);
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct JwksCache {
    keys: JwkSet,
    /// `None` until the first successful fetch.
    fetched_at: Option<Instant>,
}

impl JwksCache {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.is_some_and(|at| at.elapsed() < ttl)
    }
}

#[derive(Debug)]
enum JwksSource {
    Remote { url: String, client: Client },
    /// Fixed key set, never refreshed.
    Static,
}

#[derive(Debug)]
pub struct GoogleTokenVerifier {
    source: JwksSource,
    cache_ttl: Duration,
    cache: RwLock<JwksCache>,
    last_forced_refresh: Mutex<Option<Instant>>,
}

impl GoogleTokenVerifier {
    /// Keys are fetched lazily on first use, so startup does not depend on Google.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(jwks_url: String, cache_ttl: Duration) -> Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .context("Failed to build JWKS HTTP client")?;
        Ok(Self {
            source: JwksSource::Remote {
                url: jwks_url,
                client,
            },
            cache_ttl,
            cache: RwLock::new(JwksCache {
                keys: JwkSet { keys: Vec::new() },
                fetched_at: None,
            }),
            last_forced_refresh: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_keys(keys: JwkSet) -> Self {
        Self {
            source: JwksSource::Static,
            cache_ttl: Duration::MAX,
            cache: RwLock::new(JwksCache {
                keys,
                fetched_at: Some(Instant::now()),
            }),
            last_forced_refresh: Mutex::new(None),
        }
    }

    async fn key_for(&self, kid: &str) -> Option<Jwk> {
        let fresh = self.cache.read().await.is_fresh(self.cache_ttl);
        if !fresh {
            if let Err(err) = self.refresh().await {
                warn!(error = %err, "failed to refresh Google JWKS, using cached keys");
            }
        }

        if let Some(jwk) = self.cache.read().await.keys.find(kid) {
            return Some(jwk.clone());
        }

        if self.try_forced_refresh().await {
            return self.cache.read().await.keys.find(kid).cloned();
        }
        None
    }

    /// Refresh on an unknown `kid`, at most once per cooldown.
    async fn try_forced_refresh(&self) -> bool {
        if matches!(self.source, JwksSource::Static) {
            return false;
        }
        {
            let mut last = self.last_forced_refresh.lock().await;
            if last.is_some_and(|at| at.elapsed() < JWKS_REFRESH_COOLDOWN) {
                return false;
            }
            *last = Some(Instant::now());
        }
        match self.refresh().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "failed to refresh Google JWKS for unknown kid");
                false
            }
        }
    }

    async fn refresh(&self) -> Result<()> {
        let JwksSource::Remote { url, client } = &self.source else {
            return Ok(());
        };
        let keys = fetch_jwks(client, url).await?;
        let mut cache = self.cache.write().await;
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());
        info!(keys = cache.keys.keys.len(), "Google JWKS cache refreshed");
        Ok(())
    }
}

async fn fetch_jwks(client: &Client, url: &str) -> Result<JwkSet> {
    let span = info_span!("google.jwks.fetch", http.method = "GET", url = %url);
    async {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("JWKS fetch failed: {status}"));
        }
        response
            .json::<JwkSet>()
            .await
            .context("Invalid JWKS document")
    }
    .instrument(span)
    .await
}

#[async_trait]
impl ProviderTokenVerifier for GoogleTokenVerifier {
    #[instrument(skip_all)]
    async fn verify(&self, provider: Provider, id_token: &str) -> Result<ProviderClaims, AuthError> {
        if provider != Provider::Google {
            return Err(AuthError::InvalidProvider);
        }

        let header = decode_header(id_token).map_err(|err| {
            debug!("undecodable provider token header: {err}");
            AuthError::InvalidProvider
        })?;
        if header.alg != Algorithm::RS256 {
            debug!(alg = ?header.alg, "unexpected provider token algorithm");
            return Err(AuthError::InvalidProvider);
        }
        let kid = header.kid.ok_or(AuthError::InvalidProvider)?;

        let Some(jwk) = self.key_for(&kid).await else {
            debug!(kid = %kid, "no Google signing key for kid");
            return Err(AuthError::InvalidProvider);
        };
        let key = DecodingKey::from_jwk(&jwk).map_err(|err| {
            warn!(kid = %kid, "unusable Google signing key: {err}");
            AuthError::InvalidProvider
        })?;

        // Audience, issuer and email checks belong to the claim validator.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Value>(id_token, &key, &validation).map_err(|err| {
            debug!("provider token rejected: {err}");
            AuthError::InvalidProvider
        })?;

        Ok(ProviderClaims {
            provider: Provider::Google,
            claims: data.claims,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{jwks, sign, TEST_KID};
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn claims(exp_offset: i64) -> Value {
        json!({
            "sub": "google-sub-1",
            "aud": "client-123",
            "iss": "https://accounts.google.com",
            "email": "alice@example.com",
            "email_verified": true,
            "exp": Utc::now().timestamp() + exp_offset,
        })
    }

    #[tokio::test]
    async fn accepts_signed_token() -> anyhow::Result<()> {
        let verifier = GoogleTokenVerifier::with_keys(jwks()?);
        let token = sign(TEST_KID, &claims(600))?;
        let verified = verifier.verify(Provider::Google, &token).await?;
        assert_eq!(verified.provider, Provider::Google);
        assert_eq!(verified.claims["sub"], "google-sub-1");
        Ok(())
    }

    #[tokio::test]
    async fn rejects_expired_token() -> anyhow::Result<()> {
        let verifier = GoogleTokenVerifier::with_keys(jwks()?);
        let token = sign(TEST_KID, &claims(-3600))?;
        let result = verifier.verify(Provider::Google, &token).await;
        assert!(matches!(result, Err(AuthError::InvalidProvider)));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_unknown_kid_and_tampering() -> anyhow::Result<()> {
        let verifier = GoogleTokenVerifier::with_keys(jwks()?);

        let token = sign("other-key", &claims(600))?;
        let result = verifier.verify(Provider::Google, &token).await;
        assert!(matches!(result, Err(AuthError::InvalidProvider)));

        let token = sign(TEST_KID, &claims(600))?;
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_payload = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            serde_json::to_vec(&json!({"sub": "attacker", "exp": Utc::now().timestamp() + 600}))?,
        );
        parts[1] = &forged_payload;
        let result = verifier.verify(Provider::Google, &parts.join(".")).await;
        assert!(matches!(result, Err(AuthError::InvalidProvider)));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_other_providers_and_garbage() -> anyhow::Result<()> {
        let verifier = GoogleTokenVerifier::with_keys(jwks()?);
        let token = sign(TEST_KID, &claims(600))?;
        let result = verifier.verify(Provider::Password, &token).await;
        assert!(matches!(result, Err(AuthError::InvalidProvider)));

        let result = verifier.verify(Provider::Google, "not-a-jwt").await;
        assert!(matches!(result, Err(AuthError::InvalidProvider)));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_jwks_fails_closed() -> anyhow::Result<()> {
        let verifier =
            GoogleTokenVerifier::new("http://127.0.0.1:9/certs".to_string(), Duration::from_secs(60))?;
        let token = sign(TEST_KID, &claims(600))?;
        let result = verifier.verify(Provider::Google, &token).await;
        assert!(matches!(result, Err(AuthError::InvalidProvider)));
        Ok(())
    }
}
