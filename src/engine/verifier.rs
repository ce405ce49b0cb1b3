//! Password and provider-claim verification.

use crate::engine::{
    accounts::AccountDirectory,
    error::AuthError,
    hasher::CredentialHasher,
    model::{CredentialRecord, Identity, Provider},
    provider::{ClaimValidators, ProviderClaims},
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Trim and lowercase an email so lookups are case-insensitive.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct CredentialVerifier {
    hasher: Arc<dyn CredentialHasher>,
    accounts: Arc<dyn AccountDirectory>,
    validators: ClaimValidators,
    // Verified against when the email is unknown, so both paths cost one hash.
    dummy_digest: String,
}

impl CredentialVerifier {
    /// # Errors
    /// Returns [`AuthError::Hashing`] if the placeholder digest cannot be computed.
    pub fn new(
        hasher: Arc<dyn CredentialHasher>,
        accounts: Arc<dyn AccountDirectory>,
        validators: ClaimValidators,
    ) -> Result<Self, AuthError> {
        let dummy_digest = hasher.hash("authkeep-placeholder-password")?;
        Ok(Self {
            hasher,
            accounts,
            validators,
            dummy_digest,
        })
    }

    /// Check an email/password pair.
    ///
    /// Unknown emails and wrong passwords fail with the same
    /// [`AuthError::InvalidCredentials`] after the same amount of hashing work.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredentials`] on mismatch, [`AuthError::Storage`] when
    /// the directory fails, [`AuthError::MalformedDigest`] for a corrupt stored digest.
    #[instrument(skip_all)]
    pub async fn verify_password(&self, email: &str, plaintext: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        let record = self.accounts.find_credential(&email).await?;

        let digest = record
            .as_ref()
            .map_or_else(|| self.dummy_digest.clone(), |record| record.password_hash.clone());
        let matched = self.verify_blocking(plaintext, digest).await?;

        let Some(record) = record else {
            debug!("password login for unknown account");
            return Err(AuthError::InvalidCredentials);
        };
        if !matched {
            debug!("password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        self.upgrade_digest(&record, plaintext).await;

        Ok(Identity {
            subject: record.subject,
            email: record.email,
            provider: Provider::Password,
        })
    }

    /// Validate already signature-checked provider claims and resolve the
    /// internal identity, linking the provider subject on first use.
    ///
    /// # Errors
    /// [`AuthError::InvalidProvider`] when the claims fail validation,
    /// [`AuthError::Storage`] when linking fails.
    #[instrument(skip_all, fields(provider = %claims.provider))]
    pub async fn verify_provider_claims(&self, claims: &ProviderClaims) -> Result<Identity, AuthError> {
        let subject = self.validators.validate(claims)?;
        let identity = self.accounts.link_provider(&subject).await?;
        Ok(identity)
    }

    async fn verify_blocking(&self, plaintext: &str, digest: String) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &digest))
            .await
            .map_err(|err| AuthError::Internal(format!("password verification task failed: {err}")))?
    }

    /// Re-hash with current parameters after a successful match. Failures are
    /// logged; the login itself already succeeded.
    async fn upgrade_digest(&self, record: &CredentialRecord, plaintext: &str) {
        if !self
            .hasher
            .needs_rehash(&record.password_hash, record.hash_version)
        {
            return;
        }
        let hasher = Arc::clone(&self.hasher);
        let plaintext = plaintext.to_string();
        let rehashed = tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await;
        let digest = match rehashed {
            Ok(Ok(digest)) => digest,
            Ok(Err(err)) => {
                warn!("failed to rehash password: {err}");
                return;
            }
            Err(err) => {
                warn!("password rehash task failed: {err}");
                return;
            }
        };
        if let Err(err) = self
            .accounts
            .update_password_hash(&record.subject, &digest, self.hasher.current_version())
            .await
        {
            warn!("failed to store upgraded password hash: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        accounts::InMemoryAccounts,
        hasher::{fast_hasher, Argon2Hasher},
        model::HashVersion,
        provider::GoogleClaimValidator,
    };
    use serde_json::json;

    async fn setup() -> anyhow::Result<(CredentialVerifier, Arc<InMemoryAccounts>)> {
        let hasher = Arc::new(fast_hasher());
        let accounts = Arc::new(InMemoryAccounts::new());
        accounts
            .register_password(
                "alice@example.com",
                hasher.hash("correct horse")?,
                HashVersion::ARGON2ID_V1,
            )
            .await?;
        let validators = ClaimValidators::new().with(Arc::new(GoogleClaimValidator::new(vec![
            "client-123".to_string(),
        ])));
        let verifier = CredentialVerifier::new(hasher, accounts.clone(), validators)?;
        Ok((verifier, accounts))
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[tokio::test]
    async fn verify_password_returns_identity() -> anyhow::Result<()> {
        let (verifier, _) = setup().await?;
        let identity = verifier
            .verify_password(" Alice@Example.com ", "correct horse")
            .await?;
        assert_eq!(identity.email, "alice@example.com");
        assert_eq!(identity.provider, Provider::Password);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_fail_identically() -> anyhow::Result<()> {
        let (verifier, _) = setup().await?;
        let wrong = verifier
            .verify_password("alice@example.com", "battery staple")
            .await;
        let unknown = verifier
            .verify_password("nobody@example.com", "correct horse")
            .await;
        let (Err(wrong), Err(unknown)) = (wrong, unknown) else {
            anyhow::bail!("both attempts should fail");
        };
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        Ok(())
    }

    #[tokio::test]
    async fn outdated_digest_is_upgraded_on_login() -> anyhow::Result<()> {
        let (verifier, accounts) = setup().await?;
        let old = Argon2Hasher::new(16, 2, 1)?;
        let subject = accounts
            .register_password("bob@example.com", old.hash("hunter2")?, HashVersion::ARGON2ID_V1)
            .await?;

        verifier.verify_password("bob@example.com", "hunter2").await?;

        let (digest, _) = accounts
            .stored_hash(&subject)
            .await
            .ok_or_else(|| anyhow::anyhow!("missing hash"))?;
        assert!(digest.contains("m=8,t=1,p=1"));
        verifier.verify_password("bob@example.com", "hunter2").await?;
        Ok(())
    }

    #[tokio::test]
    async fn provider_claims_link_to_existing_account() -> anyhow::Result<()> {
        let (verifier, _) = setup().await?;
        let password_identity = verifier
            .verify_password("alice@example.com", "correct horse")
            .await?;
        let claims = ProviderClaims {
            provider: Provider::Google,
            claims: json!({
                "sub": "g-1",
                "aud": "client-123",
                "iss": "accounts.google.com",
                "email": "alice@example.com",
                "email_verified": true,
            }),
        };
        let identity = verifier.verify_provider_claims(&claims).await?;
        assert_eq!(identity.subject, password_identity.subject);
        assert_eq!(identity.provider, Provider::Google);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_provider_claims_are_rejected() -> anyhow::Result<()> {
        let (verifier, _) = setup().await?;
        let claims = ProviderClaims {
            provider: Provider::Google,
            claims: json!({
                "sub": "g-1",
                "aud": "wrong-client",
                "iss": "accounts.google.com",
                "email": "alice@example.com",
                "email_verified": true,
            }),
        };
        let result = verifier.verify_provider_claims(&claims).await;
        assert!(matches!(result, Err(AuthError::InvalidProvider)));
        Ok(())
    }
}
