//! Token pair minting and refresh-token rotation.
//!
//! Per family there is at most one `active` token. Rotation flips it to
//! `rotated` and inserts the successor in one compare-and-swap; presenting any
//! non-active member of a family is treated as theft and revokes the family.

use crate::engine::{
    error::AuthError,
    model::{Identity, IssuedRefreshToken, RefreshTokenRecord, SubjectId, TokenPair, TokenStatus},
    secret::{generate_refresh_value, hash_refresh_value},
    signer::{AccessClaims, TokenSigner},
    store::RefreshTokenStore,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of an explicit logout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RevokedFamily {
    pub family_id: Uuid,
    pub revoked: u64,
}

pub struct TokenIssuer {
    signer: Arc<TokenSigner>,
    store: Arc<dyn RefreshTokenStore>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        signer: Arc<TokenSigner>,
        store: Arc<dyn RefreshTokenStore>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            signer,
            store,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Start a new family for `identity` and return its first token pair.
    ///
    /// # Errors
    /// [`AuthError::Storage`] if the record cannot be persisted.
    #[instrument(skip_all, fields(subject = %identity.subject))]
    pub async fn issue(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let family_id = Uuid::new_v4();
        let (value, record) = self.new_record(identity.clone(), family_id, now)?;
        let access = self.signer.sign(identity, self.access_ttl)?;
        let expires_at = record.expires_at;

        self.store.insert(record).await?;
        info!(family_id = %family_id, "issued refresh token family");

        Ok(TokenPair {
            identity: identity.clone(),
            access,
            refresh: IssuedRefreshToken {
                value: SecretString::from(value),
                family_id,
                expires_at,
            },
        })
    }

    /// Exchange a refresh token for a new pair. The presented token can be
    /// used at most once.
    ///
    /// # Errors
    /// [`AuthError::TokenUnknown`] for values never issued (or purged),
    /// [`AuthError::TokenExpired`] for an expired active token,
    /// [`AuthError::ReuseDetected`] for rotated or revoked tokens and for the
    /// loser of a concurrent rotation; the family is revoked before returning.
    #[instrument(skip_all)]
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, AuthError> {
        let token_hash = hash_refresh_value(presented);
        let Some(record) = self.store.find_by_hash(&token_hash).await? else {
            return Err(AuthError::TokenUnknown);
        };
        let now = Utc::now();

        match record.status {
            TokenStatus::Revoked | TokenStatus::Rotated => {
                return Err(self.reuse_detected(&record).await);
            }
            TokenStatus::Active if record.is_expired_at(now) => {
                self.store
                    .compare_and_set_status(&token_hash, TokenStatus::Active, TokenStatus::Revoked)
                    .await?;
                info!(family_id = %record.family_id, "refresh token expired");
                return Err(AuthError::TokenExpired);
            }
            TokenStatus::Active => {}
        }

        let identity = record.identity.clone();
        let (value, successor) = self.new_record(identity.clone(), record.family_id, now)?;
        let expires_at = successor.expires_at;
        let access = self.signer.sign(&identity, self.access_ttl)?;

        if !self.store.rotate(&token_hash, successor).await? {
            // Someone else rotated (or revoked) this token between our read and write.
            return Err(self.reuse_detected(&record).await);
        }

        Ok(TokenPair {
            identity,
            access,
            refresh: IssuedRefreshToken {
                value: SecretString::from(value),
                family_id: record.family_id,
                expires_at,
            },
        })
    }

    /// Explicit logout: revoke every live member of the presented token's family.
    ///
    /// # Errors
    /// [`AuthError::TokenUnknown`] if the value was never issued or its family
    /// is already revoked; nothing changes in that case.
    #[instrument(skip_all)]
    pub async fn revoke(&self, presented: &str) -> Result<RevokedFamily, AuthError> {
        let token_hash = hash_refresh_value(presented);
        let record = self
            .store
            .find_by_hash(&token_hash)
            .await?
            .filter(|record| record.status != TokenStatus::Revoked)
            .ok_or(AuthError::TokenUnknown)?;

        let revoked = self.store.revoke_family(record.family_id).await?;
        info!(family_id = %record.family_id, revoked, "refresh token family revoked on logout");
        Ok(RevokedFamily {
            family_id: record.family_id,
            revoked,
        })
    }

    /// Administrative revocation of every refresh token a subject holds.
    ///
    /// # Errors
    /// [`AuthError::Storage`] if the store fails.
    #[instrument(skip_all, fields(subject = %subject))]
    pub async fn revoke_subject(&self, subject: &SubjectId) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_subject(subject).await?;
        info!(revoked, "revoked refresh tokens for subject");
        Ok(revoked)
    }

    /// # Errors
    /// [`AuthError::TokenInvalid`] for any verification failure.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.signer.verify(token)
    }

    fn new_record(
        &self,
        identity: Identity,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(String, RefreshTokenRecord), AuthError> {
        let ttl = ChronoDuration::from_std(self.refresh_ttl)
            .map_err(|_| AuthError::Internal("refresh token ttl out of range".to_string()))?;
        let value = generate_refresh_value().map_err(|err| AuthError::Internal(format!("{err:#}")))?;
        let record = RefreshTokenRecord {
            token_id: Uuid::new_v4(),
            token_hash: hash_refresh_value(&value),
            family_id,
            identity,
            status: TokenStatus::Active,
            issued_at: now,
            expires_at: now + ttl,
        };
        Ok((value, record))
    }

    /// Revoke the whole family and build the error to surface. Revocation
    /// happens before the caller sees the failure.
    async fn reuse_detected(&self, record: &RefreshTokenRecord) -> AuthError {
        let family_id = record.family_id;
        warn!(
            family_id = %family_id,
            subject = %record.identity.subject,
            status = record.status.as_str(),
            "refresh token reuse detected, revoking family"
        );
        match self.store.revoke_family(family_id).await {
            Ok(_) => AuthError::ReuseDetected { family_id },
            Err(err) => AuthError::Storage(err.context("failed to revoke family after reuse")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        model::Provider,
        signer::test_signer,
        store::InMemoryRefreshTokenStore,
    };
    use secrecy::ExposeSecret;

    fn identity() -> Identity {
        Identity {
            subject: SubjectId::new("subject-1"),
            email: "alice@example.com".to_string(),
            provider: Provider::Password,
        }
    }

    fn issuer_with(store: Arc<InMemoryRefreshTokenStore>, refresh_ttl: Duration) -> TokenIssuer {
        TokenIssuer::new(
            Arc::new(test_signer("k1", "issuer-secret")),
            store,
            Duration::from_secs(900),
            refresh_ttl,
        )
    }

    fn issuer() -> (TokenIssuer, Arc<InMemoryRefreshTokenStore>) {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        (
            issuer_with(store.clone(), Duration::from_secs(30 * 24 * 3600)),
            store,
        )
    }

    async fn status_of(store: &InMemoryRefreshTokenStore, value: &str) -> anyhow::Result<Option<TokenStatus>> {
        Ok(store
            .find_by_hash(&hash_refresh_value(value))
            .await?
            .map(|record| record.status))
    }

    #[tokio::test]
    async fn issue_persists_only_the_hash() -> anyhow::Result<()> {
        let (issuer, store) = issuer();
        let pair = issuer.issue(&identity()).await?;
        let value = pair.refresh.value.expose_secret();

        let record = store
            .find_by_hash(&hash_refresh_value(value))
            .await?
            .ok_or_else(|| anyhow::anyhow!("record missing"))?;
        assert_eq!(record.status, TokenStatus::Active);
        assert_eq!(record.family_id, pair.refresh.family_id);
        assert_ne!(record.token_hash, value.as_bytes());
        assert_eq!(pair.access.expires_in_seconds, 900);

        let claims = issuer.verify_access(&pair.access.token)?;
        assert_eq!(claims.sub, "subject-1");
        Ok(())
    }

    #[tokio::test]
    async fn rotate_is_single_use() -> anyhow::Result<()> {
        let (issuer, store) = issuer();
        let first = issuer.issue(&identity()).await?;
        let t1 = first.refresh.value.expose_secret().to_string();

        let second = issuer.rotate(&t1).await?;
        let t2 = second.refresh.value.expose_secret().to_string();
        assert_eq!(second.refresh.family_id, first.refresh.family_id);
        assert_eq!(status_of(&store, &t1).await?, Some(TokenStatus::Rotated));
        assert_eq!(status_of(&store, &t2).await?, Some(TokenStatus::Active));

        let replay = issuer.rotate(&t1).await;
        assert!(matches!(replay, Err(AuthError::ReuseDetected { family_id }) if family_id == first.refresh.family_id));

        let successor = issuer.rotate(&t2).await;
        assert!(matches!(successor, Err(AuthError::ReuseDetected { .. })));
        assert_eq!(status_of(&store, &t1).await?, Some(TokenStatus::Revoked));
        assert_eq!(status_of(&store, &t2).await?, Some(TokenStatus::Revoked));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_value_is_token_unknown() -> anyhow::Result<()> {
        let (issuer, _) = issuer();
        assert!(matches!(
            issuer.rotate("never-issued").await,
            Err(AuthError::TokenUnknown)
        ));
        assert!(matches!(
            issuer.revoke("never-issued").await,
            Err(AuthError::TokenUnknown)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_is_rejected_and_revoked() -> anyhow::Result<()> {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let issuer = issuer_with(store.clone(), Duration::ZERO);
        let pair = issuer.issue(&identity()).await?;
        let value = pair.refresh.value.expose_secret().to_string();

        assert!(matches!(issuer.rotate(&value).await, Err(AuthError::TokenExpired)));
        assert_eq!(status_of(&store, &value).await?, Some(TokenStatus::Revoked));
        Ok(())
    }

    #[tokio::test]
    async fn logout_revokes_family_once() -> anyhow::Result<()> {
        let (issuer, store) = issuer();
        let first = issuer.issue(&identity()).await?;
        let t1 = first.refresh.value.expose_secret().to_string();
        let second = issuer.rotate(&t1).await?;
        let t2 = second.refresh.value.expose_secret().to_string();

        let revoked = issuer.revoke(&t2).await?;
        assert_eq!(revoked.family_id, first.refresh.family_id);
        assert_eq!(revoked.revoked, 2);
        assert_eq!(status_of(&store, &t1).await?, Some(TokenStatus::Revoked));

        let again = issuer.revoke(&t2).await;
        assert!(matches!(again, Err(AuthError::TokenUnknown)));
        let third = issuer.revoke(&t2).await;
        assert!(matches!(third, Err(AuthError::TokenUnknown)));
        Ok(())
    }

    #[tokio::test]
    async fn revoke_subject_kills_every_family() -> anyhow::Result<()> {
        let (issuer, _) = issuer();
        let a = issuer.issue(&identity()).await?;
        let b = issuer.issue(&identity()).await?;
        assert_eq!(issuer.revoke_subject(&identity().subject).await?, 2);
        for pair in [a, b] {
            let result = issuer.rotate(pair.refresh.value.expose_secret()).await;
            assert!(matches!(result, Err(AuthError::ReuseDetected { .. })));
        }
        Ok(())
    }

    #[tokio::test]
    async fn families_are_independent() -> anyhow::Result<()> {
        let (issuer, _) = issuer();
        let a = issuer.issue(&identity()).await?;
        let b = issuer.issue(&identity()).await?;
        let a1 = a.refresh.value.expose_secret().to_string();
        issuer.rotate(&a1).await?;
        assert!(issuer.rotate(&a1).await.is_err());

        issuer.rotate(b.refresh.value.expose_secret()).await?;
        Ok(())
    }
}
