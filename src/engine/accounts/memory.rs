use super::AccountDirectory;
use crate::engine::{
    model::{CredentialRecord, HashVersion, Identity, Provider, SubjectId},
    provider::ProviderSubject,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Directory {
    emails: HashMap<SubjectId, String>,
    subjects_by_email: HashMap<String, SubjectId>,
    credentials: HashMap<SubjectId, (String, HashVersion)>,
    links: HashMap<(Provider, String), SubjectId>,
}

impl Directory {
    fn ensure_account(&mut self, email: &str) -> SubjectId {
        if let Some(subject) = self.subjects_by_email.get(email) {
            return subject.clone();
        }
        let subject = SubjectId::generate();
        self.emails.insert(subject.clone(), email.to_string());
        self.subjects_by_email
            .insert(email.to_string(), subject.clone());
        subject
    }
}

/// Account directory for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    inner: Mutex<Directory>,
}

impl InMemoryAccounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a password credential. `email` must already be normalized.
    ///
    /// # Errors
    /// Fails if the account already has a password credential.
    pub async fn register_password(
        &self,
        email: &str,
        password_hash: String,
        version: HashVersion,
    ) -> Result<SubjectId> {
        let mut directory = self.inner.lock().await;
        let subject = directory.ensure_account(email);
        if directory.credentials.contains_key(&subject) {
            bail!("account {email} already has a password");
        }
        directory
            .credentials
            .insert(subject.clone(), (password_hash, version));
        Ok(subject)
    }

    pub async fn stored_hash(&self, subject: &SubjectId) -> Option<(String, HashVersion)> {
        self.inner.lock().await.credentials.get(subject).cloned()
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccounts {
    async fn find_credential(&self, email: &str) -> Result<Option<CredentialRecord>> {
        let directory = self.inner.lock().await;
        let Some(subject) = directory.subjects_by_email.get(email) else {
            return Ok(None);
        };
        Ok(directory
            .credentials
            .get(subject)
            .map(|(password_hash, version)| CredentialRecord {
                subject: subject.clone(),
                email: email.to_string(),
                password_hash: password_hash.clone(),
                hash_version: *version,
            }))
    }

    async fn update_password_hash(
        &self,
        subject: &SubjectId,
        password_hash: &str,
        version: HashVersion,
    ) -> Result<()> {
        let mut directory = self.inner.lock().await;
        match directory.credentials.get_mut(subject) {
            Some(entry) => {
                *entry = (password_hash.to_string(), version);
                Ok(())
            }
            None => bail!("no password credential for subject {subject}"),
        }
    }

    async fn link_provider(&self, provider_subject: &ProviderSubject) -> Result<Identity> {
        let mut directory = self.inner.lock().await;
        let link = (provider_subject.provider, provider_subject.subject.clone());

        let subject = match directory.links.get(&link) {
            Some(subject) => subject.clone(),
            None => {
                let subject = directory.ensure_account(&provider_subject.email);
                directory.links.insert(link, subject.clone());
                subject
            }
        };
        let email = directory
            .emails
            .get(&subject)
            .cloned()
            .unwrap_or_else(|| provider_subject.email.clone());

        Ok(Identity {
            subject,
            email,
            provider: provider_subject.provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google(subject: &str, email: &str) -> ProviderSubject {
        ProviderSubject {
            provider: Provider::Google,
            subject: subject.to_string(),
            email: email.to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn register_then_find_credential() -> Result<()> {
        let accounts = InMemoryAccounts::new();
        let subject = accounts
            .register_password("alice@example.com", "digest".to_string(), HashVersion::ARGON2ID_V1)
            .await?;
        let record = accounts.find_credential("alice@example.com").await?;
        let record = record.ok_or_else(|| anyhow::anyhow!("missing credential"))?;
        assert_eq!(record.subject, subject);
        assert_eq!(record.password_hash, "digest");
        assert!(accounts.find_credential("bob@example.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_password_registration_fails() -> Result<()> {
        let accounts = InMemoryAccounts::new();
        accounts
            .register_password("alice@example.com", "a".to_string(), HashVersion::ARGON2ID_V1)
            .await?;
        let second = accounts
            .register_password("alice@example.com", "b".to_string(), HashVersion::ARGON2ID_V1)
            .await;
        assert!(second.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn update_password_hash_replaces_digest() -> Result<()> {
        let accounts = InMemoryAccounts::new();
        let subject = accounts
            .register_password("alice@example.com", "old".to_string(), HashVersion(0))
            .await?;
        accounts
            .update_password_hash(&subject, "new", HashVersion::ARGON2ID_V1)
            .await?;
        assert_eq!(
            accounts.stored_hash(&subject).await,
            Some(("new".to_string(), HashVersion::ARGON2ID_V1))
        );
        assert!(accounts
            .update_password_hash(&SubjectId::new("ghost"), "x", HashVersion::ARGON2ID_V1)
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn provider_link_reuses_existing_account_by_email() -> Result<()> {
        let accounts = InMemoryAccounts::new();
        let subject = accounts
            .register_password("alice@example.com", "digest".to_string(), HashVersion::ARGON2ID_V1)
            .await?;
        let identity = accounts
            .link_provider(&google("g-1", "alice@example.com"))
            .await?;
        assert_eq!(identity.subject, subject);
        assert_eq!(identity.provider, Provider::Google);
        Ok(())
    }

    #[tokio::test]
    async fn existing_link_wins_over_email() -> Result<()> {
        let accounts = InMemoryAccounts::new();
        let first = accounts.link_provider(&google("g-1", "alice@example.com")).await?;
        let again = accounts.link_provider(&google("g-1", "changed@example.com")).await?;
        assert_eq!(first.subject, again.subject);
        assert_eq!(again.email, "alice@example.com");

        let other = accounts.link_provider(&google("g-2", "bob@example.com")).await?;
        assert_ne!(other.subject, first.subject);
        Ok(())
    }
}
