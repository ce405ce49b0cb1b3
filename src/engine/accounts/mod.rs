//! Account lookups the engine needs from the surrounding account system.

mod memory;
mod postgres;

pub use memory::InMemoryAccounts;
pub use postgres::PgAccountDirectory;

use crate::engine::{
    model::{CredentialRecord, HashVersion, Identity, SubjectId},
    provider::ProviderSubject,
};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Password credential for an already-normalized email.
    async fn find_credential(&self, email: &str) -> Result<Option<CredentialRecord>>;

    async fn update_password_hash(
        &self,
        subject: &SubjectId,
        password_hash: &str,
        version: HashVersion,
    ) -> Result<()>;

    /// Resolve a provider subject to an internal identity.
    ///
    /// An existing `(provider, subject)` link wins; otherwise the account with
    /// the same email is linked; otherwise a new account is created.
    async fn link_provider(&self, subject: &ProviderSubject) -> Result<Identity>;
}
