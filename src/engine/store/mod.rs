//! Refresh-token persistence.
//!
//! The store is the only component allowed to change a token's status. Every
//! transition is a compare-and-swap on the current status, so concurrent
//! rotations of the same record resolve to exactly one winner.

mod memory;
mod postgres;

pub use memory::InMemoryRefreshTokenStore;
pub use postgres::PgRefreshTokenStore;

use crate::engine::model::{RefreshTokenRecord, SubjectId, TokenStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new record. Fails if the hash already exists or the family
    /// would end up with two active tokens.
    async fn insert(&self, record: RefreshTokenRecord) -> Result<()>;

    async fn find_by_hash(&self, token_hash: &[u8]) -> Result<Option<RefreshTokenRecord>>;

    /// Move a record from `expected` to `next`. Returns `false` when the
    /// record is missing or no longer in `expected`.
    async fn compare_and_set_status(
        &self,
        token_hash: &[u8],
        expected: TokenStatus,
        next: TokenStatus,
    ) -> Result<bool>;

    /// Atomically flip the record from `active` to `rotated` and insert
    /// `successor`. Returns `false`, with nothing written, when the record is
    /// no longer active.
    async fn rotate(&self, token_hash: &[u8], successor: RefreshTokenRecord) -> Result<bool>;

    /// Mark every non-revoked member of the family `revoked`; returns how many changed.
    async fn revoke_family(&self, family_id: Uuid) -> Result<u64>;

    /// Mark every non-revoked token of the subject `revoked`; returns how many changed.
    async fn revoke_subject(&self, subject: &SubjectId) -> Result<u64>;

    /// Delete whole families whose newest member expired before `before`;
    /// returns how many records were removed. Rotated members of a family
    /// with a live descendant are kept so replaying them is still detected.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64>;
}
