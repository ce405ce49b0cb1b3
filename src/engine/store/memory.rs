use super::RefreshTokenStore;
use crate::engine::model::{RefreshTokenRecord, SubjectId, TokenStatus};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Process-local store. A single lock guards every record, which makes each
/// operation linearizable.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<Records>,
}

#[derive(Debug, Default)]
struct Records {
    by_hash: HashMap<Vec<u8>, RefreshTokenRecord>,
    // Family id to the hash of its one active record.
    active: HashMap<Uuid, Vec<u8>>,
}

impl Records {
    fn ensure_insertable(&self, record: &RefreshTokenRecord) -> Result<()> {
        if self.by_hash.contains_key(&record.token_hash) {
            return Err(anyhow!("refresh token hash already stored"));
        }
        if record.status == TokenStatus::Active && self.active.contains_key(&record.family_id) {
            return Err(anyhow!(
                "family {} already has an active refresh token",
                record.family_id
            ));
        }
        Ok(())
    }

    fn insert(&mut self, record: RefreshTokenRecord) {
        if record.status == TokenStatus::Active {
            self.active
                .insert(record.family_id, record.token_hash.clone());
        }
        self.by_hash.insert(record.token_hash.clone(), record);
    }

    /// Move one record to `next`, keeping the active index in step.
    fn set_status(&mut self, token_hash: &[u8], next: TokenStatus) -> Result<()> {
        let Some(record) = self.by_hash.get(token_hash) else {
            return Ok(());
        };
        let family_id = record.family_id;
        if next == TokenStatus::Active {
            let taken = self
                .active
                .get(&family_id)
                .is_some_and(|active| active.as_slice() != token_hash);
            if taken {
                return Err(anyhow!(
                    "family {family_id} already has an active refresh token"
                ));
            }
            self.active.insert(family_id, token_hash.to_vec());
        } else if self
            .active
            .get(&family_id)
            .is_some_and(|active| active.as_slice() == token_hash)
        {
            self.active.remove(&family_id);
        }
        if let Some(record) = self.by_hash.get_mut(token_hash) {
            record.status = next;
        }
        Ok(())
    }

    /// Revoke every record matching `filter`; returns how many changed.
    fn revoke_where(&mut self, filter: impl Fn(&RefreshTokenRecord) -> bool) -> u64 {
        let mut changed = 0;
        for record in self.by_hash.values_mut() {
            if filter(record) && record.status != TokenStatus::Revoked {
                if record.status == TokenStatus::Active {
                    self.active.remove(&record.family_id);
                }
                record.status = TokenStatus::Revoked;
                changed += 1;
            }
        }
        changed
    }
}

impl InMemoryRefreshTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.by_hash.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.by_hash.is_empty()
    }

    /// Number of families that still hold an active record.
    pub async fn active_families(&self) -> usize {
        self.records.lock().await.active.len()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        records.ensure_insertable(&record)?;
        records.insert(record);
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &[u8]) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.records.lock().await.by_hash.get(token_hash).cloned())
    }

    async fn compare_and_set_status(
        &self,
        token_hash: &[u8],
        expected: TokenStatus,
        next: TokenStatus,
    ) -> Result<bool> {
        let mut records = self.records.lock().await;
        let current = records.by_hash.get(token_hash).map(|record| record.status);
        if current != Some(expected) {
            return Ok(false);
        }
        records.set_status(token_hash, next)?;
        Ok(true)
    }

    async fn rotate(&self, token_hash: &[u8], successor: RefreshTokenRecord) -> Result<bool> {
        let mut records = self.records.lock().await;
        let family_id = match records.by_hash.get(token_hash) {
            Some(record) if record.status == TokenStatus::Active => record.family_id,
            _ => return Ok(false),
        };
        if successor.family_id != family_id {
            return Err(anyhow!("successor must stay in family {family_id}"));
        }
        if records.by_hash.contains_key(&successor.token_hash) {
            return Err(anyhow!("refresh token hash already stored"));
        }
        records.set_status(token_hash, TokenStatus::Rotated)?;
        records.insert(successor);
        Ok(true)
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64> {
        let mut records = self.records.lock().await;
        Ok(records.revoke_where(|record| record.family_id == family_id))
    }

    async fn revoke_subject(&self, subject: &SubjectId) -> Result<u64> {
        let mut records = self.records.lock().await;
        Ok(records.revoke_where(|record| &record.identity.subject == subject))
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().await;
        let mut newest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for record in records.by_hash.values() {
            let entry = newest.entry(record.family_id).or_insert(record.expires_at);
            *entry = (*entry).max(record.expires_at);
        }
        let stale: HashSet<Uuid> = newest
            .into_iter()
            .filter(|(_, expires_at)| *expires_at < before)
            .map(|(family_id, _)| family_id)
            .collect();

        let initial = records.by_hash.len();
        records
            .by_hash
            .retain(|_, record| !stale.contains(&record.family_id));
        records
            .active
            .retain(|family_id, _| !stale.contains(family_id));
        Ok((initial - records.by_hash.len()) as u64)
    }
}
