use super::RefreshTokenStore;
use crate::engine::model::{Identity, Provider, RefreshTokenRecord, SubjectId, TokenStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "token_hash, token_id, family_id, subject_id, email, provider, status, issued_at, expires_at";

/// `refresh_tokens` table access. Status changes are conditional updates; the
/// partial unique index on `family_id WHERE status = 'active'` backs the
/// one-active-per-family rule.
#[derive(Clone, Debug)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<RefreshTokenRecord> {
    let provider: String = row.try_get("provider")?;
    let status: String = row.try_get("status")?;
    Ok(RefreshTokenRecord {
        token_id: row.try_get("token_id")?,
        token_hash: row.try_get("token_hash")?,
        family_id: row.try_get("family_id")?,
        identity: Identity {
            subject: SubjectId::new(row.try_get::<String, _>("subject_id")?),
            email: row.try_get("email")?,
            provider: Provider::parse(&provider)
                .ok_or_else(|| anyhow!("unknown provider {provider} in refresh_tokens"))?,
        },
        status: TokenStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown status {status} in refresh_tokens"))?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

async fn insert_record<'e, E>(executor: E, record: &RefreshTokenRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = r"
        INSERT INTO refresh_tokens
            (token_hash, token_id, family_id, subject_id, email, provider, status, issued_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&record.token_hash)
        .bind(record.token_id)
        .bind(record.family_id)
        .bind(record.identity.subject.as_str())
        .bind(&record.identity.email)
        .bind(record.identity.provider.as_str())
        .bind(record.status.as_str())
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to insert refresh token")?;
    Ok(())
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<()> {
        insert_record(&self.pool, &record).await
    }

    async fn find_by_hash(&self, token_hash: &[u8]) -> Result<Option<RefreshTokenRecord>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM refresh_tokens WHERE token_hash = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup refresh token")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn compare_and_set_status(
        &self,
        token_hash: &[u8],
        expected: TokenStatus,
        next: TokenStatus,
    ) -> Result<bool> {
        let query = "UPDATE refresh_tokens SET status = $3 WHERE token_hash = $1 AND status = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(expected.as_str())
            .bind(next.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update refresh token status")?;
        Ok(result.rows_affected() == 1)
    }

    async fn rotate(&self, token_hash: &[u8], successor: RefreshTokenRecord) -> Result<bool> {
        // The conditional update and the successor insert commit together or not at all.
        let mut tx = self.pool.begin().await.context("begin rotate transaction")?;

        let query = r"
            UPDATE refresh_tokens
            SET status = 'rotated'
            WHERE token_hash = $1 AND status = 'active' AND family_id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(successor.family_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to mark refresh token rotated")?;

        if result.rows_affected() != 1 {
            tx.rollback().await.context("rollback rotate transaction")?;
            return Ok(false);
        }

        insert_record(&mut *tx, &successor).await?;
        tx.commit().await.context("commit rotate transaction")?;
        Ok(true)
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64> {
        let query =
            "UPDATE refresh_tokens SET status = 'revoked' WHERE family_id = $1 AND status <> 'revoked'";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(family_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token family")?;
        Ok(result.rows_affected())
    }

    async fn revoke_subject(&self, subject: &SubjectId) -> Result<u64> {
        let query =
            "UPDATE refresh_tokens SET status = 'revoked' WHERE subject_id = $1 AND status <> 'revoked'";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(subject.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh tokens for subject")?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM refresh_tokens WHERE family_id IN \
             (SELECT family_id FROM refresh_tokens GROUP BY family_id HAVING MAX(expires_at) < $1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(before)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired refresh tokens")?;
        Ok(result.rows_affected())
    }
}
