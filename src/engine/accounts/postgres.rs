use super::AccountDirectory;
use crate::engine::{
    model::{CredentialRecord, HashVersion, Identity, SubjectId},
    provider::ProviderSubject,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;

#[derive(Clone, Debug)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn find_credential(&self, email: &str) -> Result<Option<CredentialRecord>> {
        let query = r"
            SELECT a.subject_id, a.email, c.password_hash, c.hash_version
            FROM accounts a
            JOIN credentials c ON c.subject_id = a.subject_id
            WHERE a.email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup credential")?;

        Ok(row.map(|row| CredentialRecord {
            subject: SubjectId::new(row.get::<String, _>("subject_id")),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            hash_version: HashVersion(row.get("hash_version")),
        }))
    }

    async fn update_password_hash(
        &self,
        subject: &SubjectId,
        password_hash: &str,
        version: HashVersion,
    ) -> Result<()> {
        let query = r"
            UPDATE credentials
            SET password_hash = $2, hash_version = $3, updated_at = NOW()
            WHERE subject_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(subject.as_str())
            .bind(password_hash)
            .bind(version.0)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("no password credential for subject {subject}"));
        }
        Ok(())
    }

    async fn link_provider(&self, provider_subject: &ProviderSubject) -> Result<Identity> {
        let mut tx = self.pool.begin().await.context("begin link transaction")?;

        // Concurrent first sign-ins race on the inserts; ON CONFLICT plus the
        // re-reads below make every caller converge on the same subject.
        let link_exists = {
            let lookup = r"
                SELECT 1 FROM provider_links WHERE provider = $1 AND provider_subject = $2
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = lookup
            );
            sqlx::query(lookup)
                .bind(provider_subject.provider.as_str())
                .bind(&provider_subject.subject)
                .fetch_optional(&mut *tx)
                .instrument(span)
                .await
                .context("failed to lookup provider link")?
                .is_some()
        };

        if !link_exists {
            let create_account = r"
                INSERT INTO accounts (subject_id, email, display_name)
                VALUES ($1, $2, $3)
                ON CONFLICT (email) DO NOTHING
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = create_account
            );
            sqlx::query(create_account)
                .bind(SubjectId::generate().as_str())
                .bind(&provider_subject.email)
                .bind(provider_subject.display_name.as_deref())
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to create account")?;

            let insert_link = r"
                INSERT INTO provider_links (provider, provider_subject, subject_id)
                SELECT $1, $2, subject_id FROM accounts WHERE email = $3
                ON CONFLICT (provider, provider_subject) DO NOTHING
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = insert_link
            );
            sqlx::query(insert_link)
                .bind(provider_subject.provider.as_str())
                .bind(&provider_subject.subject)
                .bind(&provider_subject.email)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to link provider")?;
        }

        let resolve = r"
            SELECT a.subject_id, a.email
            FROM provider_links l
            JOIN accounts a ON a.subject_id = l.subject_id
            WHERE l.provider = $1 AND l.provider_subject = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = resolve
        );
        let row = sqlx::query(resolve)
            .bind(provider_subject.provider.as_str())
            .bind(&provider_subject.subject)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to resolve linked account")?;

        tx.commit().await.context("commit link transaction")?;

        Ok(Identity {
            subject: SubjectId::new(row.get::<String, _>("subject_id")),
            email: row.get("email"),
            provider: provider_subject.provider,
        })
    }
}
