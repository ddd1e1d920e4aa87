//! Postgres record store
//!
//! Atomicity comes from conditional `UPDATE ... WHERE revoked = FALSE` (or
//! `consumed = FALSE`) statements; `rows_affected` tells the caller whether it won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{PasswordResetRepository, RefreshTokenRepository, StoreError};
use crate::models::{PasswordResetRecord, RefreshTokenRecord};

#[derive(Clone)]
pub struct PgRefreshTokenRepository {
    db_pool: PgPool,
}

impl PgRefreshTokenRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

const INSERT_REFRESH_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (id, token_hash, subject_id, client_addr, user_agent,
                                created_at, expires_at, revoked, revoked_at, replaced_by)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

fn bind_refresh_insert<'q>(
    record: &'q RefreshTokenRecord,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(INSERT_REFRESH_TOKEN)
        .bind(record.id)
        .bind(&record.token_hash)
        .bind(record.subject_id)
        .bind(&record.client_addr)
        .bind(&record.user_agent)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.revoked_at)
        .bind(record.replaced_by)
}

#[async_trait]
impl RefreshTokenRepository for PgRefreshTokenRepository {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        bind_refresh_insert(record).execute(&self.db_pool).await?;
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as(
            r#"
            SELECT id, token_hash, subject_id, client_addr, user_agent,
                   created_at, expires_at, revoked, revoked_at, replaced_by
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(record)
    }

    async fn rotate(
        &self,
        parent_id: Uuid,
        successor: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.db_pool.begin().await?;

        // Successor first so the replaced_by foreign key resolves
        bind_refresh_insert(successor).execute(&mut *tx).await?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = $2, replaced_by = $3
            WHERE id = $1 AND revoked = FALSE AND expires_at > $2
            "#,
        )
        .bind(parent_id)
        .bind(now)
        .bind(successor.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = $2
            WHERE token_hash = $1 AND revoked = FALSE AND expires_at > $2
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn revoke_chain(&self, from_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            WITH RECURSIVE chain AS (
                SELECT id, replaced_by FROM refresh_tokens WHERE id = $1
                UNION
                SELECT r.id, r.replaced_by
                FROM refresh_tokens r
                JOIN chain c ON r.id = c.replaced_by
            )
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = $2
            WHERE id IN (SELECT id FROM chain) AND revoked = FALSE
            "#,
        )
        .bind(from_id)
        .bind(now)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }

    async fn revoke_all_for_subject(
        &self,
        subject_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = $2
            WHERE subject_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(subject_id)
        .bind(now)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }

    async fn purge(
        &self,
        expired_before: DateTime<Utc>,
        revoked_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        // Break successor links into the doomed rows before deleting them
        let mut tx = self.db_pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET replaced_by = NULL
            WHERE replaced_by IN (
                SELECT id FROM refresh_tokens
                WHERE expires_at < $1 OR revoked_at < $2
            )
            "#,
        )
        .bind(expired_before)
        .bind(revoked_before)
        .execute(&mut *tx)
        .await?;

        let rows_affected = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE expires_at < $1 OR revoked_at < $2
            "#,
        )
        .bind(expired_before)
        .bind(revoked_before)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(rows_affected)
    }
}

#[derive(Clone)]
pub struct PgPasswordResetRepository {
    db_pool: PgPool,
}

impl PgPasswordResetRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PasswordResetRepository for PgPasswordResetRepository {
    async fn insert(&self, record: &PasswordResetRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO password_resets (id, code_hash, subject_id, created_at, expires_at,
                                         consumed, consumed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.code_hash)
        .bind(record.subject_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.consumed)
        .bind(record.consumed_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn find_by_hash(
        &self,
        code_hash: &str,
    ) -> Result<Option<PasswordResetRecord>, StoreError> {
        let record = sqlx::query_as(
            r#"
            SELECT id, code_hash, subject_id, created_at, expires_at, consumed, consumed_at
            FROM password_resets
            WHERE code_hash = $1
            "#,
        )
        .bind(code_hash)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(record)
    }

    async fn mark_consumed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE password_resets
            SET consumed = TRUE, consumed_at = $2
            WHERE id = $1 AND consumed = FALSE AND expires_at > $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn release(&self, id: Uuid) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE password_resets
            SET consumed = FALSE, consumed_at = NULL
            WHERE id = $1 AND consumed = TRUE
            "#,
        )
        .bind(id)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn consume_all_for_subject(
        &self,
        subject_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE password_resets
            SET consumed = TRUE, consumed_at = $2
            WHERE subject_id = $1 AND consumed = FALSE
            "#,
        )
        .bind(subject_id)
        .bind(now)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }

    async fn purge(&self, expired_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM password_resets
            WHERE expires_at < $1
            "#,
        )
        .bind(expired_before)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }
}
