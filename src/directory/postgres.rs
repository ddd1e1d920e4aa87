use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{DirectoryError, NewUser, UserAccount, UserDirectory};

/// Directory backed by the `users` table
#[derive(Clone)]
pub struct PgUserDirectory {
    db_pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError> {
        let account = sqlx::query_as(
            r#"
            SELECT id, username, email_address, first_name, last_name, phone_number,
                   password_hash, roles, created_at, updated_at
            FROM users
            WHERE LOWER(username) = LOWER($1)
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, DirectoryError> {
        let account = sqlx::query_as(
            r#"
            SELECT id, username, email_address, first_name, last_name, phone_number,
                   password_hash, roles, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(account)
    }

    async fn update_password(&self, id: Uuid, new_hash: &str) -> Result<(), DirectoryError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(new_hash)
        .bind(id)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(DirectoryError::NotFound);
        }

        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<Uuid, DirectoryError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        // Unique index on LOWER(username) turns duplicates into UsernameTaken
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email_address, first_name, last_name, phone_number,
                               password_hash, roles, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(&user.username)
        .bind(&user.email_address)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(&user.password_hash)
        .bind(&user.roles)
        .bind(now)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        Ok(id)
    }
}
