use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::repo_types::{NewUser, ProfileChanges, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint (email or username) rejected the write.
    #[error("unique constraint violated")]
    Conflict,
    /// A value exceeded its column width.
    #[error("value too long for column")]
    TooLong,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Persistence for user records, keyed by email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// First record whose email or username matches.
    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Inserts unless the email or username is taken, in which case `Conflict`.
    async fn create(&self, new_user: NewUser<'_>) -> Result<User, StoreError>;

    async fn touch_last_login(&self, email: &str, at: OffsetDateTime) -> Result<bool, StoreError>;

    /// Applies every `Some` field and `updated_at` in one write.
    async fn update_profile(
        &self,
        email: &str,
        changes: &ProfileChanges,
        at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;

    async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, email: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<User>, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
        // string_data_right_truncation
        sqlx::Error::Database(db) if db.code().as_deref() == Some("22001") => StoreError::TooLong,
        _ => StoreError::Db(err),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT email, username, password_hash, role, status, avatar_url, bio,
                   birth_date, country, email_verified, last_login, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT email, username, password_hash, role, status, avatar_url, bio,
                   birth_date, country, email_verified, last_login, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT email, username, password_hash, role, status, avatar_url, bio,
                   birth_date, country, email_verified, last_login, created_at, updated_at
            FROM users
            WHERE email = $1 OR username = $2
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser<'_>) -> Result<User, StoreError> {
        // ON CONFLICT without a target covers both the primary key and the username index.
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT DO NOTHING
            RETURNING email, username, password_hash, role, status, avatar_url, bio,
                      birth_date, country, email_verified, last_login, created_at, updated_at
            "#,
        )
        .bind(new_user.email)
        .bind(new_user.username)
        .bind(new_user.password_hash)
        .bind(new_user.created_at)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_err)?;
        user.ok_or(StoreError::Conflict)
    }

    async fn touch_last_login(&self, email: &str, at: OffsetDateTime) -> Result<bool, StoreError> {
        let res = sqlx::query("UPDATE users SET last_login = $2 WHERE email = $1")
            .bind(email)
            .bind(at)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn update_profile(
        &self,
        email: &str,
        changes: &ProfileChanges,
        at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                username   = COALESCE($2, username),
                bio        = COALESCE($3, bio),
                birth_date = COALESCE($4, birth_date),
                country    = COALESCE($5, country),
                avatar_url = COALESCE($6, avatar_url),
                updated_at = $7
            WHERE email = $1
            RETURNING email, username, password_hash, role, status, avatar_url, bio,
                      birth_date, country, email_verified, last_login, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(changes.username.as_deref())
        .bind(changes.bio.as_deref())
        .bind(changes.birth_date)
        .bind(changes.country.as_deref())
        .bind(changes.avatar_url.as_deref())
        .bind(at)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_err)?;
        Ok(user)
    }

    async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE email = $1",
        )
        .bind(email)
        .bind(password_hash)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete(&self, email: &str) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT email, username, password_hash, role, status, avatar_url, bio,
                   birth_date, country, email_verified, last_login, created_at, updated_at
            FROM users
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }
}
