use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record. The hash column is never serialized out.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub image_file: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("username is taken")]
    DuplicateUsername,
    #[error("email is taken")]
    DuplicateEmail,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Maps a unique-constraint violation raced past the pre-insert checks to
/// the same duplicate error those checks produce.
fn map_unique_violation(e: sqlx::Error) -> UserError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            let constraint = db.constraint().unwrap_or_default();
            if constraint.contains("username") {
                return UserError::DuplicateUsername;
            }
            if constraint.contains("email") {
                return UserError::DuplicateEmail;
            }
        }
    }
    UserError::Db(e)
}

impl User {
    pub async fn create(
        db: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, UserError> {
        if Self::username_taken(db, username, None).await? {
            return Err(UserError::DuplicateUsername);
        }
        if Self::email_taken(db, email, None).await? {
            return Err(UserError::DuplicateEmail);
        }
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, image_file, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(map_unique_violation)?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, image_file, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, image_file, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, image_file, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// `exclude` skips the user's own row when validating an edit.
    pub async fn username_taken(
        db: &PgPool,
        username: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE username = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(username)
        .bind(exclude)
        .fetch_one(db)
        .await
    }

    pub async fn email_taken(
        db: &PgPool,
        email: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude)
        .fetch_one(db)
        .await
    }

    /// Single-row profile update. `image_file` and `password_hash` keep
    /// their current values when `None`.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        username: &str,
        email: &str,
        image_file: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<User, UserError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET username = $2,
                   email = $3,
                   image_file = COALESCE($4, image_file),
                   password_hash = COALESCE($5, password_hash)
             WHERE id = $1
            RETURNING id, username, email, image_file, password_hash, created_at
            "#,
        )
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(image_file)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(map_unique_violation)?;
        Ok(user)
    }

    /// Used by the verified-token reset flow.
    pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }
}
