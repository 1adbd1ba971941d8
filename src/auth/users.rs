//! User directory contract and its Postgres implementation.

use anyhow::{Context, Result};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::fmt;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::BoxFuture;

#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub role_id: Uuid,
    pub image_url: Option<String>,
    pub is_deleted: bool,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role_id", &self.role_id)
            .field("image_url", &self.image_url)
            .field("is_deleted", &self.is_deleted)
            .finish_non_exhaustive()
    }
}

pub trait UserDirectory: Send + Sync {
    fn find_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>>;

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>>;

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<UserRecord>>>;
}

#[derive(Clone, Debug)]
pub struct PgUserDirectory {
    pool: PgPool,
}

const SELECT_USER: &str = r"
    SELECT id, username, email, password_hash, role_id, image_url, is_deleted
    FROM users
";

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one<T>(&self, filter: &str, value: T) -> Result<Option<UserRecord>>
    where
        T: for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send,
    {
        let query = format!("{SELECT_USER} WHERE {filter} LIMIT 1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to query user")?;

        row.as_ref().map(user_from_row).transpose()
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord> {
    Ok(UserRecord {
        id: row.try_get("id").context("users.id")?,
        username: row.try_get("username").context("users.username")?,
        email: row.try_get("email").context("users.email")?,
        password_hash: row.try_get("password_hash").context("users.password_hash")?,
        role_id: row.try_get("role_id").context("users.role_id")?,
        image_url: row.try_get("image_url").context("users.image_url")?,
        is_deleted: row.try_get("is_deleted").context("users.is_deleted")?,
    })
}

impl UserDirectory for PgUserDirectory {
    fn find_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>> {
        Box::pin(self.fetch_one("username = $1", username))
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>> {
        Box::pin(self.fetch_one("lower(email) = lower($1)", email))
    }

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<UserRecord>>> {
        Box::pin(self.fetch_one("id = $1", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_omits_password_hash() {
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            role_id: Uuid::new_v4(),
            image_url: None,
            is_deleted: false,
        };
        let rendered = format!("{user:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("argon2id"));
    }
}
