// Credential store - user records and the denormalized post counter
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::User;
use crate::db::{now_timestamp, RepositoryError};
use crate::state::DbPool;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user. Fails with `Conflict` when the email is taken.
    async fn insert(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn list(&self) -> Result<Vec<User>, RepositoryError>;

    /// Replace the avatar reference. Returns `None` if the user does not exist.
    async fn set_avatar(&self, id: &str, avatar: &str) -> Result<Option<User>, RepositoryError>;

    async fn update_profile(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<User>, RepositoryError>;

    /// Atomically add `delta` to the post counter, never going below zero.
    /// Returns false if the user does not exist.
    async fn adjust_post_count(&self, id: &str, delta: i64) -> Result<bool, RepositoryError>;
}

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn fetch(conn: &rusqlite::Connection, id: &str) -> Result<Option<User>, RepositoryError> {
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, avatar, post_count, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        avatar: row.get(4)?,
        post_count: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn insert(&self, user: NewUser) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let now = now_timestamp();

        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, post_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            params![id, user.name, user.email, user.password_hash, now],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict(format!("email {} already registered", user.email))
            } else {
                e.into()
            }
        })?;

        Ok(User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            avatar: None,
            post_count: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        Self::fetch(&conn, id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    async fn set_avatar(&self, id: &str, avatar: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET avatar = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, avatar, now_timestamp()],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        Self::fetch(&conn, id)
    }

    async fn update_profile(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE users SET name = ?2, email = ?3, password_hash = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![id, name, email, password_hash, now_timestamp()],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::Conflict(format!("email {} already registered", email))
                } else {
                    e.into()
                }
            })?;
        if rows == 0 {
            return Ok(None);
        }
        Self::fetch(&conn, id)
    }

    async fn adjust_post_count(&self, id: &str, delta: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET post_count = MAX(post_count + ?2, 0) WHERE id = ?1",
            params![id, delta],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Alice".into(),
            email: email.into(),
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn insert_then_find_by_id_and_email() {
        let repo = SqliteUserRepository::new(test_pool());
        let user = repo.insert(new_user("a@x.com")).await.unwrap();

        let by_id = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "a@x.com");
        assert_eq!(by_id.post_count, 0);
        assert!(by_id.avatar.is_none());

        let by_email = repo.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let repo = SqliteUserRepository::new(test_pool());
        repo.insert(new_user("a@x.com")).await.unwrap();
        let err = repo.insert(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let repo = SqliteUserRepository::new(test_pool());
        assert!(repo.find_by_id("nope").await.unwrap().is_none());
        assert!(repo.set_avatar("nope", "a.png").await.unwrap().is_none());
        assert!(!repo.adjust_post_count("nope", 1).await.unwrap());
    }

    #[tokio::test]
    async fn post_count_never_goes_negative() {
        let repo = SqliteUserRepository::new(test_pool());
        let user = repo.insert(new_user("a@x.com")).await.unwrap();

        assert!(repo.adjust_post_count(&user.id, 1).await.unwrap());
        assert!(repo.adjust_post_count(&user.id, 1).await.unwrap());
        assert!(repo.adjust_post_count(&user.id, -1).await.unwrap());
        let user = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(user.post_count, 1);

        repo.adjust_post_count(&user.id, -5).await.unwrap();
        let user = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(user.post_count, 0);
    }

    #[tokio::test]
    async fn set_avatar_and_update_profile() {
        let repo = SqliteUserRepository::new(test_pool());
        let user = repo.insert(new_user("a@x.com")).await.unwrap();

        let updated = repo.set_avatar(&user.id, "me123.png").await.unwrap().unwrap();
        assert_eq!(updated.avatar.as_deref(), Some("me123.png"));

        let updated = repo
            .update_profile(&user.id, "Bob", "b@x.com", "new-hash")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Bob");
        assert_eq!(updated.email, "b@x.com");
        assert_eq!(updated.password_hash, "new-hash");
        assert_eq!(updated.avatar.as_deref(), Some("me123.png"));
    }

    #[tokio::test]
    async fn list_returns_all_users() {
        let repo = SqliteUserRepository::new(test_pool());
        repo.insert(new_user("a@x.com")).await.unwrap();
        repo.insert(new_user("b@x.com")).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }
}
