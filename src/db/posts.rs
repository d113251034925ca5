// Post store
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::{Category, Post};
use crate::db::{now_timestamp, RepositoryError};
use crate::state::DbPool;

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub category: Category,
    pub description: String,
    pub creator: String,
    pub thumbnail: String,
}

/// Replacement values for an edit. `thumbnail: None` keeps the current file.
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub title: String,
    pub category: Category,
    pub description: String,
    pub thumbnail: Option<String>,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert(&self, post: NewPost) -> Result<Post, RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, RepositoryError>;

    /// All posts, most recently updated first.
    async fn list(&self) -> Result<Vec<Post>, RepositoryError>;

    /// Posts in `category`, newest first.
    async fn list_by_category(&self, category: &str) -> Result<Vec<Post>, RepositoryError>;

    /// Posts written by `creator`, newest first.
    async fn list_by_creator(&self, creator: &str) -> Result<Vec<Post>, RepositoryError>;

    /// Apply `changes` and return the updated post, or `None` if it does not exist.
    async fn update(&self, id: &str, changes: PostChanges)
        -> Result<Option<Post>, RepositoryError>;

    /// Returns false if no post was deleted.
    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;
}

pub struct SqlitePostRepository {
    pool: DbPool,
}

impl SqlitePostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn fetch(conn: &rusqlite::Connection, id: &str) -> Result<Option<Post>, RepositoryError> {
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    fn query(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let posts = stmt
            .query_map(args, post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }
}

const POST_COLUMNS: &str =
    "id, title, category, description, creator, thumbnail, created_at, updated_at";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let category: String = row.get(2)?;
    let category = category
        .parse::<Category>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        category,
        description: row.get(3)?,
        creator: row.get(4)?,
        thumbnail: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn insert(&self, post: NewPost) -> Result<Post, RepositoryError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let now = now_timestamp();

        conn.execute(
            "INSERT INTO posts (id, title, category, description, creator, thumbnail, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                post.title,
                post.category.as_str(),
                post.description,
                post.creator,
                post.thumbnail,
                now
            ],
        )?;

        Ok(Post {
            id,
            title: post.title,
            category: post.category,
            description: post.description,
            creator: post.creator,
            thumbnail: post.thumbnail,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        Self::fetch(&conn, id)
    }

    async fn list(&self) -> Result<Vec<Post>, RepositoryError> {
        self.query(
            &format!("SELECT {POST_COLUMNS} FROM posts ORDER BY updated_at DESC, id DESC"),
            params![],
        )
    }

    async fn list_by_category(&self, category: &str) -> Result<Vec<Post>, RepositoryError> {
        self.query(
            &format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE category = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            params![category],
        )
    }

    async fn list_by_creator(&self, creator: &str) -> Result<Vec<Post>, RepositoryError> {
        self.query(
            &format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE creator = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            params![creator],
        )
    }

    async fn update(
        &self,
        id: &str,
        changes: PostChanges,
    ) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE posts
             SET title = ?2, category = ?3, description = ?4,
                 thumbnail = COALESCE(?5, thumbnail), updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                changes.title,
                changes.category.as_str(),
                changes.description,
                changes.thumbnail,
                now_timestamp()
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        Self::fetch(&conn, id)
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
