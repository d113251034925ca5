use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::TokenService;
use crate::config::{Config, MAX_TOKEN_HOURS};
use crate::db::{PostRepository, SqlitePostRepository, SqliteUserRepository, UserRepository};
use crate::lifecycle::Coordinator;
use crate::storage::BlobStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub tokens: Arc<TokenService>,
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub coordinator: Coordinator,
}

impl AppState {
    /// Wire the SQLite stores, the blob directory and the token service together.
    pub fn new(config: Config, db: DbPool) -> Self {
        let users: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(db.clone()));
        let posts: Arc<dyn PostRepository> = Arc::new(SqlitePostRepository::new(db));
        let blobs = BlobStore::new(config.uploads_path());
        let tokens = TokenService::new(
            config.jwt_secret(),
            chrono::Duration::hours(config.auth.token_hours.clamp(1, MAX_TOKEN_HOURS)),
        );

        Self {
            coordinator: Coordinator::new(posts.clone(), users.clone(), blobs),
            tokens: Arc::new(tokens),
            users,
            posts,
            config,
        }
    }
}
