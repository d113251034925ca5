//! Ties record mutations to the files they reference.
//!
//! Every operation here touches both a record store and the [`BlobStore`], and
//! there is no transaction spanning the two. The ordering is fixed so that a
//! failure leaves at worst an unreferenced file, never a record without one,
//! with two exceptions noted on [`Coordinator::edit_post`] and
//! [`Coordinator::change_avatar`]. Where a newly written file would be left
//! orphaned by a failed record write, it is removed again.

mod avatars;
mod posts;

use std::sync::Arc;

use bytes::Bytes;

use crate::db::{PostRepository, UserRepository};
use crate::storage::BlobStore;

pub use self::posts::{PostInput, EDIT_DESCRIPTION_MIN_CHARS};

/// An uploaded file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Clone)]
pub struct Coordinator {
    posts: Arc<dyn PostRepository>,
    users: Arc<dyn UserRepository>,
    blobs: BlobStore,
}

impl Coordinator {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        users: Arc<dyn UserRepository>,
        blobs: BlobStore,
    ) -> Self {
        Self {
            posts,
            users,
            blobs,
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Remove a file written earlier in a request whose record write then failed.
    async fn discard_orphan(&self, name: &str) {
        if let Err(e) = self.blobs.remove(name).await {
            tracing::warn!(blob = %name, error = %e, "Failed to remove orphaned blob");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::db::models::{Post, User};
    use crate::db::posts::{NewPost, PostChanges};
    use crate::db::users::NewUser;
    use crate::db::{test_pool, RepositoryError, SqlitePostRepository, SqliteUserRepository};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Post store that delegates to SQLite but can be told to fail writes.
    pub struct FlakyPosts {
        pub inner: SqlitePostRepository,
        pub fail_writes: AtomicBool,
        /// Delete the row just before applying an update, as a concurrent delete would.
        pub vanish_on_update: AtomicBool,
    }

    impl FlakyPosts {
        fn check(&self) -> Result<(), RepositoryError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RepositoryError::Corrupt("injected write failure".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepository for FlakyPosts {
        async fn insert(&self, post: NewPost) -> Result<Post, RepositoryError> {
            self.check()?;
            self.inner.insert(post).await
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<Post>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn list(&self) -> Result<Vec<Post>, RepositoryError> {
            self.inner.list().await
        }

        async fn list_by_category(&self, category: &str) -> Result<Vec<Post>, RepositoryError> {
            self.inner.list_by_category(category).await
        }

        async fn list_by_creator(&self, creator: &str) -> Result<Vec<Post>, RepositoryError> {
            self.inner.list_by_creator(creator).await
        }

        async fn update(
            &self,
            id: &str,
            changes: PostChanges,
        ) -> Result<Option<Post>, RepositoryError> {
            self.check()?;
            if self.vanish_on_update.load(Ordering::SeqCst) {
                self.inner.delete(id).await?;
            }
            self.inner.update(id, changes).await
        }

        async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
            self.check()?;
            self.inner.delete(id).await
        }
    }

    /// User store that delegates to SQLite but can be told to fail avatar writes.
    pub struct FlakyUsers {
        pub inner: SqliteUserRepository,
        pub fail_avatar_writes: AtomicBool,
        /// Delete the user just before the avatar write lands.
        pub vanish_on_avatar: AtomicBool,
    }

    #[async_trait]
    impl UserRepository for FlakyUsers {
        async fn insert(&self, user: NewUser) -> Result<User, RepositoryError> {
            self.inner.insert(user).await
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
            self.inner.find_by_email(email).await
        }

        async fn list(&self) -> Result<Vec<User>, RepositoryError> {
            self.inner.list().await
        }

        async fn set_avatar(
            &self,
            id: &str,
            avatar: &str,
        ) -> Result<Option<User>, RepositoryError> {
            if self.fail_avatar_writes.load(Ordering::SeqCst) {
                return Err(RepositoryError::Corrupt("injected write failure".into()));
            }
            if self.vanish_on_avatar.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.set_avatar(id, avatar).await
        }

        async fn update_profile(
            &self,
            id: &str,
            name: &str,
            email: &str,
            password_hash: &str,
        ) -> Result<Option<User>, RepositoryError> {
            self.inner.update_profile(id, name, email, password_hash).await
        }

        async fn adjust_post_count(&self, id: &str, delta: i64) -> Result<bool, RepositoryError> {
            self.inner.adjust_post_count(id, delta).await
        }
    }

    pub struct Harness {
        pub _tmp: tempfile::TempDir,
        pub coordinator: Coordinator,
        pub posts: Arc<FlakyPosts>,
        pub users: Arc<FlakyUsers>,
    }

    impl Harness {
        pub fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let pool = test_pool();
            let posts = Arc::new(FlakyPosts {
                inner: SqlitePostRepository::new(pool.clone()),
                fail_writes: AtomicBool::new(false),
                vanish_on_update: AtomicBool::new(false),
            });
            let users = Arc::new(FlakyUsers {
                inner: SqliteUserRepository::new(pool),
                fail_avatar_writes: AtomicBool::new(false),
                vanish_on_avatar: AtomicBool::new(false),
            });
            let blobs = BlobStore::new(tmp.path().join("uploads"));
            let coordinator = Coordinator::new(posts.clone(), users.clone(), blobs);
            Self {
                _tmp: tmp,
                coordinator,
                posts,
                users,
            }
        }

        pub fn fail_post_writes(&self) {
            self.posts.fail_writes.store(true, Ordering::SeqCst);
        }

        pub fn vanish_posts_on_update(&self) {
            self.posts.vanish_on_update.store(true, Ordering::SeqCst);
        }

        pub fn fail_avatar_writes(&self) {
            self.users.fail_avatar_writes.store(true, Ordering::SeqCst);
        }

        pub fn vanish_users_on_avatar(&self) {
            self.users.vanish_on_avatar.store(true, Ordering::SeqCst);
        }

        pub async fn user(&self, email: &str) -> String {
            self.users
                .insert(NewUser {
                    name: "Writer".into(),
                    email: email.into(),
                    password_hash: "hash".into(),
                })
                .await
                .unwrap()
                .id
        }

        pub fn blob_count(&self) -> usize {
            match std::fs::read_dir(self.coordinator.blobs().root()) {
                Ok(entries) => entries.count(),
                Err(_) => 0,
            }
        }
    }

    pub fn upload(name: &str, size: usize) -> Upload {
        Upload {
            file_name: name.into(),
            bytes: Bytes::from(vec![7u8; size]),
        }
    }
}
