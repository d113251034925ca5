use serde::Deserialize;

use super::{Coordinator, Upload};
use crate::db::models::{Category, Post};
use crate::db::posts::{NewPost, PostChanges};
use crate::error::{AppError, AppResult};
use crate::storage::{check_size, BlobError, THUMBNAIL_MAX_BYTES};

/// Edits require a longer description than creation does.
pub const EDIT_DESCRIPTION_MIN_CHARS: usize = 12;

/// Text fields of a post form. Missing fields deserialize as empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostInput {
    pub title: String,
    pub category: String,
    pub description: String,
}

fn parse_category(raw: &str) -> AppResult<Category> {
    raw.parse::<Category>()
        .map_err(|e| AppError::Validation(e.to_string()))
}

fn thumbnail_too_big(err: BlobError) -> AppError {
    match err {
        BlobError::SizeExceeded { .. } => AppError::Validation("Thumbnail is too big".into()),
        other => other.into(),
    }
}

impl Coordinator {
    /// Store the thumbnail, then create the record, then bump the creator's post count.
    pub async fn create_post(
        &self,
        creator: &str,
        input: PostInput,
        thumbnail: Option<Upload>,
    ) -> AppResult<Post> {
        let thumbnail = match thumbnail {
            Some(t)
                if !input.title.is_empty()
                    && !input.category.is_empty()
                    && !input.description.is_empty() =>
            {
                t
            }
            _ => {
                return Err(AppError::Validation(
                    "Fill all data and choose thumbnail".into(),
                ))
            }
        };
        let category = parse_category(&input.category)?;
        check_size(thumbnail.bytes.len(), THUMBNAIL_MAX_BYTES).map_err(thumbnail_too_big)?;

        let stored = self
            .blobs
            .store(&thumbnail.bytes, &thumbnail.file_name, THUMBNAIL_MAX_BYTES)
            .await
            .map_err(thumbnail_too_big)?;

        let post = match self
            .posts
            .insert(NewPost {
                title: input.title,
                category,
                description: input.description,
                creator: creator.to_string(),
                thumbnail: stored.clone(),
            })
            .await
        {
            Ok(post) => post,
            Err(e) => {
                self.discard_orphan(&stored).await;
                return Err(e.into());
            }
        };

        match self.users.adjust_post_count(creator, 1).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(user = %creator, "Post creator missing, count not updated"),
            Err(e) => tracing::warn!(user = %creator, error = %e, "Failed to increment post count"),
        }

        tracing::info!(post = %post.id, creator = %creator, "Post created");
        Ok(post)
    }

    /// Replace a post's text fields and, optionally, its thumbnail.
    ///
    /// Any authenticated user may edit any post; only deletion checks the creator.
    /// With a new thumbnail the old file is removed before the new one is stored, so
    /// if the record update then fails the post is left pointing at a removed file.
    pub async fn edit_post(
        &self,
        post_id: &str,
        actor: &str,
        input: PostInput,
        thumbnail: Option<Upload>,
    ) -> AppResult<Post> {
        if input.title.is_empty()
            || input.category.is_empty()
            || input.description.chars().count() < EDIT_DESCRIPTION_MIN_CHARS
        {
            return Err(AppError::Validation("Fill all data".into()));
        }
        let category = parse_category(&input.category)?;

        let mut changes = PostChanges {
            title: input.title,
            category,
            description: input.description,
            thumbnail: None,
        };

        let Some(thumbnail) = thumbnail else {
            let post = self
                .posts
                .update(post_id, changes)
                .await?
                .ok_or_else(|| AppError::NotFound("Post not found".into()))?;
            tracing::info!(post = %post_id, actor = %actor, "Post edited");
            return Ok(post);
        };

        check_size(thumbnail.bytes.len(), THUMBNAIL_MAX_BYTES).map_err(thumbnail_too_big)?;

        let old = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".into()))?;

        self.blobs
            .remove_if_present(&old.thumbnail)
            .await
            .map_err(|e| {
                AppError::Internal(format!(
                    "Failed to delete old thumbnail {}: {}",
                    old.thumbnail, e
                ))
            })?;

        let stored = self
            .blobs
            .store(&thumbnail.bytes, &thumbnail.file_name, THUMBNAIL_MAX_BYTES)
            .await
            .map_err(thumbnail_too_big)?;
        changes.thumbnail = Some(stored.clone());

        match self.posts.update(post_id, changes).await {
            Ok(Some(post)) => {
                tracing::info!(post = %post_id, actor = %actor, thumbnail = %stored, "Post edited");
                Ok(post)
            }
            Ok(None) => {
                self.discard_orphan(&stored).await;
                Err(AppError::NotFound("Post not found".into()))
            }
            Err(e) => {
                self.discard_orphan(&stored).await;
                Err(e.into())
            }
        }
    }

    /// Delete a post and its thumbnail. Only the creator may do this.
    pub async fn delete_post(&self, post_id: &str, actor: &str) -> AppResult<()> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".into()))?;

        if post.creator != actor {
            return Err(AppError::Forbidden(
                "Not authorized to delete this post".into(),
            ));
        }

        self.blobs
            .remove_if_present(&post.thumbnail)
            .await
            .map_err(|e| {
                AppError::Internal(format!(
                    "Failed to delete thumbnail {}: {}",
                    post.thumbnail, e
                ))
            })?;

        // A concurrent delete may have won the race after our lookup
        if !self.posts.delete(post_id).await? {
            return Err(AppError::NotFound("Post not found".into()));
        }

        // The creator may no longer exist; that is not an error here
        if let Err(e) = self.users.adjust_post_count(&post.creator, -1).await {
            tracing::warn!(user = %post.creator, error = %e, "Failed to decrement post count");
        }

        tracing::info!(post = %post_id, actor = %actor, "Post deleted");
        Ok(())
    }
}
