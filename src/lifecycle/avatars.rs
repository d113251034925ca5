use super::{Coordinator, Upload};
use crate::db::models::PublicUser;
use crate::error::{AppError, AppResult};
use crate::storage::{check_size, BlobError, AVATAR_MAX_BYTES};

fn avatar_too_big(err: BlobError) -> AppError {
    match err {
        BlobError::SizeExceeded { .. } => AppError::Validation(
            "Image too big! Image size should be less than 2.5 MB".into(),
        ),
        other => other.into(),
    }
}

impl Coordinator {
    /// Swap a user's avatar for a newly uploaded image.
    ///
    /// The previous avatar is removed before the new upload's size is checked, so an
    /// oversized upload leaves the user without an avatar file while the record still
    /// names the old one.
    pub async fn change_avatar(
        &self,
        user_id: &str,
        avatar: Option<Upload>,
    ) -> AppResult<PublicUser> {
        let avatar = avatar.ok_or_else(|| AppError::Validation("Choose an image!".into()))?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found!".into()))?;

        if let Some(previous) = user.avatar.as_deref() {
            self.blobs.remove_if_present(previous).await.map_err(|e| {
                AppError::Internal(format!("Could not delete old avatar {}: {}", previous, e))
            })?;
        }

        check_size(avatar.bytes.len(), AVATAR_MAX_BYTES).map_err(avatar_too_big)?;

        let stored = self
            .blobs
            .store(&avatar.bytes, &avatar.file_name, AVATAR_MAX_BYTES)
            .await
            .map_err(avatar_too_big)?;

        match self.users.set_avatar(user_id, &stored).await {
            Ok(Some(user)) => {
                tracing::info!(user = %user_id, avatar = %stored, "Avatar changed");
                Ok(user.into())
            }
            Ok(None) => {
                self.discard_orphan(&stored).await;
                Err(AppError::NotFound("User not found!".into()))
            }
            Err(e) => {
                self.discard_orphan(&stored).await;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UserRepository;
    use crate::lifecycle::testing::{upload, Harness};

    #[tokio::test]
    async fn first_avatar_is_stored_and_recorded() {
        let h = Harness::new();
        let user = h.user("a@x.com").await;

        let updated = h
            .coordinator
            .change_avatar(&user, Some(upload("me.png", 16)))
            .await
            .unwrap();

        let avatar = updated.avatar.unwrap();
        assert!(avatar.starts_with("me"));
        assert!(h.coordinator.blobs().exists(&avatar).await);
    }

    #[tokio::test]
    async fn replacing_avatar_removes_previous_file() {
        let h = Harness::new();
        let user = h.user("a@x.com").await;
        let first = h
            .coordinator
            .change_avatar(&user, Some(upload("one.png", 16)))
            .await
            .unwrap()
            .avatar
            .unwrap();

        let second = h
            .coordinator
            .change_avatar(&user, Some(upload("two.png", 16)))
            .await
            .unwrap()
            .avatar
            .unwrap();

        assert_ne!(first, second);
        assert!(!h.coordinator.blobs().exists(&first).await);
        assert!(h.coordinator.blobs().exists(&second).await);
        assert_eq!(h.blob_count(), 1);
    }

    #[tokio::test]
    async fn missing_upload_is_validation_error() {
        let h = Harness::new();
        let user = h.user("a@x.com").await;
        let err = h.coordinator.change_avatar(&user, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let h = Harness::new();
        let err = h
            .coordinator
            .change_avatar("ghost", Some(upload("me.png", 16)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(h.blob_count(), 0);
    }

    #[tokio::test]
    async fn oversized_avatar_is_rejected_after_old_one_is_removed() {
        let h = Harness::new();
        let user = h.user("a@x.com").await;
        let first = h
            .coordinator
            .change_avatar(&user, Some(upload("one.png", 16)))
            .await
            .unwrap()
            .avatar
            .unwrap();

        let err = h
            .coordinator
            .change_avatar(&user, Some(upload("huge.png", AVATAR_MAX_BYTES + 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!h.coordinator.blobs().exists(&first).await);
        assert_eq!(h.blob_count(), 0);

        let stored = h.users.find_by_id(&user).await.unwrap().unwrap();
        assert_eq!(stored.avatar.as_deref(), Some(first.as_str()));
    }

    #[tokio::test]
    async fn avatar_limit_is_smaller_than_thumbnail_limit() {
        let h = Harness::new();
        let user = h.user("a@x.com").await;
        assert!(h
            .coordinator
            .change_avatar(&user, Some(upload("ok.png", AVATAR_MAX_BYTES)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn failed_avatar_write_removes_new_file() {
        let h = Harness::new();
        let user = h.user("a@x.com").await;
        h.fail_avatar_writes();

        let err = h
            .coordinator
            .change_avatar(&user, Some(upload("me.png", 16)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(h.blob_count(), 0);

        let stored = h.users.find_by_id(&user).await.unwrap().unwrap();
        assert!(stored.avatar.is_none());
    }

    #[tokio::test]
    async fn user_vanishing_before_avatar_write_removes_new_file() {
        let h = Harness::new();
        let user = h.user("a@x.com").await;
        h.vanish_users_on_avatar();

        let err = h
            .coordinator
            .change_avatar(&user, Some(upload("me.png", 16)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(h.blob_count(), 0);
    }
}
