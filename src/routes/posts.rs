use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::db::models::Post;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, FormData};
use crate::lifecycle::PostInput;
use crate::state::AppState;

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route(
            "/api/posts/{id}",
            get(get_post).patch(edit_post).delete(delete_post),
        )
        .route("/api/posts/categories/{category}", get(posts_by_category))
        .route("/api/posts/users/{id}", get(posts_by_creator))
}

async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(state.posts.list().await?))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    state
        .posts
        .find_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Post not found".into()))
}

async fn posts_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(state.posts.list_by_category(&category).await?))
}

async fn posts_by_creator(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(state.posts.list_by_creator(&id).await?))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    mut form: FormData,
) -> AppResult<(StatusCode, Json<Post>)> {
    let input: PostInput = form.parse()?;
    let thumbnail = form.take_file("thumbnail");

    let post = state
        .coordinator
        .create_post(&user.id, input, thumbnail)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn edit_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    mut form: FormData,
) -> AppResult<Json<Post>> {
    let input: PostInput = form.parse()?;
    let thumbnail = form.take_file("thumbnail");

    let post = state
        .coordinator
        .edit_post(&id, &user.id, input, thumbnail)
        .await?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.coordinator.delete_post(&id, &user.id).await?;
    Ok(Json(MessageResponse {
        message: format!("Post {} deleted successfully", id),
    }))
}
