use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::password::{hash_password, verify_password};
use crate::db::models::PublicUser;
use crate::db::users::NewUser;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, FormData};
use crate::state::AppState;

const MIN_PASSWORD_CHARS: usize = 6;

// -- Request/Response types --

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password2: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: PublicUser,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub id: String,
    pub name: String,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EditUserRequest {
    pub name: String,
    pub email: String,
    pub current_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/register", post(register))
        .route("/api/users/login", post(login))
        .route("/api/users/authors", get(authors))
        .route("/api/users/change-avatar", post(change_avatar))
        .route("/api/users/edit-user", post(edit_user))
        .route("/api/users/{id}", get(get_user))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// -- Handlers --

async fn register(
    State(state): State<AppState>,
    form: FormData,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let req: RegisterRequest = form.parse()?;

    if req.name.is_empty() || req.email.is_empty() || req.password.is_empty() || req.password2.is_empty()
    {
        return Err(AppError::Validation("Fill in all fields.".into()));
    }
    if req.password != req.password2 {
        return Err(AppError::Validation("Passwords do not match.".into()));
    }
    if req.password.trim().chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::Validation(
            "Password should be at least 6 characters.".into(),
        ));
    }

    let email = normalize_email(&req.email);
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Validation("Email already exists.".into()));
    }

    let password_hash = hash_password(&req.password, state.config.auth.bcrypt_cost)?;
    let user = state
        .users
        .insert(NewUser {
            name: req.name,
            email,
            password_hash,
        })
        .await?;

    tracing::info!(user = %user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: format!("New user {} registered.", user.email),
            user: user.into(),
        }),
    ))
}

async fn login(State(state): State<AppState>, form: FormData) -> AppResult<Json<LoginResponse>> {
    let req: LoginRequest = form.parse()?;
    if req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Fill in all fields".into()));
    }

    let user = state
        .users
        .find_by_email(&normalize_email(&req.email))
        .await?
        .ok_or_else(|| AppError::Validation("Invalid data".into()))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(AppError::Validation("Invalid password".into()));
    }

    let token = state.tokens.issue(&user.id, &user.name)?;
    Ok(Json(LoginResponse {
        token,
        id: user.id,
        name: user.name,
    }))
}

async fn get_user(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    state
        .users
        .find_by_id(&id)
        .await?
        .map(|u| Json(u.into()))
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

async fn authors(State(state): State<AppState>) -> AppResult<Json<Vec<PublicUser>>> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

async fn change_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    mut form: FormData,
) -> AppResult<Json<PublicUser>> {
    let updated = state
        .coordinator
        .change_avatar(&user.id, form.take_file("avatar"))
        .await?;
    Ok(Json(updated))
}

async fn edit_user(
    State(state): State<AppState>,
    current: CurrentUser,
    form: FormData,
) -> AppResult<Json<PublicUser>> {
    let req: EditUserRequest = form.parse()?;
    if req.name.is_empty()
        || req.email.is_empty()
        || req.current_password.is_empty()
        || req.new_password.is_empty()
        || req.confirm_new_password.is_empty()
    {
        return Err(AppError::Validation("Fill all fields".into()));
    }

    let user = state
        .users
        .find_by_id(&current.id)
        .await?
        .ok_or_else(|| AppError::Forbidden("User not found".into()))?;

    let email = normalize_email(&req.email);
    if let Some(owner) = state.users.find_by_email(&email).await? {
        if owner.id != user.id {
            return Err(AppError::Validation("Email already exists".into()));
        }
    }

    if !verify_password(&req.current_password, &user.password_hash) {
        return Err(AppError::Validation("Invalid current password".into()));
    }
    if req.new_password != req.confirm_new_password {
        return Err(AppError::Validation("New passwords do not match".into()));
    }

    let password_hash = hash_password(&req.new_password, state.config.auth.bcrypt_cost)?;
    let updated = state
        .users
        .update_profile(&user.id, &req.name, &email, &password_hash)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    tracing::info!(user = %updated.id, "Profile updated");
    Ok(Json(updated.into()))
}
