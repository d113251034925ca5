use std::collections::HashMap;

use axum::extract::{FromRequest, FromRequestParts, Multipart, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::{Form, Json};
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};
use crate::lifecycle::Upload;
use crate::state::AppState;

/// The caller identified by a valid bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
}

/// Extractor that requires a bearer token.
/// Returns 401 when the header is missing and 403 when the token does not verify,
/// before the handler touches any store.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)
            .ok_or_else(|| AppError::Unauthenticated("No token provided.".into()))?;

        let claims = state.tokens.verify(token)?;
        Ok(CurrentUser {
            id: claims.id,
            name: claims.name,
        })
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Request body as text fields plus uploaded files.
///
/// Accepts `multipart/form-data`, JSON objects and urlencoded forms, so the same
/// handler serves browser uploads and plain API clients.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl FormData {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Remove and return the uploaded file sent under `name`.
    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }

    /// Deserialize the text fields into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> AppResult<T> {
        let value = serde_json::to_value(&self.fields)
            .map_err(|e| AppError::Internal(format!("form encoding: {}", e)))?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Validation(format!("Invalid form data: {}", e)))
    }

    async fn from_multipart(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await.map_err(invalid_multipart)?;
                    // Browsers send an empty part when no file was chosen
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.insert(name, Upload { file_name, bytes });
                }
                None => {
                    let text = field.text().await.map_err(invalid_multipart)?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    fn from_json(object: HashMap<String, serde_json::Value>) -> Self {
        let fields = object
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((k, s)),
                other => Some((k, other.to_string())),
            })
            .collect();
        FormData {
            fields,
            files: HashMap::new(),
        }
    }
}

fn invalid_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid form data: {}", err.body_text()))
}

impl FromRequest<AppState> for FormData {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            FormData::from_multipart(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(object) = Json::<HashMap<String, serde_json::Value>>::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            Ok(FormData::from_json(object))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            Ok(FormData {
                fields,
                files: HashMap::new(),
            })
        } else {
            Ok(FormData::default())
        }
    }
}
