pub mod posts;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method, Uri};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

/// URL prefix under which stored blobs are served read-only.
pub const UPLOADS_PREFIX: &str = "/uploads";

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let uploads = ServeDir::new(state.config.uploads_path());

    Router::new()
        .merge(posts::router())
        .merge(users::router())
        .nest_service(UPLOADS_PREFIX, uploads)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(cors_layer(&state.config.server.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match HeaderValue::from_str(origin) {
        Ok(value) => base.allow_origin(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid CORS origin: {:?}", origin);
            base
        }
    }
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Not Found - {}", uri.path()))
}
