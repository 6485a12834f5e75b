//! GET /proxy-photo/*reference

use crate::error::ApiError;
use crate::search::ProxiedPhoto;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

const PHOTO_CACHE_CONTROL: &str = "public, max-age=3600";

/// GET /proxy-photo/*reference
///
/// Provider photo with a one-hour cache header; placeholder PNG on any
/// failure, 404 when the placeholder itself is gone.
pub async fn proxy_photo(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Response {
    match state.photos.fetch(&reference).await {
        ProxiedPhoto::Upstream(photo) => (
            [
                (header::CONTENT_TYPE, photo.content_type),
                (header::CACHE_CONTROL, PHOTO_CACHE_CONTROL.to_string()),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
            ],
            photo.bytes,
        )
            .into_response(),
        ProxiedPhoto::Placeholder(bytes) => {
            ([(header::CONTENT_TYPE, "image/png")], bytes).into_response()
        }
        ProxiedPhoto::Missing => ApiError::NotFound("Image not found".to_string()).into_response(),
    }
}

pub fn photo_routes() -> Router<AppState> {
    Router::new().route("/proxy-photo/*reference", get(proxy_photo))
}
