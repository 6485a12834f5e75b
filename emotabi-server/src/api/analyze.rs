//! POST /analyze
//!
//! Multipart form: `region`, `purpose`, `image` (file, ≤16 MiB).

use crate::config::ServiceConfig;
use crate::services::image_optimizer::{optimize_image, MAX_DIMENSION};
use crate::workflow::{AnalyzeInput, AnalyzeResponse, AnalyzeStage, StageTracker};
use crate::{ApiError, ApiResult, AppState};
use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Uploaded file as received
#[derive(Debug)]
struct UploadedImage {
    file_name: String,
    bytes: Bytes,
}

#[derive(Debug, Default)]
struct AnalyzeForm {
    region: Option<String>,
    purpose: Option<String>,
    image: Option<UploadedImage>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("16MB以下の画像をアップロードしてください".to_string())
    } else {
        ApiError::BadRequest(format!("フォームの読み込みに失敗しました: {}", err.body_text()))
    }
}

async fn read_form(multipart: &mut Multipart) -> ApiResult<AnalyzeForm> {
    let mut form = AnalyzeForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("region") => form.region = Some(field.text().await.map_err(multipart_error)?),
            Some("purpose") => form.purpose = Some(field.text().await.map_err(multipart_error)?),
            Some("image") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.image = Some(UploadedImage { file_name, bytes });
            }
            other => debug!(field = ?other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

fn required(value: Option<String>, message: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

fn validate(form: AnalyzeForm, max_image_bytes: usize) -> ApiResult<(String, String, UploadedImage)> {
    let region = required(form.region, "地域を選択または入力してください")?;
    let purpose = required(form.purpose, "目的を選択または入力してください")?;

    let image = form
        .image
        .filter(|img| !img.file_name.is_empty() && !img.bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("画像をアップロードしてください".to_string()))?;
    if image.bytes.len() > max_image_bytes {
        return Err(ApiError::BadRequest("画像サイズは16MB以下にしてください".to_string()));
    }

    Ok((region, purpose, image))
}

/// Extension of the client filename, reduced to safe characters
pub fn sanitized_extension(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.chars().filter(char::is_ascii_alphanumeric).collect::<String>())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

/// `upload_<unix-seconds>_<8 hex><ext>`
pub fn upload_file_name(file_name: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "upload_{}_{}{}",
        Utc::now().timestamp(),
        &id[..8],
        sanitized_extension(file_name)
    )
}

async fn store_upload(config: &ServiceConfig, image: &UploadedImage) -> ApiResult<PathBuf> {
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let path = config.upload_dir.join(upload_file_name(&image.file_name));
    tokio::fs::write(&path, &image.bytes).await?;
    info!(path = %path.display(), bytes = image.bytes.len(), "Upload stored");
    Ok(path)
}

async fn prepare_image(path: PathBuf) -> ApiResult<()> {
    let ready = tokio::task::spawn_blocking(move || optimize_image(&path, (MAX_DIMENSION, MAX_DIMENSION)))
        .await
        .map_err(|e| ApiError::Internal(format!("image worker failed: {}", e)))??;

    if ready {
        Ok(())
    } else {
        Err(ApiError::Internal("画像の処理に失敗しました".to_string()))
    }
}

/// POST /analyze
pub async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<AnalyzeResponse>> {
    let mut tracker = StageTracker::new();

    let result = handle(&state, &mut tracker, &mut multipart).await;
    if let Err(e) = &result {
        if !tracker.stage().is_terminal() {
            tracker.fail(e.to_string());
        }
    }
    result.map(Json)
}

async fn handle(
    state: &AppState,
    tracker: &mut StageTracker,
    multipart: &mut Multipart,
) -> ApiResult<AnalyzeResponse> {
    let form = read_form(multipart).await?;
    let (region, purpose, image) = validate(form, state.config.max_image_bytes)?;
    tracker.advance(AnalyzeStage::Validated);

    let image_path = store_upload(&state.config, &image).await?;
    prepare_image(image_path.clone()).await?;
    tracker.advance(AnalyzeStage::ImageStored);

    let input = AnalyzeInput {
        region,
        purpose,
        image_path,
    };
    Ok(state.pipeline.run(tracker, &input).await?)
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new().route("/analyze", post(analyze))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_extension() {
        assert_eq!(sanitized_extension("photo.JPG"), ".JPG");
        assert_eq!(sanitized_extension("../../etc/passwd"), "");
        assert_eq!(sanitized_extension("C:\\pics\\trip.png"), ".png");
        assert_eq!(sanitized_extension("weird.p$n%g"), ".png");
        assert_eq!(sanitized_extension("noext"), "");
    }

    #[test]
    fn test_upload_file_name_shape() {
        let name = upload_file_name("trip.jpeg");
        let parts: Vec<&str> = name.trim_end_matches(".jpeg").split('_').collect();

        assert!(name.starts_with("upload_"));
        assert!(name.ends_with(".jpeg"));
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_validate_messages() {
        let form = AnalyzeForm {
            region: Some("  ".into()),
            purpose: Some("観光".into()),
            image: None,
        };
        let err = validate(form, 10).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m.contains("地域")));

        let form = AnalyzeForm {
            region: Some("京都".into()),
            purpose: Some("観光".into()),
            image: Some(UploadedImage {
                file_name: "a.jpg".into(),
                bytes: Bytes::from_static(b"0123456789ab"),
            }),
        };
        let err = validate(form, 10).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m.contains("16MB")));
    }
}
