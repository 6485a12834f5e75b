//! HTTP integration tests for emotabi-server
//!
//! Drives the full router with offline analyzers and an in-memory places
//! provider:
//! - `/analyze` happy path, fallback queries, missing provider key
//! - analyzer failure and input validation errors
//! - photo proxy and health endpoints

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use emotabi_server::config::ServiceConfig;
use emotabi_server::error::INTERNAL_ERROR_MESSAGE;
use emotabi_server::fusion::FusionExecutor;
use emotabi_server::services::image_optimizer::ensure_placeholder;
use emotabi_server::services::{PhotoContent, PlaceCandidate, PlaceSearch, SearchError};
use emotabi_server::types::{AnalysisResult, AnalyzerError, AnalyzerSource, EmotionAnalyzer};
use emotabi_server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "emotabi-test-boundary";

/// Analyzer returning a fixed label, the sentinel, or an error
struct FixedAnalyzer {
    source: AnalyzerSource,
    outcome: Result<&'static str, &'static str>,
}

impl FixedAnalyzer {
    fn label(source: AnalyzerSource, label: &'static str) -> Arc<dyn EmotionAnalyzer> {
        Arc::new(Self {
            source,
            outcome: Ok(label),
        })
    }

    fn failing(source: AnalyzerSource, message: &'static str) -> Arc<dyn EmotionAnalyzer> {
        Arc::new(Self {
            source,
            outcome: Err(message),
        })
    }
}

#[async_trait]
impl EmotionAnalyzer for FixedAnalyzer {
    fn source(&self) -> AnalyzerSource {
        self.source
    }

    async fn analyze(&self, _image_path: &Path) -> Result<AnalysisResult, AnalyzerError> {
        match self.outcome {
            Ok(label) => Ok(AnalysisResult::new(self.source, label)),
            Err(message) => Err(AnalyzerError::Internal(message.to_string())),
        }
    }
}

fn executor(object: &'static str, color: &'static str, atmosphere: &'static str) -> FusionExecutor {
    FusionExecutor::new(
        FixedAnalyzer::label(AnalyzerSource::Object, object),
        FixedAnalyzer::label(AnalyzerSource::Color, color),
        FixedAnalyzer::label(AnalyzerSource::Atmosphere, atmosphere),
    )
}

fn place(id: &str, name: &str) -> PlaceCandidate {
    PlaceCandidate {
        place_id: Some(id.to_string()),
        name: name.to_string(),
        address: format!("{}の住所", name),
        rating: Some(4.2),
        photo_reference: Some(format!("ref-{}", id)),
    }
}

/// In-memory places provider recording every text search
#[derive(Default)]
struct FakePlaces {
    configured: bool,
    results: HashMap<String, Vec<PlaceCandidate>>,
    photo: Option<PhotoContent>,
    searched: Mutex<Vec<String>>,
}

impl FakePlaces {
    fn configured() -> Self {
        Self {
            configured: true,
            ..Self::default()
        }
    }

    fn with_results(mut self, query: &str, places: Vec<PlaceCandidate>) -> Self {
        self.results.insert(query.to_string(), places);
        self
    }

    fn searched(&self) -> Vec<String> {
        self.searched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaceSearch for FakePlaces {
    async fn text_search(
        &self,
        query: &str,
        _language: &str,
    ) -> Result<Vec<PlaceCandidate>, SearchError> {
        if !self.configured {
            return Err(SearchError::NotConfigured);
        }
        self.searched.lock().unwrap().push(query.to_string());
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }

    async fn details(&self, _place_id: &str, _language: &str) -> Result<PlaceCandidate, SearchError> {
        Err(SearchError::Status("NOT_FOUND".to_string()))
    }

    async fn photo(&self, _photo_reference: &str) -> Result<PhotoContent, SearchError> {
        if !self.configured {
            return Err(SearchError::NotConfigured);
        }
        self.photo
            .clone()
            .ok_or_else(|| SearchError::Status("ZERO_RESULTS".to_string()))
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

struct TestServer {
    app: axum::Router,
    placeholder: PathBuf,
    _root: TempDir,
}

fn setup(fusion: FusionExecutor, places: Arc<FakePlaces>) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let config = ServiceConfig::with_root(root.path().to_path_buf());
    config.ensure_directories().unwrap();
    ensure_placeholder(&config.placeholder_path).unwrap();
    let placeholder = config.placeholder_path.clone();

    let state = AppState::new(config, fusion, places);
    TestServer {
        app: build_router(state),
        placeholder,
        _root: root,
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(32, 24, image::Rgb([120, 180, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Multipart body with optional text fields and an optional image part
fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn post_analyze(app: &axum::Router, body: Vec<u8>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn analyze_kyoto(app: &axum::Router) -> (StatusCode, Value) {
    let image = png_bytes();
    let body = multipart_body(
        &[("region", "京都"), ("purpose", "観光")],
        Some(("trip.png", &image)),
    );
    post_analyze(app, body).await
}

async fn get(app: &axum::Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_identical_labels_select_distinct_places() {
    let query = "京都 観光 穏やかな 穏やかな 穏やかな";
    let places = Arc::new(FakePlaces::configured().with_results(
        query,
        vec![place("p1", "嵐山"), place("p2", "南禅寺"), place("p3", "哲学の道")],
    ));
    let server = setup(executor("穏やかな", "穏やかな", "穏やかな"), Arc::clone(&places));

    let (status, body) = analyze_kyoto(&server.app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object_emotion"], "穏やかな");
    assert_eq!(body["color_emotion"], "穏やかな");
    assert_eq!(body["atmosphere_emotion"], "穏やかな");

    let names: Vec<&str> = body["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["嵐山", "南禅寺", "哲学の道"]);

    // three identical queries, one provider call
    assert_eq!(places.searched(), vec![query.to_string()]);

    let first = &body["suggestions"][0];
    assert_eq!(first["photo_url"], "/proxy-photo/ref-p1");
    assert_eq!(first["rating"], 4.2);
    assert!(first["url"].as_str().unwrap().starts_with("https://www.google.com/maps/search/"));
    assert!(first.get("note").is_none());
    assert!(body["processing_time"].as_str().unwrap().ends_with('s'));
}

#[tokio::test]
async fn test_analyzer_error_fails_request() {
    let places = Arc::new(FakePlaces::configured());
    let fusion = FusionExecutor::new(
        FixedAnalyzer::failing(AnalyzerSource::Object, "detector crashed"),
        FixedAnalyzer::label(AnalyzerSource::Color, "穏やかな"),
        FixedAnalyzer::label(AnalyzerSource::Atmosphere, "静かな"),
    );
    let server = setup(fusion, Arc::clone(&places));

    let (status, body) = analyze_kyoto(&server.app).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], INTERNAL_ERROR_MESSAGE);
    assert!(!body.to_string().contains("detector crashed"));
    assert!(places.searched().is_empty());
}

#[tokio::test]
async fn test_all_sentinels_use_fallback_queries() {
    let places = Arc::new(
        FakePlaces::configured()
            .with_results("京都 観光", vec![place("a", "清水寺")])
            .with_results("京都 観光 おすすめ", vec![place("a", "清水寺"), place("b", "金閣寺")])
            .with_results("京都 観光 人気", vec![place("c", "伏見稲荷大社")]),
    );
    let server = setup(executor("api error", "api error", "api error"), Arc::clone(&places));

    let (status, body) = analyze_kyoto(&server.app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        places.searched(),
        vec!["京都 観光", "京都 観光 おすすめ", "京都 観光 人気"]
    );
    let names: Vec<&str> = body["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["清水寺", "金閣寺", "伏見稲荷大社"]);
}

#[tokio::test]
async fn test_missing_places_key_returns_placeholder() {
    let places = Arc::new(FakePlaces::default());
    let server = setup(executor("楽しい", "穏やかな", "静かな"), places);

    let (status, body) = analyze_kyoto(&server.app).await;

    assert_eq!(status, StatusCode::OK);
    let suggestions = body["suggestions"].as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["url"], "#");
    assert_eq!(suggestions[0]["rating"], "―");
    assert_eq!(suggestions[0]["photo_url"], "/static/images/placeholder_r1.png");
    assert!(suggestions[0]["note"].is_string());
}

#[tokio::test]
async fn test_missing_fields_rejected() {
    let server = setup(executor("楽しい", "穏やかな", "静かな"), Arc::new(FakePlaces::configured()));
    let image = png_bytes();

    let body = multipart_body(&[("purpose", "観光")], Some(("trip.png", &image)));
    let (status, json) = post_analyze(&server.app, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "地域を選択または入力してください");

    let body = multipart_body(&[("region", "京都")], Some(("trip.png", &image)));
    let (status, json) = post_analyze(&server.app, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "目的を選択または入力してください");

    let body = multipart_body(&[("region", "京都"), ("purpose", "観光")], None);
    let (status, json) = post_analyze(&server.app, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "画像をアップロードしてください");
}

#[tokio::test]
async fn test_undecodable_upload_is_server_error() {
    let server = setup(executor("楽しい", "穏やかな", "静かな"), Arc::new(FakePlaces::configured()));

    let body = multipart_body(
        &[("region", "京都"), ("purpose", "観光")],
        Some(("trip.png", b"not an image")),
    );
    let (status, json) = post_analyze(&server.app, body).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], INTERNAL_ERROR_MESSAGE);
}

#[tokio::test]
async fn test_photo_proxy_upstream() {
    let places = FakePlaces {
        photo: Some(PhotoContent {
            bytes: vec![0xff, 0xd8, 0xff],
            content_type: "image/jpeg".to_string(),
        }),
        ..FakePlaces::configured()
    };
    let server = setup(executor("楽しい", "穏やかな", "静かな"), Arc::new(places));

    let response = get(&server.app, "/proxy-photo/ref-p1").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=3600");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), &[0xff, 0xd8, 0xff]);
}

#[tokio::test]
async fn test_photo_proxy_falls_back_to_placeholder() {
    let server = setup(executor("楽しい", "穏やかな", "静かな"), Arc::new(FakePlaces::default()));

    let response = get(&server.app, "/proxy-photo/anything").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn test_photo_proxy_without_placeholder_is_not_found() {
    let server = setup(executor("楽しい", "穏やかな", "静かな"), Arc::new(FakePlaces::default()));
    std::fs::remove_file(&server.placeholder).unwrap();

    let response = get(&server.app, "/proxy-photo/anything").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Image not found");
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = setup(executor("楽しい", "穏やかな", "静かな"), Arc::new(FakePlaces::default()));

    let response = get(&server.app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "emotabi-server");
    assert!(body["version"].is_string());
    assert_eq!(body["api_keys"]["google_maps"], false);
    assert_eq!(body["features"]["photo_suggestions"], false);
}

#[tokio::test]
async fn test_index_page_served() {
    let server = setup(executor("楽しい", "穏やかな", "静かな"), Arc::new(FakePlaces::default()));

    let response = get(&server.app, "/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("id=\"analyze-form\""));
}
