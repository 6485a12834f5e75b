//! Places search client
//!
//! Text search, place details and photo retrieval against the Google Places
//! web service. Every call is attempted once with a fixed timeout; callers
//! decide how to degrade.
//!
//! # API Reference
//! - Text search: https://maps.googleapis.com/maps/api/place/textsearch/json
//! - Details: https://maps.googleapis.com/maps/api/place/details/json
//! - Photo: https://maps.googleapis.com/maps/api/place/photo

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

/// Default per-call timeout for search, details and photo requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fields requested from the details endpoint
const DETAILS_FIELDS: &str = "name,formatted_address,rating,photos,place_id";

/// Maximum photo width requested from the photo endpoint
const PHOTO_MAX_WIDTH: u32 = 400;

/// Places client errors
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// No API key configured
    #[error("Places API key not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(u16),

    /// Non-OK `status` field in the response body
    #[error("API status: {0}")]
    Status(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// A ranked place returned by the search provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub place_id: Option<String>,
    pub name: String,
    pub address: String,
    pub rating: Option<f64>,
    pub photo_reference: Option<String>,
}

/// Binary photo content
#[derive(Debug, Clone)]
pub struct PhotoContent {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Places search capability
#[async_trait::async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Text search returning candidates in provider order
    async fn text_search(
        &self,
        query: &str,
        language: &str,
    ) -> Result<Vec<PlaceCandidate>, SearchError>;

    /// Details lookup for one place
    async fn details(&self, place_id: &str, language: &str) -> Result<PlaceCandidate, SearchError>;

    /// Photo bytes for a photo reference
    async fn photo(&self, photo_reference: &str) -> Result<PhotoContent, SearchError>;

    /// True when a key is configured
    fn is_configured(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceRecord>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    result: Option<PlaceRecord>,
}

#[derive(Debug, Deserialize)]
struct PlaceRecord {
    place_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    formatted_address: Option<String>,
    rating: Option<f64>,
    #[serde(default)]
    photos: Vec<PhotoRecord>,
}

#[derive(Debug, Deserialize)]
struct PhotoRecord {
    photo_reference: Option<String>,
}

impl From<PlaceRecord> for PlaceCandidate {
    fn from(record: PlaceRecord) -> Self {
        Self {
            place_id: record.place_id.filter(|id| !id.is_empty()),
            name: record.name.unwrap_or_else(|| "Unknown".to_string()),
            address: record.formatted_address.unwrap_or_default(),
            rating: record.rating,
            photo_reference: record
                .photos
                .into_iter()
                .next()
                .and_then(|p| p.photo_reference)
                .filter(|r| !r.is_empty()),
        }
    }
}

/// Google Places web service client
pub struct GooglePlacesClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GooglePlacesClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, SearchError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: api_key.filter(|k| emotabi_common::keys::is_valid_key(k)),
            base_url: PLACES_BASE_URL.to_string(),
        })
    }

    /// Override the base URL (test servers, regional gateways)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn key(&self) -> Result<&str, SearchError> {
        self.api_key.as_deref().ok_or(SearchError::NotConfigured)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SearchError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http_client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Http(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PlaceSearch for GooglePlacesClient {
    async fn text_search(
        &self,
        query: &str,
        language: &str,
    ) -> Result<Vec<PlaceCandidate>, SearchError> {
        let key = self.key()?;
        debug!(query = %query, "Places text search");

        let response: TextSearchResponse = self
            .get_json(
                "textsearch/json",
                &[("query", query), ("language", language), ("key", key)],
            )
            .await?;

        if response.status != "OK" {
            return Err(SearchError::Status(response.status));
        }

        Ok(response.results.into_iter().map(PlaceCandidate::from).collect())
    }

    async fn details(&self, place_id: &str, language: &str) -> Result<PlaceCandidate, SearchError> {
        let key = self.key()?;

        let response: DetailsResponse = self
            .get_json(
                "details/json",
                &[
                    ("place_id", place_id),
                    ("fields", DETAILS_FIELDS),
                    ("language", language),
                    ("key", key),
                ],
            )
            .await?;

        match (response.status.as_str(), response.result) {
            ("OK", Some(record)) => Ok(record.into()),
            (status, _) => Err(SearchError::Status(status.to_string())),
        }
    }

    async fn photo(&self, photo_reference: &str) -> Result<PhotoContent, SearchError> {
        let key = self.key()?;
        let url = format!("{}/photo", self.base_url);
        let max_width = PHOTO_MAX_WIDTH.to_string();

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("maxwidth", max_width.as_str()),
                ("photoreference", photo_reference),
                ("key", key),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Http(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        Ok(PhotoContent {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
