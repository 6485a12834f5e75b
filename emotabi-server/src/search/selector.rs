//! Search & dedup selection
//!
//! For each query, in order: fetch (cached) candidates, keep the top three,
//! enrich them with place details, and select the first candidate whose
//! place id has not been selected earlier in the request. Candidates without
//! a place id are always eligible and never recorded.
//!
//! Selected candidates become [`Suggestion`]s. When nothing was selected the
//! response carries a single placeholder suggestion with a configuration
//! hint instead of an empty list.

use super::cache::{CachedCandidates, QueryCache};
use crate::services::{PlaceCandidate, PlaceSearch, SearchError};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Candidates considered per query
pub const TOP_CANDIDATES: usize = 3;

/// Default search language
pub const DEFAULT_LANGUAGE: &str = "ja";

/// Maps search URL template
const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

/// Bytes left unescaped in map queries (unreserved characters and `/`)
const MAP_QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Placeholder asset URL (relative to the service root)
pub const PLACEHOLDER_URL: &str = "/static/images/placeholder_r1.png";

/// Rating shown when the provider has none
pub const NO_RATING: &str = "―";

/// Place ids already selected within one request
#[derive(Debug, Default)]
pub struct SeenSet {
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, place_id: &str) -> bool {
        self.ids.contains(place_id)
    }

    /// Record `place_id`; false if it was already present
    pub fn insert(&mut self, place_id: &str) -> bool {
        self.ids.insert(place_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Place rating: a provider score, or `"―"` when absent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rating {
    Score(f64),
    Unrated,
}

impl From<Option<f64>> for Rating {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Rating::Unrated, Rating::Score)
    }
}

impl Serialize for Rating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Rating::Score(score) => serializer.serialize_f64(*score),
            Rating::Unrated => serializer.serialize_str(NO_RATING),
        }
    }
}

/// User-visible destination suggestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub name: String,
    pub addr: String,
    pub rating: Rating,
    pub url: String,
    pub photo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Suggestion {
    /// Single suggestion returned when no place could be selected
    pub fn placeholder(placeholder_url: &str) -> Self {
        Self {
            name: "観光地提案機能を有効にするには".to_string(),
            addr: "Google Maps APIキーを設定してください".to_string(),
            rating: Rating::Unrated,
            url: "#".to_string(),
            photo_url: placeholder_url.to_string(),
            note: Some("APIキー設定後、観光地の詳細情報が表示されます".to_string()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.url == "#" && self.note.is_some()
    }
}

/// Maps search link for a place
pub fn map_url(name: &str, address: &str) -> String {
    let query = format!("{} {}", name, address);
    format!("{}{}", MAPS_SEARCH_URL, utf8_percent_encode(&query, MAP_QUERY_SET))
}

/// Builds photo URLs that point at the photo proxy
#[derive(Debug, Clone)]
pub struct PhotoLinks {
    /// Absolute base (`https://host`) or empty for root-relative links
    public_base_url: String,
    placeholder_url: String,
}

impl PhotoLinks {
    pub fn new(public_base_url: Option<&str>) -> Self {
        Self {
            public_base_url: public_base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            placeholder_url: PLACEHOLDER_URL.to_string(),
        }
    }

    pub fn placeholder_url(&self) -> &str {
        &self.placeholder_url
    }

    /// Proxy URL for a photo reference, or the placeholder
    pub fn url_for(&self, photo_reference: Option<&str>) -> String {
        match photo_reference.filter(|r| !r.is_empty()) {
            Some(reference) => format!("{}/proxy-photo/{}", self.public_base_url, reference),
            None => self.placeholder_url.clone(),
        }
    }

    /// Never hand the client a link to its own upload
    pub fn guard_upload(&self, photo_url: String, upload: &Path) -> String {
        let upload_path = upload.to_string_lossy();
        let upload_name = upload
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let leaks_path = !upload_path.is_empty() && photo_url.contains(upload_path.as_ref());
        let leaks_name = !upload_name.is_empty() && photo_url.contains(&upload_name);
        if leaks_path || leaks_name {
            warn!(photo_url = %photo_url, "Photo URL referenced the upload, using placeholder");
            return self.placeholder_url.clone();
        }
        photo_url
    }
}

/// Query → deduplicated suggestion list
pub struct SuggestionSelector {
    search: Arc<dyn PlaceSearch>,
    cache: QueryCache,
    language: String,
    links: PhotoLinks,
}

impl SuggestionSelector {
    pub fn new(search: Arc<dyn PlaceSearch>, cache: QueryCache, links: PhotoLinks) -> Self {
        Self {
            search,
            cache,
            language: DEFAULT_LANGUAGE.to_string(),
            links,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn links(&self) -> &PhotoLinks {
        &self.links
    }

    pub fn is_configured(&self) -> bool {
        self.search.is_configured()
    }

    /// Candidates for one query; search failures degrade to an empty list
    pub async fn candidates(&self, query: &str) -> CachedCandidates {
        match self
            .cache
            .get_or_fetch(query, &self.language, self.fetch(query))
            .await
        {
            Ok(candidates) => candidates,
            Err(SearchError::NotConfigured) => {
                debug!(query = %query, "Places search not configured");
                Arc::new(Vec::new())
            }
            Err(e) => {
                warn!(query = %query, error = %e, "Places search failed");
                Arc::new(Vec::new())
            }
        }
    }

    async fn fetch(&self, query: &str) -> Result<Vec<PlaceCandidate>, SearchError> {
        let found = self.search.text_search(query, &self.language).await?;

        let mut enriched = Vec::with_capacity(TOP_CANDIDATES);
        for candidate in found.into_iter().take(TOP_CANDIDATES) {
            enriched.push(self.enrich(candidate).await);
        }
        Ok(enriched)
    }

    /// Best-effort details lookup; the plain candidate survives any failure
    async fn enrich(&self, candidate: PlaceCandidate) -> PlaceCandidate {
        let Some(place_id) = candidate.place_id.as_deref() else {
            return candidate;
        };

        match self.search.details(place_id, &self.language).await {
            Ok(mut details) => {
                if details.place_id.is_none() {
                    details.place_id = candidate.place_id.clone();
                }
                if details.photo_reference.is_none() {
                    details.photo_reference = candidate.photo_reference.clone();
                }
                details
            }
            Err(e) => {
                debug!(place_id = %place_id, error = %e, "Place details unavailable");
                candidate
            }
        }
    }

    /// One new candidate per query, in query order
    pub async fn select(&self, queries: &[String]) -> Vec<PlaceCandidate> {
        let mut seen = SeenSet::new();
        let mut selected = Vec::new();

        for (i, query) in queries.iter().enumerate() {
            let n = i + 1;
            let candidates = self.candidates(query).await;

            let mut skipped: Option<&PlaceCandidate> = None;
            let mut chosen: Option<&PlaceCandidate> = None;
            for candidate in candidates.iter() {
                match candidate.place_id.as_deref() {
                    Some(id) if seen.contains(id) => {
                        skipped.get_or_insert(candidate);
                    }
                    Some(id) => {
                        seen.insert(id);
                        chosen = Some(candidate);
                        break;
                    }
                    None => {
                        chosen = Some(candidate);
                        break;
                    }
                }
            }

            match (chosen, skipped) {
                (Some(place), Some(dup)) => {
                    info!(query = n, duplicate = %dup.name, place = %place.name, "Query selected place after duplicate");
                    selected.push(place.clone());
                }
                (Some(place), None) => {
                    info!(query = n, place = %place.name, "Query selected place");
                    selected.push(place.clone());
                }
                (None, _) => info!(query = n, "Query found no new place"),
            }
        }

        selected
    }

    /// Full selection for a request, including the placeholder fallback
    pub async fn suggest(&self, queries: &[String], upload: &Path) -> Vec<Suggestion> {
        let selected = self.select(queries).await;
        if selected.is_empty() {
            info!("No places selected, returning configuration hint");
            return vec![Suggestion::placeholder(self.links.placeholder_url())];
        }

        selected
            .into_iter()
            .map(|place| {
                let photo_url = self
                    .links
                    .guard_upload(self.links.url_for(place.photo_reference.as_deref()), upload);
                Suggestion {
                    url: map_url(&place.name, &place.address),
                    rating: place.rating.into(),
                    name: place.name,
                    addr: place.address,
                    photo_url,
                    note: None,
                }
            })
            .collect()
    }
}
