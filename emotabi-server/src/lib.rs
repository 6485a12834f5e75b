//! emotabi-server library interface
//!
//! Photo → emotion → destination suggestions. Exposes the application state
//! and router for the binary and for integration tests.

pub mod analyzers;
pub mod api;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fusion;
pub mod search;
pub mod services;
pub mod types;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use crate::analyzers::{color_table, AtmosphereAnalyzer, ColorAnalyzer, ObjectAnalyzer};
use crate::config::{ServiceConfig, MAX_BODY_BYTES};
use crate::diagnostics::CapabilityReport;
use crate::fusion::FusionExecutor;
use crate::search::{PhotoLinks, PhotoProxy, QueryCache, SuggestionSelector};
use crate::services::{
    ChatModel, CommandDetector, GooglePlacesClient, LlmClient, PlaceSearch, SearchError,
};
use crate::types::AnalyzerSource;
use crate::workflow::AnalyzePipeline;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub fusion: Arc<FusionExecutor>,
    pub selector: Arc<SuggestionSelector>,
    pub pipeline: Arc<AnalyzePipeline>,
    pub photos: Arc<PhotoProxy>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Assemble state from explicit collaborators
    pub fn new(config: ServiceConfig, fusion: FusionExecutor, search: Arc<dyn PlaceSearch>) -> Self {
        let fusion = Arc::new(fusion.with_deadline(config.fusion_deadline));
        let links = PhotoLinks::new(config.public_base_url.as_deref());
        let selector = Arc::new(
            SuggestionSelector::new(
                Arc::clone(&search),
                QueryCache::new(config.query_cache_capacity),
                links,
            )
            .with_language(config.language.clone()),
        );
        let photos = Arc::new(PhotoProxy::new(search, config.placeholder_path.clone()));
        let pipeline = Arc::new(AnalyzePipeline::new(Arc::clone(&fusion), Arc::clone(&selector)));

        Self {
            config: Arc::new(config),
            fusion,
            selector,
            pipeline,
            photos,
            startup_time: Utc::now(),
        }
    }

    /// Production wiring: remote clients built from `config`
    pub fn from_config(config: ServiceConfig) -> Result<Self, SearchError> {
        let llm: Arc<dyn ChatModel> = Arc::new(LlmClient::new(config.openai_api_key.clone()));
        let detector = Arc::new(CommandDetector::new(
            config.detector_command.clone(),
            config.detector_timeout,
        ));
        let search: Arc<dyn PlaceSearch> = Arc::new(GooglePlacesClient::new(
            config.google_maps_api_key.clone(),
            config.search_timeout,
        )?);

        let table_paths = color_table::candidate_paths(
            config.color_table_path.as_deref(),
            &config.root_folder,
        );
        let fusion = FusionExecutor::new(
            Arc::new(ObjectAnalyzer::new(
                detector,
                Arc::clone(&llm),
                config.vision_timeout,
                config.mapping_timeout,
            )),
            Arc::new(ColorAnalyzer::new(table_paths)),
            Arc::new(AtmosphereAnalyzer::new(llm, config.vision_timeout)),
        );

        Ok(Self::new(config, fusion, search))
    }

    /// Current capability snapshot
    pub fn capabilities(&self) -> CapabilityReport {
        let color_available = self
            .fusion
            .availability()
            .iter()
            .any(|(source, available)| *source == AnalyzerSource::Color && *available);
        CapabilityReport::collect(&self.config, color_available)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .merge(api::ui_routes())
        .merge(api::analyze_routes())
        .merge(api::photo_routes())
        .merge(api::health_routes())
        .nest_service("/static", static_files)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
