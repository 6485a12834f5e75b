//! Core Types and Trait Definitions
//!
//! Defines the analyzer capability shared by the three emotion sources and the
//! result type the fusion executor collects.
//!
//! # Sentinel
//! Analyzers degrade to [`FAILURE_SENTINEL`] instead of failing: a label of
//! `"api error"` means "this source produced nothing usable". An `Err` from
//! [`EmotionAnalyzer::analyze`] is reserved for unexpected failures and
//! aborts the whole fusion stage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Reserved label marking "no usable result" from an analyzer
pub const FAILURE_SENTINEL: &str = "api error";

/// Emotion source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerSource {
    Color,
    Object,
    Atmosphere,
}

impl AnalyzerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerSource::Color => "color",
            AnalyzerSource::Object => "object",
            AnalyzerSource::Atmosphere => "atmosphere",
        }
    }
}

impl fmt::Display for AnalyzerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one analyzer invocation
///
/// Created once per invocation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub source: AnalyzerSource,
    /// Natural-language descriptor or [`FAILURE_SENTINEL`]
    pub emotion: String,
    /// Source-specific auxiliary data (palette, label, caption...)
    pub metadata: HashMap<String, Value>,
}

impl AnalysisResult {
    pub fn new(source: AnalyzerSource, emotion: impl Into<String>) -> Self {
        Self {
            source,
            emotion: emotion.into(),
            metadata: HashMap::new(),
        }
    }

    /// Sentinel result for a source that produced nothing usable
    pub fn failed(source: AnalyzerSource) -> Self {
        Self::new(source, FAILURE_SENTINEL)
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        is_sentinel(&self.emotion)
    }

    /// String metadata lookup
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// True for empty labels and the failure sentinel (case-insensitive)
pub fn is_sentinel(label: &str) -> bool {
    let trimmed = label.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(FAILURE_SENTINEL)
}

/// Emotion analyzer capability
///
/// Implementations convert their own recoverable failures (missing keys,
/// unreadable images, empty model replies) into a sentinel result. Returning
/// `Err` signals that the analyzer itself is broken or unavailable.
#[async_trait::async_trait]
pub trait EmotionAnalyzer: Send + Sync {
    /// Source this analyzer reports as
    fn source(&self) -> AnalyzerSource;

    /// Analyze the image at `image_path`
    async fn analyze(&self, image_path: &Path) -> Result<AnalysisResult, AnalyzerError>;

    /// Check if analyzer dependencies are configured (keys, tables, commands)
    fn is_available(&self) -> bool {
        true
    }
}

/// Unexpected analyzer failure
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Blocking worker failed or panicked
    #[error("Worker failed: {0}")]
    Worker(String),

    /// Internal processing error
    #[error("Internal error: {0}")]
    Internal(String),
}
