//! Emotion Fusion
//!
//! Runs the three analyzers concurrently under one deadline and turns their
//! labels into search queries.
//!
//! - **mod** (this file) - [`FusionExecutor`], concurrent analyzer execution
//! - **vocabulary** - Valid emotion words in fixed source order
//! - **queries** - Search query permutations
//!
//! # Failure Policy
//! Analyzers degrade to the sentinel internally; an `Err` or a panic from
//! any analyzer fails the whole fusion immediately. Sibling tasks are then
//! detached (left to finish, results discarded). When the deadline elapses
//! every outstanding task is aborted.

pub mod queries;
pub mod vocabulary;

pub use queries::{build_queries, FALLBACK_SUFFIXES};
pub use vocabulary::EmotionVocabulary;

use crate::types::{AnalysisResult, AnalyzerSource, EmotionAnalyzer};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default deadline for the three analyzers together
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Fusion failures (all abort the request)
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("{analyzer} analyzer failed: {message}")]
    Analyzer {
        analyzer: AnalyzerSource,
        message: String,
    },

    #[error("Emotion analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analyzer task panicked: {0}")]
    Panicked(String),
}

/// The three analyzer results of one request
#[derive(Debug, Clone)]
pub struct FusedAnalysis {
    pub object: AnalysisResult,
    pub color: AnalysisResult,
    pub atmosphere: AnalysisResult,
}

impl FusedAnalysis {
    /// Emotion labels in vocabulary order [object, color, atmosphere]
    pub fn labels(&self) -> [&str; 3] {
        [
            self.object.emotion.as_str(),
            self.color.emotion.as_str(),
            self.atmosphere.emotion.as_str(),
        ]
    }

    pub fn vocabulary(&self) -> EmotionVocabulary {
        let [object, color, atmosphere] = self.labels();
        EmotionVocabulary::build(object, color, atmosphere)
    }
}

/// Concurrent executor over the three analyzers
///
/// # Example
/// ```rust,ignore
/// let executor = FusionExecutor::new(object, color, atmosphere)
///     .with_deadline(Duration::from_secs(30));
/// let fused = executor.run(&image_path).await?;
/// let vocabulary = fused.vocabulary();
/// ```
#[derive(Clone)]
pub struct FusionExecutor {
    object: Arc<dyn EmotionAnalyzer>,
    color: Arc<dyn EmotionAnalyzer>,
    atmosphere: Arc<dyn EmotionAnalyzer>,
    deadline: Duration,
}

impl FusionExecutor {
    pub fn new(
        object: Arc<dyn EmotionAnalyzer>,
        color: Arc<dyn EmotionAnalyzer>,
        atmosphere: Arc<dyn EmotionAnalyzer>,
    ) -> Self {
        Self {
            object,
            color,
            atmosphere,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Availability of each analyzer, in vocabulary order
    pub fn availability(&self) -> [(AnalyzerSource, bool); 3] {
        [
            (AnalyzerSource::Object, self.object.is_available()),
            (AnalyzerSource::Color, self.color.is_available()),
            (AnalyzerSource::Atmosphere, self.atmosphere.is_available()),
        ]
    }

    /// Run all three analyzers against `image_path`
    pub async fn run(&self, image_path: &Path) -> Result<FusedAnalysis, FusionError> {
        let start = Instant::now();
        let mut tasks = JoinSet::new();

        // Slots are fixed by role, not by what the analyzer reports
        let slots = [
            (AnalyzerSource::Object, Arc::clone(&self.object)),
            (AnalyzerSource::Color, Arc::clone(&self.color)),
            (AnalyzerSource::Atmosphere, Arc::clone(&self.atmosphere)),
        ];
        for (slot, analyzer) in slots {
            let path = image_path.to_path_buf();
            tasks.spawn(async move {
                let task_start = Instant::now();
                let result = analyzer.analyze(&path).await;
                debug!(
                    source = %slot,
                    duration_ms = task_start.elapsed().as_millis() as u64,
                    "Analyzer finished"
                );
                (slot, result)
            });
        }

        match tokio::time::timeout(self.deadline, collect(&mut tasks)).await {
            Ok(Ok(fused)) => {
                info!(
                    object = %fused.object.emotion,
                    color = %fused.color.emotion,
                    atmosphere = %fused.atmosphere.emotion,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Emotion fusion complete"
                );
                Ok(fused)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Emotion fusion failed");
                tasks.detach_all();
                Err(e)
            }
            Err(_) => {
                warn!(deadline = ?self.deadline, "Emotion fusion deadline elapsed");
                tasks.abort_all();
                Err(FusionError::Timeout(self.deadline))
            }
        }
    }
}

async fn collect(
    tasks: &mut JoinSet<(AnalyzerSource, Result<AnalysisResult, crate::types::AnalyzerError>)>,
) -> Result<FusedAnalysis, FusionError> {
    let (mut object, mut color, mut atmosphere) = (None, None, None);

    while let Some(joined) = tasks.join_next().await {
        let (slot, outcome) = joined.map_err(|e| FusionError::Panicked(e.to_string()))?;
        let result = outcome.map_err(|e| FusionError::Analyzer {
            analyzer: slot,
            message: e.to_string(),
        })?;

        match slot {
            AnalyzerSource::Object => object = Some(result),
            AnalyzerSource::Color => color = Some(result),
            AnalyzerSource::Atmosphere => atmosphere = Some(result),
        }
    }

    match (object, color, atmosphere) {
        (Some(object), Some(color), Some(atmosphere)) => Ok(FusedAnalysis {
            object,
            color,
            atmosphere,
        }),
        _ => Err(FusionError::Panicked("analyzer task vanished".to_string())),
    }
}
