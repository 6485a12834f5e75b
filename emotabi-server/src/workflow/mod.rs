//! `/analyze` request workflow
//!
//! # Stages
//! ```text
//! ReceivedInput → Validated → ImageStored → Analyzed → VocabularyBuilt
//!              → Queried → Deduplicated → Responded
//! ```
//! Any non-terminal stage may move to `Failed(reason)`. Nothing is retried.

pub mod pipeline;

pub use pipeline::{AnalyzeInput, AnalyzePipeline, AnalyzeResponse};

use std::fmt;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Stage of one `/analyze` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeStage {
    ReceivedInput,
    Validated,
    ImageStored,
    Analyzed,
    VocabularyBuilt,
    Queried,
    Deduplicated,
    Responded,
    Failed(String),
}

impl AnalyzeStage {
    fn ordinal(&self) -> Option<u8> {
        match self {
            AnalyzeStage::ReceivedInput => Some(0),
            AnalyzeStage::Validated => Some(1),
            AnalyzeStage::ImageStored => Some(2),
            AnalyzeStage::Analyzed => Some(3),
            AnalyzeStage::VocabularyBuilt => Some(4),
            AnalyzeStage::Queried => Some(5),
            AnalyzeStage::Deduplicated => Some(6),
            AnalyzeStage::Responded => Some(7),
            AnalyzeStage::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalyzeStage::Responded | AnalyzeStage::Failed(_))
    }

    /// Valid transitions: the next stage in sequence, or `Failed` from any
    /// non-terminal stage
    pub fn can_advance_to(&self, next: &AnalyzeStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), next.ordinal()) {
            (_, None) => true,
            (Some(current), Some(next)) => next == current + 1,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for AnalyzeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzeStage::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Tracks and logs the stage of one request
#[derive(Debug)]
pub struct StageTracker {
    request_id: Uuid,
    stage: AnalyzeStage,
    started: Instant,
}

impl StageTracker {
    pub fn new() -> Self {
        let tracker = Self {
            request_id: Uuid::new_v4(),
            stage: AnalyzeStage::ReceivedInput,
            started: Instant::now(),
        };
        info!(request_id = %tracker.request_id, "Analyze request received");
        tracker
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn stage(&self) -> &AnalyzeStage {
        &self.stage
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Move to `next`; invalid transitions are logged and ignored
    pub fn advance(&mut self, next: AnalyzeStage) {
        if !self.stage.can_advance_to(&next) {
            warn!(
                request_id = %self.request_id,
                from = %self.stage,
                to = %next,
                "Ignoring invalid stage transition"
            );
            return;
        }
        info!(
            request_id = %self.request_id,
            from = %self.stage,
            to = %next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Stage transition"
        );
        self.stage = next;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.advance(AnalyzeStage::Failed(reason.into()));
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_transitions() {
        assert!(AnalyzeStage::ReceivedInput.can_advance_to(&AnalyzeStage::Validated));
        assert!(AnalyzeStage::Deduplicated.can_advance_to(&AnalyzeStage::Responded));
        assert!(!AnalyzeStage::ReceivedInput.can_advance_to(&AnalyzeStage::Analyzed));
        assert!(!AnalyzeStage::Queried.can_advance_to(&AnalyzeStage::Validated));
    }

    #[test]
    fn test_failure_from_any_open_stage() {
        assert!(AnalyzeStage::ImageStored.can_advance_to(&AnalyzeStage::Failed("x".into())));
        assert!(!AnalyzeStage::Responded.can_advance_to(&AnalyzeStage::Failed("x".into())));
        assert!(!AnalyzeStage::Failed("a".into()).can_advance_to(&AnalyzeStage::Validated));
    }

    #[test]
    fn test_tracker_ignores_skips() {
        let mut tracker = StageTracker::new();
        tracker.advance(AnalyzeStage::Queried);
        assert_eq!(tracker.stage(), &AnalyzeStage::ReceivedInput);

        tracker.advance(AnalyzeStage::Validated);
        tracker.fail("fusion timed out");
        assert!(tracker.stage().is_terminal());

        tracker.advance(AnalyzeStage::ImageStored);
        assert!(matches!(tracker.stage(), AnalyzeStage::Failed(_)));
    }
}
