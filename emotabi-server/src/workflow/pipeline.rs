//! Analysis pipeline: stored image → response
//!
//! Fusion → vocabulary → queries → dedup selection → response body. Only
//! fusion can fail; search problems degrade to the placeholder suggestion.

use super::{AnalyzeStage, StageTracker};
use crate::analyzers::object_analyzer::NO_OBJECT_LABEL;
use crate::fusion::{build_queries, FusedAnalysis, FusionError, FusionExecutor};
use crate::search::{Suggestion, SuggestionSelector};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shown as the object emotion when nothing was detected
pub const NOT_DETECTED: &str = "検出されませんでした";

/// Validated request with its stored image
#[derive(Debug, Clone)]
pub struct AnalyzeInput {
    pub region: String,
    pub purpose: String,
    pub image_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDetails {
    pub label: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorDetails {
    pub palette: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtmosphereDetails {
    pub caption_ja: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseDetails {
    pub object: ObjectDetails,
    pub color: ColorDetails,
    pub atmosphere: AtmosphereDetails,
}

/// `/analyze` response body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeResponse {
    pub object_emotion: String,
    pub color_emotion: String,
    pub atmosphere_emotion: String,
    pub suggestions: Vec<Suggestion>,
    pub processing_time: String,
    pub details: ResponseDetails,
}

pub struct AnalyzePipeline {
    fusion: Arc<FusionExecutor>,
    selector: Arc<SuggestionSelector>,
}

impl AnalyzePipeline {
    pub fn new(fusion: Arc<FusionExecutor>, selector: Arc<SuggestionSelector>) -> Self {
        Self { fusion, selector }
    }

    /// Run from `ImageStored` to `Responded`
    pub async fn run(
        &self,
        tracker: &mut StageTracker,
        input: &AnalyzeInput,
    ) -> Result<AnalyzeResponse, FusionError> {
        let fused = match self.fusion.run(&input.image_path).await {
            Ok(fused) => fused,
            Err(e) => {
                tracker.fail(e.to_string());
                return Err(e);
            }
        };
        tracker.advance(AnalyzeStage::Analyzed);

        info!(
            region = %input.region,
            purpose = %input.purpose,
            color = %fused.color.emotion,
            object = %object_display(&fused),
            atmosphere = %fused.atmosphere.emotion,
            "Emotion analysis results"
        );

        let vocabulary = fused.vocabulary();
        tracker.advance(AnalyzeStage::VocabularyBuilt);

        let queries = build_queries(&input.region, &input.purpose, &vocabulary);
        tracker.advance(AnalyzeStage::Queried);

        let suggestions = self.selector.suggest(&queries, &input.image_path).await;
        tracker.advance(AnalyzeStage::Deduplicated);

        let response = build_response(&fused, suggestions, tracker.started().elapsed().as_secs_f64());
        tracker.advance(AnalyzeStage::Responded);
        Ok(response)
    }
}

fn object_display(fused: &FusedAnalysis) -> String {
    let object = &fused.object;
    if object.is_failure() && object.meta_str("label") == Some(NO_OBJECT_LABEL) {
        NOT_DETECTED.to_string()
    } else {
        object.emotion.clone()
    }
}

/// Assemble the response body
pub fn build_response(
    fused: &FusedAnalysis,
    suggestions: Vec<Suggestion>,
    elapsed_secs: f64,
) -> AnalyzeResponse {
    let palette = fused
        .color
        .metadata
        .get("palette")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    AnalyzeResponse {
        object_emotion: object_display(fused),
        color_emotion: fused.color.emotion.clone(),
        atmosphere_emotion: fused.atmosphere.emotion.clone(),
        suggestions,
        processing_time: format!("{:.2}s", elapsed_secs),
        details: ResponseDetails {
            object: ObjectDetails {
                label: fused.object.meta_str("label").map(str::to_string),
                source: fused.object.meta_str("source").map(str::to_string),
            },
            color: ColorDetails { palette },
            atmosphere: AtmosphereDetails {
                caption_ja: fused.atmosphere.meta_str("caption").unwrap_or_default().to_string(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::selector::PLACEHOLDER_URL;
    use crate::types::{AnalysisResult, AnalyzerSource};

    fn fused(object: AnalysisResult) -> FusedAnalysis {
        FusedAnalysis {
            object,
            color: AnalysisResult::new(AnalyzerSource::Color, "穏やかな")
                .with_metadata("palette", vec!["#112233", "#445566"]),
            atmosphere: AnalysisResult::new(AnalyzerSource::Atmosphere, "静かな")
                .with_metadata("caption", "静かな湖"),
        }
    }

    #[test]
    fn test_not_detected_display() {
        let object = AnalysisResult::failed(AnalyzerSource::Object)
            .with_metadata("label", NO_OBJECT_LABEL)
            .with_metadata("source", "detection");
        let response = build_response(&fused(object), vec![], 1.234);

        assert_eq!(response.object_emotion, NOT_DETECTED);
        assert_eq!(response.processing_time, "1.23s");
        assert_eq!(response.details.object.label.as_deref(), Some("no_object"));
    }

    #[test]
    fn test_other_failures_show_sentinel() {
        let object = AnalysisResult::failed(AnalyzerSource::Object).with_metadata("label", "no_model");
        let response = build_response(&fused(object), vec![], 0.0);
        assert_eq!(response.object_emotion, "api error");
    }

    #[test]
    fn test_details_shape() {
        let object = AnalysisResult::new(AnalyzerSource::Object, "楽しい")
            .with_metadata("label", "dog")
            .with_metadata("source", "detection");
        let response = build_response(
            &fused(object),
            vec![Suggestion::placeholder(PLACEHOLDER_URL)],
            0.5,
        );
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["details"]["color"]["palette"][1], "#445566");
        assert_eq!(value["details"]["atmosphere"]["caption_ja"], "静かな湖");
        assert_eq!(value["details"]["object"]["source"], "detection");
        assert_eq!(value["suggestions"].as_array().unwrap().len(), 1);
        assert_eq!(value["processing_time"], "0.50s");
    }
}
