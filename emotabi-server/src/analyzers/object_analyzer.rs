//! Object source
//!
//! Finds a label for the photo and maps it to an emotion word through the
//! language model. Label strategies are tried in order:
//!
//! 1. **Detection** - strongest object from the detector
//! 2. **Scene** - vision model picks one of [`SCENE_LABELS`]
//!
//! The first strategy whose label maps to a usable emotion wins. When every
//! strategy misses, the result is the sentinel and the first strategy's miss
//! reason (`no_object`, `low_confidence`, `no_model`, `invalid_image`) is
//! reported as the label.

use crate::services::llm_client::image_data_url;
use crate::services::{ChatMessage, ChatModel, ChatRequest, DetectorError, ObjectDetector};
use crate::types::{is_sentinel, AnalysisResult, AnalyzerError, AnalyzerSource, EmotionAnalyzer};
use moka::future::Cache;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Best detection must reach this confidence to be used
pub const DETECTION_CONFIDENCE: f32 = 0.25;

/// Capacity of the label → emotion cache
pub const LABEL_CACHE_CAPACITY: u64 = 256;

/// Scene classes offered to the vision model
pub const SCENE_LABELS: [&str; 17] = [
    "mountain",
    "lake",
    "sea",
    "forest",
    "temple",
    "shrine",
    "castle",
    "tower",
    "city skyline",
    "night view",
    "sunset",
    "waterfall",
    "park",
    "river",
    "snow",
    "desert",
    "island",
];

/// Label shown for a source that found nothing
pub const NO_OBJECT_LABEL: &str = "no_object";

/// Where a label came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    Detection,
    Scene,
}

impl LabelSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelSource::Detection => "detection",
            LabelSource::Scene => "scene",
        }
    }
}

/// A proposed label
#[derive(Debug, Clone, PartialEq)]
pub struct FoundLabel {
    /// Term sent to the emotion mapping (`"dog"`, `"sunset"`)
    pub term: String,
    pub source: LabelSource,
}

impl FoundLabel {
    /// Label as reported in metadata (`"dog"`, `"scene:sunset"`)
    pub fn display(&self) -> String {
        match self.source {
            LabelSource::Detection => self.term.clone(),
            LabelSource::Scene => format!("scene:{}", self.term),
        }
    }
}

/// Outcome of one strategy
#[derive(Debug, Clone, PartialEq)]
pub enum LabelOutcome {
    Found(FoundLabel),
    /// Nothing usable; carries the reason label
    Missed(String),
}

/// One way of finding a label for an image
#[async_trait::async_trait]
pub trait LabelStrategy: Send + Sync {
    fn source(&self) -> LabelSource;

    async fn propose(&self, image_path: &Path) -> LabelOutcome;
}

/// Strongest detected object
pub struct DetectionStrategy {
    detector: Arc<dyn ObjectDetector>,
}

impl DetectionStrategy {
    pub fn new(detector: Arc<dyn ObjectDetector>) -> Self {
        Self { detector }
    }
}

#[async_trait::async_trait]
impl LabelStrategy for DetectionStrategy {
    fn source(&self) -> LabelSource {
        LabelSource::Detection
    }

    async fn propose(&self, image_path: &Path) -> LabelOutcome {
        let detections = match self.detector.detect(image_path).await {
            Ok(detections) => detections,
            Err(DetectorError::NotAvailable(reason)) => {
                debug!(reason = %reason, "Object detection skipped");
                return LabelOutcome::Missed("no_model".into());
            }
            Err(DetectorError::InvalidImage(reason)) => {
                warn!(reason = %reason, "Detector could not read image");
                return LabelOutcome::Missed("invalid_image".into());
            }
            Err(e) => {
                warn!(error = %e, "Object detection failed");
                return LabelOutcome::Missed("error".into());
            }
        };

        let Some(best) = detections
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        else {
            return LabelOutcome::Missed(NO_OBJECT_LABEL.into());
        };

        if best.confidence < DETECTION_CONFIDENCE {
            return LabelOutcome::Missed("low_confidence".into());
        }

        info!(label = %best.label, confidence = best.confidence, "Object detected");
        LabelOutcome::Found(FoundLabel {
            term: best.label.clone(),
            source: LabelSource::Detection,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SceneReply {
    #[serde(default)]
    scene: String,
}

/// Whole-scene classification by the vision model
pub struct SceneStrategy {
    llm: Arc<dyn ChatModel>,
    timeout: Duration,
}

impl SceneStrategy {
    pub fn new(llm: Arc<dyn ChatModel>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    fn request(&self, image_url: &str) -> ChatRequest {
        let prompt = format!(
            "次の候補から写真に最も当てはまるシーンを1つ選び、{{\"scene\":\"<label>\"}} のJSONのみで出力してください。\n候補: {}",
            SCENE_LABELS.join(", ")
        );
        ChatRequest::new(vec![
            ChatMessage::system("あなたは写真のシーンを判定する分類器です。出力はJSONのみで、説明は不要です。"),
            ChatMessage::user_with_image(prompt, image_url),
        ])
        .temperature(0.2)
        .max_tokens(20)
        .json()
        .timeout(self.timeout)
    }
}

#[async_trait::async_trait]
impl LabelStrategy for SceneStrategy {
    fn source(&self) -> LabelSource {
        LabelSource::Scene
    }

    async fn propose(&self, image_path: &Path) -> LabelOutcome {
        if !self.llm.is_configured() {
            return LabelOutcome::Missed(NO_OBJECT_LABEL.into());
        }

        let image_url = match image_data_url(image_path).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot read image for scene classification");
                return LabelOutcome::Missed("invalid_image".into());
            }
        };

        let reply = match self.llm.complete(self.request(&image_url)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Scene classification failed");
                return LabelOutcome::Missed(NO_OBJECT_LABEL.into());
            }
        };

        match serde_json::from_str::<SceneReply>(&reply) {
            Ok(SceneReply { scene }) if !scene.trim().is_empty() => {
                info!(scene = %scene.trim(), "Scene classified");
                LabelOutcome::Found(FoundLabel {
                    term: scene.trim().to_string(),
                    source: LabelSource::Scene,
                })
            }
            _ => {
                debug!(reply = %reply, "Unusable scene reply");
                LabelOutcome::Missed(NO_OBJECT_LABEL.into())
            }
        }
    }
}

/// Object emotion analyzer
pub struct ObjectAnalyzer {
    strategies: Vec<Box<dyn LabelStrategy>>,
    llm: Arc<dyn ChatModel>,
    mapping_timeout: Duration,
    emotions: Cache<String, String>,
}

impl ObjectAnalyzer {
    /// Detection first, scene classification second
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        llm: Arc<dyn ChatModel>,
        vision_timeout: Duration,
        mapping_timeout: Duration,
    ) -> Self {
        let strategies: Vec<Box<dyn LabelStrategy>> = vec![
            Box::new(DetectionStrategy::new(detector)),
            Box::new(SceneStrategy::new(Arc::clone(&llm), vision_timeout)),
        ];
        Self::with_strategies(strategies, llm, mapping_timeout)
    }

    pub fn with_strategies(
        strategies: Vec<Box<dyn LabelStrategy>>,
        llm: Arc<dyn ChatModel>,
        mapping_timeout: Duration,
    ) -> Self {
        Self {
            strategies,
            llm,
            mapping_timeout,
            emotions: Cache::new(LABEL_CACHE_CAPACITY),
        }
    }

    /// Map a label to one emotion word; only usable answers are cached
    pub async fn emotion_for_label(&self, label: &str) -> Option<String> {
        self.emotions
            .optionally_get_with(label.to_string(), self.ask_emotion(label))
            .await
    }

    async fn ask_emotion(&self, label: &str) -> Option<String> {
        let prompt = format!(
            "物体「{}」を見たときに多くの人が直感的に抱く一般的な感情を、日本語の形容詞または形容動詞で一語だけ答えてください（例: 穏やかな, 壮大な, 静かな）。名詞や句は不可。",
            label
        );
        let request = ChatRequest::new(vec![ChatMessage::user(prompt)])
            .temperature(0.1)
            .max_tokens(5)
            .timeout(self.mapping_timeout);

        match self.llm.complete(request).await {
            Ok(reply) => {
                let emotion = strip_quotes(&reply);
                (!is_sentinel(emotion)).then(|| emotion.to_string())
            }
            Err(e) => {
                warn!(label = %label, error = %e, "Label emotion mapping failed");
                None
            }
        }
    }
}

/// Strip surrounding `「」` and `"` from a model reply
pub fn strip_quotes(reply: &str) -> &str {
    reply
        .trim()
        .trim_matches(|c| matches!(c, '「' | '」' | '"'))
        .trim()
}

#[async_trait::async_trait]
impl EmotionAnalyzer for ObjectAnalyzer {
    fn source(&self) -> AnalyzerSource {
        AnalyzerSource::Object
    }

    async fn analyze(&self, image_path: &Path) -> Result<AnalysisResult, AnalyzerError> {
        let mut first_miss: Option<(String, LabelSource)> = None;

        for strategy in &self.strategies {
            match strategy.propose(image_path).await {
                LabelOutcome::Found(found) => {
                    let label = found.display();
                    if let Some(emotion) = self.emotion_for_label(&found.term).await {
                        info!(label = %label, emotion = %emotion, "Object emotion resolved");
                        return Ok(AnalysisResult::new(AnalyzerSource::Object, emotion)
                            .with_metadata("label", label)
                            .with_metadata("source", found.source.as_str()));
                    }
                    first_miss.get_or_insert((label, found.source));
                }
                LabelOutcome::Missed(reason) => {
                    debug!(strategy = strategy.source().as_str(), reason = %reason, "Label strategy missed");
                    first_miss.get_or_insert((reason, strategy.source()));
                }
            }
        }

        let (label, source) =
            first_miss.unwrap_or_else(|| (NO_OBJECT_LABEL.to_string(), LabelSource::Detection));
        Ok(AnalysisResult::failed(AnalyzerSource::Object)
            .with_metadata("label", label)
            .with_metadata("source", source.as_str()))
    }

    fn is_available(&self) -> bool {
        self.llm.is_configured()
    }
}
