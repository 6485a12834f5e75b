//! Atmosphere source
//!
//! Two language-model stages:
//! 1. Vision caption of the photo in English
//! 2. Caption rewrite, Japanese translation and one-word emotion (JSON reply)
//!
//! Stage 2 replies are parsed tolerantly. When only the emotion could be
//! recovered, a separate translation request fills in the captions.

use crate::services::llm_client::image_data_url;
use crate::services::{ChatMessage, ChatModel, ChatRequest};
use crate::types::{is_sentinel, AnalysisResult, AnalyzerError, AnalyzerSource, EmotionAnalyzer};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shown when no Japanese caption is available
const CAPTION_UNAVAILABLE: &str = "キャプション生成に失敗しました";

/// Stage 2 reply
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptionAnalysis {
    pub improved_caption_en: String,
    pub translated_caption_jp: String,
    pub extracted_emotion: String,
}

/// Result of parsing a stage 2 reply
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCaption {
    /// A JSON object was recovered
    Complete(CaptionAnalysis),
    /// Only the emotion word (possibly empty) could be salvaged
    EmotionOnly(String),
}

fn object_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?s)\{.*\}",
            r#"\{[^}]*"improved_caption_en"[^}]*"extracted_emotion"[^}]*\}"#,
            r#"\{[^}]*"extracted_emotion"[^}]*\}"#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn emotion_field() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#""extracted_emotion"\s*:\s*"([^"]+)""#).ok())
        .as_ref()
}

fn japanese_adjective() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[ぁ-んァ-ヶー一-龯]{2,6}(?:い|な|的)").ok())
        .as_ref()
}

/// Parse a stage 2 reply
///
/// Tries, in order: the whole reply as JSON, embedded JSON objects carrying
/// `extracted_emotion`, the `extracted_emotion` value alone, and finally any
/// short Japanese adjective-like token.
pub fn parse_caption_analysis(content: &str) -> ParsedCaption {
    if let Ok(analysis) = serde_json::from_str::<CaptionAnalysis>(content) {
        return ParsedCaption::Complete(analysis);
    }

    for pattern in object_patterns() {
        let Some(m) = pattern.find(content) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(m.as_str()) else {
            continue;
        };
        if value.get("extracted_emotion").is_some() {
            if let Ok(analysis) = serde_json::from_value::<CaptionAnalysis>(value) {
                return ParsedCaption::Complete(analysis);
            }
        }
    }

    let emotion = emotion_field()
        .and_then(|re| re.captures(content))
        .and_then(|c| c.get(1))
        .or_else(|| japanese_adjective().and_then(|re| re.find(content)))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    ParsedCaption::EmotionOnly(emotion)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TranslationReply {
    improved_caption_en: Option<String>,
    translated_caption_jp: Option<String>,
}

/// Atmosphere emotion analyzer
pub struct AtmosphereAnalyzer {
    llm: Arc<dyn ChatModel>,
    timeout: Duration,
}

impl AtmosphereAnalyzer {
    pub fn new(llm: Arc<dyn ChatModel>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    async fn caption(&self, image_path: &Path) -> Option<String> {
        let image_url = match image_data_url(image_path).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot read image for captioning");
                return None;
            }
        };

        let request = ChatRequest::new(vec![
            ChatMessage::system("あなたは画像を詳細に説明するシステムです。画像の内容を簡潔に英語で説明してください。"),
            ChatMessage::user_with_image("この画像の内容を簡潔な英語で説明してください。", &image_url),
        ])
        .temperature(0.3)
        .max_tokens(100)
        .timeout(self.timeout);

        match self.llm.complete(request).await {
            Ok(caption) if !caption.trim().is_empty() => Some(caption.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Caption generation failed");
                None
            }
        }
    }

    async fn describe(&self, caption_en: &str) -> Option<CaptionAnalysis> {
        let system = "あなたは画像キャプションの要約と翻訳の専門家です。出力はJSONのみとし、説明文やコードフェンスを含めないでください。\
                      すべてのキーを必ず含め、値は1行で簡潔にしてください。\
                      improved_caption_enは自然で簡潔な英語（最大180文字）、translated_caption_jpは自然な日本語（最大120文字）、\
                      extracted_emotionは日本語の形容詞または形容動詞を一語のみ（例: 穏やかな, 壮大な, 静かな）。";
        let user = format!(
            "次の英語キャプションを基に improved_caption_en, translated_caption_jp, extracted_emotion を作成してください。\n\n入力:\n{}\n\n\
             形式: {{\"improved_caption_en\":\"...\", \"translated_caption_jp\":\"...\", \"extracted_emotion\":\"...\"}}",
            caption_en
        );
        let request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .temperature(0.2)
            .max_tokens(240)
            .json()
            .timeout(self.timeout);

        let content = match self.llm.complete(request).await {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Caption processing failed");
                return None;
            }
        };

        match parse_caption_analysis(&content) {
            ParsedCaption::Complete(analysis) => Some(analysis),
            ParsedCaption::EmotionOnly(emotion) => {
                debug!(reply = %content, "Caption reply was not JSON, salvaging emotion");
                let translation = self.translate(caption_en).await.unwrap_or_default();
                Some(CaptionAnalysis {
                    improved_caption_en: translation.improved_caption_en.unwrap_or_default(),
                    translated_caption_jp: translation
                        .translated_caption_jp
                        .unwrap_or_else(|| "—".to_string()),
                    extracted_emotion: emotion,
                })
            }
        }
    }

    /// Secondary request for the caption fields only
    async fn translate(&self, caption_en: &str) -> Option<TranslationReply> {
        let user = format!(
            "次の英語文を1)自然な英語に改善、2)日本語に翻訳してください。\n文: {}\n形式: {{\"improved_caption_en\":\"...\",\"translated_caption_jp\":\"...\"}}",
            caption_en
        );
        let request = ChatRequest::new(vec![
            ChatMessage::system("あなたは翻訳と言い換えの専門家です。出力は必ずJSONのみ。説明は不要。"),
            ChatMessage::user(user),
        ])
        .temperature(0.2)
        .max_tokens(160)
        .json()
        .timeout(self.timeout);

        let reply = self.llm.complete(request).await.ok()?;
        serde_json::from_str(&reply).ok()
    }

    fn failed(caption: impl Into<String>) -> AnalysisResult {
        AnalysisResult::failed(AnalyzerSource::Atmosphere).with_metadata("caption", caption.into())
    }
}

#[async_trait::async_trait]
impl EmotionAnalyzer for AtmosphereAnalyzer {
    fn source(&self) -> AnalyzerSource {
        AnalyzerSource::Atmosphere
    }

    async fn analyze(&self, image_path: &Path) -> Result<AnalysisResult, AnalyzerError> {
        if !tokio::fs::try_exists(image_path).await.unwrap_or(false) {
            return Ok(Self::failed(format!("Image file not found: {}", image_path.display())));
        }
        if !self.llm.is_configured() {
            return Ok(Self::failed("Language model API key is not configured"));
        }

        let Some(caption_en) = self.caption(image_path).await else {
            return Ok(Self::failed("Caption generation failed"));
        };
        let Some(analysis) = self.describe(&caption_en).await else {
            return Ok(Self::failed("Text processing failed"));
        };

        let emotion = analysis.extracted_emotion.trim();
        if is_sentinel(emotion) {
            return Ok(Self::failed("No valid emotion extracted"));
        }

        let caption_ja = match analysis.translated_caption_jp.trim() {
            "" => CAPTION_UNAVAILABLE,
            caption => caption,
        };

        info!(
            original = %caption_en,
            improved = %analysis.improved_caption_en,
            caption = %caption_ja,
            emotion = %emotion,
            "Atmosphere caption analysed"
        );

        Ok(AnalysisResult::new(AnalyzerSource::Atmosphere, emotion)
            .with_metadata("caption", caption_ja)
            .with_metadata("improved_caption_en", analysis.improved_caption_en.as_str())
            .with_metadata("original_caption_en", caption_en))
    }

    fn is_available(&self) -> bool {
        self.llm.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm_client::mock::ScriptedChatModel;

    fn image_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"jpeg bytes").unwrap();
        (dir, path)
    }

    #[test]
    fn test_parse_direct_json() {
        let parsed = parse_caption_analysis(
            r#"{"improved_caption_en":"A calm lake","translated_caption_jp":"静かな湖","extracted_emotion":"穏やかな"}"#,
        );
        match parsed {
            ParsedCaption::Complete(a) => {
                assert_eq!(a.extracted_emotion, "穏やかな");
                assert_eq!(a.translated_caption_jp, "静かな湖");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_embedded_json() {
        let parsed = parse_caption_analysis(
            "Sure! ```{\"translated_caption_jp\":\"夕焼け\",\"extracted_emotion\":\"壮大な\"}``` done",
        );
        assert!(matches!(
            parsed,
            ParsedCaption::Complete(CaptionAnalysis { ref extracted_emotion, .. }) if extracted_emotion == "壮大な"
        ));
    }

    #[test]
    fn test_parse_salvages_emotion_field() {
        let parsed = parse_caption_analysis(r#"broken "extracted_emotion": "静かな", "oops"#);
        assert_eq!(parsed, ParsedCaption::EmotionOnly("静かな".into()));
    }

    #[test]
    fn test_parse_salvages_japanese_token() {
        let parsed = parse_caption_analysis("感情は穏やかな感じです");
        assert!(matches!(parsed, ParsedCaption::EmotionOnly(ref e) if !e.is_empty()));
        assert_eq!(parse_caption_analysis("nothing here"), ParsedCaption::EmotionOnly(String::new()));
    }

    #[tokio::test]
    async fn test_two_stage_success() {
        let (_dir, path) = image_file();
        let llm = Arc::new(ScriptedChatModel::new(vec![
            Ok("A quiet lake surrounded by mountains".into()),
            Ok(r#"{"improved_caption_en":"A serene mountain lake","translated_caption_jp":"山に囲まれた静かな湖","extracted_emotion":"穏やかな"}"#.into()),
        ]));
        let analyzer = AtmosphereAnalyzer::new(llm.clone(), Duration::from_secs(1));

        let result = analyzer.analyze(&path).await.unwrap();

        assert_eq!(result.emotion, "穏やかな");
        assert_eq!(result.meta_str("caption"), Some("山に囲まれた静かな湖"));
        assert_eq!(result.meta_str("original_caption_en"), Some("A quiet lake surrounded by mountains"));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_salvaged_reply_triggers_translation() {
        let (_dir, path) = image_file();
        let llm = Arc::new(ScriptedChatModel::new(vec![
            Ok("A festival at night".into()),
            Ok(r#"not json "extracted_emotion": "賑やかな""#.into()),
            Ok(r#"{"improved_caption_en":"A lively night festival","translated_caption_jp":"夜の賑やかな祭り"}"#.into()),
        ]));
        let analyzer = AtmosphereAnalyzer::new(llm.clone(), Duration::from_secs(1));

        let result = analyzer.analyze(&path).await.unwrap();

        assert_eq!(result.emotion, "賑やかな");
        assert_eq!(result.meta_str("caption"), Some("夜の賑やかな祭り"));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_caption_degrades() {
        let (_dir, path) = image_file();
        let llm = Arc::new(ScriptedChatModel::new(vec![Ok("   ".into())]));
        let result = AtmosphereAnalyzer::new(llm, Duration::from_secs(1))
            .analyze(&path)
            .await
            .unwrap();

        assert!(result.is_failure());
        assert_eq!(result.meta_str("caption"), Some("Caption generation failed"));
    }

    #[tokio::test]
    async fn test_sentinel_emotion_degrades() {
        let (_dir, path) = image_file();
        let llm = Arc::new(ScriptedChatModel::new(vec![
            Ok("A wall".into()),
            Ok(r#"{"extracted_emotion":"api error"}"#.into()),
        ]));
        let result = AtmosphereAnalyzer::new(llm, Duration::from_secs(1))
            .analyze(&path)
            .await
            .unwrap();

        assert!(result.is_failure());
        assert_eq!(result.meta_str("caption"), Some("No valid emotion extracted"));
    }

    #[tokio::test]
    async fn test_missing_file_and_key() {
        let llm = Arc::new(ScriptedChatModel::unconfigured());
        let analyzer = AtmosphereAnalyzer::new(llm, Duration::from_secs(1));

        let missing = analyzer.analyze(Path::new("/nonexistent/photo.jpg")).await.unwrap();
        assert!(missing.is_failure());
        assert!(missing.meta_str("caption").unwrap().starts_with("Image file not found"));

        let (_dir, path) = image_file();
        let no_key = analyzer.analyze(&path).await.unwrap();
        assert_eq!(no_key.meta_str("caption"), Some("Language model API key is not configured"));
    }
}
