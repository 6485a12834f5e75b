//! Emotion vocabulary
//!
//! Ordered words used to build search queries: the trimmed, non-sentinel
//! labels of the object, color and atmosphere sources, in that order.
//! Duplicates are kept.

use crate::types::is_sentinel;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmotionVocabulary {
    words: Vec<String>,
}

impl EmotionVocabulary {
    /// Build from the three raw labels
    pub fn build(object: &str, color: &str, atmosphere: &str) -> Self {
        let words = [object, color, atmosphere]
            .into_iter()
            .filter(|label| !is_sentinel(label))
            .map(|label| label.trim().to_string())
            .collect();
        Self { words }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
