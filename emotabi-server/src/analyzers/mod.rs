//! Emotion Analyzers
//!
//! Three independent sources, each implementing
//! [`EmotionAnalyzer`](crate::types::EmotionAnalyzer):
//!
//! 1. **object_analyzer** - Detected object or scene label → emotion word
//! 2. **color_analyzer** - Dominant colors → color/emotion lookup table
//! 3. **atmosphere_analyzer** - Vision caption → one-word emotion
//!
//! Recoverable failures inside a source degrade to the failure sentinel.
//! The fusion executor runs all three concurrently.

pub mod atmosphere_analyzer;
pub mod color_analyzer;
pub mod color_table;
pub mod object_analyzer;

pub use atmosphere_analyzer::AtmosphereAnalyzer;
pub use color_analyzer::ColorAnalyzer;
pub use color_table::ColorTable;
pub use object_analyzer::ObjectAnalyzer;
