//! External collaborators and supporting services
//!
//! - **llm_client** - Chat completions (label mapping, scene classification, captions)
//! - **places_client** - Places text search, details and photos
//! - **object_detector** - External object detection command
//! - **image_optimizer** - Upload downscaling before analysis

pub mod image_optimizer;
pub mod llm_client;
pub mod object_detector;
pub mod places_client;

pub use llm_client::{ChatMessage, ChatModel, ChatRequest, LlmClient, LlmError};
pub use object_detector::{CommandDetector, Detection, DetectorError, ObjectDetector};
pub use places_client::{GooglePlacesClient, PhotoContent, PlaceCandidate, PlaceSearch, SearchError};
