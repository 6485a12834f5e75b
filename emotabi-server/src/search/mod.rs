//! Destination search
//!
//! - **cache** - Process-wide `(query, language)` result cache
//! - **selector** - Per-request dedup selection and suggestion assembly
//! - **photo** - Photo proxy with placeholder fallback

pub mod cache;
pub mod photo;
pub mod selector;

pub use cache::QueryCache;
pub use photo::{PhotoProxy, ProxiedPhoto};
pub use selector::{map_url, PhotoLinks, Rating, SeenSet, Suggestion, SuggestionSelector};
