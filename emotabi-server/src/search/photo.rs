//! Photo proxy
//!
//! Fetches place photos from the search provider so the client never sees
//! the provider key. Any failure (no key, upstream error, timeout) is served
//! as the placeholder asset.

use crate::services::{PhotoContent, PlaceSearch};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the proxy hands back to the HTTP layer
#[derive(Debug, Clone)]
pub enum ProxiedPhoto {
    /// Provider photo
    Upstream(PhotoContent),
    /// Placeholder PNG bytes
    Placeholder(Vec<u8>),
    /// Placeholder asset missing on disk
    Missing,
}

pub struct PhotoProxy {
    search: Arc<dyn PlaceSearch>,
    placeholder_path: PathBuf,
}

impl PhotoProxy {
    pub fn new(search: Arc<dyn PlaceSearch>, placeholder_path: PathBuf) -> Self {
        Self {
            search,
            placeholder_path,
        }
    }

    pub async fn fetch(&self, photo_reference: &str) -> ProxiedPhoto {
        match self.search.photo(photo_reference).await {
            Ok(photo) => {
                debug!(bytes = photo.bytes.len(), "Proxied place photo");
                ProxiedPhoto::Upstream(photo)
            }
            Err(e) => {
                warn!(error = %e, "Place photo unavailable, serving placeholder");
                self.placeholder().await
            }
        }
    }

    async fn placeholder(&self) -> ProxiedPhoto {
        match tokio::fs::read(&self.placeholder_path).await {
            Ok(bytes) => ProxiedPhoto::Placeholder(bytes),
            Err(e) => {
                warn!(path = %self.placeholder_path.display(), error = %e, "Placeholder image missing");
                ProxiedPhoto::Missing
            }
        }
    }
}
