//! Startup diagnostics
//!
//! Reports which capabilities this deployment has. Keys are described by
//! status and length only.

use crate::config::ServiceConfig;
use emotabi_common::keys::{google_maps_key_status, openai_key_status, KeyStatus};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiKeyFlags {
    pub google_maps: bool,
    pub openai: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeatureFlags {
    pub photo_suggestions: bool,
    pub ai_emotion_analysis: bool,
    pub object_detection: bool,
    pub color_analysis: bool,
}

/// Capability snapshot
#[derive(Debug, Clone)]
pub struct CapabilityReport {
    pub google_maps: KeyStatus,
    pub openai: KeyStatus,
    pub detector_command: Option<String>,
    pub color_table: bool,
}

impl CapabilityReport {
    pub fn collect(config: &ServiceConfig, color_table_available: bool) -> Self {
        Self {
            google_maps: google_maps_key_status(config.google_maps_api_key.as_deref()),
            openai: openai_key_status(config.openai_api_key.as_deref()),
            detector_command: config.detector_command.clone(),
            color_table: color_table_available,
        }
    }

    pub fn api_keys(&self) -> ApiKeyFlags {
        ApiKeyFlags {
            google_maps: self.google_maps.is_present(),
            openai: self.openai.is_present(),
        }
    }

    pub fn features(&self) -> FeatureFlags {
        FeatureFlags {
            photo_suggestions: self.google_maps.is_present(),
            ai_emotion_analysis: self.openai.is_present(),
            object_detection: self.detector_command.is_some(),
            color_analysis: self.color_table,
        }
    }

    /// Write the report to the log
    pub fn log(&self) {
        info!("=== EMOTABI diagnostics ===");
        log_key("Google Maps API", self.google_maps);
        log_key("OpenAI API", self.openai);

        match &self.detector_command {
            Some(command) => info!("Object detection: command '{}'", command),
            None => warn!("Object detection: no detector command, scene fallback only"),
        }
        if self.color_table {
            info!("Color analysis: lookup table available");
        } else {
            warn!("Color analysis: lookup table not found, color source will degrade");
        }
        info!("===========================");
    }
}

fn log_key(name: &str, status: KeyStatus) {
    match status {
        KeyStatus::Configured { len } => info!("{}: configured (length: {})", name, len),
        KeyStatus::Malformed { len } => warn!("{}: malformed (length: {})", name, len),
        KeyStatus::Missing => warn!("{}: not configured", name),
    }
}
