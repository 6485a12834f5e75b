//! Object detector
//!
//! Runs an external detection command (a YOLO-style model wrapper) against an
//! image and parses its JSON output. The command receives the image path as
//! its last argument and prints:
//!
//! ```json
//! [{"label": "dog", "confidence": 0.87}, {"label": "bench", "confidence": 0.41}]
//! ```
//!
//! The command's availability is probed once, on first use.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Detections below this confidence are dropped by the detector itself
pub const MODEL_CONFIDENCE: f32 = 0.3;

/// Detector errors
#[derive(Debug, Error)]
pub enum DetectorError {
    /// No detector configured or the command is not installed
    #[error("Detector not available: {0}")]
    NotAvailable(String),

    /// Detector could not read the image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Detector execution failed: {0}")]
    Execution(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One detected object
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
}

/// Object detection capability
#[async_trait::async_trait]
pub trait ObjectDetector: Send + Sync {
    /// One-time readiness check (model present, command installed)
    async fn ensure_ready(&self) -> Result<(), DetectorError>;

    /// Detect objects, strongest first
    async fn detect(&self, image_path: &Path) -> Result<Vec<Detection>, DetectorError>;

    fn is_configured(&self) -> bool;
}

/// Detector backed by an external command
pub struct CommandDetector {
    /// Command line, whitespace separated (`"yolo-detect --model yolov8n.pt"`)
    command: Option<String>,
    timeout: Duration,
    ready: OnceCell<bool>,
}

impl CommandDetector {
    pub fn new(command: Option<String>, timeout: Duration) -> Self {
        Self {
            command: command.filter(|c| !c.trim().is_empty()),
            timeout,
            ready: OnceCell::new(),
        }
    }

    fn program_and_args(&self) -> Option<(String, Vec<String>)> {
        let mut parts = self.command.as_deref()?.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some((program, parts.collect()))
    }
}

#[async_trait::async_trait]
impl ObjectDetector for CommandDetector {
    async fn ensure_ready(&self) -> Result<(), DetectorError> {
        let Some((program, _)) = self.program_and_args() else {
            return Err(DetectorError::NotAvailable("no detector command configured".into()));
        };

        let probe = program.clone();
        let ready = *self
            .ready
            .get_or_init(|| async move {
                let found = Command::new("which")
                    .arg(&probe)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await
                    .map(|s| s.success())
                    .unwrap_or(false)
                    || Path::new(&probe).is_file();

                if found {
                    debug!(command = %probe, "Object detector available");
                } else {
                    warn!(command = %probe, "Object detector command not found");
                }
                found
            })
            .await;

        if ready {
            Ok(())
        } else {
            Err(DetectorError::NotAvailable(format!("'{}' not found", program)))
        }
    }

    async fn detect(&self, image_path: &Path) -> Result<Vec<Detection>, DetectorError> {
        self.ensure_ready().await?;
        let (program, args) = self
            .program_and_args()
            .ok_or_else(|| DetectorError::NotAvailable("no detector command configured".into()))?;

        let run = Command::new(&program)
            .args(&args)
            .arg(image_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| DetectorError::Execution(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| DetectorError::Execution(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DetectorError::InvalidImage(stderr.trim().to_string()));
        }

        parse_detections(&output.stdout)
    }

    fn is_configured(&self) -> bool {
        self.command.is_some()
    }
}

/// Parse detector output, drop weak detections, sort strongest first
pub fn parse_detections(stdout: &[u8]) -> Result<Vec<Detection>, DetectorError> {
    let mut detections: Vec<Detection> =
        serde_json::from_slice(stdout).map_err(|e| DetectorError::Parse(e.to_string()))?;

    detections.retain(|d| d.confidence >= MODEL_CONFIDENCE && !d.label.trim().is_empty());
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(detections)
}
