//! Configuration loading and root folder resolution
//!
//! Resolution priority for every setting, highest first:
//! 1. Command-line argument (handled by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed TOML file is never fatal: it is logged and the
//! compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "EMOTABI_ROOT_FOLDER";

/// Environment variable pointing at an explicit TOML file
pub const CONFIG_PATH_ENV: &str = "EMOTABI_CONFIG";

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level ("trace", "debug", "info", "warn", "error")
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file path (stdout when absent)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: None,
        }
    }
}

/// On-disk configuration schema
///
/// Every field is optional so that partial files (or files written by older
/// versions) still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub static_assets: Option<PathBuf>,
    #[serde(default)]
    pub google_maps_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    /// External object detector command (receives the image path, prints JSON)
    #[serde(default)]
    pub detector_command: Option<String>,
    /// Color → emotion lookup table (CSV)
    #[serde(default)]
    pub color_table_path: Option<PathBuf>,
    /// Absolute base URL used when building proxied photo links
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
    }

    /// Load the first available config file, falling back to defaults
    ///
    /// `explicit` (command line) wins over `EMOTABI_CONFIG`, which wins over
    /// the platform locations.
    pub fn load(explicit: Option<&Path>) -> Self {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let candidate = explicit
            .map(Path::to_path_buf)
            .or(env_path)
            .or_else(default_config_file);

        let Some(path) = candidate else {
            debug!("No config file found, using compiled defaults");
            return Self::default();
        };

        match Self::from_file(&path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{} - continuing with compiled defaults", e);
                Self::default()
            }
        }
    }
}

/// Platform config file locations, first existing one wins
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("emotabi").join("config.toml"));
    let system_config = PathBuf::from("/etc/emotabi/config.toml");

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|p| p.exists())
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub port: u16,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            port: 5000,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/emotabi
        dirs::data_local_dir()
            .map(|d| d.join("emotabi"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/emotabi"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("emotabi"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/emotabi"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("emotabi"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\emotabi"))
    } else {
        PathBuf::from("./emotabi_data")
    }
}

/// Resolves the root folder: ENV → TOML → compiled default
pub struct RootFolderResolver<'a> {
    toml: &'a TomlConfig,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(toml: &'a TomlConfig) -> Self {
        Self { toml }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml.root_folder {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout on startup
///
/// ```text
/// <root>/static/
/// <root>/static/images/
/// <root>/static/uploads/
/// ```
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn static_dir(&self) -> PathBuf {
        self.root_folder.join("static")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.static_dir().join("uploads")
    }

    pub fn placeholder_path(&self) -> PathBuf {
        self.static_dir().join("images").join("placeholder_r1.png")
    }

    /// Create all directories (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(self.upload_dir())?;
        std::fs::create_dir_all(self.static_dir().join("images"))?;
        Ok(())
    }
}

/// Resolve a string setting: ENV → TOML, blank values ignored
pub fn resolve_setting(env_var: &str, toml_value: Option<&String>) -> Option<String> {
    if let Ok(value) = std::env::var(env_var) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    toml_value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse the `PORT` environment value
///
/// Deployment platforms occasionally pass the literal string `$PORT`
/// through; that, non-numeric values and out-of-range values fall back to
/// `default`.
pub fn parse_port(raw: Option<&str>, default: u16) -> u16 {
    match raw.map(str::trim) {
        None | Some("") | Some("$PORT") => default,
        Some(value) => match value.parse::<u32>() {
            Ok(port) if (1..=65535).contains(&port) => port as u16,
            _ => {
                warn!("Invalid PORT value '{}', using {}", value, default);
                default
            }
        },
    }
}
