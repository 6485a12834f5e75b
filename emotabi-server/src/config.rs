//! Service configuration
//!
//! Resolves [`ServiceConfig`] from command-line overrides, environment
//! variables, the TOML file and compiled defaults (in that priority order).

use emotabi_common::config::{
    parse_port, resolve_setting, CompiledDefaults, RootFolderInitializer, RootFolderResolver,
    TomlConfig,
};
use std::path::PathBuf;
use std::time::Duration;

pub const GOOGLE_MAPS_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const PORT_ENV: &str = "PORT";
pub const DETECTOR_COMMAND_ENV: &str = "EMOTABI_DETECTOR_COMMAND";
pub const COLOR_TABLE_ENV: &str = "EMOTABI_COLOR_TABLE";
pub const PUBLIC_BASE_URL_ENV: &str = "EMOTABI_PUBLIC_BASE_URL";

/// Maximum accepted image size
pub const MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

/// Request body limit (image plus form overhead)
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Values given on the command line (highest priority)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub root_folder: Option<PathBuf>,
    pub detector_command: Option<String>,
    pub color_table: Option<PathBuf>,
    pub public_base_url: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub static_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub placeholder_path: PathBuf,
    pub port: u16,
    pub log_level: String,
    pub google_maps_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub detector_command: Option<String>,
    pub color_table_path: Option<PathBuf>,
    pub public_base_url: Option<String>,
    pub language: String,
    pub fusion_deadline: Duration,
    pub search_timeout: Duration,
    pub vision_timeout: Duration,
    pub mapping_timeout: Duration,
    pub detector_timeout: Duration,
    pub query_cache_capacity: u64,
    pub max_image_bytes: usize,
}

impl ServiceConfig {
    /// Defaults rooted at `root_folder`, with no keys or external commands
    pub fn with_root(root_folder: PathBuf) -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        let layout = RootFolderInitializer::new(root_folder.clone());
        Self {
            static_dir: layout.static_dir(),
            upload_dir: layout.upload_dir(),
            placeholder_path: layout.placeholder_path(),
            root_folder,
            port: defaults.port,
            log_level: defaults.log_level,
            google_maps_api_key: None,
            openai_api_key: None,
            detector_command: None,
            color_table_path: None,
            public_base_url: None,
            language: crate::search::selector::DEFAULT_LANGUAGE.to_string(),
            fusion_deadline: crate::fusion::DEFAULT_DEADLINE,
            search_timeout: crate::services::places_client::DEFAULT_TIMEOUT,
            vision_timeout: Duration::from_secs(15),
            mapping_timeout: Duration::from_secs(10),
            detector_timeout: Duration::from_secs(20),
            query_cache_capacity: crate::search::cache::DEFAULT_CAPACITY,
            max_image_bytes: MAX_IMAGE_BYTES,
        }
    }

    /// CLI → ENV → TOML → compiled defaults
    pub fn resolve(toml: &TomlConfig, cli: &CliOverrides) -> Self {
        let root_folder = cli
            .root_folder
            .clone()
            .unwrap_or_else(|| RootFolderResolver::new(toml).resolve());
        let mut config = Self::with_root(root_folder);

        if let Some(static_dir) = &toml.static_assets {
            config.static_dir = static_dir.clone();
            config.upload_dir = static_dir.join("uploads");
            config.placeholder_path = static_dir.join("images").join("placeholder_r1.png");
        }

        let env_port = std::env::var(PORT_ENV).ok();
        config.port = cli.port.unwrap_or_else(|| {
            let fallback = toml.port.unwrap_or(config.port);
            parse_port(env_port.as_deref(), fallback)
        });
        config.log_level = toml.logging.level.clone();

        config.google_maps_api_key =
            resolve_setting(GOOGLE_MAPS_KEY_ENV, toml.google_maps_api_key.as_ref());
        config.openai_api_key = resolve_setting(OPENAI_KEY_ENV, toml.openai_api_key.as_ref());
        config.detector_command = cli
            .detector_command
            .clone()
            .or_else(|| resolve_setting(DETECTOR_COMMAND_ENV, toml.detector_command.as_ref()));
        config.color_table_path = cli.color_table.clone().or_else(|| {
            let toml_path = toml
                .color_table_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned());
            resolve_setting(COLOR_TABLE_ENV, toml_path.as_ref()).map(PathBuf::from)
        });
        config.public_base_url = cli
            .public_base_url
            .clone()
            .or_else(|| resolve_setting(PUBLIC_BASE_URL_ENV, toml.public_base_url.as_ref()));

        config
    }

    /// Create the static, uploads and images directories
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        if let Some(images) = self.placeholder_path.parent() {
            std::fs::create_dir_all(images)?;
        }
        Ok(())
    }
}
