use garde::Validate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};

/// How the batch scheduler dispatches image tasks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConcurrencyMode {
    #[default]
    Sequential,
    Concurrent,
}

/// Where input images come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceMode {
    #[default]
    Local,
    SharedFolder,
}

/// Resolved image source descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Directory of jpg/jpeg/png files.
    Local(PathBuf),
    /// Shared cloud folder reference (URL or bare folder id).
    SharedFolder(String),
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Base URL of the image-editing API (e.g., "https://api.example.com/v1")
    #[garde(length(min = 1))]
    pub api_base_url: String,

    /// Bearer token for the image-editing API
    #[garde(length(min = 1))]
    pub api_token: String,

    /// Cut type sent with every submission
    #[serde(default = "default_cut_type")]
    #[garde(length(min = 1))]
    pub cut_type: String,

    /// Guideline id sent with every submission
    #[garde(length(min = 1))]
    pub guideline_id: String,

    #[serde(default)]
    #[garde(skip)]
    pub concurrency_mode: ConcurrencyMode,

    /// Upper bound on in-flight tasks in concurrent mode
    #[serde(default = "default_max_concurrency")]
    #[garde(range(min = 1, max = 64))]
    pub max_concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    #[garde(range(min = 1))]
    pub poll_interval_ms: u64,

    /// Status queries per task before giving up
    #[serde(default = "default_max_poll_attempts")]
    #[garde(range(min = 1))]
    pub max_poll_attempts: u32,

    /// Appended to the derived file stem of every output file
    #[serde(default = "default_output_suffix")]
    #[garde(skip)]
    pub output_suffix: String,

    #[serde(default)]
    #[garde(skip)]
    pub image_source_mode: SourceMode,

    /// Shared folder URL or id, used when `image_source_mode` is `shared_folder`
    #[serde(default)]
    #[garde(skip)]
    pub image_source_folder: Option<String>,

    /// When false the local input directory is used regardless of mode
    #[serde(default = "default_true")]
    #[garde(skip)]
    pub image_source_enabled: bool,

    #[serde(default = "default_input_dir")]
    #[garde(skip)]
    pub input_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    #[garde(skip)]
    pub output_dir: PathBuf,

    /// Directory searched for the logo asset
    #[serde(default = "default_assets_dir")]
    #[garde(skip)]
    pub assets_dir: PathBuf,

    /// Binary result payloads at or below this size are treated as truncated
    #[serde(default = "default_min_image_bytes")]
    #[garde(skip)]
    pub min_image_bytes: usize,

    #[serde(default = "default_shared_folder_origin")]
    #[garde(length(min = 1))]
    pub shared_folder_origin: String,

    #[serde(default = "default_request_timeout_secs")]
    #[garde(range(min = 1))]
    pub request_timeout_secs: u64,
}

fn default_cut_type() -> String {
    "license_plate".to_string()
}

fn default_max_concurrency() -> usize {
    3
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_max_poll_attempts() -> u32 {
    60
}

fn default_output_suffix() -> String {
    "_logo".to_string()
}

fn default_true() -> bool {
    true
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_min_image_bytes() -> usize {
    1000
}

fn default_shared_folder_origin() -> String {
    "https://drive.google.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl AppConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::finish(envy::from_env()?)
    }

    /// Load from an explicit env file, then the process environment.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::from_path(path).map_err(|e| ConfigError::EnvFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::finish(envy::from_env()?)
    }

    /// Load from explicit key/value pairs (keys in `SCREAMING_SNAKE_CASE`).
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::finish(envy::from_iter(pairs)?)
    }

    fn finish(config: Self) -> Result<Self, ConfigError> {
        config.validate().map_err(|report| ConfigError::Invalid(report.to_string()))?;
        Ok(config)
    }

    /// Apply command-line overrides and re-run validation on the result.
    pub fn with_overrides(
        mut self,
        mode: Option<ConcurrencyMode>,
        max_concurrency: Option<usize>,
    ) -> Result<Self, ConfigError> {
        if let Some(mode) = mode {
            self.concurrency_mode = mode;
        }
        if let Some(max) = max_concurrency {
            self.max_concurrency = max;
        }
        Self::finish(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Pick the image source from the mode, enabled flag and folder reference.
    pub fn image_source(&self) -> Result<ImageSource, ConfigError> {
        if self.image_source_mode == SourceMode::Local || !self.image_source_enabled {
            return Ok(ImageSource::Local(self.input_dir.clone()));
        }

        match self.image_source_folder.as_deref().map(str::trim) {
            Some(folder) if !folder.is_empty() => Ok(ImageSource::SharedFolder(folder.to_string())),
            _ => Err(ConfigError::MalformedFolderReference(String::new())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Failed to load env file {}: {message}", path.display())]
    EnvFile { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No logo asset (png, webp or gif) found in {}", .0.display())]
    MissingLogo(PathBuf),

    #[error("Malformed shared folder reference {0:?}: expected a .../folders/<id> URL or a folder id")]
    MalformedFolderReference(String),
}
