//! Layered configuration for partsmith.
//!
//! Settings are read from `partsmith.toml`, then overridden by environment
//! variables (a `.env` file is loaded by the binary), then by CLI flags.
//! Every key is optional; a missing file yields the defaults below.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! cors_origins = ["http://localhost:3000"]
//! api_prefix = "/api/v1"
//! max_upload_mb = 10
//!
//! [model]
//! provider = "gemini"          # or "echo" for the offline double
//! name = "gemini-1.5-flash-latest"
//! temperature = 0.7
//! base_url = "https://generativelanguage.googleapis.com/v1beta"
//! request_timeout_secs = 120
//!
//! [pipeline]
//! memory_capacity = 5
//! max_attempts = 3
//! retry_delay_ms = 2000
//! stage_timeout_secs = 300
//! summary = "model"            # or "truncate"
//! summary_max_chars = 200
//! catalog = "sections.toml"    # optional, relative to this file
//!
//! [storage]
//! data_dir = ".partsmith"
//! ```
//!
//! # Environment
//!
//! | Variable          | Overrides                     |
//! |-------------------|-------------------------------|
//! | `GOOGLE_API_KEY`  | `model.api_key` (never in the file) |
//! | `PARTSMITH_HOST`  | `server.host`                 |
//! | `PARTSMITH_PORT`  | `server.port`                 |
//! | `PARTSMITH_MODEL` | `model.name`                  |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// Default file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "partsmith.toml";

/// Which model client backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Google Gemini REST API
    #[default]
    Gemini,
    /// Deterministic offline double, answers `OK-<stage>`
    Echo,
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelProvider::Gemini => write!(f, "gemini"),
            ModelProvider::Echo => write!(f, "echo"),
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(ModelProvider::Gemini),
            "echo" => Ok(ModelProvider::Echo),
            _ => Err(ConfigError::Invalid(format!(
                "Invalid model provider '{}'. Valid values: gemini, echo",
                s
            ))),
        }
    }
}

/// How a completed stage is condensed before it enters session memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStrategy {
    /// Ask the model for a 2-3 sentence summary, truncate on failure
    #[default]
    Model,
    /// Keep a prefix of the generated content
    Truncate,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; `"*"` allows any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Upper bound for multipart uploads, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

fn default_max_upload_mb() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            api_prefix: default_api_prefix(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

/// Model client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Only ever populated from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_model_name() -> String {
    "gemini-1.5-flash-latest".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            name: default_model_name(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            api_key: None,
        }
    }
}

/// Tutorial pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of stage summaries kept in session memory
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    /// Attempts per stage, first call included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Wall-clock cap for a single stage attempt
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    #[serde(default)]
    pub summary: SummaryStrategy,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    /// Optional stage catalog file; relative paths resolve against the config file
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

fn default_memory_capacity() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_stage_timeout_secs() -> u64 {
    300
}

fn default_summary_max_chars() -> usize {
    200
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            memory_capacity: default_memory_capacity(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            stage_timeout_secs: default_stage_timeout_secs(),
            summary: SummaryStrategy::default(),
            summary_max_chars: default_summary_max_chars(),
            catalog: None,
        }
    }
}

/// Where uploads and exports are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".partsmith")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// The complete partsmith.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartsmithConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl PartsmithConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content, path)?;
        config.resolve_relative_paths(path);
        Ok(config)
    }

    /// Parse configuration from a TOML string; `origin` is only used in errors.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load an explicit file, or `partsmith.toml` in `dir` if present, or the defaults.
    ///
    /// An explicit path that does not exist is an error.
    pub fn load_or_default(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    fn resolve_relative_paths(&mut self, config_path: &Path) {
        let Some(base) = config_path.parent() else {
            return;
        };
        if let Some(catalog) = &self.pipeline.catalog
            && catalog.is_relative()
        {
            self.pipeline.catalog = Some(base.join(catalog));
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` as the environment.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GOOGLE_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.model.api_key = Some(key);
        }
        if let Some(host) = lookup("PARTSMITH_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PARTSMITH_PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("PARTSMITH_PORT '{}' is not a valid port", port))
            })?;
        }
        if let Some(model) = lookup("PARTSMITH_MODEL") {
            self.model.name = model;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_attempts must be at least 1".into(),
            ));
        }
        if self.pipeline.memory_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.memory_capacity must be at least 1".into(),
            ));
        }
        if self.pipeline.summary_max_chars == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.summary_max_chars must be at least 1".into(),
            ));
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.stage_timeout_secs must be at least 1".into(),
            ));
        }
        if !self.server.api_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.api_prefix '{}' must start with '/'",
                self.server.api_prefix
            )));
        }
        Ok(())
    }

    /// Directory for uploaded images.
    pub fn uploads_dir(&self) -> PathBuf {
        self.storage.data_dir.join("uploads")
    }

    /// Well-known path of the last exported tutorial.
    pub fn export_path(&self) -> PathBuf {
        self.storage.data_dir.join("project_tutorial.md")
    }
}
