use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::storage::artifact_store::MAX_UPLOAD_BYTES;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// What happens to a swap request that arrives while another job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentionPolicy {
    #[default]
    Reject,
    Queue,
}

impl FromStr for ContentionPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(ContentionPolicy::Reject),
            "queue" => Ok(ContentionPolicy::Queue),
            _ => Err(ConfigError::InvalidValue {
                key: "jobs.contention",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_dir: PathBuf,
    pub api_token: Option<String>,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let frontend_dir = match std::env::var("CARGO_MANIFEST_DIR") {
            Ok(manifest_dir) => Path::new(&manifest_dir).join("../frontend/dist"),
            Err(_) => PathBuf::from("/usr/src/app/frontend/dist"),
        };
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            frontend_dir,
            api_token: None,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub workspace_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("workspace"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub python: String,
    pub script: PathBuf,
    pub models_dir: PathBuf,
    pub swap_weights: String,
    pub enhance_weights: String,
    pub preferred_providers: Vec<String>,
    pub memory_ceiling_gib: u64,
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            script: PathBuf::from("roop/run.py"),
            models_dir: PathBuf::from("roop/models"),
            swap_weights: "inswapper_128.onnx".to_string(),
            enhance_weights: "GFPGANv1.4.pth".to_string(),
            preferred_providers: vec!["cuda".to_string()],
            memory_ceiling_gib: 16,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub pacing_ms: u64,
    pub contention: ContentionPolicy,
    pub history_limit: usize,
    /// Jobs allowed to wait for the slot under the queue policy.
    pub max_queued: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 1000,
            contention: ContentionPolicy::Reject,
            history_limit: 32,
            max_queued: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub jobs: JobsConfig,
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

impl AppConfig {
    /// `.env`, then the YAML file named by `SWAP_CONFIG`, then individual
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var("SWAP_CONFIG") {
            Ok(path) => {
                log::info!("Loading configuration from {}", path);
                Self::from_yaml_file(Path::new(&path))?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_number("PORT", &port)?;
        }
        if let Some(dir) = lookup("SWAP_WORKSPACE_DIR") {
            self.storage.workspace_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SWAP_FRONTEND_DIR") {
            self.server.frontend_dir = PathBuf::from(dir);
        }
        if let Some(token) = lookup("SWAP_API_TOKEN") {
            self.server.api_token = Some(token).filter(|t| !t.trim().is_empty());
        }
        if let Some(python) = lookup("SWAP_PYTHON") {
            self.pipeline.python = python;
        }
        if let Some(script) = lookup("SWAP_ROOP_SCRIPT") {
            self.pipeline.script = PathBuf::from(script);
        }
        if let Some(dir) = lookup("SWAP_MODELS_DIR") {
            self.pipeline.models_dir = PathBuf::from(dir);
        }
        if let Some(pacing) = lookup("SWAP_PACING_MS") {
            self.jobs.pacing_ms = parse_number("SWAP_PACING_MS", &pacing)?;
        }
        if let Some(timeout) = lookup("SWAP_TIMEOUT_SECS") {
            self.pipeline.timeout_secs = parse_number("SWAP_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(contention) = lookup("SWAP_CONTENTION") {
            self.jobs.contention = contention.parse()?;
        }
        if let Some(max_queued) = lookup("SWAP_MAX_QUEUED") {
            self.jobs.max_queued = parse_number("SWAP_MAX_QUEUED", &max_queued)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.port",
                value: "0".to_string(),
            });
        }
        if self.pipeline.preferred_providers.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.preferred_providers",
                value: "[]".to_string(),
            });
        }
        if self.pipeline.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.timeout_secs",
                value: "0".to_string(),
            });
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.max_upload_bytes",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.jobs.pacing_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.timeout_secs)
    }
}
