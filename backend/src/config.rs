use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::inference::ModelFormat;

const DEFAULT_CONFIG_PATH: &str = "config/cattle.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Cannot infer model format from {0}; set MODEL_FORMAT")]
    UnknownModelFormat(PathBuf),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub uploads: UploadConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory uploads are written to and served from under `/static`.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Inferred from the file extension when unset.
    pub format: Option<ModelFormat>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("static"),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cattle_model.onnx"),
            format: None,
        }
    }
}

impl ModelConfig {
    pub fn new(path: impl Into<PathBuf>, format: ModelFormat) -> Self {
        Self {
            path: path.into(),
            format: Some(format),
        }
    }

    pub fn resolved_format(&self) -> Result<ModelFormat, ConfigError> {
        match self.format {
            Some(format) => Ok(format),
            None => ModelFormat::from_path(&self.path)
                .ok_or_else(|| ConfigError::UnknownModelFormat(self.path.clone())),
        }
    }
}

impl AppConfig {
    /// Defaults, then the YAML file (if any), then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match config_file_path() {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            self.uploads.dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(format) = lookup("MODEL_FORMAT") {
            let parsed = format.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MODEL_FORMAT",
                value: format.clone(),
            })?;
            self.model.format = Some(parsed);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CATTLE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
    fallback.exists().then_some(fallback)
}
