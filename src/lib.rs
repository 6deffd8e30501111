//! SVHN digit classification
//!
//! Downloads the Street View House Numbers dataset, fetches pretrained model
//! bundles and trains an MLP and a CNN classifier on top of burn.

pub mod data;
pub mod model;
pub mod pipeline;
pub mod training;

#[cfg(test)]
pub(crate) mod test_support;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Network architecture trained by the `local` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Mlp,
    Cnn,
}

impl Architecture {
    /// Directory name (and pretrained bundle name) for this architecture
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Mlp => "mlp",
            Architecture::Cnn => "cnn",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mlp" => Some(Architecture::Mlp),
            "cnn" => Some(Architecture::Cnn),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Mlp => write!(f, "MLP"),
            Architecture::Cnn => write!(f, "CNN"),
        }
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum SvhnError {
    #[error("Download failed for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("File system error at {}: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SvhnError {
    /// Wrap an IO error with the path it happened on
    pub fn file_system(path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> SvhnError {
        let path = path.as_ref().to_path_buf();
        move |source| SvhnError::FileSystem { path, source }
    }
}

impl From<zip::result::ZipError> for SvhnError {
    fn from(e: zip::result::ZipError) -> Self {
        SvhnError::Archive(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SvhnError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Working directory holding datasets, checkpoints and models
    pub work_dir: PathBuf,
    pub train_data_url: String,
    pub test_data_url: String,
    pub train_data_name: String,
    pub test_data_name: String,
    /// Prefix under which `<name>.zip` pretrained bundles are hosted
    pub archive_url_prefix: String,
    pub pretrained_models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of samples held out (taken from the end) for validation
    pub validation_split: f64,
    pub early_stopping_patience: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 30,
            batch_size: 64,
            validation_split: 0.15,
            early_stopping_patience: 3,
            seed: 42,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: DataConfig {
                work_dir: PathBuf::from("/tmp/svhn"),
                train_data_url: "http://ufldl.stanford.edu/housenumbers/train_32x32.mat"
                    .to_string(),
                test_data_url: "http://ufldl.stanford.edu/housenumbers/test_32x32.mat"
                    .to_string(),
                train_data_name: "train_data.mat".to_string(),
                test_data_name: "test_data.mat".to_string(),
                archive_url_prefix:
                    "http://grainpowder-archive.s3.amazonaws.com/github/demo-svhn-classifier"
                        .to_string(),
                pretrained_models: vec!["mlp".to_string(), "cnn".to_string()],
            },
            training: TrainingConfig::default(),
            fetch: FetchConfig {
                user_agent: "svhn-classifier/0.1".to_string(),
                connect_timeout_secs: 30,
                timeout_secs: 1800,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SvhnError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| SvhnError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SvhnError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(SvhnError::file_system(path))?;
        Ok(())
    }

    pub fn train_data_path(&self) -> PathBuf {
        self.data.work_dir.join(&self.data.train_data_name)
    }

    pub fn test_data_path(&self) -> PathBuf {
        self.data.work_dir.join(&self.data.test_data_name)
    }

    /// Output directory for one architecture's checkpoints, log and model
    pub fn model_dir(&self, architecture: Architecture) -> PathBuf {
        self.data.work_dir.join(architecture.name())
    }
}
