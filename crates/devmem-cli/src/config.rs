use std::path::{Path, PathBuf};

use devmem_core::DevmemError;
use devmem_memory::{RetentionConfig, SearchWeights};
use serde::Deserialize;
use tracing::info;

/// Top-level `devmem.toml` contents. Every field has a default.
#[derive(Debug, Deserialize)]
pub struct DevmemConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_fts_weight")]
    pub fts_weight: f64,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fts_weight: default_fts_weight(),
            vector_weight: default_vector_weight(),
        }
    }
}

impl SearchConfig {
    pub fn weights(&self) -> SearchWeights {
        SearchWeights {
            fts: self.fts_weight,
            vector: self.vector_weight,
        }
    }
}

impl Default for DevmemConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            search: SearchConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    41777
}
fn default_fts_weight() -> f64 {
    SearchWeights::default().fts
}
fn default_vector_weight() -> f64 {
    SearchWeights::default().vector
}

impl DevmemConfig {
    /// Read and validate the config at `path`. A missing file yields defaults.
    pub async fn load(path: &Path) -> Result<Self, DevmemError> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(DevmemError::Config(format!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without validating it.
    pub fn parse(raw: &str) -> Result<Self, DevmemError> {
        toml::from_str(raw).map_err(|e| DevmemError::Config(e.to_string()))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), DevmemError> {
        for (name, weight) in [
            ("search.fts_weight", self.search.fts_weight),
            ("search.vector_weight", self.search.vector_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(DevmemError::Config(format!(
                    "{name} must be a non-negative number, got {weight}"
                )));
            }
        }
        if self.retention.interval_secs == 0 {
            return Err(DevmemError::Config(
                "retention.interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Location of the SQLite database inside `data_dir`.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("devmem.db")
    }
}
