use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::reducer::GroupOrder;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub preview_rows: usize,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("btcusd_1-min_data.csv"),
            output: PathBuf::from("cleaned_btcusd_data.csv"),
            preview_rows: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperSettings {
    /// Rows whose first field equals this token are headers.
    pub header_token: String,
    pub date_column: usize,
    pub close_column: usize,
}

impl Default for MapperSettings {
    fn default() -> Self {
        Self {
            header_token: "Date".to_string(),
            date_column: 0,
            close_column: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerSettings {
    pub decimals: usize,
    pub order: GroupOrder,
}

impl Default for ReducerSettings {
    fn default() -> Self {
        Self {
            decimals: 2,
            order: GroupOrder::Contiguous,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub preprocess: PreprocessSettings,
    pub mapper: MapperSettings,
    pub reducer: ReducerSettings,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to null rather than an empty mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Loads `path` when given, otherwise returns the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
