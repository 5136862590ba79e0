//! Application configuration
//!
//! Settings are read from a JSON file. Every field is optional; anything
//! missing falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{AppError, Result};

const APP_DIR_NAME: &str = "colorizer";
const CONFIG_FILE_NAME: &str = "config.json";
const DATABASE_FILE_NAME: &str = "colorizer.db";
const MODELS_DIR_NAME: &str = "models";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for the database and downloaded models
    /// - Linux: ~/.local/share/colorizer
    /// - macOS: ~/Library/Application Support/colorizer
    /// - Windows: %APPDATA%\colorizer
    pub data_dir: PathBuf,

    /// Where the model file is downloaded from
    pub model_url: Option<String>,

    /// File name the downloaded model is stored under
    pub model_file_name: String,

    /// Name of the model's lightness input tensor
    pub input_name: String,

    /// Name of the model's chrominance output tensor
    pub output_name: String,

    /// Threads used by the inference runtime for a single call
    pub intra_threads: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            model_url: None,
            model_file_name: "colorizer.onnx".to_string(),
            input_name: "input1".to_string(),
            output_name: "796".to_string(),
            intra_threads: 1,
        }
    }
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR_NAME);
    path
}

impl AppConfig {
    /// Load configuration
    ///
    /// - `Some(path)`: the file must exist and parse
    /// - `None`: `<default data dir>/config.json` if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let candidate = default_data_dir().join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::from_file(&candidate)
                } else {
                    debug!("No config file at {}, using defaults", candidate.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.model_file_name.is_empty() || self.model_file_name.contains(['/', '\\']) {
            return Err(AppError::Config(format!(
                "model_file_name must be a plain file name, got '{}'",
                self.model_file_name
            )));
        }
        if self.input_name.is_empty() || self.output_name.is_empty() {
            return Err(AppError::Config("tensor names must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join(MODELS_DIR_NAME)
    }
}
