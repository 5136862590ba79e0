//! Error types shared across the crate
//!
//! `ColorizeError` covers a single colorization call. `ModelError` is raised
//! by model backends. `AppError` wraps everything the outer layers
//! (persistence, download, configuration) can fail with.

use std::path::PathBuf;

/// Errors raised by a model backend
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to load model from {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("inference failed: {0}")]
    Run(String),

    #[error("model produced no output named '{0}'")]
    MissingOutput(String),
}

/// Errors raised by a colorization call
///
/// Every variant is terminal for the call that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ColorizeError {
    /// The input image could not be resized or converted before inference
    #[error("image could not be prepared for the model")]
    PreprocessFailure,

    /// The model output could not be turned back into an image
    #[error("model output could not be converted to an image")]
    PostprocessFailure,

    #[error(transparent)]
    Inference(#[from] ModelError),

    #[error("background worker failed: {0}")]
    Worker(String),
}

/// Crate-level error for everything outside the colorization pipeline
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("download failed: {0}")]
    Download(String),

    #[error("downloaded model is not usable: {0}")]
    InvalidModel(ModelError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("background worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Colorize(#[from] ColorizeError),
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Worker(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
