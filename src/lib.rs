//! Colorize grayscale photos with an on-device neural model
//!
//! The crate is organized leaf-first:
//! - `units` - byte counts and download progress
//! - `color` - sRGB <-> L*a*b* conversion
//! - `colorizer` - model seam and the colorization pipeline
//! - `state` - SQLite history and settings
//! - `download` - one-shot model download
//! - `service` - colorize-then-save use cases
//! - `config` - configuration file handling

pub mod color;
pub mod colorizer;
pub mod config;
pub mod download;
pub mod error;
pub mod service;
pub mod state;
pub mod units;

pub use colorizer::{ColorizationModel, ImageColorizer, OnnxColorizationModel};
pub use config::AppConfig;
pub use error::{AppError, ColorizeError, ModelError};
pub use service::ColorizeService;
