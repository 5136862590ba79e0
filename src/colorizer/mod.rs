//! Image colorization engine
//!
//! - `model.rs` - the model seam and its ONNX implementation
//! - `pipeline.rs` - pre/post-processing around a single inference call

pub mod model;
pub mod pipeline;

pub use model::{ColorizationModel, OnnxColorizationModel};
pub use pipeline::{ImageColorizer, INPUT_DIMENSION};
