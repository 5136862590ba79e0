//! Colorization model backends
//!
//! The pipeline only needs one thing from a model: given a packed
//! `[1, 1, 256, 256]` lightness tensor, return the `[1, 2, 256, 256]`
//! chrominance prediction. `ColorizationModel` captures that seam so the
//! ONNX runtime can be swapped for a stub in tests.

use ndarray::{Array4, ArrayD};
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::ModelError;

/// A model that predicts chrominance from lightness
pub trait ColorizationModel: Send + Sync {
    /// Run a single forward pass
    fn predict(&self, input: Array4<f32>) -> Result<ArrayD<f32>, ModelError>;

    /// Run several forward passes, results in input order
    fn predict_batch(&self, inputs: Vec<Array4<f32>>) -> Result<Vec<ArrayD<f32>>, ModelError> {
        inputs.into_iter().map(|input| self.predict(input)).collect()
    }
}

/// ONNX model loaded through `ort`
///
/// The session is created on first use and cached for the lifetime of the
/// value. All predictions go through the same mutex, so calls are serialized.
pub struct OnnxColorizationModel {
    path: PathBuf,
    input_name: String,
    output_name: String,
    intra_threads: usize,
    session: Mutex<Option<Session>>,
}

impl OnnxColorizationModel {
    pub fn new(
        path: impl Into<PathBuf>,
        input_name: impl Into<String>,
        output_name: impl Into<String>,
        intra_threads: usize,
    ) -> Self {
        Self {
            path: path.into(),
            input_name: input_name.into(),
            output_name: output_name.into(),
            intra_threads: intra_threads.max(1),
            session: Mutex::new(None),
        }
    }

    /// Model at `path` with tensor names and threading taken from the config
    pub fn from_config(config: &AppConfig, path: impl Into<PathBuf>) -> Self {
        Self::new(
            path,
            config.input_name.clone(),
            config.output_name.clone(),
            config.intra_threads,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the session now instead of on the first prediction
    ///
    /// Used to validate a freshly downloaded model file.
    pub fn load(&self) -> Result<(), ModelError> {
        self.with_session(|_| Ok(()))
    }

    fn load_session(&self) -> Result<Session, ModelError> {
        Session::builder()
            .and_then(|b| b.with_intra_threads(self.intra_threads))
            .and_then(|b| b.commit_from_file(&self.path))
            .map_err(|e| ModelError::Load {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<T, ModelError>,
    ) -> Result<T, ModelError> {
        let mut slot = self
            .session
            .lock()
            .map_err(|_| ModelError::Run("model session lock poisoned".to_string()))?;

        if slot.is_none() {
            *slot = Some(self.load_session()?);
            info!("Loaded colorization model from {}", self.path.display());
        }

        match slot.as_mut() {
            Some(session) => f(session),
            None => Err(ModelError::Run("model session unavailable".to_string())),
        }
    }
}

impl ColorizationModel for OnnxColorizationModel {
    fn predict(&self, input: Array4<f32>) -> Result<ArrayD<f32>, ModelError> {
        self.with_session(|session| {
            let tensor = Tensor::from_array(input)
                .map_err(|e| ModelError::Run(format!("input tensor: {}", e)))?;

            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => tensor])
                .map_err(|e| ModelError::Run(e.to_string()))?;

            let value = outputs
                .get(self.output_name.as_str())
                .ok_or_else(|| ModelError::MissingOutput(self.output_name.clone()))?;

            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::Run(format!("extract output: {}", e)))?;

            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            debug!("Model output shape {:?}", dims);

            ArrayD::from_shape_vec(dims, data.to_vec())
                .map_err(|e| ModelError::Run(format!("output shape: {}", e)))
        })
    }
}
