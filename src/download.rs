//! Model download
//!
//! The model file is fetched once over HTTP, streamed into the models
//! directory and its file name recorded in the settings table. Later runs
//! resolve the recorded name back to a path instead of downloading again.

use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task;
use tracing::{debug, info, warn};

use crate::error::{AppError, ModelError, Result};
use crate::state::Library;
use crate::units::{ProgressModel, Units};

/// Settings key holding the installed model's file name
pub const MODEL_DESTINATION_KEY: &str = "ml_model_destination";

/// Downloads the model file into a local directory
pub struct ModelDownloader {
    client: Client,
    models_dir: PathBuf,
}

impl ModelDownloader {
    /// Create a new downloader
    pub fn new(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)?;

        let client = Client::builder()
            .user_agent(concat!("colorizer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, models_dir })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Download `url` to `<models_dir>/<file_name>.part`
    ///
    /// Returns the partial path; nothing installed is touched until
    /// [`install`](Self::install). `on_progress` is called after every
    /// received chunk. The partial file is removed if anything goes wrong.
    pub async fn download<F>(&self, url: &str, file_name: &str, mut on_progress: F) -> Result<PathBuf>
    where
        F: FnMut(ProgressModel),
    {
        let partial = self.partial_path(file_name);

        info!("Downloading model from {}", url);
        match self.fetch_to(url, &partial, &mut on_progress).await {
            Ok(bytes) => {
                info!("Downloaded {} to {}", Units::new(bytes), partial.display());
                Ok(partial)
            }
            Err(e) => {
                warn!("Model download failed: {}", e);
                discard(&partial).await;
                Err(e)
            }
        }
    }

    /// Move a downloaded file into place as `<models_dir>/<file_name>` and record it
    pub async fn install(&self, library: &Library, partial: &Path, file_name: &str) -> Result<PathBuf> {
        let destination = self.models_dir.join(file_name);
        fs::rename(partial, &destination).await?;
        self.record_installed(library, &destination)?;
        info!("Model installed at {}", destination.display());
        Ok(destination)
    }

    /// Download, check with `validate` on a blocking worker, then install
    ///
    /// A file that fails validation is deleted; the previously installed
    /// model and its settings entry stay as they were.
    pub async fn download_and_install<F, V>(
        &self,
        library: &Library,
        url: &str,
        file_name: &str,
        on_progress: F,
        validate: V,
    ) -> Result<PathBuf>
    where
        F: FnMut(ProgressModel),
        V: FnOnce(PathBuf) -> std::result::Result<(), ModelError> + Send + 'static,
    {
        let partial = self.download(url, file_name, on_progress).await?;

        let candidate = partial.clone();
        let verdict = task::spawn_blocking(move || validate(candidate)).await;
        match verdict {
            Ok(Ok(())) => self.install(library, &partial, file_name).await,
            Ok(Err(e)) => {
                warn!("Downloaded model rejected: {}", e);
                discard(&partial).await;
                Err(AppError::InvalidModel(e))
            }
            Err(e) => {
                discard(&partial).await;
                Err(e.into())
            }
        }
    }

    fn partial_path(&self, file_name: &str) -> PathBuf {
        self.models_dir.join(format!("{}.part", file_name))
    }

    async fn fetch_to<F>(&self, url: &str, path: &Path, on_progress: &mut F) -> Result<u64>
    where
        F: FnMut(ProgressModel),
    {
        let mut response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Download(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        let total = response.content_length().unwrap_or(0);
        let mut file = fs::File::create(path).await?;
        let mut completed: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            completed += chunk.len() as u64;
            on_progress(ProgressModel::new(completed, total));
        }
        file.flush().await?;

        if completed == 0 {
            return Err(AppError::Download(format!("empty response from {}", url)));
        }
        Ok(completed)
    }

    /// Remember `model_path` as the installed model
    pub fn record_installed(&self, library: &Library, model_path: &Path) -> Result<()> {
        let file_name = model_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AppError::Download(format!("invalid model path {}", model_path.display()))
            })?;

        library.set_setting(MODEL_DESTINATION_KEY, file_name)?;
        Ok(())
    }

    /// Path of the installed model, if one was recorded and is still on disk
    pub fn installed_model_path(&self, library: &Library) -> Result<Option<PathBuf>> {
        let Some(file_name) = library.setting(MODEL_DESTINATION_KEY)? else {
            return Ok(None);
        };

        let path = self.models_dir.join(file_name);
        if path.is_file() {
            Ok(Some(path))
        } else {
            warn!("Recorded model {} is missing", path.display());
            Ok(None)
        }
    }
}

async fn discard(partial: &Path) {
    if let Err(e) = fs::remove_file(partial).await {
        debug!("No partial file to remove: {}", e);
    }
}
