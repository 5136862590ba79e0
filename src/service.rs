//! Colorize-and-remember use cases
//!
//! `ColorizeService` ties the colorization engine to the history store: a
//! successful colorization is saved as a `HistoryItem`, a failed one is not.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{info, warn};

use crate::colorizer::ImageColorizer;
use crate::error::Result;
use crate::state::{HistoryItem, HistoryRecord, Library};

pub struct ColorizeService {
    colorizer: ImageColorizer,
    library: Arc<Mutex<Library>>,
}

impl ColorizeService {
    pub fn new(colorizer: ImageColorizer, library: Library) -> Self {
        Self {
            colorizer,
            library: Arc::new(Mutex::new(library)),
        }
    }

    /// Colorize `image` and save the pair to history
    ///
    /// Returns the colorized image and the new history item's ID.
    pub async fn colorize(&self, image: DynamicImage) -> Result<(DynamicImage, i64)> {
        let result = self.colorize_only(image.clone()).await?;
        let id = self.save_history_item(image, result.clone()).await?;
        Ok((result, id))
    }

    /// Colorize without touching history
    pub async fn colorize_only(&self, image: DynamicImage) -> Result<DynamicImage> {
        match self.colorizer.colorize(image).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!("Colorization failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Colorize several images in one batch and save each pair
    pub async fn colorize_batch(&self, images: Vec<DynamicImage>) -> Result<Vec<(DynamicImage, i64)>> {
        let results = self.colorizer.colorize_batch(images.clone()).await?;

        let mut saved = Vec::with_capacity(results.len());
        for (input, result) in images.into_iter().zip(results) {
            let id = self.save_history_item(input, result.clone()).await?;
            saved.push((result, id));
        }
        info!("Colorized batch of {} images", saved.len());
        Ok(saved)
    }

    /// Encode both images as PNG and store them as a new history item
    pub async fn save_history_item(&self, input: DynamicImage, result: DynamicImage) -> Result<i64> {
        let library = Arc::clone(&self.library);
        task::spawn_blocking(move || -> Result<i64> {
            let item = HistoryItem::new(encode_png(&input)?, encode_png(&result)?);
            let id = library.blocking_lock().save_history_item(&item)?;
            info!("Saved history item {}", id);
            Ok(id)
        })
        .await?
    }

    /// All history items, newest first
    pub async fn history_items(&self) -> Result<Vec<HistoryRecord>> {
        let library = Arc::clone(&self.library);
        task::spawn_blocking(move || -> Result<Vec<HistoryRecord>> {
            Ok(library.blocking_lock().history_items()?)
        })
        .await?
    }

    pub async fn history_item(&self, id: i64) -> Result<Option<HistoryRecord>> {
        let library = Arc::clone(&self.library);
        task::spawn_blocking(move || -> Result<Option<HistoryRecord>> {
            Ok(library.blocking_lock().history_item(id)?)
        })
        .await?
    }
}

/// Encode an image as PNG bytes
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// The newest `limit` history items, or all of them
pub fn recent_history(library: &Library, limit: Option<usize>) -> Result<Vec<HistoryRecord>> {
    let mut records = library.history_items()?;
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    Ok(records)
}

/// Write each record's stored PNGs as `<id>_input.png` and `<id>_result.png`
///
/// Missing blobs are skipped. Returns the files written.
pub fn export_history(records: &[HistoryRecord], dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for record in records {
        let blobs = [
            ("input", &record.item.input_image),
            ("result", &record.item.result_image),
        ];
        for (kind, blob) in blobs {
            let Some(bytes) = blob else {
                warn!("History item {} has no {} image", record.id, kind);
                continue;
            };
            let path = dir.join(format!("{}_{}.png", record.id, kind));
            std::fs::write(&path, bytes)?;
            written.push(path);
        }
    }
    info!("Exported {} files to {}", written.len(), dir.display());
    Ok(written)
}
