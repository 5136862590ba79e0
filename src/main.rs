use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use colorizer::download::ModelDownloader;
use colorizer::service::{export_history, recent_history};
use colorizer::state::Library;
use colorizer::{AppConfig, ColorizeService, ImageColorizer, OnnxColorizationModel};

/// Image extensions picked up by `batch`
const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp"];

/// Colorize grayscale photos with an on-device model
#[derive(Parser)]
#[command(name = "colorizer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the data directory (database and models)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Colorize a single image
    Colorize {
        input: PathBuf,

        /// Output path (default: <input>_colorized.png next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not save the result to history
        #[arg(long)]
        no_history: bool,
    },

    /// Colorize every image in a directory
    Batch {
        dir: PathBuf,

        /// Where results go (default: next to each input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// List past colorizations, newest first
    History {
        /// Write each item's input and result PNGs into this directory
        #[arg(long, value_name = "DIR")]
        export: Option<PathBuf>,

        /// Show at most this many items
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Download and install the colorization model
    Download {
        /// Model URL (default: model_url from the config file)
        #[arg(long)]
        url: Option<String>,
    },

    /// Show data directory, installed model and history size
    Status,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "colorizer=debug" } else { "colorizer=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let library = Library::open(&config.database_path())
        .with_context(|| format!("opening database {}", config.database_path().display()))?;
    let downloader = ModelDownloader::new(config.models_dir())?;

    match cli.command {
        Commands::Colorize {
            input,
            output,
            no_history,
        } => {
            let service = build_service(&config, &downloader, library)?;
            let image = load_image(&input)?;
            let output = output.unwrap_or_else(|| colorized_path(&input, None));

            let result = if no_history {
                service.colorize_only(image).await?
            } else {
                let (result, id) = service.colorize(image).await?;
                info!("Saved as history item {}", id);
                result
            };

            result
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("✅ {} -> {}", input.display(), output.display());
        }

        Commands::Batch { dir, output_dir } => {
            let service = build_service(&config, &downloader, library)?;
            let inputs = find_images(&dir);
            if inputs.is_empty() {
                bail!("no images found in {}", dir.display());
            }

            let mut paths = Vec::with_capacity(inputs.len());
            let mut images = Vec::with_capacity(inputs.len());
            for path in inputs {
                match load_image(&path) {
                    Ok(image) => {
                        images.push(image);
                        paths.push(path);
                    }
                    Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
                }
            }

            if let Some(out) = &output_dir {
                std::fs::create_dir_all(out)?;
            }

            let results = service.colorize_batch(images).await?;
            for (path, (result, _id)) in paths.iter().zip(results) {
                let output = colorized_path(path, output_dir.as_deref());
                result
                    .save(&output)
                    .with_context(|| format!("writing {}", output.display()))?;
                println!("✅ {} -> {}", path.display(), output.display());
            }
        }

        Commands::History { export, limit } => {
            let records = recent_history(&library, limit)?;
            if records.is_empty() {
                println!("No history yet.");
            }

            for record in &records {
                let when = record
                    .item
                    .timestamp
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown time".to_string());
                println!("#{:<5} {}", record.id, when);
            }

            if let Some(dir) = &export {
                let written = export_history(&records, dir)
                    .with_context(|| format!("exporting history to {}", dir.display()))?;
                println!("✅ Wrote {} files to {}", written.len(), dir.display());
            }
        }

        Commands::Download { url } => {
            let Some(url) = url.or_else(|| config.model_url.clone()) else {
                bail!("no model URL: pass --url or set model_url in the config file");
            };

            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );

            // A file the runtime cannot load never replaces the installed model
            let check_config = config.clone();
            let path = downloader
                .download_and_install(
                    &library,
                    &url,
                    &config.model_file_name,
                    |progress| {
                        if progress.total_units > 0 {
                            bar.set_length(progress.total_units);
                        }
                        bar.set_position(progress.completed_units);
                        bar.set_message(progress.describe());
                    },
                    move |candidate| OnnxColorizationModel::from_config(&check_config, candidate).load(),
                )
                .await?;
            bar.finish();

            println!("✅ Model installed at {}", path.display());
        }

        Commands::Status => {
            println!("Data directory: {}", config.data_dir.display());
            match downloader.installed_model_path(&library)? {
                Some(path) => println!("Model:          {}", path.display()),
                None => println!("Model:          not installed (run `colorizer download`)"),
            }
            println!("History items:  {}", library.history_count()?);
        }
    }

    Ok(())
}

fn build_service(
    config: &AppConfig,
    downloader: &ModelDownloader,
    library: Library,
) -> Result<ColorizeService> {
    let Some(model_path) = downloader.installed_model_path(&library)? else {
        bail!("no model installed, run `colorizer download` first");
    };

    let model = OnnxColorizationModel::from_config(config, model_path);
    Ok(ColorizeService::new(
        ImageColorizer::new(Arc::new(model)),
        library,
    ))
}

fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("reading {}", path.display()))
}

/// `<dir>/<stem>_colorized.png`, where dir defaults to the input's directory
fn colorized_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}_colorized.png", stem))
}

/// All image files under `dir`, sorted, skipping earlier results
fn find_images(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        })
        .filter(|path| {
            !path
                .file_stem()
                .map(|s| s.to_string_lossy().ends_with("_colorized"))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}
