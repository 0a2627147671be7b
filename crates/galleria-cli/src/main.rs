//! Galleria CLI: operate the configured asset storage from the shell.
//!
//! The backend is chosen by STORAGE_PROVIDER (see `.env`). Results are
//! printed as JSON on stdout; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use galleria_cli::{
    file_name_of_key, guess_content_type, parse_batch_item, print_json, summarize_batch,
    BatchReport,
};
use galleria_core::Config;
use galleria_infra::init_telemetry;
use galleria_processing::{extract_palette_blocking, ingest, ImageProcessor, PaletteOptions};
use galleria_storage::{create_storage, delete_many, move_many, ListOptions, Storage, UploadInput};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "galleria", about = "Galleria asset storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and its optional thumbnail
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Destination folder, e.g. 2024/06
        #[arg(long)]
        subfolder: Option<String>,
        /// Stored filename (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
        /// Path to a thumbnail stored next to the original
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },
    /// Download a stored object
    Download {
        /// Storage key
        key: String,
        /// Output path (defaults to the key's filename)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete objects; each item is `key[,thumbnail_key]`
    Delete {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Move objects into another folder; each item is `key[,thumbnail_key]`
    Move {
        #[arg(required = true)]
        items: Vec<String>,
        /// Destination folder
        #[arg(long)]
        to: String,
    },
    /// List stored objects
    List {
        /// Restrict to this folder
        #[arg(long)]
        prefix: Option<String>,
        /// Maximum number of entries per page
        #[arg(long)]
        limit: Option<usize>,
        /// Cursor returned by a previous page
        #[arg(long)]
        cursor: Option<String>,
        /// Follow cursors until every page is read
        #[arg(long)]
        all: bool,
    },
    /// Print the public URL for a filename
    Url {
        filename: String,
        #[arg(long)]
        subfolder: Option<String>,
    },
    /// Extract the dominant colors of a local image
    Palette {
        file: PathBuf,
        /// Number of colors
        #[arg(long)]
        count: Option<usize>,
        /// Sampling stride (1 = every pixel)
        #[arg(long)]
        quality: Option<usize>,
    },
    /// Upload an image and extract its palette in one step
    Ingest {
        file: PathBuf,
        #[arg(long)]
        subfolder: Option<String>,
        #[arg(long)]
        thumbnail: Option<PathBuf>,
        #[arg(long)]
        count: Option<usize>,
        #[arg(long)]
        quality: Option<usize>,
    },
}

async fn read_input(
    path: &Path,
    name: Option<String>,
    subfolder: Option<&str>,
) -> anyhow::Result<UploadInput> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Cannot derive a filename from {}", path.display()))?,
    };

    let mut input = UploadInput::new(filename, data);
    if let Some(subfolder) = subfolder {
        input = input.with_subfolder(subfolder);
    }
    if let Some(content_type) = guess_content_type(path) {
        input = input.with_content_type(content_type);
    }
    Ok(input)
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    create_storage(config)
        .await
        .context("Failed to initialize storage backend")
}

fn palette_options(
    config: &Config,
    count: Option<usize>,
    quality: Option<usize>,
) -> PaletteOptions {
    let defaults = PaletteOptions::from(config.palette);
    PaletteOptions {
        color_count: count.unwrap_or(defaults.color_count),
        quality: quality.unwrap_or(defaults.quality),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_telemetry("galleria-cli", &config.environment)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    match cli.command {
        Commands::Upload {
            file,
            subfolder,
            name,
            thumbnail,
        } => {
            let storage = open_storage(&config).await?;
            let input = read_input(&file, name, subfolder.as_deref()).await?;
            let thumbnail = match thumbnail {
                Some(path) => Some(read_input(&path, None, subfolder.as_deref()).await?),
                None => None,
            };
            let result = storage.upload(input, thumbnail).await?;
            print_json(&result)?;
        }
        Commands::Download { key, output } => {
            let storage = open_storage(&config).await?;
            let data = storage.download(&key).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(file_name_of_key(&key)));
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            print_json(&serde_json::json!({
                "key": key,
                "path": output,
                "size_bytes": data.len(),
            }))?;
        }
        Commands::Delete { items } => {
            let storage = open_storage(&config).await?;
            let items = items
                .iter()
                .map(|item| parse_batch_item(item))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let reports: Vec<BatchReport<()>> = delete_many(storage.as_ref(), &items)
                .await
                .into_iter()
                .map(BatchReport::from)
                .collect();
            summarize_batch("delete", &reports);
            print_json(&reports)?;
        }
        Commands::Move { items, to } => {
            let storage = open_storage(&config).await?;
            let items = items
                .iter()
                .map(|item| parse_batch_item(item))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let reports: Vec<BatchReport<_>> = move_many(storage.as_ref(), &items, &to)
                .await
                .into_iter()
                .map(BatchReport::from)
                .collect();
            summarize_batch("move", &reports);
            print_json(&reports)?;
        }
        Commands::List {
            prefix,
            limit,
            cursor,
            all,
        } => {
            let storage = open_storage(&config).await?;
            let mut options = ListOptions {
                prefix,
                cursor,
                limit,
            };
            if !all {
                print_json(&storage.list(options).await?)?;
                return Ok(());
            }

            let mut files = Vec::new();
            loop {
                let page = storage.list(options.clone()).await?;
                let has_more = page.has_more;
                files.extend(page.files);
                match page.cursor.filter(|_| has_more) {
                    Some(next) => options.cursor = Some(next),
                    None => break,
                }
            }
            print_json(&serde_json::json!({ "files": files, "has_more": false }))?;
        }
        Commands::Url {
            filename,
            subfolder,
        } => {
            let storage = open_storage(&config).await?;
            let url = storage.get_url(&filename, subfolder.as_deref());
            print_json(&serde_json::json!({ "url": url }))?;
        }
        Commands::Ingest {
            file,
            subfolder,
            thumbnail,
            count,
            quality,
        } => {
            let storage = open_storage(&config).await?;
            let input = read_input(&file, None, subfolder.as_deref()).await?;
            let thumbnail = match thumbnail {
                Some(path) => Some(read_input(&path, None, subfolder.as_deref()).await?),
                None => None,
            };
            let options = palette_options(&config, count, quality);
            let result = ingest(storage, input, thumbnail, options).await?;
            print_json(&result)?;
        }
        Commands::Palette {
            file,
            count,
            quality,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let options = palette_options(&config, count, quality);
            let metadata = ImageProcessor::extract_metadata(&data).ok();
            let palette = extract_palette_blocking(data.into(), options).await;
            print_json(&serde_json::json!({ "palette": palette, "metadata": metadata }))?;
        }
    }

    Ok(())
}
