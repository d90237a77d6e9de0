use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "snaplabel")]
#[command(author, version, about = "Image classification web service")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        env = "SNAPLABEL_CONFIG",
        default_value = "snaplabel.yaml"
    )]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the `model` config section
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Remote model identifier
    #[arg(long = "model-id", global = true, env = "SNAPLABEL_MODEL_ID")]
    pub model_id: Option<String>,

    /// Local model artifact path
    #[arg(long = "model-path", global = true, env = "SNAPLABEL_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Download from a plain HTTP server; `{id}` is replaced by the model identifier
    #[arg(long = "url-template", global = true, env = "SNAPLABEL_URL_TEMPLATE")]
    pub url_template: Option<String>,

    /// Expected SHA-256 of the downloaded artifact
    #[arg(long, global = true, env = "SNAPLABEL_MODEL_SHA256")]
    pub sha256: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the web service
    Serve {
        /// Listen address
        #[arg(short, long, env = "SNAPLABEL_ADDRESS")]
        address: Option<String>,

        /// Listen port
        #[arg(short, long, env = "SNAPLABEL_PORT")]
        port: Option<u16>,

        /// Load the model before accepting connections
        #[arg(long)]
        eager: bool,
    },

    /// Download the model artifact if it is not cached yet
    Fetch,

    /// Classify a single image file
    Predict {
        /// Image to classify (jpg, png, webp or tiff)
        image: PathBuf,
    },

    /// Show the manifest of the model artifact
    Inspect,

    /// Write a small red/green/blue color classifier artifact
    ExportDemo {
        /// Output path
        #[arg(default_value = "colors.safetensors")]
        path: PathBuf,
    },
}
