use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use cookgen_core::{
    BackendSettings, Enricher, GenerationConfig, HttpImageJobTransport,
    OpenAiEmbeddingGenerator, OpenAiTextGenerator, ReqwestFetcher, RetryPolicy,
};

#[derive(Parser)]
#[command(name = "cookgen")]
#[command(about = "Generate an AI-authored recipe book", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a recipe book for the given cuisines
    Generate {
        /// Cuisine to generate (repeat for multiple)
        #[arg(long = "cuisine", required = true)]
        cuisines: Vec<String>,
        /// Recipes to generate per cuisine
        #[arg(long, default_value_t = 1)]
        recipes_per_cuisine: usize,
        /// Worker pool size for detail and embedding generation
        #[arg(long, default_value_t = 5)]
        recipe_concurrency: usize,
        /// Worker pool size for image generation
        #[arg(long, default_value_t = 1)]
        image_concurrency: usize,
        /// JPEG quality (0-100) for stored cover images
        #[arg(long, default_value_t = 60)]
        image_quality: u8,
        /// Directory for run output
        #[arg(long, default_value = "data/generated")]
        output_dir: PathBuf,
        /// Maximum poll attempts for the image job
        #[arg(long, default_value_t = 5)]
        max_retries: u32,
        /// Base backoff delay between image job polls, in milliseconds
        #[arg(long, default_value_t = 1000)]
        retry_delay_ms: u64,
        /// Skip the cover image stage
        #[arg(long)]
        skip_images: bool,
        /// Skip the embedding stage
        #[arg(long)]
        skip_embeddings: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            cuisines,
            recipes_per_cuisine,
            recipe_concurrency,
            image_concurrency,
            image_quality,
            output_dir,
            max_retries,
            retry_delay_ms,
            skip_images,
            skip_embeddings,
        } => {
            let mut config = GenerationConfig::new(cuisines)?;
            config.recipes_per_cuisine = recipes_per_cuisine;
            config.recipe_concurrency = recipe_concurrency;
            config.image_concurrency = image_concurrency;
            config.image_quality = image_quality;
            config.output_dir = output_dir;
            config.retry = RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(retry_delay_ms),
            };
            config.skip_images = skip_images;
            config.skip_embeddings = skip_embeddings;
            config.validate()?;

            let backends =
                BackendSettings::from_env().context("Failed to load backend settings")?;

            let enricher = Enricher {
                text: Arc::new(OpenAiTextGenerator::new(backends.text)),
                embedding: Arc::new(OpenAiEmbeddingGenerator::new(backends.embedding)),
                fetcher: Arc::new(ReqwestFetcher::new()),
                image_quality: config.image_quality,
            };
            let image_transport = Arc::new(HttpImageJobTransport::new(backends.image));

            let cancel = CancellationToken::new();
            let ctrlc_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, stopping after in-flight items");
                    ctrlc_cancel.cancel();
                }
            });

            let summary = cookgen_core::run(&config, enricher, image_transport, cancel)
                .await
                .context("Generation run failed")?;

            if summary.cancelled {
                tracing::warn!(run_id = %summary.run_id, "Run was interrupted; output is partial");
            }
        }
    }

    Ok(())
}
