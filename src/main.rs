// Command-line runner for the `kernel_pool` library.
//
// Filters every image under a directory and writes `<name>_filtered.png` files.
// Per-image failures are logged and counted; they do not change the exit status.

use anyhow::{Context, Result};
use clap::Parser;
use kernel_pool::pipeline::{DEFAULT_THREADS_PER_IMAGE, FilterPipeline, PipelineConfig};
use kernel_pool::Filter;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kernel_pool")]
#[command(version, about = "Apply a 3x3 convolution or greyscale filter to a batch of images")]
struct Cli {
    /// Directory searched recursively for images
    #[arg(short, long, default_value = "img")]
    input: PathBuf,

    /// Directory for filtered outputs
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// IDENTITY, BLUR, SHARPEN, EDGE, EMBOSS or GREY (case-insensitive)
    #[arg(short, long, default_value = "GREY")]
    filter: Filter,

    /// Filter images without writing them
    #[arg(long)]
    no_save: bool,

    /// Images processed at once (0 = one per CPU)
    #[arg(short = 'j', long, default_value_t = 0)]
    pool_size: usize,

    /// Row bands per image
    #[arg(short, long, default_value_t = DEFAULT_THREADS_PER_IMAGE)]
    threads: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            input_dir: self.input,
            output_dir: self.output,
            filter: self.filter,
            save_output: !self.no_save,
            pool_size: if self.pool_size == 0 {
                defaults.pool_size
            } else {
                self.pool_size
            },
            threads_per_image: self.threads,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.into_config();
    if config.save_output {
        std::fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("creating {}", config.output_dir.display()))?;
    }

    let pipeline = FilterPipeline::new(config).context("invalid configuration")?;
    let report = pipeline.run().await.context("worker pool failed")?;

    info!(
        found = report.images_found,
        succeeded = report.succeeded(),
        failed = report.failed(),
        saved = report.saved().len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "batch complete"
    );
    Ok(())
}
