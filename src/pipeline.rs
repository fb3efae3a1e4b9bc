// THEORY:
// The `pipeline` module is the top-level API for batch filtering. It ties the
// pieces together: discover and decode every image under a directory, build one
// validated `ImageJob` per image, feed them all to a `WorkerPool`, and wait for
// the pool to drain.
//
// Images that cannot become jobs (too narrow for the requested thread count, or
// empty) are rejected individually and reported; they never stop the batch.

use crate::core_modules::image_job::ImageJob;
use crate::core_modules::kernel::Filter;
use crate::core_modules::utils::image_helper::image_helper::{
    self, ImageSink, PngSink, SourceImage,
};
use crate::error::{ConfigError, JobError, PoolError, PoolResult};
use crate::parallel_pipeline::{PoolReport, WorkerPool};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default number of slice tasks per image.
pub const DEFAULT_THREADS_PER_IMAGE: usize = 2;

/// Configuration for a batch run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory searched recursively for source images.
    pub input_dir: PathBuf,
    /// Directory that receives `<filename>_filtered.png` outputs.
    pub output_dir: PathBuf,
    pub filter: Filter,
    /// When false, images are filtered but nothing is written.
    pub save_output: bool,
    /// Maximum number of images processed at once.
    pub pool_size: usize,
    /// Number of row bands each image is split into.
    pub threads_per_image: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("img"),
            output_dir: PathBuf::from("."),
            filter: Filter::default(),
            save_output: true,
            pool_size: num_cpus::get(),
            threads_per_image: DEFAULT_THREADS_PER_IMAGE,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        if self.threads_per_image == 0 {
            return Err(ConfigError::InvalidThreadCount);
        }
        Ok(())
    }
}

/// Summary of one batch run.
#[derive(Debug)]
pub struct BatchReport {
    pub images_found: usize,
    /// Images that could not be turned into jobs.
    pub rejected: Vec<(String, JobError)>,
    pub pool: PoolReport,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.pool.succeeded()
    }

    pub fn failed(&self) -> usize {
        self.pool.failed() + self.rejected.len()
    }

    pub fn saved(&self) -> Vec<PathBuf> {
        self.pool
            .outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok()?.saved_to.clone())
            .collect()
    }
}

/// Runs a configured filter over a batch of images.
pub struct FilterPipeline {
    config: PipelineConfig,
    sink: Arc<dyn ImageSink>,
}

impl FilterPipeline {
    /// A pipeline that writes PNG files.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::with_sink(config, Arc::new(PngSink))
    }

    pub fn with_sink(
        config: PipelineConfig,
        sink: Arc<dyn ImageSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, sink })
    }

    /// Builds one job per image, setting aside images that fail validation.
    pub fn build_jobs(
        &self,
        images: Vec<SourceImage>,
    ) -> (Vec<ImageJob>, Vec<(String, JobError)>) {
        let mut jobs = Vec::with_capacity(images.len());
        let mut rejected = Vec::new();
        for image in images {
            match ImageJob::new(
                image.filename.clone(),
                image.grid,
                self.config.filter,
                self.config.threads_per_image,
            ) {
                Ok(job) => {
                    let job = if self.config.save_output {
                        let target =
                            image_helper::output_path(&self.config.output_dir, &image.filename);
                        job.with_output(target, Arc::clone(&self.sink))
                    } else {
                        job
                    };
                    jobs.push(job);
                }
                Err(err) => {
                    warn!(
                        file = %image.filename,
                        path = %image.path.display(),
                        error = %err,
                        "rejecting image"
                    );
                    rejected.push((image.filename, err));
                }
            }
        }
        (jobs, rejected)
    }

    /// Decodes everything under `input_dir` and filters it.
    pub async fn run(&self) -> PoolResult<BatchReport> {
        let root = self.config.input_dir.clone();
        let images = tokio::task::spawn_blocking(move || image_helper::find_images(&root))
            .await
            .map_err(|err| PoolError::Scheduler(err.to_string()))?;
        self.run_images(images).await
    }

    /// Filters already-decoded images.
    pub async fn run_images(&self, images: Vec<SourceImage>) -> PoolResult<BatchReport> {
        let started = Instant::now();
        let images_found = images.len();
        info!(
            images = images_found,
            filter = %self.config.filter,
            pool_size = self.config.pool_size,
            threads_per_image = self.config.threads_per_image,
            "Working."
        );

        let (jobs, rejected) = self.build_jobs(images);
        let mut pool = WorkerPool::new(self.config.pool_size)?;
        for job in jobs {
            pool.submit(job)?;
        }
        pool.start()?;
        let pool = pool.await_completion().await?;

        let elapsed = started.elapsed();
        info!(
            succeeded = pool.succeeded(),
            failed = pool.failed() + rejected.len(),
            elapsed_ns = elapsed.as_nanos() as u64,
            "Done."
        );
        Ok(BatchReport {
            images_found,
            rejected,
            pool,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color::color::Color;
    use crate::core_modules::kernel::Kernel;
    use crate::core_modules::pixel_grid::pixel_grid::PixelGrid;

    fn source(name: &str, rows: usize, cols: usize) -> SourceImage {
        SourceImage {
            filename: name.to_string(),
            path: PathBuf::from(name),
            grid: PixelGrid::filled(rows, cols, Color::new(0.2, 0.4, 0.9)),
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.pool_size >= 1);
        assert_eq!(config.threads_per_image, 2);
        assert_eq!(config.filter, Filter::Grey);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let config = PipelineConfig {
            pool_size: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPoolSize));
        let config = PipelineConfig {
            threads_per_image: 0,
            ..PipelineConfig::default()
        };
        assert!(FilterPipeline::new(config).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn narrow_images_are_rejected_without_stopping_the_batch() {
        let out = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_dir: out.path().to_path_buf(),
            filter: Filter::Convolve(Kernel::Emboss),
            pool_size: 2,
            threads_per_image: 3,
            ..PipelineConfig::default()
        };
        let pipeline = FilterPipeline::new(config).unwrap();
        let images = vec![
            source("wide.png", 6, 2),
            source("narrow.png", 2, 6),
            source("big.png", 9, 9),
        ];

        let report = pipeline.run_images(images).await.unwrap();

        assert_eq!(report.images_found, 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.rejected[0].0, "narrow.png");
        assert!(out.path().join("wide.png_filtered.png").is_file());
        assert!(out.path().join("big.png_filtered.png").is_file());
        assert_eq!(report.saved().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_disabled_writes_nothing() {
        let out = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_dir: out.path().to_path_buf(),
            save_output: false,
            pool_size: 1,
            ..PipelineConfig::default()
        };
        let report = FilterPipeline::new(config)
            .unwrap()
            .run_images(vec![source("a.png", 4, 4)])
            .await
            .unwrap();
        assert_eq!(report.succeeded(), 1);
        assert!(report.saved().is_empty());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
