// THEORY:
// This file is the entry point for the `kernel_pool` library crate. It exposes
// the batch filtering API (`pipeline`) and the bounded job scheduler
// (`parallel_pipeline`) as the high-level interface. The building blocks
// (colors, grids, kernels, slice filtering, per-image jobs, image I/O) live in
// `core_modules` and are public so callers can drive a single job directly.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::image_job::{ImageJob, JobState, JobStatus};
pub use core_modules::kernel::{Filter, Kernel};
pub use core_modules::pixel_grid::pixel_grid::PixelGrid;
pub use error::{ConfigError, ImageIoError, JobError, PoolError};
pub use parallel_pipeline::{PoolReport, WorkerPool};
pub use pipeline::{BatchReport, FilterPipeline, PipelineConfig};
