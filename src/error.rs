//! Error types for filter configuration, image jobs, image I/O and the worker pool.

use std::path::PathBuf;
use thiserror::Error;

/// Rejected configuration values. Raised before any work is scheduled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The filter name is not one of IDENTITY, BLUR, SHARPEN, EDGE, EMBOSS, GREY.
    #[error("unknown filter: {0:?}")]
    UnknownFilter(String),

    /// A pool must be able to run at least one job.
    #[error("pool size must be at least 1")]
    InvalidPoolSize,

    /// A job must fan out into at least one slice task.
    #[error("threads per image must be at least 1")]
    InvalidThreadCount,
}

/// Image decode/encode failures.
#[derive(Error, Debug)]
pub enum ImageIoError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of a single image job. None of these affect sibling jobs.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// More slice tasks than rows would leave some bands empty.
    #[error("cannot split {rows} rows into {threads} bands")]
    Partition { threads: usize, rows: usize },

    #[error("source image has no pixels")]
    EmptyImage,

    /// A slice task panicked or was aborted.
    #[error("slice task failed: {0}")]
    SliceTask(String),

    /// The job's task panicked before reporting a result.
    #[error("job panicked: {0}")]
    Panicked(String),

    #[error("merged {merged} rows, expected {expected}")]
    MergeMismatch { expected: usize, merged: usize },

    #[error("failed to save output: {0}")]
    Sink(#[from] ImageIoError),
}

/// Failures of the pool itself, as opposed to the jobs it runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker pool was already started")]
    AlreadyStarted,

    /// `start` must be called from within a tokio runtime.
    #[error("no tokio runtime to run the scheduler on")]
    NoRuntime,

    #[error("worker pool was never started")]
    NotStarted,

    #[error("worker pool scheduler has shut down")]
    Closed,

    /// Scheduler bug: more jobs running than the pool has slots.
    #[error("running set holds {running} jobs but capacity is {capacity}")]
    CapacityExceeded { running: usize, capacity: usize },

    #[error("scheduler task failed: {0}")]
    Scheduler(String),
}

pub type JobResult<T> = Result<T, JobError>;
pub type PoolResult<T> = Result<T, PoolError>;
