// THEORY:
// An `ImageJob` is the middle layer of the concurrency tree. It owns one source
// image and turns it into one filtered output image by fanning out into slice
// tasks and fanning back in.
//
// Key architectural principles:
// 1.  **Validate Up Front**: The filter is parsed and the band partition is computed
//     in the constructor. An unknown filter or more threads than rows is an error
//     before the job ever reaches a pool.
// 2.  **Structured Fan-Out/Fan-In**: `process` spawns exactly one blocking task per
//     band and joins all of them at a single point. No output buffer is shared
//     while slice tasks run; each task returns its own `FilteredBand`.
// 3.  **Ordered Merge**: Bands are consulted in the order they were assigned and
//     each band's row cursor advances one row per merged output row. The merged
//     grid has exactly as many rows as the source.
// 4.  **Observable Lifecycle**: A `JobStatus` handle can be cloned before the job
//     is moved into a pool. It moves Pending -> Running -> Finished (or Failed),
//     and never backwards.

use crate::core_modules::kernel::Filter;
use crate::core_modules::pixel_grid::pixel_grid::PixelGrid;
use crate::core_modules::slice_filter::{self, FilteredBand};
use crate::core_modules::utils::image_helper::image_helper::ImageSink;
use crate::error::{ImageIoError, JobError, JobResult};
use futures::future::join_all;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// A contiguous run of rows assigned to one slice task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub start: usize,
    pub len: usize,
}

impl Band {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Splits `rows` into `threads` contiguous bands. Every band but the last gets
/// `rows / threads` rows; the last absorbs the remainder.
pub fn partition(rows: usize, threads: usize) -> JobResult<Vec<Band>> {
    if threads == 0 || threads > rows {
        return Err(JobError::Partition { threads, rows });
    }
    let band = rows / threads;
    let mut bands: Vec<Band> = (0..threads - 1)
        .map(|i| Band {
            start: i * band,
            len: band,
        })
        .collect();
    let last_start = (threads - 1) * band;
    bands.push(Band {
        start: last_start,
        len: rows - last_start,
    });
    Ok(bands)
}

/// Lifecycle of an image job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Finished,
    Failed,
}

impl JobState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobState::Pending,
            1 => JobState::Running,
            2 => JobState::Finished,
            _ => JobState::Failed,
        }
    }
}

/// A shared, read-only view of a job's lifecycle state.
#[derive(Debug, Clone)]
pub struct JobStatus(Arc<AtomicU8>);

impl JobStatus {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(JobState::Pending as u8)))
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.state() == JobState::Finished
    }

    pub(crate) fn set(&self, state: JobState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

struct OutputTarget {
    path: PathBuf,
    sink: Arc<dyn ImageSink>,
}

/// What a successfully finished job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub saved_to: Option<PathBuf>,
}

/// One image to be filtered by `threads` concurrent slice tasks.
pub struct ImageJob {
    name: String,
    source: Arc<PixelGrid>,
    filter: Filter,
    bands: Vec<Band>,
    output: Option<OutputTarget>,
    status: JobStatus,
}

impl fmt::Debug for ImageJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageJob")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .field("bands", &self.bands)
            .field("output", &self.output.as_ref().map(|o| &o.path))
            .field("state", &self.status.state())
            .finish()
    }
}

impl ImageJob {
    pub fn new(
        name: impl Into<String>,
        source: PixelGrid,
        filter: Filter,
        threads: usize,
    ) -> JobResult<Self> {
        if source.is_empty() {
            return Err(JobError::EmptyImage);
        }
        let bands = partition(source.rows(), threads)?;
        Ok(Self {
            name: name.into(),
            source: Arc::new(source),
            filter,
            bands,
            output: None,
            status: JobStatus::new(),
        })
    }

    /// Like `new`, but parses the filter name first.
    pub fn from_filter_name(
        name: impl Into<String>,
        source: PixelGrid,
        filter_name: &str,
        threads: usize,
    ) -> JobResult<Self> {
        let filter: Filter = filter_name.parse()?;
        Self::new(name, source, filter, threads)
    }

    /// Requests that the merged image be written to `path` through `sink`.
    pub fn with_output(mut self, path: impl Into<PathBuf>, sink: Arc<dyn ImageSink>) -> Self {
        self.output = Some(OutputTarget {
            path: path.into(),
            sink,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> JobStatus {
        self.status.clone()
    }

    /// Filters every band concurrently and merges the results in band order.
    pub async fn process(&self) -> JobResult<PixelGrid> {
        let filter = self.filter;
        let (grid, context_rows) = if filter.needs_border() {
            (Arc::new(self.source.bordered()), 2)
        } else {
            (Arc::clone(&self.source), 0)
        };

        debug!(job = %self.name, %filter, bands = self.bands.len(), "fanning out slice tasks");
        let tasks = self.bands.iter().map(|&band| {
            let grid = Arc::clone(&grid);
            tokio::task::spawn_blocking(move || {
                // Bordered row `band.start` is the context row just above the band.
                let view = grid.band(band.start, band.len + context_rows).ok_or_else(|| {
                    JobError::SliceTask(format!(
                        "band {}..{} does not fit the source grid",
                        band.start,
                        band.end()
                    ))
                })?;
                Ok::<_, JobError>(slice_filter::apply(filter, view))
            })
        });

        let mut filtered = Vec::with_capacity(self.bands.len());
        for joined in join_all(tasks).await {
            let band = joined.map_err(|err| JobError::SliceTask(err.to_string()))??;
            filtered.push(band);
        }

        let merged = merge(&filtered, self.source.rows(), self.source.cols())?;
        debug!(job = %self.name, rows = merged.rows(), "merged slice outputs");
        Ok(merged)
    }

    /// Processes the image, writes it if an output was requested, and records the
    /// final state on the job's status handle.
    pub async fn run(self) -> JobResult<JobReport> {
        self.status.set(JobState::Running);
        let status = self.status.clone();
        let result = self.run_inner().await;
        status.set(if result.is_ok() {
            JobState::Finished
        } else {
            JobState::Failed
        });
        result
    }

    async fn run_inner(self) -> JobResult<JobReport> {
        let merged = self.process().await?;
        let (rows, cols) = (merged.rows(), merged.cols());

        let saved_to = match self.output {
            Some(OutputTarget { path, sink }) => {
                let target = path.clone();
                tokio::task::spawn_blocking(move || sink.write(&merged, &target))
                    .await
                    .map_err(|err| ImageIoError::Io(std::io::Error::other(err.to_string())))??;
                Some(path)
            }
            None => None,
        };

        Ok(JobReport {
            name: self.name,
            rows,
            cols,
            saved_to,
        })
    }
}

/// Reassembles filtered bands into one grid, reading each band row by row in order.
pub fn merge(bands: &[FilteredBand], expected_rows: usize, cols: usize) -> JobResult<PixelGrid> {
    let total: usize = bands.iter().map(|b| b.rows).sum();
    if total != expected_rows || bands.iter().any(|b| b.cols != cols) {
        return Err(JobError::MergeMismatch {
            expected: expected_rows,
            merged: total,
        });
    }

    let mut merged = PixelGrid::with_row_capacity(cols, expected_rows);
    let mut task = 0;
    let mut cursor = 0;
    for _ in 0..expected_rows {
        while cursor == bands[task].rows {
            task += 1;
            cursor = 0;
        }
        merged.extend_rows(bands[task].row(cursor));
        cursor += 1;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color::color::Color;
    use crate::core_modules::kernel::Kernel;
    use crate::error::ConfigError;
    use approx::assert_relative_eq;
    use std::path::Path;
    use std::sync::Mutex;

    fn gradient(rows: usize, cols: usize) -> PixelGrid {
        PixelGrid::from_fn(rows, cols, |r, c| {
            Color::new(r as f64 / rows as f64, c as f64 / cols as f64, (r + c) as f64 / 20.0)
        })
    }

    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<(PathBuf, usize)>>,
    }

    impl ImageSink for RecordingSink {
        fn write(&self, grid: &PixelGrid, target: &Path) -> Result<(), ImageIoError> {
            self.writes.lock().unwrap().push((target.to_path_buf(), grid.rows()));
            Ok(())
        }
    }

    struct FailingSink;

    impl ImageSink for FailingSink {
        fn write(&self, _: &PixelGrid, _: &Path) -> Result<(), ImageIoError> {
            Err(ImageIoError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn partition_covers_every_row_exactly_once() {
        for rows in 1..40 {
            for threads in 1..=rows {
                let bands = partition(rows, threads).unwrap();
                assert_eq!(bands.len(), threads);
                assert_eq!(bands[0].start, 0);
                for pair in bands.windows(2) {
                    assert_eq!(pair[0].end(), pair[1].start);
                }
                assert!(bands.iter().all(|b| b.len > 0));
                assert_eq!(bands.iter().map(|b| b.len).sum::<usize>(), rows);
                assert_eq!(bands.last().unwrap().end(), rows);
            }
        }
    }

    #[test]
    fn last_band_absorbs_remainder() {
        let sizes: Vec<usize> = partition(8, 3).unwrap().iter().map(|b| b.len).collect();
        assert_eq!(sizes, vec![2, 2, 4]);
    }

    #[test]
    fn degenerate_thread_counts_are_rejected() {
        assert!(matches!(partition(4, 0), Err(JobError::Partition { threads: 0, rows: 4 })));
        assert!(matches!(partition(4, 5), Err(JobError::Partition { threads: 5, rows: 4 })));
        let err = ImageJob::new("tiny", gradient(2, 9), Filter::Grey, 3).unwrap_err();
        assert!(matches!(err, JobError::Partition { .. }));
    }

    #[test]
    fn construction_rejects_unknown_filter_and_empty_image() {
        let err = ImageJob::from_filter_name("x", gradient(4, 4), "SEPIA", 2).unwrap_err();
        assert!(matches!(err, JobError::Config(ConfigError::UnknownFilter(_))));

        let empty = PixelGrid::filled(0, 0, Color::BLACK);
        assert!(matches!(
            ImageJob::new("x", empty, Filter::Grey, 1),
            Err(JobError::EmptyImage)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn grey_of_uniform_red_is_one_third_everywhere() {
        let red = PixelGrid::filled(4, 4, Color::new(1.0, 0.0, 0.0));
        let job = ImageJob::new("red", red, Filter::Grey, 2).unwrap();
        let out = job.process().await.unwrap();
        assert_eq!((out.rows(), out.cols()), (4, 4));
        for c in out.pixels() {
            assert_relative_eq!(c.red, 1.0 / 3.0);
            assert_relative_eq!(c.green, 1.0 / 3.0);
            assert_relative_eq!(c.blue, 1.0 / 3.0);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identity_is_exact_for_any_thread_count() {
        let source = gradient(9, 5);
        for threads in 1..=9 {
            let filter = Filter::Convolve(Kernel::Identity);
            let job = ImageJob::new("id", source.clone(), filter, threads).unwrap();
            assert_eq!(job.process().await.unwrap(), source);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn banded_convolution_matches_single_band() {
        let source = gradient(11, 6);
        for kernel in Kernel::ALL {
            let whole = ImageJob::new("a", source.clone(), Filter::Convolve(kernel), 1)
                .unwrap()
                .process()
                .await
                .unwrap();
            let banded = ImageJob::new("b", source.clone(), Filter::Convolve(kernel), 4)
                .unwrap()
                .process()
                .await
                .unwrap();
            assert_eq!(whole, banded, "{kernel:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_saves_output_and_finishes() {
        let sink = Arc::new(RecordingSink::default());
        let job = ImageJob::new("saved", gradient(6, 2), Filter::Grey, 3)
            .unwrap()
            .with_output("out/saved_filtered.png", sink.clone());
        let status = job.status();
        assert_eq!(status.state(), JobState::Pending);

        let report = job.run().await.unwrap();
        assert_eq!(report.saved_to, Some(PathBuf::from("out/saved_filtered.png")));
        assert_eq!((report.rows, report.cols), (6, 2));
        assert!(status.is_finished());
        assert_eq!(
            *sink.writes.lock().unwrap(),
            vec![(PathBuf::from("out/saved_filtered.png"), 6)]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_without_output_skips_the_sink() {
        let job =
            ImageJob::new("quiet", gradient(3, 3), Filter::Convolve(Kernel::Blur), 1).unwrap();
        let status = job.status();
        let report = job.run().await.unwrap();
        assert_eq!(report.saved_to, None);
        assert!(status.is_finished());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sink_failure_is_reported_not_finished() {
        let job = ImageJob::new("broken", gradient(3, 3), Filter::Grey, 1)
            .unwrap()
            .with_output("nowhere.png", Arc::new(FailingSink));
        let status = job.status();
        let err = job.run().await.unwrap_err();
        assert!(matches!(err, JobError::Sink(_)));
        assert_eq!(status.state(), JobState::Failed);
    }

    #[test]
    fn merge_rejects_short_bands() {
        let band = FilteredBand {
            rows: 2,
            cols: 3,
            pixels: vec![Color::BLACK; 6],
        };
        let err = merge(&[band.clone(), band], 5, 3).unwrap_err();
        assert!(matches!(err, JobError::MergeMismatch { expected: 5, merged: 4 }));
    }

    #[test]
    fn merge_preserves_band_order() {
        let a = FilteredBand { rows: 1, cols: 1, pixels: vec![Color::BLACK] };
        let b = FilteredBand { rows: 2, cols: 1, pixels: vec![Color::WHITE, Color::NEUTRAL_GREY] };
        let merged = merge(&[a, b], 3, 1).unwrap();
        assert_eq!(merged.pixels(), &[Color::BLACK, Color::WHITE, Color::NEUTRAL_GREY]);
    }
}
