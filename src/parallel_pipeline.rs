// THEORY:
// The `WorkerPool` bounds how many `ImageJob`s run at once and keeps its slots
// busy from a FIFO waiting queue until every submitted job is done.
//
// It is built as an actor. A single scheduler task owns the waiting queue and the
// running set outright, so neither needs a lock. Callers talk to it through a
// command channel (submit, drain), and every running job reports back through a
// completion channel when it ends. The scheduler wakes only on those two events:
// there is no polling.
//
// Invariants held by the scheduler:
// - the running set never holds more than `pool_size` jobs
// - jobs are admitted in exactly the order their submissions arrived
// - a slot is reused as soon as its job's completion is observed
// - one job failing never affects its siblings; it becomes a failed `JobOutcome`

use crate::core_modules::image_job::{ImageJob, JobReport, JobState, JobStatus};
use crate::error::{ConfigError, JobError, JobResult, PoolError, PoolResult};
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Identifies a job within one pool, in submission order.
pub type JobId = u64;

enum PoolCommand {
    Submit(JobId, ImageJob),
    Drain,
}

struct Completion {
    id: JobId,
    name: String,
    result: JobResult<JobReport>,
}

/// The final result of one job as observed by the pool.
#[derive(Debug)]
pub struct JobOutcome {
    pub id: JobId,
    pub name: String,
    pub result: JobResult<JobReport>,
}

/// Everything the pool observed while it ran.
#[derive(Debug, Default)]
pub struct PoolReport {
    /// Job ids in the order they entered the running set.
    pub admitted: Vec<JobId>,
    /// Outcomes in the order the jobs completed.
    pub outcomes: Vec<JobOutcome>,
    /// The largest running-set size seen.
    pub peak_running: usize,
}

impl PoolReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// A cloneable handle for submitting jobs to a pool from other tasks.
#[derive(Clone)]
pub struct Submitter {
    sender: mpsc::UnboundedSender<PoolCommand>,
    next_id: Arc<Mutex<JobId>>,
}

impl Submitter {
    /// Appends a job to the pool's waiting queue.
    ///
    /// Ids are handed out in the same order submissions reach the queue. Once the
    /// scheduler has drained and closed its queue this returns `PoolError::Closed`.
    pub fn submit(&self, job: ImageJob) -> PoolResult<JobId> {
        // Held across the send so id order and queue order agree.
        let mut next_id = self
            .next_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = *next_id;
        self.sender
            .send(PoolCommand::Submit(id, job))
            .map_err(|_| PoolError::Closed)?;
        *next_id += 1;
        Ok(id)
    }
}

/// A fixed-capacity pool of concurrently running image jobs.
pub struct WorkerPool {
    pool_size: usize,
    submitter: Submitter,
    command_receiver: Option<mpsc::UnboundedReceiver<PoolCommand>>,
    scheduler: Option<JoinHandle<PoolResult<PoolReport>>>,
}

impl WorkerPool {
    pub fn new(pool_size: usize) -> Result<Self, ConfigError> {
        if pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        Ok(Self {
            pool_size,
            submitter: Submitter {
                sender,
                next_id: Arc::new(Mutex::new(0)),
            },
            command_receiver: Some(receiver),
            scheduler: None,
        })
    }

    pub fn submit(&self, job: ImageJob) -> PoolResult<JobId> {
        self.submitter.submit(job)
    }

    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Spawns the scheduler on the current tokio runtime and returns immediately.
    pub fn start(&mut self) -> PoolResult<()> {
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        let commands = self.command_receiver.take().ok_or(PoolError::AlreadyStarted)?;
        let scheduler = Scheduler::new(self.pool_size, commands);
        self.scheduler = Some(runtime.spawn(scheduler.run()));
        Ok(())
    }

    /// Waits until the waiting queue and the running set are both empty.
    ///
    /// Submissions that reach the scheduler before it empties are still run.
    pub async fn await_completion(mut self) -> PoolResult<PoolReport> {
        let scheduler = self.scheduler.take().ok_or(PoolError::NotStarted)?;
        // The scheduler may already have stopped on an error; its result says why.
        let _ = self.submitter.sender.send(PoolCommand::Drain);
        scheduler
            .await
            .map_err(|err| PoolError::Scheduler(err.to_string()))?
    }
}

struct RunningJob {
    id: JobId,
    name: String,
}

enum Event {
    Command(Option<PoolCommand>),
    Completed(Completion),
}

struct Scheduler {
    capacity: usize,
    waiting: VecDeque<(JobId, ImageJob)>,
    running: Vec<RunningJob>,
    commands: mpsc::UnboundedReceiver<PoolCommand>,
    commands_open: bool,
    completion_sender: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    draining: bool,
    report: PoolReport,
}

impl Scheduler {
    fn new(capacity: usize, commands: mpsc::UnboundedReceiver<PoolCommand>) -> Self {
        let (completion_sender, completions) = mpsc::unbounded_channel();
        Self {
            capacity,
            waiting: VecDeque::new(),
            running: Vec::with_capacity(capacity),
            commands,
            commands_open: true,
            completion_sender,
            completions,
            draining: false,
            report: PoolReport::default(),
        }
    }

    async fn run(mut self) -> PoolResult<PoolReport> {
        // Everything submitted before start forms the initial backlog.
        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command);
        }
        info!(
            backlog = self.waiting.len(),
            capacity = self.capacity,
            "worker pool started"
        );
        self.admit()?;

        loop {
            if self.is_idle() {
                // Stop taking submissions, then run anything that got in first.
                self.commands.close();
                while let Some(command) = self.commands.recv().await {
                    self.handle_command(command);
                }
                self.commands_open = false;
                if self.waiting.is_empty() {
                    break;
                }
                self.admit()?;
                continue;
            }

            let event = tokio::select! {
                command = self.commands.recv(), if self.commands_open => Event::Command(command),
                Some(done) = self.completions.recv() => Event::Completed(done),
                else => {
                    return Err(PoolError::Scheduler("no event sources left".into()));
                }
            };
            match event {
                Event::Command(Some(command)) => self.handle_command(command),
                Event::Command(None) => {
                    // Every handle is gone; finish what is queued and stop.
                    self.commands_open = false;
                    self.draining = true;
                }
                Event::Completed(done) => self.evict(done),
            }
            self.admit()?;
        }

        info!(
            completed = self.report.outcomes.len(),
            peak_running = self.report.peak_running,
            "worker pool drained"
        );
        Ok(self.report)
    }

    fn is_idle(&self) -> bool {
        self.draining && self.waiting.is_empty() && self.running.is_empty()
    }

    fn handle_command(&mut self, command: PoolCommand) {
        match command {
            PoolCommand::Submit(id, job) => {
                debug!(id, job = %job.name(), waiting = self.waiting.len() + 1, "queued job");
                self.waiting.push_back((id, job));
            }
            PoolCommand::Drain => self.draining = true,
        }
    }

    /// Fills free slots from the front of the waiting queue.
    fn admit(&mut self) -> PoolResult<()> {
        while self.running.len() < self.capacity {
            let Some((id, job)) = self.waiting.pop_front() else {
                break;
            };
            self.launch(id, job);
        }
        if self.running.len() > self.capacity {
            error!(
                running = self.running.len(),
                capacity = self.capacity,
                "running set exceeded pool capacity"
            );
            return Err(PoolError::CapacityExceeded {
                running: self.running.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn launch(&mut self, id: JobId, job: ImageJob) {
        let name = job.name().to_string();
        self.running.push(RunningJob {
            id,
            name: name.clone(),
        });
        self.report.admitted.push(id);
        self.report.peak_running = self.report.peak_running.max(self.running.len());
        debug!(
            id,
            job = %name,
            running = self.running.len(),
            waiting = self.waiting.len(),
            "admitted job"
        );

        let completions = self.completion_sender.clone();
        let status = job.status();
        tokio::spawn(async move {
            let result = guarded(job.run(), status).await;
            // The scheduler holds the receiver until every running job has reported.
            let _ = completions.send(Completion { id, name, result });
        });
    }

    fn evict(&mut self, done: Completion) {
        match self.running.iter().position(|job| job.id == done.id) {
            Some(slot) => {
                let job = self.running.remove(slot);
                debug!(id = job.id, job = %job.name, "evicted finished job");
            }
            None => warn!(id = done.id, "completion for a job that is not running"),
        }
        match &done.result {
            Ok(report) => debug!(job = %done.name, saved_to = ?report.saved_to, "job finished"),
            Err(err) => warn!(job = %done.name, error = %err, "job failed"),
        }
        self.report.outcomes.push(JobOutcome {
            id: done.id,
            name: done.name,
            result: done.result,
        });
    }
}

/// Runs a job future, turning a panic into a failed outcome on `status`.
async fn guarded<F>(run: F, status: JobStatus) -> JobResult<JobReport>
where
    F: Future<Output = JobResult<JobReport>>,
{
    AssertUnwindSafe(run).catch_unwind().await.unwrap_or_else(|panic| {
        status.set(JobState::Failed);
        Err(JobError::Panicked(panic_message(panic.as_ref())))
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
