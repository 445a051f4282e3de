//! In-process job registry and worker queue.
//!
//! The [`JobRegistry`] is the only component that introduces asynchrony: the
//! HTTP orchestrator submits a transform as an opaque work closure and either
//! gets a [`JobId`] back immediately (queue mode) or blocks until the work
//! finishes (degraded synchronous mode, selected once at startup when the
//! queue is disabled).
//!
//! Jobs move `Queued → Running → {Completed | Failed}` and never leave a
//! terminal state. Each state update replaces the record's status under the
//! dashmap entry lock, so a concurrent status reader always sees a fully
//! committed transition. Terminal results are retained for a bounded TTL,
//! after which the job is indistinguishable from one that never existed.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Semaphore;
use tokio::time::{Duration, Instant};

use tf_av::transform::ProgressSink;
use tf_av::ArtifactStore;
use tf_core::config::Config;
use tf_core::{Error, JobId, Result};

/// How often the reaper sweeps for expired terminal jobs.
const REAP_INTERVAL: Duration = Duration::from_secs(10);

/// The future a work closure produces; runs the actual transform.
pub type WorkFuture = BoxFuture<'static, Result<()>>;

/// One unit of transform work. Consumed exactly once — by the background
/// worker in queue mode, or inline in synchronous mode — so the external
/// tool is invoked at most once per job no matter how often status is polled.
pub type Work = Box<dyn FnOnce(Box<dyn ProgressSink>) -> WorkFuture + Send + 'static>;

/// Observable job state. Each variant carries only the fields valid for it.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Accepted, waiting for a worker.
    Queued,
    /// A worker is executing the transform.
    Running {
        /// Best-effort fractional progress in [0.0, 1.0]; stays 0 when the
        /// invoker has nothing finer to report.
        progress: f32,
    },
    /// The transform succeeded; the output is available for download.
    Completed,
    /// The transform failed or timed out.
    Failed {
        /// Response-safe description of the failure.
        error: String,
    },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running { .. } => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed { .. } => "failed",
        }
    }
}

/// Outcome of [`JobRegistry::submit`].
#[derive(Debug)]
pub enum Submission {
    /// Queue mode: the job was accepted and runs in the background.
    Queued(JobId),
    /// Synchronous mode: the transform already ran; the output is ready.
    Completed(PathBuf),
}

/// Point-in-time view of one job, as returned by [`JobRegistry::status`].
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct JobRecord {
    input: PathBuf,
    output: PathBuf,
    /// Filename offered to the client on download.
    download_name: String,
    status: JobStatus,
    created_at: DateTime<Utc>,
    /// Set when the job reaches a terminal state; starts the TTL clock.
    terminal_at: Option<Instant>,
    output_claimed: bool,
}

struct QueuedWork {
    id: JobId,
    work: Work,
}

/// Tracks every live job and owns the worker pool executing them.
///
/// Constructed once at startup and injected into the HTTP layer. Whether
/// submissions queue or run inline is fixed at construction from the
/// configuration; it never varies per request.
pub struct JobRegistry {
    jobs: Arc<DashMap<JobId, JobRecord>>,
    /// `None` in the degraded synchronous mode.
    tx: Option<mpsc::Sender<QueuedWork>>,
    artifacts: ArtifactStore,
    job_timeout: Duration,
    result_ttl: Duration,
}

impl JobRegistry {
    /// Build the registry, starting the worker pool and TTL reaper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &Config, artifacts: ArtifactStore) -> Arc<Self> {
        let jobs: Arc<DashMap<JobId, JobRecord>> = Arc::new(DashMap::new());
        let job_timeout = config.limits.job_timeout();
        let result_ttl = config.limits.result_ttl();

        let tx = if config.asynchronous() {
            let (tx, rx) = mpsc::channel(config.queue.capacity.max(1));
            tokio::spawn(worker_pool(
                rx,
                jobs.clone(),
                artifacts.clone(),
                job_timeout,
                config.queue.workers,
            ));
            tracing::info!(
                workers = config.queue.workers,
                capacity = config.queue.capacity,
                "Job queue started"
            );
            Some(tx)
        } else {
            tracing::warn!("Job queue disabled; transforms run synchronously on request workers");
            None
        };

        let registry = Arc::new(Self {
            jobs,
            tx,
            artifacts,
            job_timeout,
            result_ttl,
        });

        // The reaper holds a weak reference so it winds down with the
        // registry instead of keeping it alive forever.
        let weak = Arc::downgrade(&registry);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(REAP_INTERVAL);
            loop {
                tick.tick().await;
                match weak.upgrade() {
                    Some(registry) => registry.reap_expired(),
                    None => break,
                }
            }
        });

        registry
    }

    /// Whether submissions run on background workers.
    pub fn asynchronous(&self) -> bool {
        self.tx.is_some()
    }

    /// Submit one transform. `input` and `output` pass into the registry's
    /// ownership: from here on, cleanup on every outcome is its job.
    ///
    /// Queue mode returns [`Submission::Queued`] immediately; the work runs
    /// on a background worker under the configured execution timeout.
    /// Synchronous mode blocks, returning [`Submission::Completed`] with the
    /// finished output — no job id is ever produced.
    pub async fn submit(
        &self,
        work: Work,
        input: PathBuf,
        output: PathBuf,
        download_name: String,
    ) -> Result<Submission> {
        match &self.tx {
            Some(tx) => {
                let id = JobId::new();
                self.jobs.insert(
                    id,
                    JobRecord {
                        input: input.clone(),
                        output: output.clone(),
                        download_name,
                        status: JobStatus::Queued,
                        created_at: Utc::now(),
                        terminal_at: None,
                        output_claimed: false,
                    },
                );

                if let Err(e) = tx.try_send(QueuedWork { id, work }) {
                    self.jobs.remove(&id);
                    self.artifacts.release([&input, &output]);
                    return Err(match e {
                        TrySendError::Full(_) => {
                            tracing::warn!(job = %id, "Job queue full; rejecting submission");
                            Error::Internal("job queue is full; try again later".into())
                        }
                        TrySendError::Closed(_) => {
                            Error::Internal("job queue is shut down".into())
                        }
                    });
                }

                tracing::info!(job = %id, "Job enqueued");
                Ok(Submission::Queued(id))
            }
            None => {
                let result =
                    tokio::time::timeout(self.job_timeout, work(Box::new(NullProgress))).await;
                match result {
                    Ok(Ok(())) => {
                        self.artifacts.release([&input]);
                        Ok(Submission::Completed(output))
                    }
                    Ok(Err(e)) => {
                        self.artifacts.release([&input, &output]);
                        Err(e)
                    }
                    Err(_) => {
                        // Dropping the work future kills any spawned child.
                        self.artifacts.release([&input, &output]);
                        Err(Error::Timeout(self.job_timeout))
                    }
                }
            }
        }
    }

    /// Look up a job's current state.
    ///
    /// Returns `None` for unknown ids and for terminal jobs past their
    /// retention window — the two cases are indistinguishable to callers.
    pub fn status(&self, id: JobId) -> Option<JobSnapshot> {
        let record = self.jobs.get(&id)?;
        if self.expired(&record) {
            return None;
        }
        Some(JobSnapshot {
            status: record.status.clone(),
            created_at: record.created_at,
        })
    }

    /// Hand the completed output to a downloader, exactly once.
    ///
    /// Returns the artifact path and the filename to offer the client, or
    /// `None` when the job is unknown, expired, not yet completed, or its
    /// output was already claimed.
    pub fn claim_output(&self, id: JobId) -> Option<(PathBuf, String)> {
        let mut record = self.jobs.get_mut(&id)?;
        if self.expired(&record) || record.output_claimed {
            return None;
        }
        if record.status != JobStatus::Completed {
            return None;
        }
        record.output_claimed = true;
        Some((record.output.clone(), record.download_name.clone()))
    }

    fn expired(&self, record: &JobRecord) -> bool {
        record
            .terminal_at
            .is_some_and(|t| t.elapsed() > self.result_ttl)
    }

    /// Drop expired terminal jobs and reclaim their unclaimed artifacts.
    fn reap_expired(&self) {
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .terminal_at
                    .is_some_and(|t| t.elapsed() > self.result_ttl)
            })
            .map(|entry| *entry.key())
            .collect();

        for id in expired {
            if let Some((_, record)) = self.jobs.remove(&id) {
                // Failed jobs released their artifacts on the worker;
                // release is idempotent so this covers both cases.
                self.artifacts.release([&record.input, &record.output]);
                tracing::debug!(job = %id, "Reclaimed expired job");
            }
        }
    }
}

async fn worker_pool(
    mut rx: mpsc::Receiver<QueuedWork>,
    jobs: Arc<DashMap<JobId, JobRecord>>,
    artifacts: ArtifactStore,
    job_timeout: Duration,
    workers: usize,
) {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));

    while let Some(queued) = rx.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let jobs = jobs.clone();
        let artifacts = artifacts.clone();

        tokio::spawn(async move {
            let _permit = permit;
            run_job(queued, jobs, artifacts, job_timeout).await;
        });
    }
}

async fn run_job(
    queued: QueuedWork,
    jobs: Arc<DashMap<JobId, JobRecord>>,
    artifacts: ArtifactStore,
    job_timeout: Duration,
) {
    let QueuedWork { id, work } = queued;

    {
        let Some(mut record) = jobs.get_mut(&id) else {
            tracing::warn!(job = %id, "Dequeued job no longer in registry; skipping");
            return;
        };
        record.status = JobStatus::Running { progress: 0.0 };
    }

    let sink = Box::new(RegistryProgress {
        jobs: jobs.clone(),
        id,
    });

    let started = Instant::now();
    let outcome = match tokio::time::timeout(job_timeout, work(sink)).await {
        Ok(result) => result,
        // Dropping the work future kills the external process (kill_on_drop).
        Err(_) => Err(Error::Timeout(job_timeout)),
    };

    let Some(mut record) = jobs.get_mut(&id) else {
        return;
    };
    match outcome {
        Ok(()) => {
            // The input has served its purpose; the output persists until
            // downloaded or the TTL expires.
            artifacts.release([&record.input]);
            record.status = JobStatus::Completed;
            tracing::info!(job = %id, elapsed = ?started.elapsed(), "Job completed");
        }
        Err(e) => {
            tracing::error!(job = %id, error = %e, "Job failed");
            artifacts.release([&record.input, &record.output]);
            record.status = JobStatus::Failed {
                error: e.user_message(),
            };
        }
    }
    record.terminal_at = Some(Instant::now());
}

/// Progress sink wired into a job's `Running` state.
struct RegistryProgress {
    jobs: Arc<DashMap<JobId, JobRecord>>,
    id: JobId,
}

impl ProgressSink for RegistryProgress {
    fn report(&self, progress: f32) {
        if let Some(mut record) = self.jobs.get_mut(&self.id) {
            if let JobStatus::Running { progress: p } = &mut record.status {
                *p = progress.clamp(0.0, 1.0);
            }
        }
    }
}

/// Sink for the synchronous path, where nobody can observe progress anyway.
struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _progress: f32) {}
}
