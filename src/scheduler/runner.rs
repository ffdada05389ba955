use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::{BackendHandle, JobBackend, PollStatus};
use crate::config::SchedulerConfig;
use crate::error::{BallastError, Result};
use crate::pool::ResourcePool;
use crate::scheduler::job::{JobRecord, JobRequest, JobState};
use crate::scheduler::queue::AdmissionQueue;
use crate::shutdown::{CleanupCoordinator, CleanupState};
use crate::source::ReadyJobSource;
use crate::usage::{UsageReporter, UsageSample};

/// Outcome counts for a completed scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub killed: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.killed == 0 && !self.cancelled
    }
}

/// Admission-control loop: turns a stream of ready jobs into bounded
/// concurrent executions on a backend, respecting the resource budget.
///
/// A single instance owns all mutable scheduling state (pool counters, the
/// admission queue, job records); nothing else mutates them. Multiple
/// independent instances can coexist, which the tests rely on.
pub struct Scheduler {
    config: SchedulerConfig,
    pool: ResourcePool,
    queue: AdmissionQueue,
    running: Vec<JobRecord>,
    finished: Vec<JobRecord>,
    seen: HashSet<Uuid>,
    usage: UsageReporter,
    cleanup: CleanupCoordinator,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_shutdown(config, CancellationToken::new())
    }

    /// Build a scheduler that stops admitting and cleans up in-flight jobs
    /// once `shutdown` is cancelled.
    pub fn with_shutdown(config: SchedulerConfig, shutdown: CancellationToken) -> Self {
        let pool = ResourcePool::new(config.max_cpu, config.max_ram_mb);
        Self {
            config,
            pool,
            queue: AdmissionQueue::new(),
            running: Vec::new(),
            finished: Vec::new(),
            seen: HashSet::new(),
            usage: UsageReporter::new(),
            cleanup: CleanupCoordinator::new(),
            shutdown,
        }
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn usage(&self) -> &UsageReporter {
        &self.usage
    }

    /// Records of all jobs that reached a terminal state.
    pub fn finished_records(&self) -> &[JobRecord] {
        &self.finished
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn cleanup_state(&self) -> CleanupState {
        self.cleanup.state()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Drive the workflow to completion.
    ///
    /// Returns once the source is exhausted and every admitted job reached a
    /// terminal state, or once shutdown was requested and in-flight jobs were
    /// cleaned up. The usage report (if configured) is written best-effort in
    /// every case, including fatal errors.
    pub async fn run<S: ReadyJobSource>(
        &mut self,
        source: &mut S,
        backend: &dyn JobBackend,
    ) -> Result<RunSummary> {
        tracing::info!(
            max_cpu = self.config.max_cpu,
            max_ram_mb = self.config.max_ram_mb,
            max_parallel = ?self.config.max_parallel_jobs,
            "Scheduler starting"
        );

        let outcome = self.run_loop(source, backend).await;

        if self.shutdown.is_cancelled() || outcome.is_err() {
            self.cleanup_running(source, backend).await;
        }
        self.write_usage_report();
        outcome?;

        let summary = self.summary();
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            killed = summary.killed,
            cancelled = summary.cancelled,
            "Scheduler finished"
        );
        Ok(summary)
    }

    async fn run_loop<S: ReadyJobSource>(
        &mut self,
        source: &mut S,
        backend: &dyn JobBackend,
    ) -> Result<()> {
        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, stopping admission");
                return Ok(());
            }

            let ready = tokio::select! {
                res = source.next_ready_jobs() => res?,
                _ = self.shutdown.cancelled() => return Ok(()),
            };
            for request in ready {
                self.intake(request, source);
            }

            let admitted = self.admit(source, backend).await?;
            let completed = self.reap(source, backend).await?;

            if source.is_done() && self.queue.is_empty() && self.running.is_empty() {
                tracing::info!("All jobs complete");
                return Ok(());
            }

            if admitted == 0 && completed == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = self.shutdown.cancelled() => return Ok(()),
                }
            }
        }
    }

    /// Accept a ready request into the admission queue, failing it up front
    /// when it can never fit the pool. Duplicate ids are ignored, so a
    /// request re-yielded by the source is never started twice.
    fn intake<S: ReadyJobSource>(&mut self, request: JobRequest, source: &mut S) {
        if !self.seen.insert(request.id) {
            tracing::debug!(job_id = %request.id, "Ignoring duplicate job request");
            return;
        }
        if !self.pool.fits_total(request.cpu, request.ram_mb) {
            let err = BallastError::UnsatisfiableResourceRequest {
                id: request.id,
                cpu: request.cpu,
                ram_mb: request.ram_mb,
            };
            tracing::warn!(job_id = %request.id, name = %request.name, "{}", err);
            let id = request.id;
            let mut record = JobRecord::new(request);
            record.finish(JobState::Failed, None, Some(err.to_string()));
            self.finished.push(record);
            source.report_result(id, JobState::Failed, None);
            return;
        }
        tracing::debug!(job_id = %request.id, name = %request.name, "Job queued");
        self.queue.push(request);
    }

    /// Admission pass: walk the queue in FIFO order, skipping entries that
    /// do not currently fit, until the parallel cap or the budget stops us.
    async fn admit<S: ReadyJobSource>(
        &mut self,
        source: &mut S,
        backend: &dyn JobBackend,
    ) -> Result<usize> {
        let mut admitted = 0;
        loop {
            if let Some(cap) = self.config.max_parallel_jobs {
                if self.running.len() >= cap {
                    break;
                }
            }
            let pool = &self.pool;
            let Some(request) = self.queue.admit_where(|r| pool.can_reserve(r.cpu, r.ram_mb))
            else {
                break;
            };
            if !self.pool.try_reserve(request.cpu, request.ram_mb) {
                // Unreachable from the single control loop; treat as corrupt
                // accounting rather than limping on.
                return Err(BallastError::AccountingViolation(
                    "reservation failed after successful fit check".to_string(),
                ));
            }

            match self.start_with_retry(backend, &request).await {
                Ok(handle) => {
                    tracing::info!(
                        job_id = %request.id,
                        name = %request.name,
                        cpu = request.cpu,
                        ram_mb = request.ram_mb,
                        "Job started"
                    );
                    let mut record = JobRecord::new(request);
                    record.mark_running(handle);
                    self.running.push(record);
                    admitted += 1;
                    self.emit_sample();
                }
                Err(e) => {
                    tracing::warn!(job_id = %request.id, name = %request.name, error = %e, "Failed to start job");
                    self.pool.release(request.cpu, request.ram_mb)?;
                    let id = request.id;
                    let mut record = JobRecord::new(request);
                    record.finish(JobState::Failed, None, Some(e.to_string()));
                    self.finished.push(record);
                    source.report_result(id, JobState::Failed, None);
                }
            }
        }
        Ok(admitted)
    }

    async fn start_with_retry(
        &self,
        backend: &dyn JobBackend,
        request: &JobRequest,
    ) -> Result<BackendHandle> {
        let mut attempt = 1;
        loop {
            match backend.start(request).await {
                Ok(handle) => return Ok(handle),
                Err(BallastError::BackendCommunication(msg))
                    if attempt < self.config.retry.max_attempts =>
                {
                    tracing::warn!(
                        job_id = %request.id,
                        attempt,
                        error = %msg,
                        "Backend start failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.retry.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reap pass: poll every running job without blocking on any of them.
    /// Poll errors are tolerated up to the retry bound per job.
    async fn reap<S: ReadyJobSource>(
        &mut self,
        source: &mut S,
        backend: &dyn JobBackend,
    ) -> Result<usize> {
        let mut completed = 0;
        let mut saw_poll_error = false;
        let mut i = 0;
        while i < self.running.len() {
            let Some(handle) = self.running[i].handle else {
                i += 1;
                continue;
            };
            match backend.poll(&handle).await {
                Ok(PollStatus::Running) => {
                    self.running[i].poll_failures = 0;
                    i += 1;
                }
                Ok(PollStatus::Succeeded { exit_code }) => {
                    self.finish_running(i, JobState::Succeeded, Some(exit_code), None, source)?;
                    completed += 1;
                }
                Ok(PollStatus::Failed { exit_code }) => {
                    let error = match exit_code {
                        Some(code) => format!("job exited with non-zero code {}", code),
                        None => "job terminated without an exit code".to_string(),
                    };
                    self.finish_running(i, JobState::Failed, exit_code, Some(error), source)?;
                    completed += 1;
                }
                Err(e) => {
                    saw_poll_error = true;
                    let record = &mut self.running[i];
                    record.poll_failures += 1;
                    if record.poll_failures >= self.config.retry.max_attempts {
                        tracing::warn!(
                            job_id = %record.id,
                            error = %e,
                            attempts = record.poll_failures,
                            "Backend unreachable, failing job"
                        );
                        self.finish_running(i, JobState::Failed, None, Some(e.to_string()), source)?;
                        completed += 1;
                    } else {
                        tracing::warn!(
                            job_id = %record.id,
                            error = %e,
                            attempt = record.poll_failures,
                            "Backend poll failed, will retry"
                        );
                        i += 1;
                    }
                }
            }
        }

        if saw_poll_error {
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry.backoff) => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
        Ok(completed)
    }

    /// Move a running record into a terminal state. The resource release is
    /// recorded before the result is reported, so a dependent job can never
    /// be admitted ahead of its prerequisite's resources being reclaimed.
    fn finish_running<S: ReadyJobSource>(
        &mut self,
        index: usize,
        state: JobState,
        exit_code: Option<i32>,
        error: Option<String>,
        source: &mut S,
    ) -> Result<()> {
        let mut record = self.running.swap_remove(index);
        record.finish(state, exit_code, error);
        self.pool
            .release(record.request.cpu, record.request.ram_mb)?;
        tracing::info!(
            job_id = %record.id,
            name = %record.request.name,
            state = %record.state,
            exit_code = ?record.exit_code,
            "Job finished"
        );
        self.emit_sample();
        source.report_result(record.id, record.state, record.exit_code);
        self.finished.push(record);
        Ok(())
    }

    /// Terminate everything still running and reconcile accounting.
    async fn cleanup_running<S: ReadyJobSource>(
        &mut self,
        source: &mut S,
        backend: &dyn JobBackend,
    ) {
        let attempted = self.cleanup.trigger(&mut self.running, backend).await;
        if attempted > 0 {
            tracing::info!(attempted, "Terminated in-flight jobs");
        }
        while let Some(record) = self.running.pop() {
            if let Err(e) = self.pool.release(record.request.cpu, record.request.ram_mb) {
                tracing::error!(job_id = %record.id, error = %e, "Release failed during cleanup");
            }
            source.report_result(record.id, record.state, record.exit_code);
            self.finished.push(record);
        }
        self.emit_sample();
    }

    fn emit_sample(&mut self) {
        self.usage.record(UsageSample::now(
            self.pool.cpu_in_use(),
            self.pool.ram_in_use_mb(),
            self.running.len(),
        ));
    }

    fn write_usage_report(&self) {
        if let Some(path) = &self.config.usage_report_path {
            if let Err(e) = self.usage.write_report(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write usage report");
            }
        }
    }

    fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            succeeded: 0,
            failed: 0,
            killed: 0,
            cancelled: self.shutdown.is_cancelled(),
        };
        for record in &self.finished {
            match record.state {
                JobState::Succeeded => summary.succeeded += 1,
                JobState::Failed => summary.failed += 1,
                JobState::Killed => summary.killed += 1,
                JobState::Pending | JobState::Running => {}
            }
        }
        summary
    }
}
