use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{BallastError, Result};
use crate::scheduler::job::{JobRequest, JobState};

/// The workflow evaluator boundary: decides which jobs are ready and learns
/// about their outcomes.
#[async_trait]
pub trait ReadyJobSource: Send {
    /// Return newly ready jobs. May suspend until more become ready; returns
    /// an empty vec when nothing is ready right now.
    async fn next_ready_jobs(&mut self) -> Result<Vec<JobRequest>>;

    /// Report a terminal result for a previously released job. May unblock
    /// dependents on the next `next_ready_jobs` call.
    fn report_result(&mut self, id: Uuid, state: JobState, exit_code: Option<i32>);

    /// True once every job has been released and reported.
    fn is_done(&self) -> bool;
}

/// In-memory dependency-graph evaluator over a fixed job list.
///
/// A job becomes ready when all of its dependencies have succeeded. When a
/// dependency fails or is killed, every transitive dependent is marked failed
/// without ever being released to the scheduler. Independent branches keep
/// running.
#[derive(Debug)]
pub struct StaticDagSource {
    pending: Vec<JobRequest>,
    in_flight: HashSet<Uuid>,
    results: HashMap<Uuid, JobState>,
}

impl StaticDagSource {
    pub fn new(jobs: Vec<JobRequest>) -> Result<Self> {
        let ids: HashSet<Uuid> = jobs.iter().map(|j| j.id).collect();
        if ids.len() != jobs.len() {
            return Err(BallastError::InvalidJobSpec(
                "duplicate job ids in workflow".to_string(),
            ));
        }
        for job in &jobs {
            for dep in &job.depends_on {
                if !ids.contains(dep) {
                    return Err(BallastError::InvalidJobSpec(format!(
                        "job '{}' depends on unknown job {}",
                        job.name, dep
                    )));
                }
            }
        }
        Ok(Self {
            pending: jobs,
            in_flight: HashSet::new(),
            results: HashMap::new(),
        })
    }

    /// Number of jobs that ended in a non-success state, including jobs
    /// skipped because a dependency failed.
    pub fn failed_count(&self) -> usize {
        self.results
            .values()
            .filter(|s| **s != JobState::Succeeded)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    pub fn result(&self, id: &Uuid) -> Option<JobState> {
        self.results.get(id).copied()
    }

    fn dependency_outcome(&self, job: &JobRequest) -> DependencyOutcome {
        let mut all_succeeded = true;
        for dep in &job.depends_on {
            match self.results.get(dep) {
                Some(JobState::Succeeded) => {}
                Some(_) => return DependencyOutcome::Failed,
                None => all_succeeded = false,
            }
        }
        if all_succeeded {
            DependencyOutcome::Ready
        } else {
            DependencyOutcome::Waiting
        }
    }

    /// Mark as failed every pending job with a failed dependency, repeating
    /// until no more jobs can be skipped.
    fn cascade_failures(&mut self) {
        loop {
            let mut skipped = Vec::new();
            let results = &self.results;
            self.pending.retain(|job| {
                let blocked = job
                    .depends_on
                    .iter()
                    .any(|d| matches!(results.get(d), Some(s) if *s != JobState::Succeeded));
                if blocked {
                    skipped.push((job.id, job.name.clone()));
                }
                !blocked
            });
            if skipped.is_empty() {
                break;
            }
            for (id, name) in skipped {
                tracing::warn!(job_id = %id, name = %name, "Skipping job: dependency failed");
                self.results.insert(id, JobState::Failed);
            }
        }
    }
}

enum DependencyOutcome {
    Ready,
    Waiting,
    Failed,
}

#[async_trait]
impl ReadyJobSource for StaticDagSource {
    async fn next_ready_jobs(&mut self) -> Result<Vec<JobRequest>> {
        let mut ready = Vec::new();
        let mut rest = Vec::new();
        for job in std::mem::take(&mut self.pending) {
            match self.dependency_outcome(&job) {
                DependencyOutcome::Ready => ready.push(job),
                _ => rest.push(job),
            }
        }
        self.pending = rest;

        if ready.is_empty() && self.in_flight.is_empty() && !self.pending.is_empty() {
            // Nothing runnable, nothing outstanding: the remaining jobs form
            // a dependency cycle and can never become ready.
            for job in self.pending.drain(..) {
                tracing::error!(job_id = %job.id, name = %job.name, "Job unreachable: dependency cycle");
                self.results.insert(job.id, JobState::Failed);
            }
        }

        for job in &ready {
            self.in_flight.insert(job.id);
        }
        Ok(ready)
    }

    fn report_result(&mut self, id: Uuid, state: JobState, exit_code: Option<i32>) {
        self.in_flight.remove(&id);
        self.results.insert(id, state);
        tracing::debug!(job_id = %id, state = %state, exit_code = ?exit_code, "Result reported");
        if state != JobState::Succeeded {
            self.cascade_failures();
        }
    }

    fn is_done(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

/// One entry in a workflow file. Dependencies refer to other entries by name.
#[derive(Debug, Deserialize)]
pub struct WorkflowJobSpec {
    pub name: String,
    pub cpu: u32,
    pub ram_mb: u64,
    pub command: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Load a JSON workflow file into job requests with resolved dependency ids.
pub fn load_workflow(path: &Path) -> Result<Vec<JobRequest>> {
    let data = std::fs::read_to_string(path)?;
    let specs: Vec<WorkflowJobSpec> = serde_json::from_str(&data)?;

    let mut ids: HashMap<String, Uuid> = HashMap::new();
    for spec in &specs {
        if ids.insert(spec.name.clone(), Uuid::new_v4()).is_some() {
            return Err(BallastError::InvalidJobSpec(format!(
                "duplicate job name '{}'",
                spec.name
            )));
        }
    }

    specs
        .into_iter()
        .map(|spec| {
            let depends_on = spec
                .depends_on
                .iter()
                .map(|dep| {
                    ids.get(dep).copied().ok_or_else(|| {
                        BallastError::InvalidJobSpec(format!(
                            "job '{}' depends on unknown job '{}'",
                            spec.name, dep
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(JobRequest {
                id: ids[&spec.name],
                name: spec.name,
                cpu: spec.cpu,
                ram_mb: spec.ram_mb,
                command: spec.command,
                depends_on,
            })
        })
        .collect()
}
