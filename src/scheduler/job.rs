use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::BackendHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Killed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Killed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
            JobState::Killed => write!(f, "killed"),
        }
    }
}

/// A unit of work proposed by the workflow evaluator.
///
/// The `command` payload is opaque to the scheduler and passed through to the
/// backend unchanged. `depends_on` is informational only; readiness is
/// decided by the job source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: Uuid,
    pub name: String,
    pub cpu: u32,
    pub ram_mb: u64,
    pub command: String,
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
}

impl JobRequest {
    pub fn new(name: impl Into<String>, cpu: u32, ram_mb: u64, command: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            cpu,
            ram_mb,
            command: command.into(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, dep: Uuid) -> Self {
        self.depends_on.push(dep);
        self
    }
}

/// Execution lifecycle of a single admitted job.
///
/// Owned exclusively by the scheduler. `handle` refers to an external
/// resource whose lifecycle belongs to the backend; dropping the record does
/// not stop the job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub request: JobRequest,
    pub state: JobState,
    pub handle: Option<BackendHandle>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    /// Consecutive backend poll failures, reset on any successful poll.
    pub poll_failures: u32,
}

impl JobRecord {
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: request.id,
            request,
            state: JobState::Pending,
            handle: None,
            started_at: None,
            finished_at: None,
            exit_code: None,
            error: None,
            poll_failures: 0,
        }
    }

    pub fn mark_running(&mut self, handle: BackendHandle) {
        debug_assert_eq!(self.state, JobState::Pending);
        self.state = JobState::Running;
        self.handle = Some(handle);
        self.started_at = Some(Utc::now());
    }

    /// Move the record into a terminal state. Terminal states never
    /// transition further; a second call is ignored.
    pub fn finish(&mut self, state: JobState, exit_code: Option<i32>, error: Option<String>) {
        if self.state.is_terminal() {
            return;
        }
        debug_assert!(state.is_terminal());
        self.state = state;
        self.exit_code = exit_code;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_do_not_transition() {
        let mut record = JobRecord::new(JobRequest::new("a", 1, 128, "true"));
        record.mark_running(BackendHandle::new());
        record.finish(JobState::Succeeded, Some(0), None);
        record.finish(JobState::Failed, Some(1), Some("late".into()));
        assert_eq!(record.state, JobState::Succeeded);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.error.is_none());
    }

    #[test]
    fn job_state_display() {
        assert_eq!(JobState::Pending.to_string(), "pending");
        assert_eq!(JobState::Killed.to_string(), "killed");
    }
}
