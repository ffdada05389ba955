use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{BallastError, Result};
use crate::scheduler::job::JobRequest;

/// Opaque token identifying a started job inside a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendHandle(Uuid);

impl BackendHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BackendHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status reported by a backend poll. Polls never block on the job itself;
/// a still-executing job reports `Running` immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Running,
    Succeeded { exit_code: i32 },
    Failed { exit_code: Option<i32> },
}

/// The external system that actually runs jobs once started.
///
/// The scheduler only ever starts, polls, and terminates; everything else
/// about the job's execution environment is the backend's concern.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn start(&self, request: &JobRequest) -> Result<BackendHandle>;

    async fn poll(&self, handle: &BackendHandle) -> Result<PollStatus>;

    /// Best-effort termination. Returns true if a termination was delivered,
    /// false if the job was already gone.
    async fn terminate(&self, handle: &BackendHandle) -> Result<bool>;
}

/// Runs job commands as local `sh -c` child processes.
///
/// Output is discarded; the scheduler only cares about exit status. Useful
/// for the CLI and for exercising the scheduler without a remote cluster.
#[derive(Debug, Default)]
pub struct LocalProcessBackend {
    children: Mutex<HashMap<BackendHandle, Child>>,
}

impl LocalProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobBackend for LocalProcessBackend {
    async fn start(&self, request: &JobRequest) -> Result<BackendHandle> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(&request.command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let handle = BackendHandle::new();
        tracing::debug!(job_id = %request.id, handle = %handle, "Spawned local process");
        self.children.lock().await.insert(handle, child);
        Ok(handle)
    }

    async fn poll(&self, handle: &BackendHandle) -> Result<PollStatus> {
        let mut children = self.children.lock().await;
        let child = children.get_mut(handle).ok_or_else(|| {
            BallastError::BackendCommunication(format!("unknown handle {}", handle))
        })?;

        match child.try_wait()? {
            None => Ok(PollStatus::Running),
            Some(status) => {
                children.remove(handle);
                match status.code() {
                    Some(0) => Ok(PollStatus::Succeeded { exit_code: 0 }),
                    code => Ok(PollStatus::Failed { exit_code: code }),
                }
            }
        }
    }

    async fn terminate(&self, handle: &BackendHandle) -> Result<bool> {
        let child = self.children.lock().await.remove(handle);
        match child {
            Some(mut child) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(handle = %handle, error = %e, "Failed to kill local process");
                    return Ok(false);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
