use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::backend::JobBackend;
use crate::scheduler::job::{JobRecord, JobState};

// Signal numbers per POSIX.
const SIGINT: i32 = 2;
const SIGTERM: i32 = 15;

/// Handle returned by [`install_shutdown_handler`].
///
/// The token is cancelled when a termination signal arrives; the signal
/// number is retained so the process can exit with the conventional
/// `128 + signo` status.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
    signo: Arc<AtomicI32>,
}

impl ShutdownHandle {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The signal that triggered shutdown, if any.
    pub fn received_signal(&self) -> Option<i32> {
        match self.signo.load(Ordering::SeqCst) {
            0 => None,
            n => Some(n),
        }
    }
}

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// The scheduler loop checks the returned token on every iteration and runs
/// job cleanup before the process exits.
pub fn install_shutdown_handler() -> ShutdownHandle {
    let handle = ShutdownHandle {
        token: CancellationToken::new(),
        signo: Arc::new(AtomicI32::new(0)),
    };
    let token = handle.token.clone();
    let signo = handle.signo.clone();

    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, terminating in-flight jobs");
                signo.store(SIGTERM, Ordering::SeqCst);
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, terminating in-flight jobs");
                signo.store(SIGINT, Ordering::SeqCst);
            }
        }

        token.cancel();
    });

    handle
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupState {
    Armed,
    Triggered,
    CleanedUp,
}

/// Ensures in-flight jobs are terminated exactly once on shutdown.
///
/// Termination is best-effort and collect-and-continue: one failing
/// terminate call must not prevent attempting the rest.
#[derive(Debug)]
pub struct CleanupCoordinator {
    state: CleanupState,
}

impl Default for CleanupCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupCoordinator {
    pub fn new() -> Self {
        Self {
            state: CleanupState::Armed,
        }
    }

    pub fn state(&self) -> CleanupState {
        self.state
    }

    /// Terminate every running record via the backend and mark it killed.
    ///
    /// Returns the number of termination calls attempted. Idempotent: once
    /// triggered, subsequent calls do nothing, even if the first trigger
    /// itself hit errors partway through.
    pub async fn trigger(&mut self, records: &mut [JobRecord], backend: &dyn JobBackend) -> usize {
        if self.state != CleanupState::Armed {
            tracing::debug!("Cleanup already performed, skipping");
            return 0;
        }
        self.state = CleanupState::Triggered;

        let mut attempted = 0;
        for record in records.iter_mut().filter(|r| r.state == JobState::Running) {
            if let Some(handle) = record.handle {
                attempted += 1;
                match backend.terminate(&handle).await {
                    Ok(delivered) => {
                        tracing::info!(job_id = %record.id, delivered, "Terminated job");
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %record.id, error = %e, "Failed to terminate job");
                    }
                }
            }
            record.finish(JobState::Killed, None, Some("terminated during shutdown".into()));
        }

        self.state = CleanupState::CleanedUp;
        attempted
    }
}
