use std::time::Duration;

use ballast::backend::{BackendHandle, JobBackend, LocalProcessBackend, PollStatus};
use ballast::config::SchedulerConfig;
use ballast::error::BallastError;
use ballast::scheduler::{JobRequest, Scheduler};
use ballast::source::StaticDagSource;

/// Poll until the job leaves the running state, bounded so a broken backend
/// cannot hang the test.
async fn poll_until_done(backend: &LocalProcessBackend, handle: &BackendHandle) -> PollStatus {
    for _ in 0..200 {
        match backend.poll(handle).await.unwrap() {
            PollStatus::Running => tokio::time::sleep(Duration::from_millis(10)).await,
            status => return status,
        }
    }
    panic!("job did not finish in time");
}

#[tokio::test]
async fn test_successful_command() {
    let backend = LocalProcessBackend::new();
    let request = JobRequest::new("ok", 1, 128, "true");

    let handle = backend.start(&request).await.unwrap();
    let status = poll_until_done(&backend, &handle).await;
    assert_eq!(status, PollStatus::Succeeded { exit_code: 0 });
}

#[tokio::test]
async fn test_nonzero_exit_code_is_surfaced() {
    let backend = LocalProcessBackend::new();
    let request = JobRequest::new("fails", 1, 128, "exit 3");

    let handle = backend.start(&request).await.unwrap();
    let status = poll_until_done(&backend, &handle).await;
    assert_eq!(status, PollStatus::Failed { exit_code: Some(3) });
}

#[tokio::test]
async fn test_terminate_running_process() {
    let backend = LocalProcessBackend::new();
    let request = JobRequest::new("sleeper", 1, 128, "sleep 30");

    let handle = backend.start(&request).await.unwrap();
    assert_eq!(backend.poll(&handle).await.unwrap(), PollStatus::Running);

    assert!(backend.terminate(&handle).await.unwrap());
    // The handle is gone after termination.
    assert!(!backend.terminate(&handle).await.unwrap());
}

#[tokio::test]
async fn test_poll_unknown_handle_is_a_backend_error() {
    let backend = LocalProcessBackend::new();
    let err = backend.poll(&BackendHandle::new()).await.unwrap_err();
    assert!(matches!(err, BallastError::BackendCommunication(_)));
}

#[tokio::test]
async fn test_end_to_end_workflow_on_local_processes() {
    let first = JobRequest::new("first", 1, 128, "true");
    let second = JobRequest::new("second", 1, 128, "true").with_dependency(first.id);

    let backend = LocalProcessBackend::new();
    let mut source = StaticDagSource::new(vec![first, second]).unwrap();
    let config = SchedulerConfig::new(2, 1024).with_poll_interval(Duration::from_millis(5));
    let mut scheduler = Scheduler::new(config);

    let summary = tokio::time::timeout(Duration::from_secs(10), scheduler.run(&mut source, &backend))
        .await
        .expect("workflow timed out")
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert!(summary.all_succeeded());
    assert_eq!(scheduler.pool().available_cpu(), 2);
}

#[tokio::test]
async fn test_failing_command_fails_the_workflow() {
    let bad = JobRequest::new("bad", 1, 128, "exit 7");
    let bad_id = bad.id;
    let backend = LocalProcessBackend::new();
    let mut source = StaticDagSource::new(vec![bad]).unwrap();
    let config = SchedulerConfig::new(2, 1024).with_poll_interval(Duration::from_millis(5));
    let mut scheduler = Scheduler::new(config);

    let summary = tokio::time::timeout(Duration::from_secs(10), scheduler.run(&mut source, &backend))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.failed, 1);
    let record = scheduler
        .finished_records()
        .iter()
        .find(|r| r.id == bad_id)
        .unwrap();
    assert_eq!(record.exit_code, Some(7));
}
