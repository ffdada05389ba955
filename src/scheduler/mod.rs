pub mod job;
pub mod queue;
pub mod runner;

pub use job::{JobRecord, JobRequest, JobState};
pub use queue::AdmissionQueue;
pub use runner::{RunSummary, Scheduler};
