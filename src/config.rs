use std::path::PathBuf;
use std::time::Duration;

/// Retry policy for transient backend communication failures.
///
/// After `max_attempts` consecutive failures against the same job, the job
/// is marked failed rather than retried further.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Total CPU budget across all running jobs.
    pub max_cpu: u32,
    /// Total RAM budget across all running jobs, in megabytes.
    pub max_ram_mb: u64,
    /// Cap on concurrently running jobs, independent of the resource budget.
    pub max_parallel_jobs: Option<usize>,
    /// Where to write the JSON usage report, if anywhere.
    pub usage_report_path: Option<PathBuf>,
    /// Sleep between control-loop cycles when nothing was admitted or reaped.
    pub poll_interval: Duration,
    pub retry: RetryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_cpu: 4,
            max_ram_mb: 8192,
            max_parallel_jobs: None,
            usage_report_path: None,
            poll_interval: Duration::from_millis(100),
            retry: RetryConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn new(max_cpu: u32, max_ram_mb: u64) -> Self {
        Self {
            max_cpu,
            max_ram_mb,
            ..Default::default()
        }
    }

    pub fn with_max_parallel(mut self, cap: usize) -> Self {
        self.max_parallel_jobs = Some(cap);
        self
    }

    pub fn with_usage_report(mut self, path: PathBuf) -> Self {
        self.usage_report_path = Some(path);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_default() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.max_cpu, 4);
        assert_eq!(cfg.max_ram_mb, 8192);
        assert!(cfg.max_parallel_jobs.is_none());
        assert!(cfg.usage_report_path.is_none());
        assert_eq!(cfg.retry.max_attempts, 3);
    }

    #[test]
    fn scheduler_config_builders() {
        let cfg = SchedulerConfig::new(16, 65536)
            .with_max_parallel(8)
            .with_usage_report(PathBuf::from("/tmp/usage.json"))
            .with_poll_interval(Duration::from_millis(10));
        assert_eq!(cfg.max_cpu, 16);
        assert_eq!(cfg.max_ram_mb, 65536);
        assert_eq!(cfg.max_parallel_jobs, Some(8));
        assert_eq!(
            cfg.usage_report_path.as_deref(),
            Some(std::path::Path::new("/tmp/usage.json"))
        );
        assert_eq!(cfg.poll_interval, Duration::from_millis(10));
    }
}
