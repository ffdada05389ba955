use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Point-in-time snapshot of admitted resources, appended whenever admission
/// state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_in_use: u32,
    pub ram_in_use_mb: u64,
    pub running_jobs: usize,
}

impl UsageSample {
    pub fn now(cpu_in_use: u32, ram_in_use_mb: u64, running_jobs: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu_in_use,
            ram_in_use_mb,
            running_jobs,
        }
    }
}

/// Serialized form of the usage report file.
#[derive(Debug, Serialize, Deserialize)]
pub struct UsageReport {
    pub samples: Vec<UsageSample>,
    pub peak_cpu: u32,
    pub peak_ram_mb: u64,
}

/// Accumulates usage samples for post-hoc reporting.
#[derive(Debug, Default)]
pub struct UsageReporter {
    samples: Vec<UsageSample>,
}

impl UsageReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: UsageSample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[UsageSample] {
        &self.samples
    }

    pub fn peak_cpu(&self) -> u32 {
        self.samples.iter().map(|s| s.cpu_in_use).max().unwrap_or(0)
    }

    pub fn peak_ram_mb(&self) -> u64 {
        self.samples
            .iter()
            .map(|s| s.ram_in_use_mb)
            .max()
            .unwrap_or(0)
    }

    pub fn peak_running_jobs(&self) -> usize {
        self.samples
            .iter()
            .map(|s| s.running_jobs)
            .max()
            .unwrap_or(0)
    }

    /// Write the samples plus computed peaks as JSON. Callers treat failures
    /// as non-fatal; the report records historical fact, not run outcome.
    pub fn write_report(&self, path: &Path) -> Result<()> {
        let report = UsageReport {
            samples: self.samples.clone(),
            peak_cpu: self.peak_cpu(),
            peak_ram_mb: self.peak_ram_mb(),
        };
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &report)?;
        tracing::info!(path = %path.display(), samples = self.samples.len(), "Usage report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peaks_over_empty_reporter_are_zero() {
        let reporter = UsageReporter::new();
        assert_eq!(reporter.peak_cpu(), 0);
        assert_eq!(reporter.peak_ram_mb(), 0);
        assert_eq!(reporter.peak_running_jobs(), 0);
    }

    #[test]
    fn peaks_track_maxima_not_last_sample() {
        let mut reporter = UsageReporter::new();
        reporter.record(UsageSample::now(2, 2048, 1));
        reporter.record(UsageSample::now(4, 6144, 2));
        reporter.record(UsageSample::now(1, 1024, 1));
        assert_eq!(reporter.peak_cpu(), 4);
        assert_eq!(reporter.peak_ram_mb(), 6144);
        assert_eq!(reporter.peak_running_jobs(), 2);
    }
}
