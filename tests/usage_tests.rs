use ballast::usage::{UsageReport, UsageReporter, UsageSample};

#[test]
fn test_samples_are_kept_in_order() {
    let mut reporter = UsageReporter::new();
    reporter.record(UsageSample::now(1, 1024, 1));
    reporter.record(UsageSample::now(3, 3072, 2));
    reporter.record(UsageSample::now(0, 0, 0));

    let samples = reporter.samples();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].cpu_in_use, 1);
    assert_eq!(samples[2].running_jobs, 0);
}

#[test]
fn test_report_file_contains_samples_and_peaks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usage.json");

    let mut reporter = UsageReporter::new();
    reporter.record(UsageSample::now(2, 2048, 1));
    reporter.record(UsageSample::now(4, 6144, 2));
    reporter.record(UsageSample::now(2, 2048, 1));
    reporter.write_report(&path).unwrap();

    let data = std::fs::read_to_string(&path).unwrap();
    let report: UsageReport = serde_json::from_str(&data).unwrap();
    assert_eq!(report.samples.len(), 3);
    assert_eq!(report.peak_cpu, 4);
    assert_eq!(report.peak_ram_mb, 6144);
}

#[test]
fn test_write_failure_is_an_error_not_a_panic() {
    let reporter = UsageReporter::new();
    let result = reporter.write_report(std::path::Path::new(
        "/nonexistent-dir/definitely/usage.json",
    ));
    assert!(result.is_err());
}
