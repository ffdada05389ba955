use crate::error::{BallastError, Result};

/// Tracks the total and available CPU/RAM budget for the scheduler.
///
/// Counters are mutated only through [`try_reserve`](ResourcePool::try_reserve)
/// and [`release`](ResourcePool::release), both called from the single
/// scheduler control loop. The invariant `0 <= available <= total` holds for
/// both dimensions at all times.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    total_cpu: u32,
    total_ram_mb: u64,
    available_cpu: u32,
    available_ram_mb: u64,
}

impl ResourcePool {
    pub fn new(total_cpu: u32, total_ram_mb: u64) -> Self {
        Self {
            total_cpu,
            total_ram_mb,
            available_cpu: total_cpu,
            available_ram_mb: total_ram_mb,
        }
    }

    pub fn total_cpu(&self) -> u32 {
        self.total_cpu
    }

    pub fn total_ram_mb(&self) -> u64 {
        self.total_ram_mb
    }

    pub fn available_cpu(&self) -> u32 {
        self.available_cpu
    }

    pub fn available_ram_mb(&self) -> u64 {
        self.available_ram_mb
    }

    /// CPU currently reserved by running jobs.
    pub fn cpu_in_use(&self) -> u32 {
        self.total_cpu - self.available_cpu
    }

    /// RAM currently reserved by running jobs, in megabytes.
    pub fn ram_in_use_mb(&self) -> u64 {
        self.total_ram_mb - self.available_ram_mb
    }

    /// Whether a request could ever be satisfied by this pool.
    ///
    /// A request exceeding the *total* budget can never run and must be
    /// failed up front rather than left queued forever.
    pub fn fits_total(&self, cpu: u32, ram_mb: u64) -> bool {
        cpu <= self.total_cpu && ram_mb <= self.total_ram_mb
    }

    /// Whether a request fits the currently available budget.
    pub fn can_reserve(&self, cpu: u32, ram_mb: u64) -> bool {
        cpu <= self.available_cpu && ram_mb <= self.available_ram_mb
    }

    /// Atomically reserve `cpu` and `ram_mb` if both fit.
    ///
    /// Returns false and makes no change when either dimension does not fit.
    pub fn try_reserve(&mut self, cpu: u32, ram_mb: u64) -> bool {
        if !self.can_reserve(cpu, ram_mb) {
            return false;
        }
        self.available_cpu -= cpu;
        self.available_ram_mb -= ram_mb;
        true
    }

    /// Return a previous reservation to the pool.
    ///
    /// A release without a matching reserve would push a counter past its
    /// total; that is a scheduler bug and fails with
    /// [`BallastError::AccountingViolation`] without mutating either counter.
    pub fn release(&mut self, cpu: u32, ram_mb: u64) -> Result<()> {
        if self.available_cpu + cpu > self.total_cpu
            || self.available_ram_mb + ram_mb > self.total_ram_mb
        {
            return Err(BallastError::AccountingViolation(format!(
                "release of cpu={} ram_mb={} exceeds total (available cpu={}/{} ram_mb={}/{})",
                cpu,
                ram_mb,
                self.available_cpu,
                self.total_cpu,
                self.available_ram_mb,
                self.total_ram_mb
            )));
        }
        self.available_cpu += cpu;
        self.available_ram_mb += ram_mb;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pool_is_fully_available() {
        let pool = ResourcePool::new(4, 8192);
        assert_eq!(pool.available_cpu(), 4);
        assert_eq!(pool.available_ram_mb(), 8192);
        assert_eq!(pool.cpu_in_use(), 0);
        assert_eq!(pool.ram_in_use_mb(), 0);
    }

    #[test]
    fn reserve_fails_without_partial_effect() {
        let mut pool = ResourcePool::new(4, 8192);
        // CPU fits, RAM does not; neither counter may move.
        assert!(!pool.try_reserve(2, 10_000));
        assert_eq!(pool.available_cpu(), 4);
        assert_eq!(pool.available_ram_mb(), 8192);
    }

    #[test]
    fn release_without_reserve_is_an_accounting_violation() {
        let mut pool = ResourcePool::new(4, 8192);
        let err = pool.release(1, 0).unwrap_err();
        assert!(matches!(err, BallastError::AccountingViolation(_)));
        assert_eq!(pool.available_cpu(), 4);
    }
}
