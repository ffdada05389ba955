use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use crate::scheduler::job::JobRequest;

/// FIFO queue of admitted-but-not-yet-started requests.
///
/// Admission walks the queue in submission order but may skip entries that do
/// not currently fit, so a large job never head-of-line blocks smaller jobs
/// behind it.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    requests: VecDeque<JobRequest>,
    ids: HashSet<Uuid>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a request. Returns false if a request with the same id is
    /// already queued.
    pub fn push(&mut self, request: JobRequest) -> bool {
        if !self.ids.insert(request.id) {
            return false;
        }
        self.requests.push_back(request);
        true
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    /// Remove and return the first request (in FIFO order) satisfying `fits`.
    pub fn admit_where<F>(&mut self, fits: F) -> Option<JobRequest>
    where
        F: Fn(&JobRequest) -> bool,
    {
        let idx = self.requests.iter().position(fits)?;
        let request = self.requests.remove(idx)?;
        self.ids.remove(&request.id);
        Some(request)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobRequest> {
        self.requests.iter()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_in_fifo_order_with_skip() {
        let mut queue = AdmissionQueue::new();
        let big = JobRequest::new("big", 4, 4096, "true");
        let small = JobRequest::new("small", 1, 512, "true");
        queue.push(big.clone());
        queue.push(small.clone());

        // Only one cpu available: big must be skipped, small admitted.
        let admitted = queue.admit_where(|r| r.cpu <= 1).unwrap();
        assert_eq!(admitted.id, small.id);
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(&big.id));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut queue = AdmissionQueue::new();
        let request = JobRequest::new("a", 1, 128, "true");
        assert!(queue.push(request.clone()));
        assert!(!queue.push(request));
        assert_eq!(queue.len(), 1);
    }
}
