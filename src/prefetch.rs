//! Low-priority prefetch queue.
//!
//! Stands in for browser idle callbacks: jobs wait here until the session
//! decides the foreground is quiet, then at most `max_in_flight` of them are
//! handed to the lookup worker at a time. An image URL is only ever requested
//! once per queue lifetime.

use std::collections::{HashSet, VecDeque};

use crate::constants::PREFETCH_MAX_IN_FLIGHT;

/// A deferred background request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchJob {
    /// Warm the image bytes behind a URL
    Image { url: String },
    /// Warm the plot-membership cache for an image
    Metadata { image: String },
}

/// FIFO of prefetch jobs with URL deduplication and an in-flight cap.
#[derive(Debug)]
pub struct PrefetchQueue {
    queue: VecDeque<PrefetchJob>,
    /// URLs queued or already dispatched
    requested_urls: HashSet<String>,
    in_flight: usize,
    max_in_flight: usize,
}

impl Default for PrefetchQueue {
    fn default() -> Self {
        Self::new(PREFETCH_MAX_IN_FLIGHT)
    }
}

impl PrefetchQueue {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            requested_urls: HashSet::new(),
            in_flight: 0,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Queue an image URL. Returns `false` if it was requested before.
    pub fn enqueue_image(&mut self, url: String) -> bool {
        if !self.requested_urls.insert(url.clone()) {
            return false;
        }
        self.queue.push_back(PrefetchJob::Image { url });
        true
    }

    pub fn enqueue_metadata(&mut self, image: String) {
        let job = PrefetchJob::Metadata { image };
        if !self.queue.contains(&job) {
            self.queue.push_back(job);
        }
    }

    /// Drop queued (not dispatched) jobs after the cursor moved on.
    ///
    /// Their URLs are forgotten so the new window can queue them again.
    pub fn retarget(&mut self) {
        for job in self.queue.drain(..) {
            if let PrefetchJob::Image { url } = job {
                self.requested_urls.remove(&url);
            }
        }
    }

    /// Forget everything, including in-flight accounting.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.requested_urls.clear();
        self.in_flight = 0;
    }

    /// Next job to dispatch, if the in-flight cap allows one.
    pub fn next_ready(&mut self) -> Option<PrefetchJob> {
        if self.in_flight >= self.max_in_flight {
            return None;
        }
        let job = self.queue.pop_front()?;
        self.in_flight += 1;
        Some(job)
    }

    /// Record that a dispatched job completed (or was skipped).
    pub fn job_finished(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_never_requeued() {
        let mut queue = PrefetchQueue::new(4);
        assert!(queue.enqueue_image("/a".to_string()));
        assert!(!queue.enqueue_image("/a".to_string()));

        assert_eq!(
            queue.next_ready(),
            Some(PrefetchJob::Image {
                url: "/a".to_string()
            })
        );
        queue.job_finished();
        assert!(!queue.enqueue_image("/a".to_string()));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_in_flight_cap() {
        let mut queue = PrefetchQueue::new(2);
        for i in 0..5 {
            queue.enqueue_image(format!("/{}", i));
        }
        assert!(queue.next_ready().is_some());
        assert!(queue.next_ready().is_some());
        assert!(queue.next_ready().is_none());
        assert_eq!(queue.in_flight(), 2);

        queue.job_finished();
        assert!(queue.next_ready().is_some());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_retarget_forgets_undispatched_urls() {
        let mut queue = PrefetchQueue::new(1);
        queue.enqueue_image("/dispatched".to_string());
        queue.enqueue_image("/queued".to_string());
        queue.enqueue_metadata("x.jpg".to_string());
        queue.next_ready();

        queue.retarget();
        assert!(queue.is_empty());
        assert_eq!(queue.in_flight(), 1);
        assert!(!queue.enqueue_image("/dispatched".to_string()));
        assert!(queue.enqueue_image("/queued".to_string()));
    }

    #[test]
    fn test_metadata_jobs_deduplicate_while_queued() {
        let mut queue = PrefetchQueue::new(1);
        queue.enqueue_metadata("x.jpg".to_string());
        queue.enqueue_metadata("x.jpg".to_string());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_reset() {
        let mut queue = PrefetchQueue::new(1);
        queue.enqueue_image("/a".to_string());
        queue.next_ready();
        queue.reset();
        assert_eq!(queue.in_flight(), 0);
        assert!(queue.enqueue_image("/a".to_string()));
    }
}
