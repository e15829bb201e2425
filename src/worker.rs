//! Background thread for plot-membership lookups and image prefetches.
//!
//! Requests go to the thread over a channel and results come back on
//! another; the session drains them each tick with
//! [`take_one_result`](LookupWorker::take_one_result). Every job carries the
//! session epoch it was issued in so results from a previous directory can
//! be recognised and dropped.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cache::LookupTicket;
use crate::model::PlotMembership;
use crate::service::{FieldService, ServiceError};

/// Work handed to the lookup thread.
#[derive(Debug, Clone)]
pub enum Job {
    /// Resolve an image's plot membership
    Membership {
        epoch: u64,
        ticket: LookupTicket,
        /// Issued by the prefetcher rather than for the displayed image
        background: bool,
    },
    /// Warm an image URL
    Image { epoch: u64, url: String },
}

/// Completed job.
#[derive(Debug)]
pub enum JobResult {
    Membership {
        epoch: u64,
        ticket: LookupTicket,
        background: bool,
        result: Result<PlotMembership, ServiceError>,
    },
    Image {
        epoch: u64,
        url: String,
        result: Result<usize, ServiceError>,
    },
}

impl JobResult {
    pub fn epoch(&self) -> u64 {
        match self {
            JobResult::Membership { epoch, .. } | JobResult::Image { epoch, .. } => *epoch,
        }
    }
}

enum ThreadMessage {
    Run(Job),
    Shutdown,
}

/// Owns the lookup thread.
pub struct LookupWorker {
    request_tx: Sender<ThreadMessage>,
    result_rx: Receiver<JobResult>,
    thread_handle: Option<JoinHandle<()>>,
    /// Jobs sent but not yet collected
    pending: usize,
}

impl LookupWorker {
    /// Spawn the lookup thread.
    pub fn spawn(service: Arc<dyn FieldService>) -> Result<Self, String> {
        let (request_tx, request_rx) = mpsc::channel::<ThreadMessage>();
        let (result_tx, result_rx) = mpsc::channel::<JobResult>();

        let thread_handle = thread::Builder::new()
            .name("plot-lookup".to_string())
            .spawn(move || {
                log::debug!("Lookup thread started");
                Self::thread_loop(service.as_ref(), request_rx, result_tx);
                log::debug!("Lookup thread exiting");
            })
            .map_err(|e| format!("Failed to spawn lookup thread: {}", e))?;

        Ok(Self {
            request_tx,
            result_rx,
            thread_handle: Some(thread_handle),
            pending: 0,
        })
    }

    fn thread_loop(
        service: &dyn FieldService,
        request_rx: Receiver<ThreadMessage>,
        result_tx: Sender<JobResult>,
    ) {
        while let Ok(ThreadMessage::Run(job)) = request_rx.recv() {
            let result = Self::run_job(service, job);
            if result_tx.send(result).is_err() {
                log::warn!("Result channel closed, lookup thread exiting");
                break;
            }
        }
    }

    fn run_job(service: &dyn FieldService, job: Job) -> JobResult {
        match job {
            Job::Membership {
                epoch,
                ticket,
                background,
            } => {
                let result =
                    service.image_plot_membership(&ticket.key.directory, &ticket.key.image);
                JobResult::Membership {
                    epoch,
                    ticket,
                    background,
                    result,
                }
            }
            Job::Image { epoch, url } => {
                let result = service.fetch_image(&url);
                JobResult::Image { epoch, url, result }
            }
        }
    }

    /// Queue a job on the lookup thread.
    pub fn submit(&mut self, job: Job) {
        if self.request_tx.send(ThreadMessage::Run(job)).is_err() {
            log::error!("Failed to submit lookup job: channel closed");
        } else {
            self.pending += 1;
        }
    }

    /// Take one completed result without blocking.
    pub fn take_one_result(&mut self) -> Option<JobResult> {
        match self.result_rx.try_recv() {
            Ok(result) => {
                self.pending = self.pending.saturating_sub(1);
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::warn!("Lookup thread disconnected");
                None
            }
        }
    }

    /// Wait up to `timeout` for one completed result.
    pub fn wait_one_result(&mut self, timeout: Duration) -> Option<JobResult> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => {
                self.pending = self.pending.saturating_sub(1);
                Some(result)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("Lookup thread disconnected");
                None
            }
        }
    }

    /// Jobs submitted and not yet collected.
    pub fn pending_count(&self) -> usize {
        self.pending
    }
}

impl Drop for LookupWorker {
    fn drop(&mut self) {
        let _ = self.request_tx.send(ThreadMessage::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                log::warn!("Lookup thread panicked: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, PlotIndexCache, Resolution};
    use crate::model::{DirectoryKey, LatLon};
    use crate::service::MemoryService;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn dir() -> DirectoryKey {
        DirectoryKey::new("2024", "Trial", "Davis", "Pop1", "2024-06-01", "Amiga", "RGB")
    }

    fn service() -> Arc<MemoryService> {
        let svc = MemoryService::new();
        svc.add_directory(
            dir(),
            vec!["a.jpg".to_string(), "b.jpg".to_string()],
            vec![LatLon::new(38.0, -121.0), LatLon::new(38.1, -121.1)],
        );
        Arc::new(svc)
    }

    #[test]
    fn test_membership_job_round_trip() {
        let svc = service();
        let mut worker = LookupWorker::spawn(svc.clone()).unwrap();
        let mut cache = PlotIndexCache::new();

        let Resolution::Dispatch(ticket) = cache.resolve(CacheKey::new(dir(), "b.jpg")) else {
            panic!("expected dispatch");
        };
        worker.submit(Job::Membership {
            epoch: 3,
            ticket,
            background: false,
        });
        assert_eq!(worker.pending_count(), 1);

        let result = worker.wait_one_result(TIMEOUT).expect("lookup result");
        assert_eq!(result.epoch(), 3);
        let JobResult::Membership {
            background, result, ..
        } = result
        else {
            panic!("expected membership result");
        };
        assert!(!background);
        assert_eq!(result.unwrap().lat, Some(38.1));
        assert_eq!(worker.pending_count(), 0);
        assert_eq!(svc.call_count("image_plot_membership"), 1);
    }

    #[test]
    fn test_image_job_reports_failure() {
        let svc = service();
        svc.fail_next("fetch_image");
        let mut worker = LookupWorker::spawn(svc).unwrap();
        worker.submit(Job::Image {
            epoch: 0,
            url: "/images/x.jpg".to_string(),
        });

        let Some(JobResult::Image { result, .. }) = worker.wait_one_result(TIMEOUT) else {
            panic!("expected image result");
        };
        assert!(result.is_err());
    }

    #[test]
    fn test_take_one_result_is_non_blocking() {
        let mut worker = LookupWorker::spawn(service()).unwrap();
        assert!(worker.take_one_result().is_none());
    }
}
