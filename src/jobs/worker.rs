// Transcode worker -- drains the input queue one job at a time.
//
// A single sequential loop per process; more throughput comes from running
// more worker processes, which race on the atomic claim. The stop marker is
// read once when the worker starts and compared between jobs and at every
// progress poll.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::catalog::CatalogTree;
use crate::constants::WORKER_IDLE_SECONDS;
use crate::db::Store;
use crate::error::Result;

use super::runner::WorkerOptions;
use super::{get_worker_id, read_stop_marker, request_stop, runner};

/// Why a drain pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassEnd {
    Empty,
    Stopped,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct TranscodeWorker {
    store: Store,
    catalog: CatalogTree,
    options: WorkerOptions,
    worker_id: String,
    idle: Duration,
}

impl TranscodeWorker {
    pub fn new(store: Store) -> Self {
        Self {
            catalog: CatalogTree::new(store.clone()),
            store,
            options: WorkerOptions::default(),
            worker_id: get_worker_id(),
            idle: Duration::from_secs(WORKER_IDLE_SECONDS),
        }
    }

    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn current_marker(&self) -> Result<i64> {
        let conn = self.store.connect()?;
        read_stop_marker(&conn)
    }

    /// True once the stop marker has moved past `baseline`.
    /// A failed read counts as no stop.
    pub fn stop_requested_since(&self, baseline: i64) -> bool {
        match self.current_marker() {
            Ok(marker) => marker != baseline,
            Err(e) => {
                log::warn!("Worker {}: could not read stop marker: {}", self.worker_id, e);
                false
            }
        }
    }

    /// Increment the stop marker; running workers exit after their current job
    pub fn request_stop(&self) -> Result<i64> {
        let conn = self.store.connect()?;
        request_stop(&conn)
    }

    /// Drain the queue once and return the number of jobs processed
    pub fn run_once(&self) -> Result<usize> {
        let baseline = self.current_marker()?;
        log::info!("Worker {} draining queue", self.worker_id);
        let (count, end) = self.drain(baseline);
        log::info!("Worker {} processed {} job(s) ({:?})", self.worker_id, count, end);
        Ok(count)
    }

    /// Keep draining, sleeping between empty polls, until a stop is requested
    pub fn run_continuous(&self) -> Result<usize> {
        let baseline = self.current_marker()?;
        log::info!("Worker {} started (stop marker {})", self.worker_id, baseline);

        let mut total = 0;
        loop {
            let (count, end) = self.drain(baseline);
            total += count;
            if end == PassEnd::Stopped {
                break;
            }

            std::thread::sleep(self.idle);
            if self.stop_requested_since(baseline) {
                break;
            }
        }

        log::info!("Worker {} stopped after {} job(s)", self.worker_id, total);
        Ok(total)
    }

    fn drain(&self, baseline: i64) -> (usize, PassEnd) {
        let stop_check = || self.stop_requested_since(baseline);
        let mut count = 0;

        loop {
            if stop_check() {
                return (count, PassEnd::Stopped);
            }

            // Catch panics so the loop never dies
            let result = catch_unwind(AssertUnwindSafe(|| {
                runner::run_next_job(&self.store, &self.catalog, &self.options, &stop_check)
            }));

            match result {
                Ok(Ok(true)) => count += 1,
                Ok(Ok(false)) => return (count, PassEnd::Empty),
                Ok(Err(e)) => {
                    log::error!("Worker {}: job failed: {}", self.worker_id, e);
                    return (count, PassEnd::Aborted);
                }
                Err(_) => {
                    log::error!("Worker {}: job panicked (recovered)", self.worker_id);
                    return (count, PassEnd::Aborted);
                }
            }
        }
    }
}
