//! Background processing of queued jobs.
//!
//! A single worker thread drains the queue; conversions already
//! serialize on the automation-host lock, so more workers would only
//! contend for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::jobs::JobOrchestrator;

pub struct JobWorker {
    sender: Sender<String>,
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl JobWorker {
    pub fn start(orchestrator: Arc<JobOrchestrator>, queue_capacity: usize) -> Self {
        let (sender, receiver) = bounded::<String>(queue_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_worker(orchestrator, receiver, flag));
        info!("Job worker started");

        Self {
            sender,
            handle: Some(handle),
            shutdown,
        }
    }

    /// Queues a job id for processing. Fails fast instead of blocking
    /// the caller when the queue is full.
    pub fn submit(&self, job_id: String) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }
        match self.sender.try_send(job_id) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(WorkerError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::ChannelClosed),
        }
    }

    pub fn shutdown(&self) {
        info!("Shutting down job worker...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Signals shutdown and waits for the in-flight job to finish.
    pub fn join(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Job worker panicked");
            } else {
                debug!("Job worker finished");
            }
        }
    }
}

fn run_worker(
    orchestrator: Arc<JobOrchestrator>,
    receiver: Receiver<String>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Job worker received shutdown signal");
            break;
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job_id) => {
                debug!("Processing queued job {}", job_id);
                if let Err(e) = orchestrator.process(&job_id) {
                    error!("Job {} could not be processed: {}", job_id, e);
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Job queue disconnected");
                break;
            }
        }
    }

    debug!("Job worker stopped");
}
