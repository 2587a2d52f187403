//! # Upload Scheduler
//!
//! Runs [`UploadPipeline::run_cycle`] on a fixed interval until stopped.
//!
//! The loop is a single tokio task: sleep `interval`, run one cycle, repeat.
//! A cycle only starts after the previous one returned, so cycles never
//! overlap. Each `start()` gets its own stop channel; a loop that was told to
//! stop keeps seeing `true` even if the scheduler is started again.

pub mod pipeline;

pub use pipeline::{CycleOutcome, UploadPipeline};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Result of [`UploadScheduler::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

struct RunHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Periodic driver of the upload pipeline
pub struct UploadScheduler {
    pipeline: Arc<Mutex<UploadPipeline>>,
    interval: Duration,
    run: Option<RunHandle>,
    cycles: Arc<AtomicU64>,
}

impl UploadScheduler {
    pub fn new(pipeline: UploadPipeline, interval: Duration) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            interval,
            run: None,
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the control loop; the first cycle runs after one interval
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> StartOutcome {
        if self.is_running() {
            info!("Scheduler already running");
            return StartOutcome::AlreadyRunning;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.pipeline),
            self.interval,
            stop_rx,
            Arc::clone(&self.cycles),
        ));
        self.run = Some(RunHandle { stop_tx, task });

        info!("Scheduler started, cycle interval {:?}", self.interval);
        StartOutcome::Started
    }

    /// Cancel the pending sleep and prevent further cycles
    ///
    /// Returns `false` if the scheduler was not running. A cycle already in
    /// flight runs to completion; use [`shutdown`](Self::shutdown) to wait
    /// for it.
    pub fn stop(&mut self) -> bool {
        match self.run.take() {
            Some(run) => {
                run.stop_tx.send_replace(true);
                info!("Scheduler stopped");
                !run.task.is_finished()
            }
            None => false,
        }
    }

    /// Stop and wait for the loop task to exit
    pub async fn shutdown(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        run.stop_tx.send_replace(true);

        if let Err(e) = run.task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
        info!(
            "Scheduler shut down after {} cycles",
            self.cycles.load(Ordering::SeqCst)
        );
    }

    pub fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(|run| !run.task.is_finished())
    }

    /// Cycles finished since construction, across restarts
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Shared handle to the pipeline, locked by the loop for one cycle at a time
    pub fn pipeline(&self) -> Arc<Mutex<UploadPipeline>> {
        Arc::clone(&self.pipeline)
    }
}

impl Drop for UploadScheduler {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.stop_tx.send_replace(true);
        }
    }
}

async fn run_loop(
    pipeline: Arc<Mutex<UploadPipeline>>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    cycles: Arc<AtomicU64>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        if *stop_rx.borrow() {
            break;
        }

        let mut pipeline = pipeline.lock().await;
        // stop() may have been called while waiting for the lock
        if *stop_rx.borrow() {
            break;
        }

        let outcome = pipeline.run_cycle().await;
        drop(pipeline);

        let n = cycles.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Cycle {} finished: {:?}", n, outcome);
    }
    debug!("Scheduler loop exited");
}
