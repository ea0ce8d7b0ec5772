use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analysis::Reasoner;
use crate::config::QueueConfig;
use crate::error::{AgentError, Result};
use crate::pipeline::Orchestrator;
use crate::report::write_report;
use crate::runner::ToolRunner;
use crate::scope::resolve_scope;
use crate::types::ScanRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Reported(PathBuf),
    /// Prior artifacts were found; nothing ran.
    Skipped,
}

/// One full scan: whatever the worker does with a dequeued request.
#[async_trait]
pub trait ScanProcessor: Send + Sync + 'static {
    async fn process(&self, request: ScanRequest) -> anyhow::Result<JobResult>;
}

/// Scope -> recon -> analysis -> report.
pub struct ReconJob<R: ?Sized> {
    orchestrator: Orchestrator<R>,
    reasoner: Reasoner,
}

impl<R> ReconJob<R>
where
    R: ToolRunner + ?Sized,
{
    pub fn new(orchestrator: Orchestrator<R>, reasoner: Reasoner) -> Self {
        Self {
            orchestrator,
            reasoner,
        }
    }
}

#[async_trait]
impl<R> ScanProcessor for ReconJob<R>
where
    R: ToolRunner + ?Sized + 'static,
{
    async fn process(&self, request: ScanRequest) -> anyhow::Result<JobResult> {
        let scope = resolve_scope(&request)
            .with_context(|| format!("cannot scan {:?}", request.target))?;
        let outcome = self.orchestrator.run(&scope).await;
        if outcome.is_skipped() {
            return Ok(JobResult::Skipped);
        }
        let analysis = self.reasoner.analyze(&scope, &outcome).await;
        let path = write_report(self.orchestrator.store(), &scope, &outcome, &analysis)
            .context("failed to write report")?;
        Ok(JobResult::Reported(path))
    }
}

/// Snapshot returned by [`WorkQueue::status`].
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub queued: usize,
    pub running: Option<String>,
    pub completed: u64,
    pub failed: u64,
    pub state: String, // "idle" | "running" | "stopped"
}

#[derive(Debug, Default)]
struct Counters {
    running: Mutex<Option<String>>,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn set_running(&self, target: Option<String>) {
        if let Ok(mut guard) = self.running.lock() {
            *guard = target;
        }
    }

    fn running(&self) -> Option<String> {
        self.running.lock().ok().and_then(|g| g.clone())
    }
}

/// FIFO of scan requests drained by exactly one background worker, so at most
/// one pipeline runs at a time.
#[derive(Debug)]
pub struct WorkQueue {
    tx: mpsc::Sender<ScanRequest>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: QueueConfig,
}

impl WorkQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn start<P: ScanProcessor>(processor: Arc<P>, config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity);
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let handle = tokio::spawn(worker_loop(processor, rx, cancel.clone(), counters.clone()));
        Self {
            tx,
            cancel,
            counters,
            worker: Mutex::new(Some(handle)),
            config,
        }
    }

    /// Non-blocking enqueue. Fails when the queue is full or shutting down.
    pub fn enqueue(&self, request: ScanRequest) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Queue("queue is shutting down".into()));
        }
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(r) => {
                AgentError::Queue(format!("queue is full, dropped {}", r.target))
            }
            mpsc::error::TrySendError::Closed(_) => AgentError::Queue("worker has stopped".into()),
        })?;
        Ok(())
    }

    pub fn status(&self) -> QueueStatus {
        let running = self.counters.running();
        let state = if self.cancel.is_cancelled() {
            "stopped"
        } else if running.is_some() {
            "running"
        } else {
            "idle"
        };
        QueueStatus {
            queued: self.tx.max_capacity() - self.tx.capacity(),
            running,
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            state: state.into(),
        }
    }

    /// Token cancelled when shutdown begins.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop taking work and wait for the in-flight scan, bounded by
    /// `join_timeout_secs`. Queued requests that never started are dropped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().ok().and_then(|mut g| g.take());
        let Some(mut handle) = handle else {
            return;
        };
        match time::timeout(self.config.join_timeout(), &mut handle).await {
            Ok(_) => info!("worker joined"),
            Err(_) => {
                warn!(
                    "worker did not stop within {}s, abandoning current scan",
                    self.config.join_timeout_secs
                );
                handle.abort();
                // Dropping the worker drops its JoinSet, which aborts the scan.
                let _ = handle.await;
                self.counters.set_running(None);
            }
        }
    }
}

async fn worker_loop<P: ScanProcessor>(
    processor: Arc<P>,
    mut rx: mpsc::Receiver<ScanRequest>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) {
    info!("worker started");
    loop {
        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(r) => r,
                None => break,
            },
        };

        let target = request.target.clone();
        info!(target = %target, "starting scan");
        counters.set_running(Some(target.clone()));

        // Run in its own task so a panicking scan only loses that scan. The set
        // is owned by this loop, so aborting the worker aborts the scan with it.
        let mut scan = JoinSet::new();
        let p = processor.clone();
        scan.spawn(async move { p.process(request).await });
        match scan.join_next().await {
            Some(Ok(Ok(JobResult::Reported(path)))) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(target = %target, report = %path.display(), "report generated");
            }
            Some(Ok(Ok(JobResult::Skipped))) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(target = %target, "scan skipped, prior results exist");
            }
            Some(Ok(Err(e))) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(target = %target, "scan failed: {e:#}");
            }
            Some(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(target = %target, "scan task aborted: {e}");
            }
            None => {}
        }
        counters.set_running(None);
    }

    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(dropped, "discarded queued scans at shutdown");
    }
    info!("worker stopped");
}
