//! Bounded fan-out of per-entity operations
//!
//! ```text
//! records ──► acquire permit (or stop) ──► spawn execute() ──► join_all ──► outcomes by index
//!                      │
//!                      └─ stop requested: remaining records become `skipped`
//! ```
//!
//! At most `concurrency` operations are in flight. A task that panics is
//! reported as a failed outcome for its entity; the batch keeps going.
//! Completed outcomes can also be streamed to a sink while the batch runs.

use futures::future::join_all;
use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{error, info, warn};

use crate::client::OperationClient;
use crate::errors::AzureError;
use crate::inventory::EntityRecord;
use crate::outcome::{OperationKind, OperationOutcome};

pub const CANCELLED_REASON: &str = "cancelled before dispatch";

/// Requests a cooperative stop: running operations finish, nothing new starts
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        if !self.tx.send_replace(true) {
            warn!("Stop requested: finishing in-flight operations, no new dispatches");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct BatchOrchestrator {
    client: Arc<OperationClient>,
    concurrency: usize,
    stop_rx: watch::Receiver<bool>,
    sink: Option<mpsc::UnboundedSender<OperationOutcome>>,
}

impl BatchOrchestrator {
    pub fn new(client: Arc<OperationClient>, concurrency: usize) -> (Self, StopHandle) {
        let (tx, stop_rx) = watch::channel(false);
        let orchestrator = Self {
            client,
            concurrency: concurrency.max(1),
            stop_rx,
            sink: None,
        };
        (orchestrator, StopHandle { tx: Arc::new(tx) })
    }

    /// Receive each outcome as soon as its operation completes
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<OperationOutcome>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run `kind` for every record; returns one outcome per record, sorted by input index
    pub async fn run(&self, kind: OperationKind, records: Vec<EntityRecord>) -> Vec<OperationOutcome> {
        let total = records.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut stop_rx = self.stop_rx.clone();

        info!(
            "Starting {} for {} entities (concurrency {})",
            kind, total, self.concurrency
        );

        let mut outcomes = Vec::with_capacity(total);
        let mut dispatched = Vec::with_capacity(total);
        let mut tasks = Vec::with_capacity(total);
        let mut remaining = records.into_iter();

        while let Some(record) = remaining.next() {
            let permit = tokio::select! {
                biased;
                _ = stopped(&mut stop_rx) => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                outcomes.push(OperationOutcome::skipped(kind, &record, CANCELLED_REASON));
                break;
            };

            let client = self.client.clone();
            let completed = completed.clone();
            let sink = self.sink.clone();
            let task_record = record.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = client.execute(&task_record, kind).await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                info!(
                    "[{}/{}] {} {}: {}",
                    done, total, kind, task_record.name, outcome.status
                );
                if let Some(sink) = sink {
                    if sink.send(outcome.clone()).is_err() {
                        warn!("Progress receiver gone; {} not recorded early", task_record.name);
                    }
                }
                outcome
            }));
            dispatched.push(record);
        }

        let cancelled: Vec<OperationOutcome> = remaining
            .map(|record| OperationOutcome::skipped(kind, &record, CANCELLED_REASON))
            .collect();
        if !cancelled.is_empty() || !outcomes.is_empty() {
            warn!(
                "{} entities not dispatched due to stop request",
                cancelled.len() + outcomes.len()
            );
        }
        outcomes.extend(cancelled);

        let results = join_all(tasks).await;
        for (record, result) in dispatched.iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("Task for {} did not complete: {}", record.name, e);
                    let err = AzureError::permanent(if e.is_panic() {
                        format!("operation panicked: {}", e)
                    } else {
                        format!("operation aborted: {}", e)
                    });
                    outcomes.push(OperationOutcome::failed(kind, record, 0, &err));
                }
            }
        }

        outcomes.sort_by_key(|o| o.index);
        outcomes
    }
}

/// Resolves once a stop is requested; never resolves if the handle is gone
async fn stopped(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|stop| *stop).await.map(|_| ()).is_err();
    if closed {
        pending::<()>().await;
    }
}
