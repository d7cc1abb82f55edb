// File: azsnap/src/report/aggregator.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::outcome::{OperationKind, OperationOutcome, OperationStatus};

/// Counts and failed ids of one finished batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub operation: OperationKind,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Input order
    pub failed_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn duration_seconds(&self) -> i64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    pub fn is_consistent(&self) -> bool {
        self.succeeded + self.failed + self.skipped == self.total
    }
}

/// Full ids split by verdict, each in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
    pub skipped: Vec<String>,
}

/// Finalized batch: summary plus every outcome sorted by input index
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub outcomes: Vec<OperationOutcome>,
}

impl BatchReport {
    pub fn partition(&self) -> Partition {
        let mut partition = Partition::default();
        for outcome in &self.outcomes {
            let bucket = match outcome.status {
                OperationStatus::Succeeded => &mut partition.valid,
                OperationStatus::Failed => &mut partition.invalid,
                OperationStatus::Skipped => &mut partition.skipped,
            };
            bucket.push(outcome.entity_id.clone());
        }
        partition
    }

    pub fn failed(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }
}

/// Accumulates outcomes as they arrive; finalized exactly once
pub struct ResultAggregator {
    run_id: Uuid,
    operation: OperationKind,
    started_at: DateTime<Utc>,
    outcomes: Vec<OperationOutcome>,
}

impl ResultAggregator {
    pub fn new(operation: OperationKind, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation,
            started_at,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: OperationOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = OperationOutcome>) {
        self.outcomes.extend(outcomes);
    }

    pub fn finalize(self) -> BatchReport {
        let mut outcomes = self.outcomes;
        outcomes.sort_by_key(|o| o.index);

        let mut summary = BatchSummary {
            run_id: self.run_id,
            operation: self.operation,
            total: outcomes.len(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            failed_ids: Vec::new(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        };

        for outcome in &outcomes {
            match outcome.status {
                OperationStatus::Succeeded => summary.succeeded += 1,
                OperationStatus::Failed => {
                    summary.failed += 1;
                    summary.failed_ids.push(outcome.entity_id.clone());
                }
                OperationStatus::Skipped => summary.skipped += 1,
            }
        }

        BatchReport { summary, outcomes }
    }
}
