//! Azure operation client
//!
//! Turns one entity record plus an [`OperationKind`] into exactly one
//! [`OperationOutcome`]. Every backend call goes through the retry policy;
//! VM lookups go through the run-scoped cache. Errors never escape: they are
//! captured in the outcome so one bad entity cannot stop a batch.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::azure::{AzureApi, SnapshotRequest, VmDetails};
use crate::cache::VmCache;
use crate::config::SnapshotConfig;
use crate::constants::{files, snapshot};
use crate::errors::AzureError;
use crate::inventory::{EntityRecord, ResourceId};
use crate::outcome::{OperationKind, OperationOutcome};
use crate::retry::{RetryOutcome, RetryPolicy};

/// Naming and tagging of snapshots created during one run
#[derive(Debug, Clone)]
pub struct SnapshotNaming {
    prefix: String,
    chg: String,
    run_timestamp: String,
    expire_on: String,
    operator: String,
    incremental: bool,
}

impl SnapshotNaming {
    pub fn new(config: &SnapshotConfig, chg: &str, run_started: DateTime<Utc>, operator: &str) -> Self {
        let expire_on = run_started + ChronoDuration::days(i64::from(config.expire_days));
        Self {
            prefix: config.name_prefix.trim().to_string(),
            chg: chg.trim().to_string(),
            run_timestamp: run_started.format(files::TIMESTAMP_FORMAT).to_string(),
            expire_on: expire_on.format("%Y-%m-%d").to_string(),
            operator: operator.to_string(),
            incremental: config.incremental,
        }
    }

    /// `{prefix}_{chg}_{vm}_{timestamp}`, limited to characters Azure accepts.
    ///
    /// When too long, the VM segment is shortened so the timestamp survives.
    pub fn snapshot_name(&self, vm_name: &str) -> String {
        let head = format!("{}_{}_", sanitize(&self.prefix), sanitize(&self.chg));
        let tail = format!("_{}", self.run_timestamp);
        let budget = snapshot::MAX_NAME_LEN.saturating_sub(head.len() + tail.len());

        let vm: String = sanitize(vm_name).chars().take(budget).collect();
        let vm = vm.trim_end_matches(['-', '.']);
        format!("{}{}{}", head, vm, tail)
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (snapshot::TAG_CHANGE.to_string(), self.chg.clone()),
            (snapshot::TAG_CREATED_BY.to_string(), self.operator.clone()),
            (snapshot::TAG_EXPIRE_ON.to_string(), self.expire_on.clone()),
        ])
    }
}

/// Snapshot names allow letters, digits, `_`, `.` and `-`
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

pub struct OperationClient {
    api: Arc<dyn AzureApi>,
    retry: RetryPolicy,
    cache: VmCache,
    naming: Option<SnapshotNaming>,
    dry_run: bool,
}

impl OperationClient {
    pub fn new(api: Arc<dyn AzureApi>, retry: RetryPolicy, cache: VmCache) -> Self {
        Self {
            api,
            retry,
            cache,
            naming: None,
            dry_run: false,
        }
    }

    pub fn with_naming(mut self, naming: SnapshotNaming) -> Self {
        self.naming = Some(naming);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cache(&self) -> &VmCache {
        &self.cache
    }

    #[instrument(skip(self, record), fields(entity = %record.name, operation = %kind))]
    pub async fn execute(&self, record: &EntityRecord, kind: OperationKind) -> OperationOutcome {
        let outcome = match kind {
            OperationKind::CreateSnapshot => self.create_snapshot(record).await,
            OperationKind::ValidateSnapshot => self.validate_snapshot(record).await,
            OperationKind::MoveInvalid => self.confirm_invalid(record).await,
        };

        match (&outcome.error, outcome.status) {
            (Some(error), _) => warn!("{} {}: {} ({} attempts)", kind, record.name, error, outcome.attempts),
            (None, status) => debug!("{} {}: {}", kind, record.name, status),
        }
        outcome
    }

    async fn create_snapshot(&self, record: &EntityRecord) -> OperationOutcome {
        let kind = OperationKind::CreateSnapshot;
        let Some(naming) = &self.naming else {
            return OperationOutcome::failed(
                kind,
                record,
                0,
                &AzureError::permanent("no change number configured for snapshot creation"),
            );
        };
        let name = naming.snapshot_name(&record.name);

        if self.dry_run {
            info!("[dry run] would create snapshot {} for {}", name, record.name);
            return OperationOutcome::skipped(kind, record, format!("dry run: would create {}", name));
        }

        let (vm, mut attempts) = match self.resolve_vm(record).await {
            (Ok(vm), attempts) => (vm, attempts),
            (Err(e), attempts) => return OperationOutcome::failed(kind, record, attempts, &e),
        };

        let subscription = match record
            .subscription
            .clone()
            .or_else(|| ResourceId::parse(&record.id).ok().map(|r| r.subscription))
        {
            Some(sub) => sub,
            None => {
                let err = AzureError::permanent(format!("cannot determine subscription of {}", record.id));
                return OperationOutcome::failed(kind, record, attempts, &err);
            }
        };

        let request = SnapshotRequest {
            name: name.clone(),
            subscription,
            resource_group: vm.resource_group.clone(),
            source_disk_id: vm.os_disk_id.clone(),
            location: vm.location.clone(),
            tags: naming.tags(),
            incremental: naming.incremental,
        };

        let RetryOutcome { result, attempts: create_attempts } = self
            .retry
            .run(&format!("snapshot create {}", name), |_| self.api.create_snapshot(&request))
            .await;
        attempts += create_attempts;

        match result {
            Ok(details) if !details.id.trim().is_empty() => {
                info!("Snapshot created: {} ({})", details.name, details.id);
                OperationOutcome::succeeded(kind, record, attempts, details.id.clone(), Some(details))
            }
            Ok(_) => {
                let err = AzureError::permanent(format!("Azure returned no resource id for snapshot {}", name));
                OperationOutcome::failed(kind, record, attempts, &err)
            }
            Err(e) => OperationOutcome::failed(kind, record, attempts, &e),
        }
    }

    /// VM details from the cache, or from Azure on a miss
    async fn resolve_vm(&self, record: &EntityRecord) -> (Result<VmDetails, AzureError>, u32) {
        if let Some(details) = self.cache.get(&record.id).await {
            return (Ok(details), 0);
        }

        let RetryOutcome { result, attempts } = self
            .retry
            .run(&format!("vm show {}", record.name), |_| self.api.show_vm(record))
            .await;

        if let Ok(details) = &result {
            self.cache.insert(&record.id, details.clone()).await;
        }
        (result, attempts)
    }

    async fn validate_snapshot(&self, record: &EntityRecord) -> OperationOutcome {
        let kind = OperationKind::ValidateSnapshot;
        let RetryOutcome { result, attempts } = self
            .retry
            .run(&format!("snapshot show {}", record.name), |_| self.api.show_snapshot(&record.id))
            .await;

        match result {
            Ok(details) if details.is_provisioned() => {
                let detail = describe(&details.provisioning_state, details.time_created.as_deref());
                OperationOutcome::succeeded(kind, record, attempts, detail, Some(details))
            }
            Ok(details) => {
                let reason = describe(&details.provisioning_state, None);
                OperationOutcome::rejected(kind, record, attempts, reason, Some(details))
            }
            Err(e) => OperationOutcome::failed(kind, record, attempts, &e),
        }
    }

    /// Succeeds when the snapshot is confirmed unusable and may be moved
    async fn confirm_invalid(&self, record: &EntityRecord) -> OperationOutcome {
        let kind = OperationKind::MoveInvalid;
        let RetryOutcome { result, attempts } = self
            .retry
            .run(&format!("snapshot show {}", record.name), |_| self.api.show_snapshot(&record.id))
            .await;

        match result {
            Ok(details) if details.is_provisioned() => OperationOutcome::rejected(
                kind,
                record,
                attempts,
                "snapshot exists and is usable; not moved",
                Some(details),
            ),
            Ok(details) => {
                let detail = describe(&details.provisioning_state, None);
                OperationOutcome::succeeded(kind, record, attempts, detail, Some(details))
            }
            Err(e) if e.is_not_found() => OperationOutcome::succeeded(kind, record, attempts, "not found", None),
            Err(e) => OperationOutcome::failed(kind, record, attempts, &e),
        }
    }
}

fn describe(state: &Option<String>, created: Option<&str>) -> String {
    let state = state.as_deref().unwrap_or("unknown");
    match created {
        Some(created) => format!("provisioning state {} (created {})", state, created),
        None => format!("provisioning state {}", state),
    }
}
