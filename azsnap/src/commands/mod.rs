//! Batch commands
//!
//! Every command runs the same pipeline:
//!
//! ```text
//! SessionGuard ─► read_inventory ─► output dir + run log ─► BatchOrchestrator
//!                                                                 │
//!              summary table ◄─ outcome/summary files ◄─ ResultAggregator
//! ```
//!
//! and then writes its own artifacts (partition files, moved ids).
//! While the batch runs, each completed outcome is appended to the outcome
//! file and every created snapshot id to the snapshot list, so an interrupted
//! run still leaves a record of what exists. The outcome file is rewritten in
//! input order at the end.
//! Nothing touches the filesystem before the session guard and the inventory
//! reader have both succeeded.

pub mod create;
pub mod move_invalid;
pub mod validate;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::azure::{AccountInfo, AzCli, AzureApi, RestClient, RestSettings, SessionProvider, TokenSource};
use crate::cache::VmCache;
use crate::client::{OperationClient, SnapshotNaming};
use crate::config::{Backend, Config};
use crate::constants::azure;
use crate::errors::SnapError;
use crate::inventory::read_inventory;
use crate::logging::RunLog;
use crate::orchestrator::BatchOrchestrator;
use crate::outcome::{OperationKind, OperationOutcome};
use crate::report::{
    append_ids, append_outcome, current_user, render_summary_table, BatchReport, BatchSummary,
    ResultAggregator, ReportWriter,
};
use crate::retry::RetryPolicy;
use crate::session::SessionGuard;

pub use create::create_snapshots;
pub use move_invalid::move_invalid_snapshots;
pub use validate::validate_snapshots;

/// Azure collaborators of a run
#[derive(Clone)]
pub struct Backends {
    pub session: Arc<dyn SessionProvider>,
    pub api: Arc<dyn AzureApi>,
}

impl Backends {
    /// The session is always probed through `az`; operations use the configured backend
    pub fn from_config(config: &Config) -> Result<Self> {
        let cli = AzCli::new(config.azure.az_binary.clone());
        let session: Arc<dyn SessionProvider> = Arc::new(cli.clone());

        let api: Arc<dyn AzureApi> = match config.azure.backend {
            Backend::Cli => Arc::new(cli),
            Backend::Rest => {
                let token_source = match std::env::var(azure::ACCESS_TOKEN_ENV) {
                    Ok(token) if !token.trim().is_empty() => {
                        info!("Using bearer token from {}", azure::ACCESS_TOKEN_ENV);
                        TokenSource::Static(token.trim().to_string())
                    }
                    _ => TokenSource::AzCli(cli),
                };
                Arc::new(RestClient::new(RestSettings::from_config(config), token_source)?)
            }
        };

        Ok(Self { session, api })
    }
}

/// Everything a command needs besides its own arguments
pub struct CommandContext {
    pub config: Arc<Config>,
    pub backends: Backends,
    pub run_log: RunLog,
    pub operator: String,
    pub started_at: DateTime<Utc>,
    /// `None` detects whether stdin is a terminal
    pub interactive: Option<bool>,
}

impl CommandContext {
    pub fn new(config: Arc<Config>, backends: Backends, run_log: RunLog) -> Self {
        Self {
            config,
            backends,
            run_log,
            operator: current_user(),
            started_at: Utc::now(),
            interactive: None,
        }
    }

    pub(crate) fn session_guard(&self) -> SessionGuard {
        let guard = SessionGuard::new(
            self.backends.session.clone(),
            self.config.azure.interactive_login,
        );
        match self.interactive {
            Some(interactive) => guard.with_interactive(interactive),
            None => guard,
        }
    }

    fn writer(&self) -> ReportWriter {
        ReportWriter::new(&self.config.output.dir, &self.operator, self.started_at)
    }
}

/// What a finished command leaves behind
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub summary: BatchSummary,
    pub outcomes_file: PathBuf,
    pub summary_file: PathBuf,
    /// Command-specific files, in the order they were written
    pub artifacts: Vec<PathBuf>,
}

/// Shared pipeline up to and including the outcome and summary files
pub(crate) async fn run_batch(
    ctx: &CommandContext,
    kind: OperationKind,
    input: &Path,
    naming: Option<SnapshotNaming>,
) -> Result<(BatchReport, ReportWriter, RunOutput), SnapError> {
    let account = ctx.session_guard().ensure_session().await?;
    run_batch_in_session(ctx, &account, kind, input, naming).await
}

/// [`run_batch`] for callers that already hold a session
pub(crate) async fn run_batch_in_session(
    ctx: &CommandContext,
    account: &AccountInfo,
    kind: OperationKind,
    input: &Path,
    naming: Option<SnapshotNaming>,
) -> Result<(BatchReport, ReportWriter, RunOutput), SnapError> {
    let inventory = read_inventory(input, kind.entity_kind()).await?;

    let writer = ctx.writer();
    writer.ensure_dir().await?;
    if let Err(e) = ctx.run_log.attach_file(&writer.log_path(kind)) {
        warn!("Run log unavailable, continuing with console logging only: {:#}", e);
    }
    info!(
        "{} run by {} on subscription {}: {} entities from {}",
        kind,
        ctx.operator,
        account.name,
        inventory.total(),
        input.display()
    );

    let config = &ctx.config;
    let mut client = OperationClient::new(
        ctx.backends.api.clone(),
        RetryPolicy::from_config(&config.retry),
        VmCache::new(),
    )
    .with_dry_run(config.batch.dry_run);
    if let Some(naming) = naming {
        client = client.with_naming(naming);
    }
    let client = Arc::new(client);

    // Creates record each snapshot id as soon as it exists
    let snapshot_list =
        (kind == OperationKind::CreateSnapshot).then(|| config.output.snapshot_list_file.clone());
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let progress = spawn_progress_writer(writer.outcomes_path(kind), snapshot_list.clone(), progress_rx);

    let (orchestrator, stop) = BatchOrchestrator::new(client.clone(), config.batch.concurrency);
    let orchestrator = orchestrator.with_sink(progress_tx);
    let interrupted = stop.clone();
    let ctrl_c = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let mut aggregator = ResultAggregator::new(kind, ctx.started_at);
    aggregator.extend(inventory.duplicates.iter().map(|dup| {
        OperationOutcome::skipped(kind, &dup.record, format!("duplicate of line {}", dup.first_line))
    }));
    aggregator.extend(orchestrator.run(kind, inventory.records).await);
    ctrl_c.abort();
    drop(orchestrator);
    if interrupted.is_stopped() {
        warn!("{} run interrupted; undispatched entities are reported as skipped", kind);
    }
    let recorded = match progress.await {
        Ok(result) => result,
        Err(e) => Err(SnapError::output(
            writer.outcomes_path(kind),
            std::io::Error::other(format!("progress writer did not complete: {}", e)),
        )),
    };

    let stats = client.cache().stats().await;
    if stats.entries > 0 {
        info!(
            "VM cache: {} entries, {} hits, {} misses",
            stats.entries, stats.hits, stats.misses
        );
    }

    let report = aggregator.finalize();
    println!("{}", render_summary_table(&report.summary));

    let outcomes_file = writer.write_outcomes(&report).await.inspect_err(|_| log_summary(&report.summary))?;
    let summary_file = writer.write_summary(&report).await.inspect_err(|_| log_summary(&report.summary))?;

    let recorded = recorded.inspect_err(|_| log_summary(&report.summary))?;

    let mut output = RunOutput {
        summary: report.summary.clone(),
        outcomes_file,
        summary_file,
        artifacts: Vec::new(),
    };
    if let Some(list) = snapshot_list.filter(|_| recorded > 0) {
        output.artifacts.push(list);
    }
    Ok((report, writer, output))
}

/// Persist each outcome as it arrives: one JSON line, plus the snapshot id of
/// a successful create. Resolves to the number of ids added to `snapshot_list`
/// once every sender is gone.
fn spawn_progress_writer(
    outcomes_path: PathBuf,
    snapshot_list: Option<PathBuf>,
    mut rx: mpsc::UnboundedReceiver<OperationOutcome>,
) -> JoinHandle<Result<usize, SnapError>> {
    tokio::spawn(async move {
        let mut recorded = 0;
        let mut failure = None;

        while let Some(outcome) = rx.recv().await {
            if failure.is_some() {
                continue;
            }
            let result = async {
                append_outcome(&outcomes_path, &outcome).await?;
                let created = outcome.snapshot.as_ref().filter(|_| outcome.is_succeeded());
                if let (Some(list), Some(snapshot)) = (snapshot_list.as_deref(), created) {
                    append_ids(list, std::slice::from_ref(&snapshot.id)).await?;
                    recorded += 1;
                }
                Ok::<(), SnapError>(())
            }
            .await;
            if let Err(e) = result {
                error!("Cannot record progress: {}", e);
                failure = Some(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(recorded),
        }
    })
}

/// Last resort when results cannot be persisted
fn log_summary(summary: &BatchSummary) {
    error!(
        "Could not persist results of {} run {}: total {}, succeeded {}, failed {}, skipped {}",
        summary.operation, summary.run_id, summary.total, summary.succeeded, summary.failed, summary.skipped
    );
    for id in &summary.failed_ids {
        error!("failed: {}", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::SnapshotDetails;
    use crate::errors::AzureError;
    use crate::inventory::reader::parse_line;
    use crate::inventory::EntityKind;
    use std::time::Duration;
    use tempfile::TempDir;

    const VM: &str = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/web01";
    const SNAP: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/snapshots/RH_CHG1_web01_20240811120000";

    async fn wait_for_lines(path: &Path, count: usize) -> Vec<String> {
        for _ in 0..200 {
            if let Ok(content) = tokio::fs::read_to_string(path).await {
                let lines: Vec<String> = content.lines().map(str::to_string).collect();
                if lines.len() >= count {
                    return lines;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{} never reached {} lines", path.display(), count);
    }

    #[tokio::test]
    async fn test_created_id_is_on_disk_before_batch_ends() {
        let dir = TempDir::new().unwrap();
        let outcomes = dir.path().join("create_snapshot_outcomes.jsonl");
        let list = dir.path().join("snap_rid_list.txt");
        let (tx, rx) = mpsc::unbounded_channel();
        let progress = spawn_progress_writer(outcomes.clone(), Some(list.clone()), rx);

        let vm = parse_line(VM, 1, 0, EntityKind::Vm).unwrap();
        let snapshot = SnapshotDetails {
            id: SNAP.to_string(),
            name: "RH_CHG1_web01_20240811120000".to_string(),
            resource_group: Some("rg".to_string()),
            time_created: None,
            disk_size_gb: None,
            provisioning_state: Some("Succeeded".to_string()),
        };
        tx.send(OperationOutcome::succeeded(
            OperationKind::CreateSnapshot,
            &vm,
            2,
            SNAP,
            Some(snapshot),
        ))
        .unwrap();

        // sender still open
        assert_eq!(wait_for_lines(&list, 1).await, vec![SNAP.to_string()]);
        assert_eq!(wait_for_lines(&outcomes, 1).await.len(), 1);

        tx.send(OperationOutcome::failed(
            OperationKind::CreateSnapshot,
            &vm,
            1,
            &AzureError::permanent("(InvalidParameter) bad disk"),
        ))
        .unwrap();
        drop(tx);

        assert_eq!(progress.await.unwrap().unwrap(), 1);
        assert_eq!(wait_for_lines(&outcomes, 2).await.len(), 2);
        assert_eq!(wait_for_lines(&list, 1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_progress_without_snapshot_list_only_writes_outcomes() {
        let dir = TempDir::new().unwrap();
        let outcomes = dir.path().join("validate_snapshot_outcomes.jsonl");
        let (tx, rx) = mpsc::unbounded_channel();
        let progress = spawn_progress_writer(outcomes.clone(), None, rx);

        let snap = parse_line(SNAP, 1, 0, EntityKind::Snapshot).unwrap();
        tx.send(OperationOutcome::skipped(OperationKind::ValidateSnapshot, &snap, "dry run"))
            .unwrap();
        drop(tx);

        assert_eq!(progress.await.unwrap().unwrap(), 0);
        assert_eq!(wait_for_lines(&outcomes, 1).await.len(), 1);
    }
}
