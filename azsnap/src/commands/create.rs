// File: azsnap/src/commands/create.rs
use anyhow::{ensure, Result};
use std::path::Path;
use tracing::info;

use super::{run_batch, CommandContext, RunOutput};
use crate::client::SnapshotNaming;
use crate::outcome::OperationKind;

/// Snapshot the OS disk of every VM in `input` under change ticket `chg`.
///
/// Each created snapshot id is appended to the configured snapshot list as
/// soon as the snapshot exists.
pub async fn create_snapshots(ctx: &CommandContext, input: &Path, chg: &str) -> Result<RunOutput> {
    let chg = chg.trim();
    ensure!(!chg.is_empty(), "A change number (--chg) is required");
    ensure!(
        !chg.chars().any(char::is_whitespace),
        "Change number '{}' must not contain whitespace",
        chg
    );

    let naming = SnapshotNaming::new(&ctx.config.snapshot, chg, ctx.started_at, &ctx.operator);
    let (report, _writer, output) =
        run_batch(ctx, OperationKind::CreateSnapshot, input, Some(naming)).await?;

    let created = report
        .outcomes
        .iter()
        .filter(|o| o.is_succeeded() && o.snapshot.is_some())
        .count();
    if created > 0 {
        info!(
            "{} snapshots created for {}; ids added to {}",
            created,
            chg,
            ctx.config.output.snapshot_list_file.display()
        );
    } else {
        info!("No snapshots created for {}", chg);
    }

    Ok(output)
}
