// File: azsnap/src/commands/move_invalid.rs
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{run_batch_in_session, CommandContext, RunOutput};
use crate::constants::files;
use crate::errors::SnapError;
use crate::outcome::OperationKind;
use crate::report::{latest_invalid_file, remove_ids};

/// Re-check each invalid candidate and move the confirmed ones out of `snapshot_list`.
///
/// Candidates come from `invalid`, or from the newest invalid file in the
/// output directory. A candidate that turns out to be usable stays in the list.
pub async fn move_invalid_snapshots(
    ctx: &CommandContext,
    snapshot_list: &Path,
    invalid: Option<&Path>,
) -> Result<RunOutput> {
    let account = ctx.session_guard().ensure_session().await?;

    let candidates = resolve_candidates(ctx, invalid)?;
    if !snapshot_list.is_file() {
        return Err(SnapError::InputFormat {
            path: snapshot_list.to_path_buf(),
            line: None,
            reason: "snapshot list not found".to_string(),
        }
        .into());
    }
    info!("Invalid candidates from {}", candidates.display());

    let (report, writer, mut output) =
        run_batch_in_session(ctx, &account, OperationKind::MoveInvalid, &candidates, None).await?;

    let confirmed = report.partition().valid;
    let moved_file = writer.write_id_list(files::MOVED_PREFIX, &confirmed).await?;
    output.artifacts.push(moved_file.clone());

    if ctx.config.batch.dry_run {
        info!(
            "[dry run] would remove {} snapshots from {}",
            confirmed.len(),
            snapshot_list.display()
        );
    } else if !confirmed.is_empty() {
        let removed = remove_ids(snapshot_list, &confirmed).await?;
        output.artifacts.push(snapshot_list.to_path_buf());
        info!(
            "Moved {} invalid snapshots from {} to {}",
            removed,
            snapshot_list.display(),
            moved_file.display()
        );
    }

    Ok(output)
}

fn resolve_candidates(ctx: &CommandContext, invalid: Option<&Path>) -> Result<PathBuf, SnapError> {
    match invalid {
        Some(path) => Ok(path.to_path_buf()),
        None => latest_invalid_file(&ctx.config.output.dir).ok_or_else(|| SnapError::InputFormat {
            path: ctx.config.output.dir.join(format!("{}_*.txt", files::INVALID_PREFIX)),
            line: None,
            reason: "no invalid snapshot file found; run validate first or pass --invalid".to_string(),
        }),
    }
}
