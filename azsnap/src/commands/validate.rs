// File: azsnap/src/commands/validate.rs
use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use super::{run_batch, CommandContext, RunOutput};
use crate::constants::files;
use crate::outcome::OperationKind;

/// Check every snapshot in `input` and split the ids into valid and invalid files.
///
/// Both files always get written, possibly empty, so the next step can rely on them.
pub async fn validate_snapshots(ctx: &CommandContext, input: &Path) -> Result<RunOutput> {
    let (report, writer, mut output) =
        run_batch(ctx, OperationKind::ValidateSnapshot, input, None).await?;

    let partition = report.partition();
    let valid_file = writer.write_id_list(files::VALID_PREFIX, &partition.valid).await?;
    let invalid_file = writer.write_id_list(files::INVALID_PREFIX, &partition.invalid).await?;

    if partition.invalid.is_empty() {
        info!("All {} snapshots are valid", partition.valid.len());
    } else {
        warn!(
            "{} of {} snapshots are invalid, see {}",
            partition.invalid.len(),
            report.summary.total,
            invalid_file.display()
        );
    }

    output.artifacts.push(valid_file);
    output.artifacts.push(invalid_file);
    Ok(output)
}
