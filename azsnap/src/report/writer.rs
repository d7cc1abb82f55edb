// File: azsnap/src/report/writer.rs
//
// Every file a run produces goes through ReportWriter so names share one
// timestamp and one operator tag.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::aggregator::BatchReport;
use super::render_summary_table;
use crate::constants::files;
use crate::errors::SnapError;
use crate::inventory::normalize_id;
use crate::outcome::{OperationKind, OperationOutcome};

pub struct ReportWriter {
    dir: PathBuf,
    operator: String,
    timestamp: String,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, operator: &str, run_started: DateTime<Utc>) -> Self {
        Self {
            dir: dir.into(),
            operator: file_safe(operator),
            timestamp: run_started.format(files::TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub async fn ensure_dir(&self) -> Result<(), SnapError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SnapError::output(&self.dir, e))
    }

    pub fn log_path(&self, operation: OperationKind) -> PathBuf {
        self.dir.join(format!(
            "azsnap_{}_{}_{}.log",
            operation, self.operator, self.timestamp
        ))
    }

    pub fn outcomes_path(&self, operation: OperationKind) -> PathBuf {
        self.dir.join(format!(
            "{}_outcomes_{}_{}.jsonl",
            operation, self.operator, self.timestamp
        ))
    }

    pub fn summary_path(&self, operation: OperationKind) -> PathBuf {
        self.dir.join(format!(
            "{}_summary_{}_{}.txt",
            operation, self.operator, self.timestamp
        ))
    }

    /// `<dir>/<prefix>_<timestamp>.txt`
    pub fn list_path(&self, prefix: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.txt", prefix, self.timestamp))
    }

    /// One JSON line per outcome, input order
    pub async fn write_outcomes(&self, report: &BatchReport) -> Result<PathBuf, SnapError> {
        let path = self.outcomes_path(report.summary.operation);
        let mut content = String::new();
        for outcome in &report.outcomes {
            let line = serde_json::to_string(outcome).map_err(|e| {
                SnapError::output(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            content.push_str(&line);
            content.push('\n');
        }
        write_file(&path, &content).await?;
        debug!("Wrote {} outcomes to {}", report.outcomes.len(), path.display());
        Ok(path)
    }

    pub async fn write_summary(&self, report: &BatchReport) -> Result<PathBuf, SnapError> {
        let path = self.summary_path(report.summary.operation);
        let summary = &report.summary;

        let mut content = render_summary_table(summary);
        content.push_str(&format!(
            "\nRun id:   {}\nStarted:  {}\nFinished: {}\n",
            summary.run_id,
            summary.started_at.to_rfc3339(),
            summary.finished_at.to_rfc3339()
        ));

        let failed: Vec<_> = report.failed().collect();
        if !failed.is_empty() {
            content.push_str(&format!("\nFailed ({}):\n", failed.len()));
            for outcome in failed {
                content.push_str(&format!(
                    "- {} ({}): {}\n",
                    outcome.entity_name,
                    outcome.entity_id,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }

        write_file(&path, &content).await?;
        Ok(path)
    }

    /// New file holding `ids`, one per line
    pub async fn write_id_list(&self, prefix: &str, ids: &[String]) -> Result<PathBuf, SnapError> {
        let path = self.list_path(prefix);
        write_file(&path, &join_lines(ids)).await?;
        info!("Wrote {} ids to {}", ids.len(), path.display());
        Ok(path)
    }
}

/// Append `ids` to `path`, creating it if needed
pub async fn append_ids(path: &Path, ids: &[String]) -> Result<(), SnapError> {
    if ids.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SnapError::output(parent, e))?;
    }

    // Start on a fresh line if the file does not end with one
    let needs_newline = match fs::read(path).await {
        Ok(bytes) => bytes.last().is_some_and(|b| *b != b'\n'),
        Err(_) => false,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| SnapError::output(path, e))?;

    let mut content = String::new();
    if needs_newline {
        content.push('\n');
    }
    content.push_str(&join_lines(ids));

    file.write_all(content.as_bytes())
        .await
        .map_err(|e| SnapError::output(path, e))?;
    file.flush().await.map_err(|e| SnapError::output(path, e))?;

    debug!("Appended {} ids to {}", ids.len(), path.display());
    Ok(())
}

/// Append one outcome as a JSON line, creating the file if needed
pub async fn append_outcome(path: &Path, outcome: &OperationOutcome) -> Result<(), SnapError> {
    let mut line = serde_json::to_string(outcome)
        .map_err(|e| SnapError::output(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| SnapError::output(path, e))?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|e| SnapError::output(path, e))?;
    file.flush().await.map_err(|e| SnapError::output(path, e))
}

/// Rewrite `path` without the lines whose id is in `ids`; returns how many lines were removed.
///
/// Comments, blank lines and unrelated records are kept as they are.
pub async fn remove_ids(path: &Path, ids: &[String]) -> Result<usize, SnapError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| SnapError::output(path, e))?;

    let targets: HashSet<String> = ids.iter().map(|id| normalize_id(id)).collect();
    let mut kept = String::with_capacity(content.len());
    let mut removed = 0;

    for line in content.lines() {
        match line_id(line) {
            Some(id) if targets.contains(&normalize_id(id)) => removed += 1,
            _ => {
                kept.push_str(line);
                kept.push('\n');
            }
        }
    }

    let tmp = path.with_extension("tmp");
    write_file(&tmp, &kept).await?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| SnapError::output(path, e))?;

    if removed < targets.len() {
        warn!(
            "{} of {} ids were not present in {}",
            targets.len() - removed,
            targets.len(),
            path.display()
        );
    }
    Ok(removed)
}

/// Newest `invalid_snap_rid_<ts>.txt` in `dir`
pub fn latest_invalid_file(dir: &Path) -> Option<PathBuf> {
    let pattern = dir.join(format!("{}_*.txt", files::INVALID_PREFIX));
    let pattern = pattern.to_str()?;

    glob::glob(pattern)
        .ok()?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .max_by(|a, b| a.file_name().cmp(&b.file_name()))
}

/// Login name of whoever runs the batch, safe for file names
pub fn current_user() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    file_safe(&user)
}

fn file_safe(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Resource id of an inventory line, if it has one
fn line_id(line: &str) -> Option<&str> {
    let trimmed = line.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()
        .filter(|id| !id.is_empty())
}

fn join_lines(ids: &[String]) -> String {
    let mut content = ids.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    content
}

async fn write_file(path: &Path, content: &str) -> Result<(), SnapError> {
    fs::write(path, content)
        .await
        .map_err(|e| SnapError::output(path, e))
}
