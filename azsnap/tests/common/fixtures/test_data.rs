//! Common test data: resource ids, inventory files and contexts

use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use azsnap::commands::{Backends, CommandContext};
use azsnap::{Config, RetryPolicy, RunLog};

use super::FakeAzure;

pub const SUBSCRIPTION: &str = "1111-2222-3333";
pub const RESOURCE_GROUP: &str = "rg-app";
pub const CHG: &str = "CHG0042";

pub fn vm_id(name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}",
        SUBSCRIPTION, RESOURCE_GROUP, name
    )
}

pub fn snapshot_id(name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/snapshots/{}",
        SUBSCRIPTION, RESOURCE_GROUP, name
    )
}

/// Write `lines` to `<dir>/<file_name>`
pub fn write_inventory(dir: &Path, file_name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, format!("{}\n", lines.join("\n"))).unwrap();
    path
}

/// Inventory of `count` VMs named web01, web02, ...
pub fn vm_inventory(dir: &Path, count: usize) -> PathBuf {
    let lines: Vec<String> = (1..=count)
        .map(|i| format!("{} web{:02}", vm_id(&format!("web{:02}", i)), i))
        .collect();
    write_inventory(dir, "vms.txt", &lines)
}

/// Retries without meaningful sleeps
pub fn fast_retry_config() -> Config {
    let mut config = Config::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter = false;
    config
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::from_config(&fast_retry_config().retry)
}

/// Workspace with separate input and output directories
pub struct TestWorkspace {
    pub root: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        let dir = self.root.path().join("input");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.path().join("logs")
    }

    pub fn snapshot_list(&self) -> PathBuf {
        self.root.path().join("snap_rid_list.txt")
    }

    pub fn config(&self, concurrency: usize) -> Config {
        let mut config = fast_retry_config();
        config.batch.concurrency = concurrency;
        config.output.dir = self.output_dir();
        config.output.snapshot_list_file = self.snapshot_list();
        config
    }

    pub fn context(&self, azure: Arc<FakeAzure>, config: Config) -> CommandContext {
        let backends = Backends {
            session: azure.clone(),
            api: azure,
        };
        let mut ctx = CommandContext::new(Arc::new(config), backends, RunLog::disabled());
        ctx.operator = "tester".to_string();
        ctx.started_at = Utc.with_ymd_and_hms(2024, 8, 11, 12, 0, 0).unwrap();
        ctx.interactive = Some(false);
        ctx
    }

    /// File names currently in the output directory, sorted
    pub fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.output_dir()) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

pub const SHORT_DELAY: Duration = Duration::from_millis(20);
