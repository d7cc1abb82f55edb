//! Central repository for defaults, file names and Azure endpoints
//!
//! Organized by category so every tunable has a single source of truth.
//! Most of these can be overridden from the TOML config or the command line.

use std::time::Duration;

/// Retry/backoff defaults applied around every Azure call
pub mod retry {
    /// Maximum attempts per call, including the first one
    pub const MAX_ATTEMPTS: u32 = 5;

    /// Delay before the first retry
    pub const BASE_DELAY_MS: u64 = 500;

    /// Growth factor between consecutive delays
    pub const MULTIPLIER: f64 = 2.0;

    /// Upper bound for a single backoff delay
    pub const MAX_DELAY_MS: u64 = 30_000;

    /// Hard ceiling accepted from configuration
    pub const MAX_ATTEMPTS_LIMIT: u32 = 10;
}

/// Batch execution defaults
pub mod batch {
    /// Operations allowed in flight at the same time
    pub const DEFAULT_CONCURRENCY: usize = 10;

    /// Largest concurrency accepted from configuration
    pub const MAX_CONCURRENCY: usize = 256;
}

/// Snapshot naming and tagging
pub mod snapshot {
    /// Prefix of every snapshot name: `{prefix}_{chg}_{vm}_{timestamp}`
    pub const NAME_PREFIX: &str = "RH";

    /// Days until the `ExpireOn` tag date
    pub const EXPIRE_DAYS: u32 = 3;

    /// Azure rejects snapshot names longer than this
    pub const MAX_NAME_LEN: usize = 80;

    /// Provisioning state reported for a usable snapshot
    pub const STATE_SUCCEEDED: &str = "Succeeded";

    pub const TAG_CHANGE: &str = "ChangeNumber";
    pub const TAG_CREATED_BY: &str = "CreatedBy";
    pub const TAG_EXPIRE_ON: &str = "ExpireOn";
}

/// Input/output file naming
pub mod files {
    /// Config file looked up when `--config` is not given
    pub const DEFAULT_CONFIG_PATH: &str = "config/azsnap.toml";

    /// Directory for logs, summaries and partition files
    pub const OUTPUT_DIR: &str = "logs";

    /// Snapshot ids created by `create`, consumed by `validate`
    pub const SNAP_RID_LIST: &str = "snap_rid_list.txt";

    pub const VALID_PREFIX: &str = "valid_snap_rid";
    pub const INVALID_PREFIX: &str = "invalid_snap_rid";
    pub const MOVED_PREFIX: &str = "moved_invalid_snap_rid";

    /// Timestamp format used in every generated file name
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
}

/// Azure Resource Manager access
pub mod azure {
    use super::Duration;

    /// Azure CLI executable
    pub const AZ_BINARY: &str = "az";

    /// Public-cloud ARM endpoint
    pub const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

    /// Token audience for ARM
    pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

    pub const SNAPSHOT_API_VERSION: &str = "2023-04-02";
    pub const VM_API_VERSION: &str = "2024-07-01";

    /// Environment variable holding a pre-acquired bearer token
    pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

    /// Per-request timeout for REST calls
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Interval between provisioning-state polls after a create
    pub const PROVISION_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Polls before a still-provisioning snapshot is reported as transient
    pub const MAX_PROVISION_POLLS: u32 = 120;
}
