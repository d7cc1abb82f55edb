//! Azure control-plane access
//!
//! Two transports implement the same [`AzureApi`] seam:
//!
//! ```text
//! OperationClient ──► AzureApi ──┬─► AzCli      (`az` subprocess per call)
//!                                └─► RestClient (HTTPS to Resource Manager)
//! ```
//!
//! Both classify every failure into an [`ErrorKind`](crate::errors::ErrorKind)
//! so the retry policy can tell throttling apart from a missing snapshot.
//! Session probing and interactive login only exist on the CLI side and are
//! exposed through [`SessionProvider`].

pub mod cli;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::AzureError;
use crate::inventory::EntityRecord;

pub use cli::AzCli;
pub use rest::{RestClient, RestSettings, TokenSource};

/// Calls the batch commands need from Azure
#[async_trait]
pub trait AzureApi: Send + Sync {
    /// Resource group, OS disk and location of a VM
    async fn show_vm(&self, vm: &EntityRecord) -> Result<VmDetails, AzureError>;

    /// Create (or update in place) a snapshot and wait until it is provisioned
    async fn create_snapshot(&self, request: &SnapshotRequest) -> Result<SnapshotDetails, AzureError>;

    /// Look up a snapshot by its full resource id
    async fn show_snapshot(&self, snapshot_id: &str) -> Result<SnapshotDetails, AzureError>;
}

/// Authenticated-session checks, used once per run before any entity is touched
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current account, or an error when no usable session exists
    async fn probe(&self) -> Result<AccountInfo, AzureError>;

    /// Interactive login; blocks until the operator completes or abandons it
    async fn login(&self) -> Result<(), AzureError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDetails {
    pub resource_group: String,
    pub os_disk_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRequest {
    pub name: String,
    pub subscription: String,
    pub resource_group: String,
    pub source_disk_id: String,
    pub location: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub incremental: bool,
}

impl SnapshotRequest {
    /// ARM id the snapshot will have once created
    pub fn resource_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/snapshots/{}",
            self.subscription, self.resource_group, self.name
        )
    }
}

/// Snapshot facts as reported by `az snapshot show` (flattened camelCase)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDetails {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub time_created: Option<String>,
    #[serde(default, alias = "diskSizeGB")]
    pub disk_size_gb: Option<u64>,
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

impl SnapshotDetails {
    pub fn is_provisioned(&self) -> bool {
        self.provisioning_state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(crate::constants::snapshot::STATE_SUCCEEDED))
    }

    pub fn is_failed(&self) -> bool {
        self.provisioning_state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("Failed"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub user: Option<AccountUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUser {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_details_from_cli_json() {
        let json = r#"{
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/snapshots/snap1",
            "name": "snap1",
            "resourceGroup": "rg",
            "timeCreated": "2024-08-11T12:00:00+00:00",
            "diskSizeGb": 64,
            "provisioningState": "Succeeded",
            "sku": {"name": "Standard_LRS"}
        }"#;
        let details: SnapshotDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.disk_size_gb, Some(64));
        assert!(details.is_provisioned());
        assert!(!details.is_failed());
    }

    #[test]
    fn test_creating_snapshot_is_not_provisioned() {
        let details = SnapshotDetails {
            id: "/subscriptions/s/resourceGroups/rg-x/providers/Microsoft.Compute/snapshots/snap1".to_string(),
            name: "snap1".to_string(),
            resource_group: None,
            time_created: None,
            disk_size_gb: None,
            provisioning_state: Some("Creating".to_string()),
        };
        assert!(!details.is_provisioned());
        assert!(!details.is_failed());
    }
}
