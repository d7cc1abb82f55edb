//! Per-entity operation results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::azure::SnapshotDetails;
use crate::errors::{AzureError, ErrorKind};
use crate::inventory::{EntityKind, EntityRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Succeeded => write!(f, "succeeded"),
            OperationStatus::Failed => write!(f, "failed"),
            OperationStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Operation the client performs for one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateSnapshot,
    ValidateSnapshot,
    MoveInvalid,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::CreateSnapshot => "create_snapshot",
            OperationKind::ValidateSnapshot => "validate_snapshot",
            OperationKind::MoveInvalid => "move_invalid",
        }
    }

    /// Kind of entity listed in the inventory for this operation
    pub fn entity_kind(self) -> EntityKind {
        match self {
            OperationKind::CreateSnapshot => EntityKind::Vm,
            OperationKind::ValidateSnapshot | OperationKind::MoveInvalid => EntityKind::Snapshot,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result for one entity; written as one JSON line per entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub operation: OperationKind,
    pub entity_id: String,
    pub entity_name: String,
    pub index: usize,
    pub line: usize,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotDetails>,
    pub timestamp: DateTime<Utc>,
}

impl OperationOutcome {
    fn base(operation: OperationKind, record: &EntityRecord, status: OperationStatus, attempts: u32) -> Self {
        Self {
            operation,
            entity_id: record.id.clone(),
            entity_name: record.name.clone(),
            index: record.index,
            line: record.line,
            status,
            error: None,
            error_kind: None,
            detail: None,
            attempts,
            snapshot: None,
            timestamp: Utc::now(),
        }
    }

    pub fn succeeded(
        operation: OperationKind,
        record: &EntityRecord,
        attempts: u32,
        detail: impl Into<String>,
        snapshot: Option<SnapshotDetails>,
    ) -> Self {
        Self {
            detail: Some(detail.into()),
            snapshot,
            ..Self::base(operation, record, OperationStatus::Succeeded, attempts)
        }
    }

    pub fn failed(operation: OperationKind, record: &EntityRecord, attempts: u32, error: &AzureError) -> Self {
        Self {
            error: Some(error.message.clone()),
            error_kind: Some(error.kind),
            ..Self::base(operation, record, OperationStatus::Failed, attempts)
        }
    }

    /// Failure that is a verdict rather than an Azure error (snapshot unusable, still present)
    pub fn rejected(
        operation: OperationKind,
        record: &EntityRecord,
        attempts: u32,
        reason: impl Into<String>,
        snapshot: Option<SnapshotDetails>,
    ) -> Self {
        Self {
            error: Some(reason.into()),
            snapshot,
            ..Self::base(operation, record, OperationStatus::Failed, attempts)
        }
    }

    pub fn skipped(operation: OperationKind, record: &EntityRecord, reason: impl Into<String>) -> Self {
        Self {
            detail: Some(reason.into()),
            ..Self::base(operation, record, OperationStatus::Skipped, 0)
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == OperationStatus::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        self.status == OperationStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status == OperationStatus::Skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EntityRecord {
        EntityRecord {
            id: "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/snapshots/snap1".to_string(),
            name: "snap1".to_string(),
            kind: EntityKind::Snapshot,
            resource_group: Some("rg".to_string()),
            subscription: Some("s".to_string()),
            line: 3,
            index: 2,
        }
    }

    #[test]
    fn test_failed_outcome_carries_error_kind() {
        let err = AzureError::not_found("Snapshot snap1 not found");
        let outcome = OperationOutcome::failed(OperationKind::ValidateSnapshot, &record(), 1, &err);

        assert!(outcome.is_failed());
        assert_eq!(outcome.error_kind, Some(ErrorKind::NotFound));
        assert_eq!(outcome.line, 3);
        assert_eq!(outcome.index, 2);
    }

    #[test]
    fn test_json_line_shape() {
        let outcome = OperationOutcome::skipped(OperationKind::CreateSnapshot, &record(), "duplicate of line 1");
        let json: serde_json::Value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "skipped");
        assert_eq!(json["operation"], "create_snapshot");
        assert_eq!(json["detail"], "duplicate of line 1");
        assert_eq!(json["attempts"], 0);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_operation_entity_kinds() {
        assert_eq!(OperationKind::CreateSnapshot.entity_kind(), EntityKind::Vm);
        assert_eq!(OperationKind::MoveInvalid.entity_kind(), EntityKind::Snapshot);
        assert_eq!(OperationKind::ValidateSnapshot.as_str(), "validate_snapshot");
    }
}
