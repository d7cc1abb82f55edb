//! Inventory of entities a batch operates on
//!
//! An inventory is a plain-text list of Azure resource ids, one per line,
//! optionally followed by a display name and resource-group/subscription
//! metadata. See [`reader`] for the accepted shapes.

pub mod reader;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use reader::{parse_inventory, read_inventory, Duplicate, Inventory};

/// What an inventory line points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Vm,
    Snapshot,
}

impl EntityKind {
    /// ARM resource type under `Microsoft.Compute`
    pub fn resource_type(self) -> &'static str {
        match self {
            EntityKind::Vm => "virtualMachines",
            EntityKind::Snapshot => "snapshots",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Vm => write!(f, "VM"),
            EntityKind::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Parsed `Microsoft.Compute` resource id
///
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Compute/{type}/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription: String,
    pub resource_group: String,
    pub resource_type: String,
    pub name: String,
}

impl ResourceId {
    pub fn parse(id: &str) -> Result<Self, String> {
        let parts: Vec<&str> = id.split('/').collect();
        if parts.len() != 9 || !parts[0].is_empty() {
            return Err(format!(
                "'{}' is not a resource id of the form /subscriptions/<sub>/resourceGroups/<rg>/providers/Microsoft.Compute/<type>/<name>",
                id
            ));
        }

        let fixed = [
            (1, "subscriptions"),
            (3, "resourceGroups"),
            (5, "providers"),
            (6, "Microsoft.Compute"),
        ];
        for (position, expected) in fixed {
            if !parts[position].eq_ignore_ascii_case(expected) {
                return Err(format!(
                    "'{}': expected segment '{}' but found '{}'",
                    id, expected, parts[position]
                ));
            }
        }

        for (position, label) in [(2, "subscription"), (4, "resource group"), (7, "type"), (8, "name")] {
            if parts[position].trim().is_empty() {
                return Err(format!("'{}': empty {}", id, label));
            }
        }

        Ok(Self {
            subscription: parts[2].to_string(),
            resource_group: parts[4].to_string(),
            resource_type: parts[7].to_string(),
            name: parts[8].to_string(),
        })
    }

    pub fn is_kind(&self, kind: EntityKind) -> bool {
        self.resource_type.eq_ignore_ascii_case(kind.resource_type())
    }
}

/// One VM or snapshot subject to an operation
///
/// `id` is always the full resource id exactly as written in the input; the
/// output files are built from it so they can be fed back in as input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub resource_group: Option<String>,
    pub subscription: Option<String>,
    /// 1-based line in the source file
    pub line: usize,
    /// Position among the records of the source file
    pub index: usize,
}

impl EntityRecord {
    /// Lowercased id used for duplicate detection and lookups
    pub fn key(&self) -> String {
        normalize_id(&self.id)
    }
}

/// ARM ids are case-insensitive
pub fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}
