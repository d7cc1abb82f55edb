// File: azsnap/src/inventory/reader.rs
//
// Accepted record shapes, one per line:
//
//   <resource-id>
//   <resource-id> <name>
//   <resource-id>,<name>[,<resource-group>[,<subscription>]]
//
// Blank lines and `#` comments are skipped.

use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use super::{EntityKind, EntityRecord, ResourceId};
use crate::errors::SnapError;

/// A later line repeating an id already seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub record: EntityRecord,
    pub first_line: usize,
}

/// Records ready for dispatch plus the duplicates dropped from them
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub records: Vec<EntityRecord>,
    pub duplicates: Vec<Duplicate>,
}

impl Inventory {
    /// Number of records in the file, duplicates included
    pub fn total(&self) -> usize {
        self.records.len() + self.duplicates.len()
    }
}

pub async fn read_inventory(path: &Path, kind: EntityKind) -> Result<Inventory, SnapError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| SnapError::InputFormat {
            path: path.to_path_buf(),
            line: None,
            reason: format!("cannot read file: {}", e),
        })?;

    let inventory = parse_inventory(&content, path, kind)?;
    info!(
        "Read {} {} records from {} ({} duplicates dropped)",
        inventory.records.len(),
        kind,
        path.display(),
        inventory.duplicates.len()
    );
    Ok(inventory)
}

pub fn parse_inventory(content: &str, path: &Path, kind: EntityKind) -> Result<Inventory, SnapError> {
    let mut inventory = Inventory::default();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut index = 0;
    // Editors on Windows prepend a byte order mark
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    for (offset, raw) in content.lines().enumerate() {
        let line_no = offset + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record = parse_line(line, line_no, index, kind)
            .map_err(|reason| SnapError::input(path, line_no, reason))?;
        index += 1;

        match seen.get(&record.key()) {
            Some(&first_line) => {
                warn!(
                    "Duplicate {} {} on line {} (first seen on line {}), skipping",
                    kind, record.id, line_no, first_line
                );
                inventory.duplicates.push(Duplicate { record, first_line });
            }
            None => {
                seen.insert(record.key(), line_no);
                inventory.records.push(record);
            }
        }
    }

    if inventory.records.is_empty() {
        return Err(SnapError::InputFormat {
            path: path.to_path_buf(),
            line: None,
            reason: format!("no {} records found", kind),
        });
    }

    Ok(inventory)
}

/// Parse a single non-empty, non-comment line
pub fn parse_line(line: &str, line_no: usize, index: usize, kind: EntityKind) -> Result<EntityRecord, String> {
    let fields: Vec<&str> = if line.contains(',') {
        line.split(',').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    };

    let max_fields = if line.contains(',') { 4 } else { 2 };
    if fields.len() > max_fields {
        return Err(format!(
            "expected at most {} fields but found {}",
            max_fields,
            fields.len()
        ));
    }

    let raw_id = fields[0];
    if raw_id.is_empty() {
        return Err("missing resource id".to_string());
    }
    let resource_id = ResourceId::parse(raw_id)?;
    if !resource_id.is_kind(kind) {
        return Err(format!(
            "expected a {} id (Microsoft.Compute/{}) but found type '{}'",
            kind,
            kind.resource_type(),
            resource_id.resource_type
        ));
    }

    let name = match fields.get(1).copied().filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => resource_id.name.clone(),
    };

    let resource_group = optional_field(&fields, 2);
    if let Some(rg) = &resource_group {
        if !rg.eq_ignore_ascii_case(&resource_id.resource_group) {
            return Err(format!(
                "resource group '{}' does not match '{}' in the resource id",
                rg, resource_id.resource_group
            ));
        }
    }

    let subscription = optional_field(&fields, 3);
    if let Some(sub) = &subscription {
        if !sub.eq_ignore_ascii_case(&resource_id.subscription) {
            return Err(format!(
                "subscription '{}' does not match '{}' in the resource id",
                sub, resource_id.subscription
            ));
        }
    }

    Ok(EntityRecord {
        id: raw_id.to_string(),
        name,
        kind,
        resource_group: resource_group.or(Some(resource_id.resource_group)),
        subscription: subscription.or(Some(resource_id.subscription)),
        line: line_no,
        index,
    })
}

fn optional_field(fields: &[&str], position: usize) -> Option<String> {
    fields
        .get(position)
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}
