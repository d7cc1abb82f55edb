//! Run-scoped VM lookup cache
//!
//! One cache is created per run and handed to the operation client, so the
//! same VM is resolved at most once per run in the common case. Nothing is
//! persisted between runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::azure::VmDetails;
use crate::inventory::normalize_id;

#[derive(Debug, Clone, Default)]
pub struct VmCache {
    entries: Arc<RwLock<HashMap<String, VmDetails>>>, // normalized vm id -> details
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl VmCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, vm_id: &str) -> Option<VmDetails> {
        let entries = self.entries.read().await;
        match entries.get(&normalize_id(vm_id)) {
            Some(details) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("VM cache hit for {}", vm_id);
                Some(details.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn insert(&self, vm_id: &str, details: VmDetails) {
        let mut entries = self.entries.write().await;
        entries.insert(normalize_id(vm_id), details);
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
