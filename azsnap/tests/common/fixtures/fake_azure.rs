//! Scripted Azure backend
//!
//! Behaves like a tiny subscription: VMs always resolve (unless marked
//! missing), created snapshots become visible to `show_snapshot`, and
//! failures can be queued per operation and target.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use azsnap::azure::{AccountInfo, AccountUser, AzureApi, SessionProvider, SnapshotDetails, SnapshotRequest, VmDetails};
use azsnap::inventory::{normalize_id, EntityRecord, ResourceId};
use azsnap::AzureError;

pub mod ops {
    pub const SHOW_VM: &str = "show_vm";
    pub const CREATE: &str = "create_snapshot";
    pub const SHOW_SNAPSHOT: &str = "show_snapshot";
}

#[derive(Default)]
pub struct FakeAzure {
    snapshots: Mutex<HashMap<String, SnapshotDetails>>,
    missing_vms: Mutex<HashSet<String>>,
    scripted: Mutex<Vec<(String, String, AzureError)>>, // (op, target needle, error)
    panic_on: Mutex<Vec<(String, String)>>,
    calls: Mutex<Vec<(String, String)>>, // (op, target)
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    logged_out: Mutex<bool>,
    login_succeeds: Mutex<bool>,
    probe_calls: AtomicUsize,
    login_calls: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeAzure {
    pub fn new() -> Self {
        Self {
            login_succeeds: Mutex::new(true),
            ..Default::default()
        }
    }

    /// Every call sleeps this long, so concurrency becomes observable
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn logged_out(self) -> Self {
        *self.logged_out.lock().unwrap() = true;
        self
    }

    pub fn login_fails(self) -> Self {
        *self.login_succeeds.lock().unwrap() = false;
        self
    }

    pub fn add_snapshot(&self, id: &str, state: &str) {
        let resource = ResourceId::parse(id).unwrap();
        self.snapshots.lock().unwrap().insert(
            normalize_id(id),
            SnapshotDetails {
                id: id.to_string(),
                name: resource.name,
                resource_group: Some(resource.resource_group),
                time_created: Some("2024-08-11T12:00:00+00:00".to_string()),
                disk_size_gb: Some(64),
                provisioning_state: Some(state.to_string()),
            },
        );
    }

    pub fn remove_vm(&self, vm_id: &str) {
        self.missing_vms.lock().unwrap().insert(normalize_id(vm_id));
    }

    /// Next call of `op` whose target contains `needle` fails with `error`
    pub fn fail_next(&self, op: &str, needle: &str, error: AzureError) {
        self.scripted
            .lock()
            .unwrap()
            .push((op.to_string(), needle.to_ascii_lowercase(), error));
    }

    pub fn panic_on(&self, op: &str, needle: &str) {
        self.panic_on
            .lock()
            .unwrap()
            .push((op.to_string(), needle.to_ascii_lowercase()));
    }

    pub fn calls(&self, op: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| o == op)
            .map(|(_, target)| target.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, op: &str, target: &str) -> Result<InFlight<'_>, AzureError> {
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), target.to_string()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let lowered = target.to_ascii_lowercase();
        let should_panic = self
            .panic_on
            .lock()
            .unwrap()
            .iter()
            .any(|(o, needle)| o == op && lowered.contains(needle.as_str()));
        if should_panic {
            panic!("scripted panic in {} for {}", op, target);
        }

        let scripted = {
            let mut scripted = self.scripted.lock().unwrap();
            scripted
                .iter()
                .position(|(o, needle, _)| o == op && lowered.contains(needle.as_str()))
                .map(|pos| scripted.remove(pos).2)
        };
        match scripted {
            Some(error) => Err(error),
            None => Ok(guard),
        }
    }
}

#[async_trait]
impl AzureApi for FakeAzure {
    async fn show_vm(&self, vm: &EntityRecord) -> Result<VmDetails, AzureError> {
        let _guard = self.enter(ops::SHOW_VM, &vm.id).await?;

        if self.missing_vms.lock().unwrap().contains(&vm.key()) {
            return Err(AzureError::not_found(format!("VM {} not found", vm.name)));
        }
        let resource = ResourceId::parse(&vm.id).map_err(AzureError::permanent)?;
        Ok(VmDetails {
            os_disk_id: format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/disks/{}_OsDisk",
                resource.subscription, resource.resource_group, resource.name
            ),
            resource_group: resource.resource_group,
            location: Some("westeurope".to_string()),
        })
    }

    async fn create_snapshot(&self, request: &SnapshotRequest) -> Result<SnapshotDetails, AzureError> {
        let _guard = self.enter(ops::CREATE, &request.name).await?;

        let id = request.resource_id();
        self.add_snapshot(&id, "Succeeded");
        Ok(self.snapshots.lock().unwrap()[&normalize_id(&id)].clone())
    }

    async fn show_snapshot(&self, snapshot_id: &str) -> Result<SnapshotDetails, AzureError> {
        let _guard = self.enter(ops::SHOW_SNAPSHOT, snapshot_id).await?;

        self.snapshots
            .lock()
            .unwrap()
            .get(&normalize_id(snapshot_id))
            .cloned()
            .ok_or_else(|| AzureError::not_found(format!("Snapshot {} not found", snapshot_id)))
    }
}

#[async_trait]
impl SessionProvider for FakeAzure {
    async fn probe(&self) -> Result<AccountInfo, AzureError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if *self.logged_out.lock().unwrap() {
            return Err(AzureError::unauthorized("ERROR: Please run 'az login' to setup account."));
        }
        Ok(AccountInfo {
            id: "00000000-0000-0000-0000-000000000001".to_string(),
            name: "test-subscription".to_string(),
            user: Some(AccountUser {
                name: "tester@example.com".to_string(),
            }),
        })
    }

    async fn login(&self) -> Result<(), AzureError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if *self.login_succeeds.lock().unwrap() {
            *self.logged_out.lock().unwrap() = false;
            Ok(())
        } else {
            Err(AzureError::unauthorized("az login exited with code 1"))
        }
    }
}
