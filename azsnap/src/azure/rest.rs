// File: azsnap/src/azure/rest.rs
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::{AzCli, AzureApi, SnapshotDetails, SnapshotRequest, VmDetails};
use crate::config::Config;
use crate::constants::azure;
use crate::errors::{AzureError, ErrorKind};
use crate::inventory::{EntityRecord, ResourceId};

/// Where the bearer token comes from
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Pre-acquired token (e.g. `AZURE_ACCESS_TOKEN`)
    Static(String),
    /// `az account get-access-token` on first use
    AzCli(AzCli),
}

#[derive(Debug, Clone)]
pub struct RestSettings {
    pub endpoint: String,
    pub snapshot_api_version: String,
    pub vm_api_version: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl RestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.azure.management_endpoint.clone(),
            snapshot_api_version: config.azure.snapshot_api_version.clone(),
            vm_api_version: config.azure.vm_api_version.clone(),
            request_timeout: config.request_timeout(),
            poll_interval: config.provision_poll_interval(),
            max_polls: config.azure.max_provision_polls,
        }
    }
}

/// Azure Resource Manager over HTTPS
pub struct RestClient {
    client: Client,
    settings: RestSettings,
    token_source: TokenSource,
    token: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct ArmSnapshot {
    id: String,
    name: String,
    #[serde(default)]
    properties: ArmSnapshotProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmSnapshotProperties {
    time_created: Option<String>,
    #[serde(rename = "diskSizeGB")]
    disk_size_gb: Option<u64>,
    provisioning_state: Option<String>,
}

impl From<ArmSnapshot> for SnapshotDetails {
    fn from(arm: ArmSnapshot) -> Self {
        let resource_group = ResourceId::parse(&arm.id).ok().map(|r| r.resource_group);
        SnapshotDetails {
            id: arm.id,
            name: arm.name,
            resource_group,
            time_created: arm.properties.time_created,
            disk_size_gb: arm.properties.disk_size_gb,
            provisioning_state: arm.properties.provisioning_state,
        }
    }
}

impl RestClient {
    pub fn new(settings: RestSettings, token_source: TokenSource) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            settings,
            token_source,
            token: OnceCell::new(),
        })
    }

    fn url(&self, resource_path: &str, api_version: &str) -> String {
        format!(
            "{}{}?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            resource_path,
            api_version
        )
    }

    async fn bearer(&self) -> Result<&str, AzureError> {
        let token = self
            .token
            .get_or_try_init(|| async {
                match &self.token_source {
                    TokenSource::Static(token) => Ok(token.clone()),
                    TokenSource::AzCli(cli) => {
                        debug!("Acquiring ARM access token from Azure CLI");
                        cli.access_token(azure::MANAGEMENT_RESOURCE).await
                    }
                }
            })
            .await?;
        Ok(token.as_str())
    }

    /// Send one request and return the parsed JSON body
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value, AzureError> {
        let token = self.bearer().await?;

        let mut request = self.client.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| classify_reqwest_error(&e, url))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| classify_reqwest_error(&e, url))?;

        if !status.is_success() {
            let detail = arm_error_message(&text).unwrap_or_else(|| text.clone());
            return Err(AzureError::new(
                classify_status(status),
                format!("{} {} returned {}: {}", method, strip_query(url), status, detail),
            ));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| AzureError::permanent(format!("Invalid JSON from {}: {}", strip_query(url), e)))
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> Result<SnapshotDetails, AzureError> {
        let url = self.url(snapshot_id, &self.settings.snapshot_api_version);
        let body = self.send(Method::GET, &url, None).await?;
        parse_snapshot(body)
    }

    /// Poll a freshly created snapshot until ARM reports a terminal state
    async fn wait_for_provisioning(&self, snapshot_id: &str) -> Result<SnapshotDetails, AzureError> {
        let mut consecutive_failures = 0;
        const MAX_CONSECUTIVE_FAILURES: u32 = 5;

        for poll in 1..=self.settings.max_polls {
            sleep(self.settings.poll_interval).await;

            match self.get_snapshot(snapshot_id).await {
                Ok(details) if details.is_provisioned() => {
                    info!("Snapshot {} provisioned after {} polls", details.name, poll);
                    return Ok(details);
                }
                Ok(details) if details.is_failed() => {
                    return Err(AzureError::permanent(format!(
                        "Snapshot {} ended in provisioning state Failed",
                        details.name
                    )));
                }
                Ok(details) => {
                    consecutive_failures = 0;
                    debug!(
                        "Snapshot {} still {} (poll {}/{})",
                        details.name,
                        details.provisioning_state.as_deref().unwrap_or("unknown"),
                        poll,
                        self.settings.max_polls
                    );
                }
                // ARM can briefly 404 right after accepting the PUT
                Err(e) if e.is_transient() || e.is_not_found() => {
                    consecutive_failures += 1;
                    warn!("Polling {} failed ({}/{}): {}", snapshot_id, consecutive_failures, MAX_CONSECUTIVE_FAILURES, e);
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(AzureError::transient(format!(
                            "Lost track of snapshot {} while provisioning: {}",
                            snapshot_id, e
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(AzureError::transient(format!(
            "Snapshot {} still provisioning after {} polls",
            snapshot_id, self.settings.max_polls
        )))
    }
}

#[async_trait]
impl AzureApi for RestClient {
    #[instrument(skip(self, vm), fields(vm = %vm.name))]
    async fn show_vm(&self, vm: &EntityRecord) -> Result<VmDetails, AzureError> {
        let url = self.url(&vm.id, &self.settings.vm_api_version);
        let body = self.send(Method::GET, &url, None).await?;

        let os_disk_id = body
            .pointer("/properties/storageProfile/osDisk/managedDisk/id")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| AzureError::permanent(format!("VM {} has no managed OS disk", vm.name)))?
            .to_string();

        let resource_group = vm
            .resource_group
            .clone()
            .or_else(|| ResourceId::parse(&vm.id).ok().map(|r| r.resource_group))
            .ok_or_else(|| AzureError::permanent(format!("Cannot determine resource group of {}", vm.id)))?;

        Ok(VmDetails {
            resource_group,
            os_disk_id,
            location: body.get("location").and_then(Value::as_str).map(str::to_string),
        })
    }

    #[instrument(skip(self, request), fields(snapshot = %request.name))]
    async fn create_snapshot(&self, request: &SnapshotRequest) -> Result<SnapshotDetails, AzureError> {
        let location = request.location.as_deref().ok_or_else(|| {
            AzureError::permanent(format!("No location known for snapshot {}", request.name))
        })?;

        let snapshot_id = request.resource_id();
        let url = self.url(&snapshot_id, &self.settings.snapshot_api_version);
        let payload = json!({
            "location": location,
            "tags": request.tags,
            "properties": {
                "creationData": {
                    "createOption": "Copy",
                    "sourceResourceId": request.source_disk_id,
                },
                "incremental": request.incremental,
            }
        });

        let body = self.send(Method::PUT, &url, Some(&payload)).await?;

        // 202 responses may carry no body; poll the resource itself
        if body.is_null() {
            return self.wait_for_provisioning(&snapshot_id).await;
        }

        let details = parse_snapshot(body)?;
        if details.is_provisioned() {
            Ok(details)
        } else if details.is_failed() {
            Err(AzureError::permanent(format!(
                "Snapshot {} ended in provisioning state Failed",
                details.name
            )))
        } else {
            self.wait_for_provisioning(&details.id).await
        }
    }

    #[instrument(skip(self))]
    async fn show_snapshot(&self, snapshot_id: &str) -> Result<SnapshotDetails, AzureError> {
        self.get_snapshot(snapshot_id).await
    }
}

fn parse_snapshot(body: Value) -> Result<SnapshotDetails, AzureError> {
    serde_json::from_value::<ArmSnapshot>(body)
        .map(SnapshotDetails::from)
        .map_err(|e| AzureError::permanent(format!("Unexpected snapshot payload: {}", e)))
}

/// `{"error": {"code": "...", "message": "..."}}` → `code: message`
fn arm_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let code = error.get("code").and_then(Value::as_str).unwrap_or("Error");
    let message = error.get("message").and_then(Value::as_str).unwrap_or_default();
    Some(format!("{}: {}", code, message))
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        404 => ErrorKind::NotFound,
        401 | 403 => ErrorKind::Unauthorized,
        408 | 429 | 500 | 502 | 503 | 504 => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

fn classify_reqwest_error(error: &reqwest::Error, url: &str) -> AzureError {
    let kind = if error.is_builder() || error.is_decode() {
        ErrorKind::Permanent
    } else {
        // connect, timeout, body and request errors are network-level
        ErrorKind::Transient
    };
    AzureError::new(kind, format!("Request to {} failed: {}", strip_query(url), error))
}
