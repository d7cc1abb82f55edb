// File: azsnap/src/azure/cli.rs
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, instrument};

use super::{AccountInfo, AzureApi, SessionProvider, SnapshotDetails, SnapshotRequest, VmDetails};
use crate::errors::{AzureError, ErrorKind};
use crate::inventory::EntityRecord;

/// Azure CLI transport: one `az` process per call
#[derive(Debug, Clone)]
pub struct AzCli {
    binary: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmShowOutput {
    resource_group: String,
    disk_id: Option<String>,
    location: Option<String>,
}

impl AzCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run `az <args>` and return stdout, classifying failures from stderr
    pub async fn execute(&self, args: &[String]) -> Result<String, AzureError> {
        debug!("Executing: {} {}", self.binary, args.join(" "));

        let output = AsyncCommand::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AzureError::permanent(format!(
                        "Azure CLI ({}) not found. Install Azure CLI and try again.",
                        self.binary
                    ))
                } else {
                    AzureError::transient(format!("Failed to spawn {}: {}", self.binary, e))
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(stdout)
        } else {
            let message = if !stderr.is_empty() { stderr } else { stdout };
            let kind = classify_cli_error(&message);
            Err(AzureError::new(
                kind,
                format!(
                    "az {} failed (exit code {}): {}",
                    args.first().map(String::as_str).unwrap_or_default(),
                    output.status.code().unwrap_or(-1),
                    message
                ),
            ))
        }
    }

    /// Bearer token for Resource Manager from the current CLI session
    pub async fn access_token(&self, resource: &str) -> Result<String, AzureError> {
        let token = self
            .execute(&args([
                "account",
                "get-access-token",
                "--resource",
                resource,
                "--query",
                "accessToken",
                "-o",
                "tsv",
            ]))
            .await?;

        if token.is_empty() {
            return Err(AzureError::unauthorized("az returned an empty access token"));
        }
        Ok(token)
    }
}

#[async_trait]
impl AzureApi for AzCli {
    #[instrument(skip(self, vm), fields(vm = %vm.name))]
    async fn show_vm(&self, vm: &EntityRecord) -> Result<VmDetails, AzureError> {
        let stdout = self
            .execute(&args([
                "vm",
                "show",
                "--ids",
                &vm.id,
                "--query",
                "{resourceGroup:resourceGroup, diskId:storageProfile.osDisk.managedDisk.id, location:location}",
                "-o",
                "json",
            ]))
            .await?;

        let parsed: VmShowOutput = serde_json::from_str(&stdout)
            .map_err(|e| AzureError::permanent(format!("Unexpected az vm show output: {}", e)))?;

        let os_disk_id = parsed.disk_id.filter(|d| !d.is_empty()).ok_or_else(|| {
            AzureError::permanent(format!("VM {} has no managed OS disk", vm.name))
        })?;

        Ok(VmDetails {
            resource_group: parsed.resource_group,
            os_disk_id,
            location: parsed.location,
        })
    }

    #[instrument(skip(self, request), fields(snapshot = %request.name))]
    async fn create_snapshot(&self, request: &SnapshotRequest) -> Result<SnapshotDetails, AzureError> {
        let mut command = args([
            "snapshot",
            "create",
            "--name",
            &request.name,
            "--resource-group",
            &request.resource_group,
            "--subscription",
            &request.subscription,
            "--source",
            &request.source_disk_id,
        ]);
        if let Some(location) = &request.location {
            command.extend(args(["--location", location]));
        }
        if request.incremental {
            command.extend(args(["--incremental", "true"]));
        }
        if !request.tags.is_empty() {
            command.push("--tags".to_string());
            command.extend(request.tags.iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        command.extend(args(["-o", "json"]));

        // az waits for the long-running operation before returning
        let stdout = self.execute(&command).await?;
        let details: SnapshotDetails = serde_json::from_str(&stdout)
            .map_err(|e| AzureError::permanent(format!("Unexpected az snapshot create output: {}", e)))?;

        if details.is_failed() {
            return Err(AzureError::permanent(format!(
                "Snapshot {} ended in provisioning state Failed",
                details.name
            )));
        }
        Ok(details)
    }

    #[instrument(skip(self))]
    async fn show_snapshot(&self, snapshot_id: &str) -> Result<SnapshotDetails, AzureError> {
        let stdout = self
            .execute(&args(["snapshot", "show", "--ids", snapshot_id, "-o", "json"]))
            .await?;

        // `--ids` on a missing resource can exit 0 with empty output
        if stdout.is_empty() || stdout == "null" {
            return Err(AzureError::not_found(format!("Snapshot {} not found", snapshot_id)));
        }

        serde_json::from_str(&stdout)
            .map_err(|e| AzureError::permanent(format!("Unexpected az snapshot show output: {}", e)))
    }
}

#[async_trait]
impl SessionProvider for AzCli {
    async fn probe(&self) -> Result<AccountInfo, AzureError> {
        let stdout = self.execute(&args(["account", "show", "-o", "json"])).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| AzureError::permanent(format!("Unexpected az account show output: {}", e)))
    }

    async fn login(&self) -> Result<(), AzureError> {
        info!("Starting interactive Azure login");

        // Inherit the terminal so device-code or browser prompts reach the operator
        let status = AsyncCommand::new(&self.binary)
            .arg("login")
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AzureError::permanent(format!(
                        "Azure CLI ({}) not found. Install Azure CLI and try again.",
                        self.binary
                    ))
                } else {
                    AzureError::permanent(format!("Failed to run az login: {}", e))
                }
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(AzureError::unauthorized(format!(
                "az login exited with code {}",
                status.code().unwrap_or(-1)
            )))
        }
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Map `az` stderr text onto an error kind
///
/// The ARM error code (`ERROR: (Code) ...` or a `Code: ...` line) decides when
/// present. Otherwise only unquoted words count: resource ids and names repeat
/// in most messages and must not be read as status codes or keywords.
pub fn classify_cli_error(message: &str) -> ErrorKind {
    if let Some(code) = arm_error_code(message) {
        return classify_arm_code(&code);
    }

    let lower = message.to_ascii_lowercase();
    if lower.contains("az login") {
        return ErrorKind::Unauthorized;
    }

    let words = unquoted_words(&lower);
    let has = |phrase: &str| contains_phrase(&words, phrase);

    if has("was not found") || has("could not be found") {
        ErrorKind::NotFound
    } else if words.iter().any(|w| w.starts_with("aadsts"))
        || has("forbidden")
        || has("unauthorized")
    {
        ErrorKind::Unauthorized
    } else if words
        .iter()
        .any(|w| matches!(w.as_str(), "429" | "500" | "502" | "503" | "504"))
        || has("too many requests")
        || has("timed out")
        || has("timeout")
        || has("connection reset")
        || has("connection aborted")
        || has("connectionreseterror")
        || has("temporarily unavailable")
        || has("service unavailable")
        || has("internal server error")
    {
        ErrorKind::Transient
    } else {
        ErrorKind::Permanent
    }
}

fn classify_arm_code(code: &str) -> ErrorKind {
    match code.to_ascii_lowercase().as_str() {
        "resourcenotfound" | "resourcegroupnotfound" | "parentresourcenotfound" | "notfound"
        | "subscriptionnotfound" => ErrorKind::NotFound,
        "authorizationfailed"
        | "linkedauthorizationfailed"
        | "invalidauthenticationtoken"
        | "invalidauthenticationtokentenant"
        | "expiredauthenticationtoken"
        | "authenticationfailed" => ErrorKind::Unauthorized,
        "toomanyrequests"
        | "throttled"
        | "retryableerror"
        | "internalservererror"
        | "internalexecutionerror"
        | "serviceunavailable"
        | "badgateway"
        | "gatewaytimeout"
        | "operationtimedout"
        | "requesttimeout"
        | "anotheroperationinprogress" => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

/// First `(Code)` or `Code: X` marker at the start of a line
fn arm_error_code(message: &str) -> Option<String> {
    let is_code = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());

    for line in message.lines() {
        let line = line.trim();
        let line = line.strip_prefix("ERROR:").map(str::trim_start).unwrap_or(line);

        if let Some(rest) = line.strip_prefix('(') {
            if let Some((code, _)) = rest.split_once(')') {
                if is_code(code) {
                    return Some(code.to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("Code:") {
            let code = rest.trim();
            if is_code(code) {
                return Some(code.to_string());
            }
        }
    }
    None
}

/// Lowercased words outside quoted spans, with resource paths dropped
fn unquoted_words(lower: &str) -> Vec<String> {
    let mut visible = String::with_capacity(lower.len());
    let mut quote: Option<char> = None;
    let mut prev = ' ';

    for c in lower.chars() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if (c == '\'' || c == '"') && !prev.is_alphanumeric() => quote = Some(c),
            None => visible.push(c),
        }
        prev = c;
    }

    visible
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')))
        .filter(|w| !w.contains('/'))
        .map(|w| w.trim_matches(|c: char| c == '.' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}
