//! Session guard: no batch starts without an authenticated Azure session

use std::io::IsTerminal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::azure::{AccountInfo, SessionProvider};
use crate::errors::{ErrorKind, SnapError};

pub struct SessionGuard {
    provider: Arc<dyn SessionProvider>,
    allow_login: bool,
    interactive: bool,
}

impl SessionGuard {
    /// Interactive login is only attempted when stdin is a terminal
    pub fn new(provider: Arc<dyn SessionProvider>, allow_login: bool) -> Self {
        Self {
            provider,
            allow_login,
            interactive: std::io::stdin().is_terminal(),
        }
    }

    /// Override terminal detection
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub async fn ensure_session(&self) -> Result<AccountInfo, SnapError> {
        let probe_error = match self.provider.probe().await {
            Ok(account) => {
                log_account(&account);
                return Ok(account);
            }
            Err(e) => e,
        };

        // A missing CLI cannot be fixed by logging in
        if probe_error.kind == ErrorKind::Permanent && probe_error.message.contains("not found") {
            return Err(SnapError::AzureLogin(probe_error.message));
        }

        warn!("No usable Azure session: {}", probe_error);

        if !self.allow_login {
            return Err(SnapError::AzureLogin(format!(
                "{} (interactive login disabled)",
                probe_error
            )));
        }
        if !self.interactive {
            return Err(SnapError::AzureLogin(format!(
                "{} (no terminal available for az login)",
                probe_error
            )));
        }

        self.provider
            .login()
            .await
            .map_err(|e| SnapError::AzureLogin(e.to_string()))?;

        let account = self
            .provider
            .probe()
            .await
            .map_err(|e| SnapError::AzureLogin(format!("still no session after login: {}", e)))?;
        log_account(&account);
        Ok(account)
    }
}

fn log_account(account: &AccountInfo) {
    info!(
        "Azure session: subscription {} ({}), user {}",
        account.name,
        account.id,
        account.user.as_ref().map(|u| u.name.as_str()).unwrap_or("unknown")
    );
}
