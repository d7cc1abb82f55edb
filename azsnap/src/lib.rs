pub mod azure;
pub mod cache;
pub mod client;
pub mod commands;
pub mod config;
pub mod constants;
pub mod errors;
pub mod inventory;
pub mod logging;
pub mod orchestrator;
pub mod outcome;
pub mod report;
pub mod retry;
pub mod session;

// Re-export commonly used types
pub use azure::{AzCli, AzureApi, RestClient, SessionProvider};
pub use cache::VmCache;
pub use client::{OperationClient, SnapshotNaming};
pub use commands::{Backends, CommandContext, RunOutput};
pub use config::{Backend, Config, ConfigManager, Overrides};
pub use errors::{AzureError, ErrorKind, SnapError};
pub use inventory::{EntityKind, EntityRecord, Inventory};
pub use logging::RunLog;
pub use orchestrator::{BatchOrchestrator, StopHandle};
pub use outcome::{OperationKind, OperationOutcome, OperationStatus};
pub use report::{BatchReport, BatchSummary, ResultAggregator};
pub use retry::{RetryOutcome, RetryPolicy};
pub use session::SessionGuard;
