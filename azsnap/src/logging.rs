//! Console logging plus a per-run log file attached once output is allowed

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};

type FileLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Handle to the run log layer; a disabled one ignores `attach_file`
#[derive(Clone)]
pub struct RunLog {
    handle: Option<reload::Handle<Option<FileLayer>, Registry>>,
}

impl RunLog {
    /// Install the global subscriber: console now, file later
    pub fn init() -> Result<Self> {
        let env_filter = EnvFilter::from_default_env()
            .add_directive("azsnap=info".parse()?)
            .add_directive("reqwest=warn".parse()?)
            .add_directive("hyper=warn".parse()?);

        let (file_layer, handle) = reload::Layer::new(None::<FileLayer>);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .context("Failed to initialize logging")?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    /// Start copying every log line to `path`
    pub fn attach_file(&self, path: &Path) -> Result<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open run log {}", path.display()))?;

        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .boxed();

        handle
            .reload(Some(layer))
            .context("Failed to attach run log")?;
        debug!("Run log attached at {}", path.display());
        Ok(())
    }
}
