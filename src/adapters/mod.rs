//! Engine adapters
//!
//! Each engine turns "dump this logical unit" and "restore this artifact" into
//! concrete commands run through the target's [`ExecutionBackend`]. Adapters are
//! looked up by engine in an [`AdapterRegistry`].

mod archive;
mod document;
mod keyvalue;
mod messaging;
mod mysql;
mod postgres;
mod vector;
mod volume;

pub use document::DocumentAdapter;
pub use keyvalue::KeyValueAdapter;
pub use messaging::MessagingAdapter;
pub use mysql::MysqlAdapter;
pub use postgres::PostgresAdapter;
pub use vector::VectorAdapter;
pub use volume::VolumeAdapter;

use crate::backends::{ExecutionBackend, Invocation};
use crate::error::BackupError;
use crate::registry::{Engine, Mode, Target};
use crate::secrets::SecretResolver;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Bounded wait for engines that finish a dump asynchronously
#[derive(Debug, Clone, Copy)]
pub struct SettleWindow {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for SettleWindow {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll: Duration::from_secs(1),
        }
    }
}

/// Everything an adapter needs for one call
pub struct AdapterContext<'a> {
    pub backend: &'a dyn ExecutionBackend,
    pub secrets: &'a dyn SecretResolver,
    pub settle: SettleWindow,
    /// Timeout for direct HTTP calls
    pub http_timeout: Duration,
}

impl<'a> AdapterContext<'a> {
    /// The target's credential, if it names one
    pub fn credential(&self, target: &Target) -> Result<Option<String>, BackupError> {
        self.secrets.resolve_optional(target.credential_env.as_deref())
    }
}

pub trait EngineAdapter: Send + Sync {
    fn engine(&self) -> Engine;

    /// Native client programs needed on this host for network and path modes
    fn client_tools(&self, target: &Target) -> Vec<&'static str>;

    /// File name of the artifact a unit dumps to
    fn artifact_name(&self, target: &Target, unit: &str) -> String;

    /// Fail fast on engine/mode pairings with no valid dump path
    fn check_mode(&self, _target: &Target) -> Result<(), BackupError> {
        Ok(())
    }

    /// Everything `check_mode` checks, plus what restoring needs
    fn check_restore(&self, target: &Target) -> Result<(), BackupError> {
        self.check_mode(target)
    }

    /// Write the unit's artifact to `dest`
    fn dump(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        dest: &Path,
    ) -> Result<(), BackupError>;

    /// Replace the unit's live state with the contents of `artifact`
    fn restore(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        artifact: &Path,
    ) -> Result<(), BackupError>;
}

/// Adapters keyed by engine
pub struct AdapterRegistry {
    adapters: HashMap<Engine, Box<dyn EngineAdapter>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// One adapter for every engine
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(PostgresAdapter));
        registry.register(Box::new(MysqlAdapter));
        registry.register(Box::new(DocumentAdapter));
        registry.register(Box::new(KeyValueAdapter));
        registry.register(Box::new(MessagingAdapter));
        registry.register(Box::new(VectorAdapter));
        registry.register(Box::new(VolumeAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Box<dyn EngineAdapter>) {
        self.adapters.insert(adapter.engine(), adapter);
    }

    pub fn get(&self, engine: Engine) -> Result<&dyn EngineAdapter, BackupError> {
        self.adapters
            .get(&engine)
            .map(|a| a.as_ref())
            .ok_or_else(|| BackupError::Configuration(format!("no adapter registered for {}", engine)))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Host, port and user flags shared by the SQL clients
pub(crate) fn connection_flags(
    target: &Target,
    host_flag: &str,
    port_flag: &str,
    user_flag: &str,
    default_user: &str,
) -> Vec<String> {
    let mut flags = Vec::new();
    match target.mode {
        Mode::Path => {
            if let Some(ref path) = target.path {
                flags.push(host_flag.to_string());
                flags.push(path.display().to_string());
            }
        }
        _ => {
            if let Some(ref host) = target.host {
                flags.push(host_flag.to_string());
                flags.push(host.clone());
            }
        }
    }
    if let Some(port) = target.port {
        flags.push(port_flag.to_string());
        flags.push(port.to_string());
    }
    flags.push(user_flag.to_string());
    flags.push(target.user.clone().unwrap_or_else(|| default_user.to_string()));
    flags
}

/// A local file operation failed while preparing or unpacking an artifact
pub(crate) fn local_io_error(target: &Target, what: &str, err: std::io::Error) -> BackupError {
    BackupError::ExecutionFailed {
        target: target.id(),
        backend: target.mode,
        exit_code: None,
        stderr: format!("{}: {}", what, err),
    }
}

pub(crate) fn gzip_file(source: &Path, dest: &Path) -> std::io::Result<()> {
    let mut input = std::fs::File::open(source)?;
    let mut encoder = GzEncoder::new(std::fs::File::create(dest)?, Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()
}

pub(crate) fn gunzip_file(source: &Path, dest: &Path) -> std::io::Result<()> {
    let mut decoder = GzDecoder::new(std::fs::File::open(source)?);
    let mut output = std::fs::File::create(dest)?;
    std::io::copy(&mut decoder, &mut output)?;
    output.sync_all()
}

/// Scratch directory next to `path`, removed on drop
pub(crate) fn scratch_beside(target: &Target, path: &Path) -> Result<tempfile::TempDir, BackupError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tempfile::Builder::new()
        .prefix(".stackvault-")
        .tempdir_in(parent)
        .map_err(|e| local_io_error(target, "create scratch directory", e))
}

/// Run a command from the target's options through its backend
fn exec_command(ctx: &AdapterContext, argv: &[String]) -> Result<(), BackupError> {
    ctx.backend.exec(Invocation::new(argv.iter().cloned()))?;
    Ok(())
}

/// How an engine can be stopped and started around a raw-file restore
pub(crate) struct Lifecycle<'a> {
    pub default_stop: Option<&'a [&'a str]>,
    pub default_start: Option<&'a [&'a str]>,
}

impl<'a> Lifecycle<'a> {
    pub const NONE: Lifecycle<'static> = Lifecycle {
        default_stop: None,
        default_start: None,
    };

    /// Whether stop and start can both be carried out for this target
    pub fn available(&self, target: &Target, backend_has_lifecycle: bool) -> bool {
        let stop = target.options.stop_command.is_some() || self.default_stop.is_some();
        let start = target.options.start_command.is_some() || self.default_start.is_some();
        (stop && start) || backend_has_lifecycle
    }

    fn stop(&self, ctx: &AdapterContext, target: &Target) -> Result<(), BackupError> {
        info!("Stopping {} before restore", target.id());
        if let Some(ref argv) = target.options.stop_command {
            exec_command(ctx, argv)
        } else if let Some(argv) = self.default_stop {
            exec_command(ctx, &argv.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        } else {
            ctx.backend.stop_engine()
        }
    }

    fn start(&self, ctx: &AdapterContext, target: &Target) -> Result<(), BackupError> {
        info!("Starting {} after restore", target.id());
        if let Some(ref argv) = target.options.start_command {
            exec_command(ctx, argv)
        } else if let Some(argv) = self.default_start {
            exec_command(ctx, &argv.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        } else {
            ctx.backend.start_engine()
        }
    }

    /// Stop, run `work`, then start again even if `work` failed
    pub fn with_engine_stopped<F>(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        work: F,
    ) -> Result<(), BackupError>
    where
        F: FnOnce() -> Result<(), BackupError>,
    {
        self.stop(ctx, target)?;
        let result = work();
        let started = self.start(ctx, target);

        match (result, started) {
            (Err(e), Err(start_err)) => {
                warn!("Engine for {} did not restart: {}", target.id(), start_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), started) => started,
        }
    }
}
