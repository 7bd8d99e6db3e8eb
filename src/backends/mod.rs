//! Execution backends
//!
//! One implementation per [`Mode`], selected from the target when it is
//! processed. Adapters only ever see `dyn ExecutionBackend`.

mod container;
mod local;
mod orchestrated;

pub use container::ContainerBackend;
pub use local::{NetworkBackend, PathBackend};
pub use orchestrated::OrchestratedBackend;

use crate::error::BackupError;
use crate::registry::{Engine, Mode, Target};
use crate::utils::executor::{CommandRunner, CommandSpec, StdinSource, StdoutSink};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A command to run against a target, before transport wrapping
#[derive(Debug, Clone)]
pub struct Invocation {
    pub argv: Vec<String>,
    /// Environment for the engine client; values are never logged
    pub env: Vec<(String, String)>,
    pub secrets: Vec<String>,
    pub stdin: StdinSource,
    pub stdout: StdoutSink,
}

impl Invocation {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            secrets: Vec::new(),
            stdin: StdinSource::Null,
            stdout: StdoutSink::Capture,
        }
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        self.secrets.push(value.clone());
        self.env.push((key.to_string(), value));
        self
    }

    /// Mask a value that has to appear in argv
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        self.secrets.push(value.into());
        self
    }

    pub fn stdin(mut self, source: StdinSource) -> Self {
        self.stdin = source;
        self
    }

    pub fn stdout(mut self, sink: StdoutSink) -> Self {
        self.stdout = sink;
        self
    }

    /// Run the argv as-is on this host
    fn into_local_spec(self) -> Result<CommandSpec, BackupError> {
        let mut argv = self.argv.into_iter();
        let program = argv
            .next()
            .ok_or_else(|| BackupError::Configuration("empty command".to_string()))?;

        let mut spec = CommandSpec::new(program)
            .args(argv)
            .stdin(self.stdin)
            .stdout(self.stdout);
        for (key, value) in self.env {
            spec = spec.env(key, value);
        }
        for secret in self.secrets {
            spec = spec.secret(secret);
        }
        Ok(spec)
    }
}

/// Transport used to reach a target
pub trait ExecutionBackend: Send + Sync {
    fn mode(&self) -> Mode;

    /// Run a command against the target; returns captured stdout (empty for file sinks)
    fn exec(&self, invocation: Invocation) -> Result<Vec<u8>, BackupError>;

    /// Copy a file from the target to this host
    fn copy_out(&self, remote: &str, local: &Path) -> Result<(), BackupError>;

    /// Copy a file from this host into the target
    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), BackupError>;

    /// Stop the engine process without any engine-specific command
    fn stop_engine(&self) -> Result<(), BackupError>;

    fn start_engine(&self) -> Result<(), BackupError>;

    /// Whether `stop_engine`/`start_engine` work for this transport
    fn has_lifecycle(&self) -> bool {
        false
    }

    /// Local programs the transport itself needs
    fn required_tools(&self) -> Vec<&'static str>;
}

/// State shared by every backend: which target, how to run, how long to wait
#[derive(Clone)]
pub(crate) struct BackendBase {
    pub target_id: String,
    pub engine: Engine,
    pub mode: Mode,
    pub runner: Arc<dyn CommandRunner>,
    pub timeout: Duration,
}

impl BackendBase {
    /// Run to completion; non-zero exit and timeouts become `ExecutionFailed`
    pub fn run(&self, spec: CommandSpec) -> Result<Vec<u8>, BackupError> {
        let spec = spec.timeout(self.timeout);
        match self.runner.run(&spec) {
            Ok(output) if output.success() => Ok(output.stdout),
            Ok(output) => Err(BackupError::ExecutionFailed {
                target: self.target_id.clone(),
                backend: self.mode,
                exit_code: output.exit_code,
                stderr: spec.redact(output.stderr.trim()),
            }),
            Err(err) => Err(BackupError::ExecutionFailed {
                target: self.target_id.clone(),
                backend: self.mode,
                exit_code: None,
                stderr: err.to_string(),
            }),
        }
    }

    pub fn unsupported(&self, reason: &str) -> BackupError {
        BackupError::unsupported(self.engine, self.mode, reason)
    }

    pub fn no_lifecycle(&self) -> BackupError {
        self.unsupported("this transport cannot stop or start the engine; set options.stop_command and options.start_command")
    }
}

/// Build the backend for a target's mode
pub fn for_target(
    target: &Target,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
) -> Result<Box<dyn ExecutionBackend>, BackupError> {
    target.validate()?;

    let base = BackendBase {
        target_id: target.id(),
        engine: target.engine,
        mode: target.mode,
        runner,
        timeout,
    };
    let required = |value: &Option<String>, field: &str| {
        value.clone().ok_or_else(|| {
            BackupError::Configuration(format!("{} is missing '{}'", target.id(), field))
        })
    };

    Ok(match target.mode {
        Mode::Container => Box::new(ContainerBackend::new(
            base,
            required(&target.container, "container")?,
        )),
        Mode::Orchestrated => Box::new(OrchestratedBackend::new(
            base,
            required(&target.namespace, "namespace")?,
            required(&target.pod, "pod")?,
            target.pod_container.clone(),
        )),
        Mode::Network => Box::new(NetworkBackend::new(base)),
        Mode::Path => Box::new(PathBackend::new(base)),
    })
}
