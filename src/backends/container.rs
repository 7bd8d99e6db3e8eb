//! Commands inside a running container via the docker CLI

use super::{BackendBase, ExecutionBackend, Invocation};
use crate::error::BackupError;
use crate::registry::Mode;
use crate::utils::executor::CommandSpec;
use std::path::Path;
use tracing::info;

pub struct ContainerBackend {
    base: BackendBase,
    container: String,
}

impl ContainerBackend {
    pub(crate) fn new(base: BackendBase, container: String) -> Self {
        Self { base, container }
    }

    fn docker(&self) -> CommandSpec {
        CommandSpec::new("docker")
    }
}

impl ExecutionBackend for ContainerBackend {
    fn mode(&self) -> Mode {
        Mode::Container
    }

    /// `docker exec -i -e KEY <container> argv...`
    ///
    /// Only variable names go on the command line; docker copies the values
    /// from the CLI's own environment.
    fn exec(&self, invocation: Invocation) -> Result<Vec<u8>, BackupError> {
        let mut spec = self.docker().args(["exec", "-i"]);
        for (key, _) in &invocation.env {
            spec = spec.arg("-e").arg(key.clone());
        }
        spec = spec
            .arg(self.container.clone())
            .args(invocation.argv)
            .stdin(invocation.stdin)
            .stdout(invocation.stdout);
        for (key, value) in invocation.env {
            spec = spec.env(key, value);
        }
        for secret in invocation.secrets {
            spec = spec.secret(secret);
        }
        self.base.run(spec)
    }

    fn copy_out(&self, remote: &str, local: &Path) -> Result<(), BackupError> {
        self.base.run(self.docker().args([
            "cp".to_string(),
            format!("{}:{}", self.container, remote),
            local.display().to_string(),
        ]))?;
        Ok(())
    }

    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), BackupError> {
        self.base.run(self.docker().args([
            "cp".to_string(),
            local.display().to_string(),
            format!("{}:{}", self.container, remote),
        ]))?;
        Ok(())
    }

    fn stop_engine(&self) -> Result<(), BackupError> {
        info!("Stopping container {}", self.container);
        self.base
            .run(self.docker().args(["stop", self.container.as_str()]))?;
        Ok(())
    }

    fn start_engine(&self) -> Result<(), BackupError> {
        info!("Starting container {}", self.container);
        self.base
            .run(self.docker().args(["start", self.container.as_str()]))?;
        Ok(())
    }

    fn has_lifecycle(&self) -> bool {
        true
    }

    fn required_tools(&self) -> Vec<&'static str> {
        vec!["docker"]
    }
}
