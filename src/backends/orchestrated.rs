//! Commands inside a pod via kubectl

use super::{BackendBase, ExecutionBackend, Invocation};
use crate::error::BackupError;
use crate::registry::Mode;
use crate::utils::executor::CommandSpec;
use std::path::Path;

pub struct OrchestratedBackend {
    base: BackendBase,
    namespace: String,
    pod: String,
    container: Option<String>,
}

impl OrchestratedBackend {
    pub(crate) fn new(
        base: BackendBase,
        namespace: String,
        pod: String,
        container: Option<String>,
    ) -> Self {
        Self {
            base,
            namespace,
            pod,
            container,
        }
    }

    fn kubectl(&self, verb: &str) -> CommandSpec {
        let spec = CommandSpec::new("kubectl").args([verb, "-n", self.namespace.as_str()]);
        match self.container {
            Some(ref container) => spec.args(["-c", container.as_str()]),
            None => spec,
        }
    }

    fn remote(&self, path: &str) -> String {
        format!("{}:{}", self.pod, path)
    }
}

impl ExecutionBackend for OrchestratedBackend {
    fn mode(&self) -> Mode {
        Mode::Orchestrated
    }

    /// `kubectl exec -i -n <ns> [-c <c>] <pod> -- [env K=V...] argv...`
    ///
    /// kubectl cannot forward local environment, so values travel through
    /// `env` inside the pod and are masked in logs.
    fn exec(&self, invocation: Invocation) -> Result<Vec<u8>, BackupError> {
        let mut spec = self
            .kubectl("exec")
            .arg("-i")
            .arg(self.pod.clone())
            .arg("--");
        if !invocation.env.is_empty() {
            spec = spec.arg("env");
            for (key, value) in &invocation.env {
                spec = spec.arg(format!("{}={}", key, value));
            }
        }
        spec = spec
            .args(invocation.argv)
            .stdin(invocation.stdin)
            .stdout(invocation.stdout);
        for secret in invocation.secrets {
            spec = spec.secret(secret);
        }
        self.base.run(spec)
    }

    fn copy_out(&self, remote: &str, local: &Path) -> Result<(), BackupError> {
        self.base.run(
            self.kubectl("cp")
                .arg(self.remote(remote))
                .arg(local.display().to_string()),
        )?;
        Ok(())
    }

    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), BackupError> {
        self.base.run(
            self.kubectl("cp")
                .arg(local.display().to_string())
                .arg(self.remote(remote)),
        )?;
        Ok(())
    }

    fn stop_engine(&self) -> Result<(), BackupError> {
        Err(self.base.no_lifecycle())
    }

    fn start_engine(&self) -> Result<(), BackupError> {
        Err(self.base.no_lifecycle())
    }

    fn required_tools(&self) -> Vec<&'static str> {
        vec!["kubectl"]
    }
}
