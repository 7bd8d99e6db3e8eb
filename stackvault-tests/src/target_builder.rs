//! Fluent API for building registry targets

use stackvault::registry::{Engine, Mode, Target};
use std::path::Path;

/// Builder for [`Target`] records
pub struct TargetBuilder {
    target: Target,
}

impl TargetBuilder {
    pub fn new(engine: Engine, name: &str, mode: Mode) -> Self {
        Self {
            target: Target::new(engine, name, mode),
        }
    }

    /// A relational-pg target in container mode, user `postgres`
    pub fn postgres(name: &str) -> Self {
        Self::new(Engine::RelationalPg, name, Mode::Container).user("postgres")
    }

    pub fn mysql(name: &str) -> Self {
        Self::new(Engine::RelationalMysql, name, Mode::Container).user("root")
    }

    /// A volume target in path mode
    pub fn volume(name: &str, path: &Path) -> Self {
        Self::new(Engine::Volume, name, Mode::Path).path(path)
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.target.mode = mode;
        self
    }

    pub fn container(mut self, container: &str) -> Self {
        self.target.container = Some(container.to_string());
        self
    }

    pub fn pod(mut self, namespace: &str, pod: &str) -> Self {
        self.target.namespace = Some(namespace.to_string());
        self.target.pod = Some(pod.to_string());
        self
    }

    pub fn host(mut self, host: &str, port: u16) -> Self {
        self.target.host = Some(host.to_string());
        self.target.port = Some(port);
        self
    }

    pub fn path(mut self, path: &Path) -> Self {
        self.target.path = Some(path.to_path_buf());
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.target.user = Some(user.to_string());
        self
    }

    pub fn credential(mut self, env: &str) -> Self {
        self.target.credential_env = Some(env.to_string());
        self
    }

    pub fn databases(mut self, databases: &[&str]) -> Self {
        self.target.options.databases = databases.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn collections(mut self, collections: &[&str]) -> Self {
        self.target.options.collections = collections.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn data_dir(mut self, dir: &str) -> Self {
        self.target.options.data_dir = Some(dir.to_string());
        self
    }

    pub fn custom_format(mut self) -> Self {
        self.target.options.custom_format = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.target.enabled = false;
        self
    }

    pub fn build(self) -> Target {
        self.target
    }
}
