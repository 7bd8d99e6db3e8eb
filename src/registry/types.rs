use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::RegistryError;

/// Category of data store a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Engine {
    RelationalPg,
    RelationalMysql,
    Document,
    KeyValue,
    Messaging,
    Vector,
    Volume,
}

impl Engine {
    /// All engines, in the order backups visit them
    pub const ALL: [Engine; 7] = [
        Engine::RelationalPg,
        Engine::RelationalMysql,
        Engine::Document,
        Engine::KeyValue,
        Engine::Messaging,
        Engine::Vector,
        Engine::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::RelationalPg => "relational-pg",
            Engine::RelationalMysql => "relational-mysql",
            Engine::Document => "document",
            Engine::KeyValue => "key-value",
            Engine::Messaging => "messaging",
            Engine::Vector => "vector",
            Engine::Volume => "volume",
        }
    }

    /// Whether this engine belongs to the `databases` backup scope
    pub fn is_database(&self) -> bool {
        !matches!(self, Engine::Volume)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relational-pg" | "postgres" | "postgresql" | "pg" => Ok(Engine::RelationalPg),
            "relational-mysql" | "mysql" | "mariadb" => Ok(Engine::RelationalMysql),
            "document" | "mongo" | "mongodb" => Ok(Engine::Document),
            "key-value" | "keyvalue" | "redis" => Ok(Engine::KeyValue),
            "messaging" | "rabbitmq" => Ok(Engine::Messaging),
            "vector" | "qdrant" => Ok(Engine::Vector),
            "volume" | "volumes" => Ok(Engine::Volume),
            other => Err(format!(
                "unknown engine '{}' (expected one of: {})",
                other,
                Engine::ALL.map(|e| e.as_str()).join(", ")
            )),
        }
    }
}

/// Transport used to reach a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Container,
    Orchestrated,
    Network,
    Path,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Container => "container",
            Mode::Orchestrated => "orchestrated",
            Mode::Network => "network",
            Mode::Path => "path",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "container" | "docker" => Ok(Mode::Container),
            "orchestrated" | "kubernetes" | "k8s" => Ok(Mode::Orchestrated),
            "network" => Ok(Mode::Network),
            "path" | "local" => Ok(Mode::Path),
            other => Err(format!(
                "unknown mode '{}' (expected container, orchestrated, network or path)",
                other
            )),
        }
    }
}

/// Per-engine options. Only the fields relevant to a target's engine are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Databases to dump (relational, document)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub databases: Vec<String>,

    /// Collections to snapshot (vector)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,

    /// Use the binary custom dump format (relational-pg)
    #[serde(skip_serializing_if = "is_false")]
    pub custom_format: bool,

    /// Tables to restore selectively from a custom-format dump
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<String>,

    /// Read from a secondary member when dumping (document)
    #[serde(skip_serializing_if = "is_false")]
    pub replica_aware: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub tls: bool,

    /// Accept invalid certificates and hostnames
    #[serde(skip_serializing_if = "is_false")]
    pub tls_insecure: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_database: Option<String>,

    /// Directory holding the engine's on-disk state inside the container or pod
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Command that stops the engine before a raw-file restore
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_command: Option<Vec<String>>,

    /// Command that starts the engine after a raw-file restore
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_command: Option<Vec<String>>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl EngineOptions {
    pub fn is_empty(&self) -> bool {
        *self == EngineOptions::default()
    }
}

/// A named backup source reached through one execution mode
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Target {
    pub name: String,
    pub engine: Engine,
    pub mode: Mode,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Container name or id (container mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    /// Container within the pod, when the pod runs several
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_container: Option<String>,

    /// Socket path for client engines, data directory for file-based engines (path mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Name of the environment variable holding the credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,

    #[serde(default, skip_serializing_if = "EngineOptions::is_empty")]
    pub options: EngineOptions,
}

fn default_enabled() -> bool {
    true
}

impl Target {
    /// Create an enabled target with no connection parameters set
    pub fn new(engine: Engine, name: impl Into<String>, mode: Mode) -> Self {
        Self {
            name: name.into(),
            engine,
            mode,
            enabled: true,
            host: None,
            port: None,
            container: None,
            namespace: None,
            pod: None,
            pod_container: None,
            path: None,
            user: None,
            credential_env: None,
            options: EngineOptions::default(),
        }
    }

    /// `engine/name`, used in logs and lock names
    pub fn id(&self) -> String {
        format!("{}/{}", self.engine, self.name)
    }

    /// Logical units dumped for this target, in declaration order
    pub fn logical_units(&self) -> Vec<String> {
        match self.engine {
            Engine::RelationalPg | Engine::RelationalMysql => self.options.databases.clone(),
            Engine::Document => {
                if self.options.databases.is_empty() {
                    vec!["all".to_string()]
                } else {
                    self.options.databases.clone()
                }
            }
            Engine::Vector => self.options.collections.clone(),
            Engine::KeyValue => vec!["dump".to_string()],
            Engine::Messaging | Engine::Volume => vec!["data".to_string()],
        }
    }

    /// Check that the fields required by the mode and engine are present
    pub fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidModeConfiguration {
            engine: self.engine,
            name: self.name.clone(),
            mode: self.mode,
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("target name is empty".to_string()));
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(invalid(format!(
                "target name '{}' must not contain path separators",
                self.name
            )));
        }

        let mut missing = Vec::new();
        match self.mode {
            Mode::Container => {
                if is_blank(&self.container) {
                    missing.push("container");
                }
            }
            Mode::Orchestrated => {
                if is_blank(&self.namespace) {
                    missing.push("namespace");
                }
                if is_blank(&self.pod) {
                    missing.push("pod");
                }
            }
            Mode::Network => {
                if is_blank(&self.host) {
                    missing.push("host");
                }
            }
            Mode::Path => {
                if self.path.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
                    missing.push("path");
                }
            }
        }
        if !missing.is_empty() {
            return Err(invalid(format!(
                "{} mode requires: {}",
                self.mode,
                missing.join(", ")
            )));
        }

        match self.engine {
            Engine::RelationalPg | Engine::RelationalMysql => {
                if self.options.databases.is_empty() {
                    return Err(invalid("at least one database is required".to_string()));
                }
            }
            Engine::Vector => {
                if self.options.collections.is_empty() {
                    return Err(invalid("at least one collection is required".to_string()));
                }
            }
            Engine::Volume => {
                if matches!(self.mode, Mode::Container | Mode::Orchestrated)
                    && is_blank(&self.options.data_dir)
                {
                    return Err(invalid(
                        "volume targets in container or orchestrated mode require data_dir"
                            .to_string(),
                    ));
                }
            }
            Engine::Document | Engine::KeyValue | Engine::Messaging => {}
        }

        for unit in self.logical_units() {
            if unit.trim().is_empty() || unit.contains(['/', '\\']) {
                return Err(invalid(format!("invalid logical unit name '{}'", unit)));
            }
        }

        if let Some(ref var) = self.credential_env {
            let valid = !var.is_empty()
                && var
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !var.starts_with(|c: char| c.is_ascii_digit());
            if !valid {
                return Err(invalid(format!(
                    "credential_env '{}' is not a valid environment variable name",
                    var
                )));
            }
        }

        for (label, command) in [
            ("stop_command", &self.options.stop_command),
            ("start_command", &self.options.start_command),
        ] {
            if let Some(argv) = command {
                if argv.is_empty() {
                    return Err(invalid(format!("{} must not be empty", label)));
                }
            }
        }

        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Contents of one registry file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub targets: Vec<Target>,
}
