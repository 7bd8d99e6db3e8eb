//! Restic subprocess driver
//!
//! The snapshot store is only ever reached through restic's verbs (`init`,
//! `backup`, `snapshots`, `ls`, `restore`, `forget`); deduplication and
//! retention bucketing are restic's business.

use super::executor::{CommandOutput, CommandRunner, CommandSpec};
use super::restic_ops::SnapshotStore;
use crate::config::{RetentionPolicy, StoreConfig};
use crate::error::BackupError;
use crate::secrets::SecretResolver;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variables for restic
#[derive(Clone)]
pub struct ResticEnv {
    vars: Vec<(String, String)>,
    secrets: Vec<String>,
}

impl ResticEnv {
    /// Repository plus passphrase source; an env-referenced passphrase is resolved now
    pub fn resolve(store: &StoreConfig, secrets: &dyn SecretResolver) -> Result<Self, BackupError> {
        let mut env = Self {
            vars: vec![("RESTIC_REPOSITORY".to_string(), store.repository.clone())],
            secrets: Vec::new(),
        };

        if let Some(ref var) = store.password_env {
            let password = secrets.resolve(var)?;
            env.secrets.push(password.clone());
            env.vars.push(("RESTIC_PASSWORD".to_string(), password));
        } else if let Some(ref file) = store.password_file {
            env.vars.push((
                "RESTIC_PASSWORD_FILE".to_string(),
                file.display().to_string(),
            ));
        }

        Ok(env)
    }

    /// Add custom environment variable
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.push((key.into(), value.into()));
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    fn apply(&self, mut spec: CommandSpec) -> CommandSpec {
        for (key, value) in &self.vars {
            spec = spec.env(key.clone(), value.clone());
        }
        for secret in &self.secrets {
            spec = spec.secret(secret.clone());
        }
        spec
    }
}

/// Snapshot information, as reported by `restic snapshots --json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default)]
    pub short_id: String,
    pub time: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

impl Snapshot {
    /// Whether `id` names this snapshot (full id, short id or unique prefix)
    pub fn matches(&self, id: &str) -> bool {
        !id.is_empty() && (self.id.starts_with(id) || self.short_id == id)
    }
}

#[derive(Debug, Deserialize)]
struct BackupMessage {
    message_type: String,
    #[serde(default)]
    snapshot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LsNode {
    struct_type: String,
    #[serde(default)]
    path: Option<String>,
}

/// Exit code restic uses when the repository does not exist
const EXIT_NO_REPOSITORY: i32 = 10;

/// Build the `forget` arguments for a retention policy.
///
/// The newest snapshot always survives (`--keep-last 1`) and zero counts are
/// left out, so an all-zero policy still keeps one snapshot.
pub fn forget_args(policy: &RetentionPolicy) -> Vec<String> {
    let mut args = vec![
        "forget".to_string(),
        "--keep-last".to_string(),
        "1".to_string(),
    ];
    for (flag, count) in [
        ("--keep-hourly", policy.hourly),
        ("--keep-daily", policy.daily),
        ("--keep-weekly", policy.weekly),
        ("--keep-monthly", policy.monthly),
        ("--keep-yearly", policy.yearly),
    ] {
        if count > 0 {
            args.push(flag.to_string());
            args.push(count.to_string());
        }
    }
    args.push("--prune".to_string());
    args
}

/// Restic-backed snapshot store
pub struct ResticStore {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    env: ResticEnv,
    timeout: Duration,
}

impl ResticStore {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        store: &StoreConfig,
        secrets: &dyn SecretResolver,
        timeout: Duration,
    ) -> Result<Self, BackupError> {
        Ok(Self {
            runner,
            binary: store.binary.clone(),
            env: ResticEnv::resolve(store, secrets)?,
            timeout,
        })
    }

    fn spec<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env
            .apply(CommandSpec::new(self.binary.clone()).args(args))
            .timeout(self.timeout)
    }

    fn execute(&self, verb: &str, spec: &CommandSpec) -> Result<CommandOutput, BackupError> {
        self.runner
            .run(spec)
            .map_err(|e| BackupError::SnapshotStore(format!("restic {}: {}", verb, e)))
    }

    fn execute_ok(&self, verb: &str, spec: &CommandSpec) -> Result<CommandOutput, BackupError> {
        let output = self.execute(verb, spec)?;
        if !output.success() {
            return Err(BackupError::SnapshotStore(format!(
                "restic {} failed (exit code {:?}): {}",
                verb,
                output.exit_code,
                spec.redact(output.stderr.trim())
            )));
        }
        Ok(output)
    }
}

impl SnapshotStore for ResticStore {
    fn available(&self) -> bool {
        self.runner.tool_available(&self.binary)
    }

    fn is_initialized(&self) -> Result<bool, BackupError> {
        let spec = self.spec(["cat", "config"]);
        let output = self.execute("cat config", &spec)?;
        if output.success() {
            return Ok(true);
        }

        let stderr = output.stderr.to_lowercase();
        if output.exit_code == Some(EXIT_NO_REPOSITORY)
            || stderr.contains("unable to open config file")
            || stderr.contains("is there a repository at the following location")
        {
            return Ok(false);
        }

        Err(BackupError::SnapshotStore(format!(
            "repository is not reachable: {}",
            spec.redact(output.stderr.trim())
        )))
    }

    fn init(&self) -> Result<(), BackupError> {
        info!("Initializing restic repository...");
        let spec = self.spec(["init"]);
        let output = self.execute("init", &spec)?;

        // Repository might already exist - that's okay
        if output.success() {
            info!("Repository initialized successfully");
            Ok(())
        } else if output.stderr.contains("already initialized")
            || output.stderr.contains("already exists")
        {
            info!("Repository already initialized");
            Ok(())
        } else {
            Err(BackupError::SnapshotStore(format!(
                "failed to initialize repository: {}",
                spec.redact(output.stderr.trim())
            )))
        }
    }

    fn backup(
        &self,
        path: &Path,
        tags: &[String],
        host: Option<&str>,
    ) -> Result<Option<String>, BackupError> {
        info!("Starting restic backup of {:?}", path);

        let mut args = vec!["backup".to_string(), path.display().to_string()];
        for tag in tags {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }
        if let Some(host) = host {
            args.push("--host".to_string());
            args.push(host.to_string());
        }
        args.push("--json".to_string());

        let spec = self.spec(args);
        let output = self.execute_ok("backup", &spec)?;

        let snapshot_id = output
            .stdout_str()
            .lines()
            .filter_map(|line| serde_json::from_str::<BackupMessage>(line).ok())
            .filter(|m| m.message_type == "summary")
            .find_map(|m| m.snapshot_id);

        match snapshot_id {
            Some(ref id) => info!("Backup completed, snapshot {}", id),
            None => warn!("Backup completed but restic did not report a snapshot id"),
        }
        Ok(snapshot_id)
    }

    fn snapshots(&self) -> Result<Vec<Snapshot>, BackupError> {
        debug!("Listing snapshots from repository...");
        let spec = self.spec(["snapshots", "--json"]);
        let output = self.execute_ok("snapshots", &spec)?;

        let snapshots: Vec<Snapshot> = serde_json::from_slice(&output.stdout).map_err(|e| {
            BackupError::SnapshotStore(format!("failed to parse snapshots JSON: {}", e))
        })?;
        debug!("Found {} snapshots", snapshots.len());
        Ok(snapshots)
    }

    fn ls(&self, snapshot_id: &str) -> Result<Vec<String>, BackupError> {
        let spec = self.spec(["ls", snapshot_id, "--json"]);
        let output = self.execute_ok("ls", &spec)?;

        Ok(output
            .stdout_str()
            .lines()
            .filter_map(|line| serde_json::from_str::<LsNode>(line).ok())
            .filter(|n| n.struct_type == "node")
            .filter_map(|n| n.path)
            .collect())
    }

    fn restore(
        &self,
        snapshot_id: &str,
        target: &Path,
        include: &[String],
    ) -> Result<(), BackupError> {
        info!("Restoring from snapshot: {}", snapshot_id);

        let mut args = vec![
            "restore".to_string(),
            snapshot_id.to_string(),
            "--target".to_string(),
            target.display().to_string(),
        ];
        for path in include {
            args.push("--include".to_string());
            args.push(path.clone());
        }

        let spec = self.spec(args);
        self.execute_ok("restore", &spec)?;
        info!("Restore completed successfully");
        Ok(())
    }

    fn forget(&self, policy: &RetentionPolicy) -> Result<(), BackupError> {
        info!("Applying retention policy...");
        let spec = self.spec(forget_args(policy));
        self.execute_ok("forget", &spec)?;
        info!("Retention policy applied successfully");
        Ok(())
    }
}
