//! Restore manager - snapshot inspection and target restores
//!
//! Listing and inspection never change anything. A target restore pulls only
//! that target's staged subtree out of the snapshot into a scratch directory,
//! finds every expected artifact, and asks for the confirmation literal before
//! the first mutating command.

use crate::adapters::{AdapterContext, AdapterRegistry, SettleWindow};
use crate::backends;
use crate::config::Config;
use crate::managers::notification::NotificationManager;
use crate::managers::report::{Operation, RunReport};
use crate::registry::{Engine, Mode, Target, TargetRegistry};
use crate::secrets::SecretResolver;
use crate::utils::executor::CommandRunner;
use crate::utils::locker::FileLock;
use crate::utils::restic_ops::{Snapshot, SnapshotStore};
use crate::utils::staging::{locate_artifact, run_stamp, StagingArea};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// The operator must type exactly this before live data is overwritten
pub const CONFIRMATION_LITERAL: &str = "yes";

/// Source of the operator's answer to the confirmation prompt
pub trait Confirmer {
    fn ask(&self, prompt: &str) -> Result<String>;
}

/// Interactive prompt on the terminal
pub struct PromptConfirmer;

impl Confirmer for PromptConfirmer {
    fn ask(&self, prompt: &str) -> Result<String> {
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .context("Failed to read confirmation")
    }
}

/// A pre-supplied answer (`--confirm`, tests)
pub struct FixedConfirmer(pub String);

impl Confirmer for FixedConfirmer {
    fn ask(&self, prompt: &str) -> Result<String> {
        info!("{} [answered: {}]", prompt, self.0);
        Ok(self.0.clone())
    }
}

pub fn is_confirmed(answer: &str) -> bool {
    answer.trim() == CONFIRMATION_LITERAL
}

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub engine: Engine,
    pub snapshot: String,
    pub target: String,
    /// One logical unit, or every unit of the target
    pub unit: Option<String>,
}

#[derive(Debug)]
pub enum RestoreOutcome {
    Restored(RunReport),
    /// The confirmation literal was not given; nothing was changed
    Cancelled,
}

pub struct RestoreManager {
    config: Config,
    registry: TargetRegistry,
    adapters: AdapterRegistry,
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn SnapshotStore>,
    secrets: Arc<dyn SecretResolver>,
    notifier: NotificationManager,
    log_path: Option<PathBuf>,
}

impl RestoreManager {
    pub fn new(
        config: Config,
        runner: Arc<dyn CommandRunner>,
        store: Arc<dyn SnapshotStore>,
        secrets: Arc<dyn SecretResolver>,
        notifier: NotificationManager,
    ) -> Self {
        Self {
            registry: TargetRegistry::new(&config.paths.registry_dir),
            adapters: AdapterRegistry::standard(),
            config,
            runner,
            store,
            secrets,
            notifier,
            log_path: None,
        }
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_log_path(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }

    fn staging(&self) -> StagingArea {
        StagingArea::new(&self.config.paths.staging_dir)
    }

    /// All snapshots, oldest first
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = self.store.snapshots().context("Failed to list snapshots")?;
        snapshots.sort_by(|a, b| a.time.cmp(&b.time));
        Ok(snapshots)
    }

    /// Find a snapshot by full id, id prefix or short id
    pub fn resolve_snapshot(&self, id: &str) -> Result<Snapshot> {
        let matches: Vec<Snapshot> = self
            .store
            .snapshots()
            .context("Failed to list snapshots")?
            .into_iter()
            .filter(|s| s.matches(id))
            .collect();
        match matches.len() {
            0 => anyhow::bail!("no snapshot matches '{}'", id),
            1 => Ok(matches.into_iter().next().context("snapshot vanished")?),
            n => anyhow::bail!("'{}' is ambiguous ({} snapshots match)", id, n),
        }
    }

    /// Snapshot metadata plus the paths recorded in it
    pub fn show(&self, id: &str) -> Result<(Snapshot, Vec<String>)> {
        let snapshot = self.resolve_snapshot(id)?;
        let paths = self
            .store
            .ls(&snapshot.id)
            .with_context(|| format!("Failed to list contents of {}", snapshot.short_id))?;
        Ok((snapshot, paths))
    }

    /// Restore an arbitrary path from a snapshot into a fresh local directory
    pub fn files(&self, id: &str, path: &str, target_dir: Option<PathBuf>) -> Result<PathBuf> {
        let snapshot = self.resolve_snapshot(id)?;
        let dest = target_dir.unwrap_or_else(|| {
            self.config
                .paths
                .scratch_dir
                .join(format!("files-{}-{}", snapshot.short_id, run_stamp(Utc::now())))
        });
        ensure_empty_dir(&dest)?;

        info!("Restoring {} from snapshot {} into {:?}", path, snapshot.short_id, dest);
        self.store
            .restore(&snapshot.id, &dest, &[path.to_string()])
            .context("Snapshot restore failed")?;
        Ok(dest)
    }

    /// Restore one target (or one of its units) from a snapshot
    pub fn restore_target(
        &self,
        request: &RestoreRequest,
        confirmer: &dyn Confirmer,
    ) -> Result<RestoreOutcome> {
        let started = Instant::now();

        let target = self
            .registry
            .find(request.engine, &request.target)
            .context("Failed to resolve restore target")?;
        let adapter = self.adapters.get(target.engine)?;
        adapter.check_restore(&target)?;

        let units = match request.unit {
            Some(ref unit) => {
                if !target.logical_units().contains(unit) {
                    anyhow::bail!(
                        "{} has no unit '{}' (units: {})",
                        target.id(),
                        unit,
                        target.logical_units().join(", ")
                    );
                }
                vec![unit.clone()]
            }
            None => target.logical_units(),
        };

        let backend = backends::for_target(&target, self.runner.clone(), self.config.timeouts.command())?;
        let missing = self.missing_tools(&target, adapter.client_tools(&target), backend.required_tools());
        if !missing.is_empty() {
            anyhow::bail!("required tool(s) not found: {}", missing.join(", "));
        }

        let snapshot = self.resolve_snapshot(&request.snapshot)?;

        fs::create_dir_all(&self.config.paths.scratch_dir).with_context(|| {
            format!("Failed to create scratch directory {:?}", self.config.paths.scratch_dir)
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("restore-")
            .tempdir_in(&self.config.paths.scratch_dir)
            .context("Failed to create scratch directory")?;

        let staging = self.staging();
        let include = staging.include_pattern(target.engine, &target.name, request.unit.as_deref());
        info!(
            "Extracting {} from snapshot {} into {:?}",
            include,
            snapshot.short_id,
            scratch.path()
        );
        self.store
            .restore(&snapshot.id, scratch.path(), &[include])
            .context("Snapshot restore failed")?;

        let mut artifacts = Vec::new();
        for unit in &units {
            let artifact = locate_artifact(
                scratch.path(),
                &staging,
                target.engine,
                &target.name,
                unit,
                &adapter.artifact_name(&target, unit),
            )?;
            artifacts.push((unit.clone(), artifact));
        }

        let mut lock = FileLock::for_target(&self.config.paths.lock_dir, &target.id())?;
        let _guard = lock.try_acquire(&target.id())?;

        let prompt = format!(
            "Restore {} ({}) from snapshot {} ({})? Live data will be overwritten. Type '{}' to continue",
            target.id(),
            units.join(", "),
            snapshot.short_id,
            snapshot.time,
            CONFIRMATION_LITERAL
        );
        if !is_confirmed(&confirmer.ask(&prompt)?) {
            info!("Restore of {} cancelled; nothing was changed", target.id());
            return Ok(RestoreOutcome::Cancelled);
        }

        let ctx = AdapterContext {
            backend: backend.as_ref(),
            secrets: self.secrets.as_ref(),
            settle: SettleWindow {
                timeout: self.config.timeouts.settle(),
                poll: self.config.timeouts.settle_poll(),
            },
            http_timeout: self.config.timeouts.command(),
        };

        let mut report = RunReport::new(Operation::Restore);
        report.log_path = self.log_path.clone();
        report.snapshot_id = Some(snapshot.id.clone());
        for (unit, artifact) in &artifacts {
            info!("Restoring {}/{} from {:?}", target.id(), unit, artifact);
            match adapter.restore(&ctx, &target, unit, artifact) {
                Ok(()) => report.record_success(&target.id(), unit),
                Err(e) => {
                    error!("{}/{} restore failed: {}", target.id(), unit, e);
                    report.record_failure(&target.id(), Some(unit.as_str()), &e);
                    break;
                }
            }
        }
        report.duration = started.elapsed();

        self.notifier.notify(&report);
        info!("{}", report.summary_line());

        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch directory: {}", e);
        }

        if report.failures.is_empty() {
            Ok(RestoreOutcome::Restored(report))
        } else {
            anyhow::bail!("{}", report.summary_line())
        }
    }

    fn missing_tools(
        &self,
        target: &Target,
        client: Vec<&'static str>,
        transport: Vec<&'static str>,
    ) -> Vec<&'static str> {
        let mut tools = transport;
        if matches!(target.mode, Mode::Network | Mode::Path) {
            tools.extend(client);
        }
        tools
            .into_iter()
            .filter(|tool| !self.runner.tool_available(tool))
            .collect()
    }
}

fn ensure_empty_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        let occupied = fs::read_dir(dir)
            .with_context(|| format!("Failed to read {:?}", dir))?
            .next()
            .is_some();
        if occupied {
            anyhow::bail!("{:?} is not empty", dir);
        }
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))
}
