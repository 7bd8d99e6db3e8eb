//! Backup manager - orchestrates one backup run
//!
//! `Idle → Preflight → PerEngineDump → Stage → Snapshot → Retain → Cleanup → Notify`
//!
//! Target failures are collected in the [`RunReport`], never thrown; only
//! preflight, snapshot and retention failures fail the run as a whole.

use crate::adapters::{AdapterContext, AdapterRegistry, EngineAdapter, SettleWindow};
use crate::backends;
use crate::config::Config;
use crate::error::BackupError;
use crate::managers::logging::expire_run_logs;
use crate::managers::notification::NotificationManager;
use crate::managers::report::{Operation, RunReport};
use crate::registry::{Engine, Mode, Target, TargetRegistry};
use crate::secrets::SecretResolver;
use crate::utils::executor::CommandRunner;
use crate::utils::locker::FileLock;
use crate::utils::restic_ops::SnapshotStore;
use crate::utils::staging::{finalize_artifact, partial_path, run_stamp, StagingArea};
use crate::utils::CancelFlag;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Tag on every snapshot this tool creates
pub const AUTOMATED_TAG: &str = "automated";

/// Which targets a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupScope {
    All,
    Databases,
    Volumes,
    Engine(Engine),
}

impl BackupScope {
    pub fn engines(&self) -> Vec<Engine> {
        Engine::ALL
            .into_iter()
            .filter(|engine| match self {
                BackupScope::All => true,
                BackupScope::Databases => engine.is_database(),
                BackupScope::Volumes => !engine.is_database(),
                BackupScope::Engine(only) => engine == only,
            })
            .collect()
    }
}

impl FromStr for BackupScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(BackupScope::All),
            "databases" => Ok(BackupScope::Databases),
            "volumes" => Ok(BackupScope::Volumes),
            other => other.parse().map(BackupScope::Engine),
        }
    }
}

impl fmt::Display for BackupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupScope::All => write!(f, "all"),
            BackupScope::Databases => write!(f, "databases"),
            BackupScope::Volumes => write!(f, "volumes"),
            BackupScope::Engine(engine) => write!(f, "{}", engine),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Preflight,
    PerEngineDump,
    Stage,
    Snapshot,
    Retain,
    Cleanup,
    Notify,
}

pub struct BackupManager {
    config: Config,
    registry: TargetRegistry,
    adapters: AdapterRegistry,
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn SnapshotStore>,
    secrets: Arc<dyn SecretResolver>,
    notifier: NotificationManager,
    cancel: CancelFlag,
    log_path: Option<PathBuf>,
}

impl BackupManager {
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
            cancel: CancelFlag::new(),
            log_path: None,
        }
    }

    /// Stop starting new targets and units once this flag is set
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    /// Recorded in the run report
    pub fn with_log_path(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }

    fn enter(&self, phase: RunPhase) {
        debug!("Backup phase: {:?}", phase);
    }

    /// Run a backup for `scope`, optionally narrowed to one target name
    pub fn run(&self, scope: BackupScope, target_name: Option<&str>) -> RunReport {
        let started = Instant::now();
        let now = Utc::now();
        let stamp = run_stamp(now);
        let staging = StagingArea::new(&self.config.paths.staging_dir);

        let mut report = RunReport::new(Operation::Backup);
        report.log_path = self.log_path.clone();

        info!("Starting backup run (scope: {})", scope);

        self.enter(RunPhase::Preflight);
        match self.preflight(scope, target_name, &staging) {
            Ok(targets) => {
                self.enter(RunPhase::PerEngineDump);
                self.dump_targets(&targets, &staging, &stamp, &mut report);

                if report.cancelled {
                    warn!("Run cancelled; skipping snapshot and retention");
                } else if report.run_failure.is_some() {
                    warn!("Run failed during dumps; skipping snapshot and retention");
                } else if !staging.has_artifacts() {
                    info!("Nothing was staged; skipping snapshot and retention");
                } else {
                    self.enter(RunPhase::Snapshot);
                    let date_tag = format!("date:{}", now.format("%Y-%m-%d"));
                    match self.snapshot(&staging, date_tag) {
                        Ok(id) => {
                            report.snapshot_id = id;
                            self.enter(RunPhase::Retain);
                            if let Err(e) = self.store.forget(&self.config.retention) {
                                error!("Retention failed: {}", e);
                                report.run_failure = Some(format!("retention: {}", e));
                            }
                        }
                        Err(e) => {
                            error!("Snapshot failed: {}", e);
                            report.run_failure = Some(format!("snapshot: {}", e));
                        }
                    }
                }
            }
            Err(e) => {
                error!("Preflight failed: {:#}", e);
                report.run_failure = Some(format!("preflight: {:#}", e));
            }
        }

        self.enter(RunPhase::Cleanup);
        self.cleanup(&staging);

        report.duration = started.elapsed();

        self.enter(RunPhase::Notify);
        self.notifier.notify(&report);

        info!("{}", report.summary_line());
        self.enter(RunPhase::Idle);
        report
    }

    /// Load targets and make sure the store is usable
    fn preflight(
        &self,
        scope: BackupScope,
        target_name: Option<&str>,
        staging: &StagingArea,
    ) -> Result<Vec<Target>> {
        let mut targets = Vec::new();
        for engine in scope.engines() {
            let listed = self
                .registry
                .list_targets(engine)
                .with_context(|| format!("Failed to load {} targets", engine))?;
            targets.extend(listed);
        }

        if let Some(name) = target_name {
            targets.retain(|t| t.name == name);
            if targets.is_empty() {
                let disabled = scope
                    .engines()
                    .into_iter()
                    .any(|engine| self.registry.find(engine, name).is_ok());
                if !disabled {
                    anyhow::bail!("no target named '{}' in scope {}", name, scope);
                }
                info!("Target '{}' is disabled, nothing to back up", name);
            }
        }

        if !self.store.available() {
            anyhow::bail!("restic binary '{}' not found", self.config.store.binary);
        }
        if !self.store.is_initialized().context("Snapshot store is not reachable")? {
            info!("Initializing snapshot repository");
            self.store.init().context("Failed to initialize snapshot repository")?;
        }

        staging
            .prepare()
            .with_context(|| format!("Failed to prepare staging tree {:?}", staging.root()))?;

        info!("Preflight passed: {} target(s) to back up", targets.len());
        Ok(targets)
    }

    fn dump_targets(
        &self,
        targets: &[Target],
        staging: &StagingArea,
        stamp: &str,
        report: &mut RunReport,
    ) {
        for target in targets {
            if self.cancel.is_cancelled() {
                warn!("Cancellation requested; not starting {}", target.id());
                report.cancelled = true;
                break;
            }

            if let Err(e) = self.dump_target(target, staging, stamp, report) {
                error!("{}: {}", target.id(), e);
                let fatal = e.is_run_fatal();
                report.record_failure(&target.id(), None, &e);
                if fatal {
                    report.run_failure = Some(e.to_string());
                    break;
                }
            }
        }
    }

    /// Dump every logical unit of one target; unit failures go straight into the report
    fn dump_target(
        &self,
        target: &Target,
        staging: &StagingArea,
        stamp: &str,
        report: &mut RunReport,
    ) -> std::result::Result<(), BackupError> {
        let adapter = self.adapters.get(target.engine)?;
        adapter.check_mode(target)?;

        if let Err(e) = self.secrets.resolve_optional(target.credential_env.as_deref()) {
            return Err(BackupError::MissingCredential {
                target: target.id(),
                detail: match e {
                    BackupError::Configuration(detail) => detail,
                    other => other.to_string(),
                },
            });
        }

        let backend = backends::for_target(target, self.runner.clone(), self.config.timeouts.command())?;
        self.check_tools(target, adapter, backend.required_tools())?;

        let mut lock = FileLock::for_target(&self.config.paths.lock_dir, &target.id())
            .map_err(|e| busy(target, e))?;
        let _guard = lock
            .try_acquire(&target.id())
            .map_err(|e| busy(target, e))?;

        let ctx = AdapterContext {
            backend: backend.as_ref(),
            secrets: self.secrets.as_ref(),
            settle: SettleWindow {
                timeout: self.config.timeouts.settle(),
                poll: self.config.timeouts.settle_poll(),
            },
            http_timeout: self.config.timeouts.command(),
        };

        for unit in target.logical_units() {
            if self.cancel.is_cancelled() {
                warn!("Cancellation requested; not dumping {}/{}", target.id(), unit);
                report.cancelled = true;
                break;
            }

            info!("Dumping {}/{}", target.id(), unit);
            let dir = staging.unit_dir(target.engine, &target.name, &unit, stamp);
            if let Err(e) = fs::create_dir_all(&dir) {
                error!("{}/{}: cannot create staging directory {:?}: {}", target.id(), unit, dir, e);
                report.record_failure(
                    &target.id(),
                    Some(unit.as_str()),
                    format!("cannot create staging directory {:?}: {}", dir, e),
                );
                continue;
            }

            let artifact = dir.join(adapter.artifact_name(target, &unit));
            let partial = partial_path(&artifact);

            self.enter(RunPhase::Stage);
            let staged = adapter
                .dump(&ctx, target, &unit, &partial)
                .and_then(|()| finalize_artifact(&target.id(), &artifact));
            match staged {
                Ok(size) => {
                    info!("Staged {:?} ({} bytes)", artifact, size);
                    report.record_success(&target.id(), &unit);
                }
                Err(e) => {
                    error!("{}/{} failed: {}", target.id(), unit, e);
                    let _ = fs::remove_file(&partial);
                    let _ = fs::remove_dir(&dir);
                    report.record_failure(&target.id(), Some(unit.as_str()), &e);
                }
            }
            self.enter(RunPhase::PerEngineDump);
        }
        Ok(())
    }

    /// Transport tools everywhere, native clients where they run on this host
    fn check_tools(
        &self,
        target: &Target,
        adapter: &dyn EngineAdapter,
        transport: Vec<&'static str>,
    ) -> std::result::Result<(), BackupError> {
        let mut tools = transport;
        if matches!(target.mode, Mode::Network | Mode::Path) {
            tools.extend(adapter.client_tools(target));
        }
        let missing: Vec<&str> = tools
            .into_iter()
            .filter(|tool| !self.runner.tool_available(tool))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BackupError::ExecutionFailed {
                target: target.id(),
                backend: target.mode,
                exit_code: None,
                stderr: format!("required tool(s) not found: {}", missing.join(", ")),
            })
        }
    }

    fn snapshot(
        &self,
        staging: &StagingArea,
        date_tag: String,
    ) -> std::result::Result<Option<String>, BackupError> {
        let tags = vec![AUTOMATED_TAG.to_string(), date_tag];
        let id = self
            .store
            .backup(staging.root(), &tags, self.config.store.host.as_deref())?;
        match id {
            Some(ref id) => info!("Created snapshot {}", id),
            None => info!("Created snapshot"),
        }
        Ok(id)
    }

    /// Never affects the run's status
    fn cleanup(&self, staging: &StagingArea) {
        if let Err(e) = staging.cleanup() {
            warn!("Failed to remove staging tree {:?}: {}", staging.root(), e);
        }

        let log_dir = &self.config.logging.log_directory;
        if log_dir.is_dir() {
            match expire_run_logs(log_dir, self.config.logging.log_retention_days) {
                Ok(0) => {}
                Ok(removed) => info!("Expired {} old run log(s)", removed),
                Err(e) => warn!("Failed to expire run logs: {:#}", e),
            }
        }
    }
}

fn busy(target: &Target, err: anyhow::Error) -> BackupError {
    BackupError::ExecutionFailed {
        target: target.id(),
        backend: target.mode,
        exit_code: None,
        stderr: format!("{:#}", err),
    }
}
