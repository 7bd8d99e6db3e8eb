use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use stackvault::config::{self, Config, DEFAULT_CONFIG_PATH};
use stackvault::managers::backup::{BackupManager, BackupScope};
use stackvault::managers::logging::{self, LogGuard, LoggingConfig};
use stackvault::managers::notification::NotificationManager;
use stackvault::managers::report::{Operation, RunReport};
use stackvault::managers::restore::{
    Confirmer, FixedConfirmer, PromptConfirmer, RestoreManager, RestoreOutcome, RestoreRequest,
};
use stackvault::registry::{Engine, Mode, Target, TargetRegistry};
use stackvault::secrets::{EnvSecrets, SecretResolver};
use stackvault::utils::cancel::{install_signal_handler, CancelFlag};
use stackvault::utils::{CommandRunner, RealRunner, ResticStore, SnapshotStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(name = "stackvault")]
#[command(about = "Backup and restore for databases and volumes, stored with restic", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "STACKVAULT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump every enabled target in scope and ingest the results as one snapshot
    Backup {
        /// all, databases, volumes or an engine name
        #[arg(default_value = "all")]
        scope: BackupScope,

        /// Only back up the target with this name
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Inspect snapshots or restore a target from one
    Restore(RestoreArgs),

    /// Edit the target registry
    #[command(subcommand)]
    ManageTargets(TargetCommands),

    /// Validate the configuration and every registry file
    Validate,
}

#[derive(Args)]
#[command(args_conflicts_with_subcommands = true)]
struct RestoreArgs {
    #[command(subcommand)]
    action: Option<RestoreAction>,

    /// Answer the confirmation prompt non-interactively
    #[arg(long)]
    confirm: Option<String>,

    engine: Option<Engine>,

    /// Snapshot id or short id
    snapshot: Option<String>,

    target: Option<String>,

    /// Restore only this database, collection or other unit
    unit: Option<String>,
}

#[derive(Subcommand)]
enum RestoreAction {
    /// List snapshots
    List,

    /// Show a snapshot and the paths it holds
    Show { id: String },

    /// Restore a path from a snapshot into a fresh local directory
    Files {
        id: String,
        path: String,

        /// Destination directory (must be empty or absent)
        #[arg(long)]
        target_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// List targets, optionally for one engine
    List { engine: Option<Engine> },

    /// Show one target
    Show { engine: Engine, name: String },

    /// Register a new target
    Add(AddTargetArgs),

    /// Remove a target
    Remove { engine: Engine, name: String },

    /// Include a target in backups
    Enable { engine: Engine, name: String },

    /// Exclude a target from backups
    Disable { engine: Engine, name: String },
}

#[derive(Args)]
struct AddTargetArgs {
    engine: Engine,
    name: String,

    #[arg(long)]
    mode: Mode,

    /// Register the target disabled
    #[arg(long)]
    disabled: bool,

    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    container: Option<String>,
    #[arg(long)]
    namespace: Option<String>,
    #[arg(long)]
    pod: Option<String>,
    #[arg(long)]
    pod_container: Option<String>,
    #[arg(long)]
    path: Option<PathBuf>,
    #[arg(long)]
    user: Option<String>,

    /// Name of the environment variable holding the credential
    #[arg(long)]
    credential_env: Option<String>,

    #[arg(long, value_delimiter = ',')]
    databases: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    collections: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,
    #[arg(long)]
    custom_format: bool,
    #[arg(long)]
    replica_aware: bool,
    #[arg(long)]
    tls: bool,
    #[arg(long)]
    tls_insecure: bool,
    #[arg(long)]
    auth_database: Option<String>,
    #[arg(long)]
    data_dir: Option<String>,

    /// Command stopping the engine before a raw-file restore (whitespace separated)
    #[arg(long)]
    stop_command: Option<String>,

    /// Command starting the engine afterwards (whitespace separated)
    #[arg(long)]
    start_command: Option<String>,
}

impl AddTargetArgs {
    fn into_target(self) -> Target {
        let mut target = Target::new(self.engine, self.name, self.mode);
        target.enabled = !self.disabled;
        target.host = self.host;
        target.port = self.port;
        target.container = self.container;
        target.namespace = self.namespace;
        target.pod = self.pod;
        target.pod_container = self.pod_container;
        target.path = self.path;
        target.user = self.user;
        target.credential_env = self.credential_env;
        target.options.databases = self.databases;
        target.options.collections = self.collections;
        target.options.tables = self.tables;
        target.options.custom_format = self.custom_format;
        target.options.replica_aware = self.replica_aware;
        target.options.tls = self.tls;
        target.options.tls_insecure = self.tls_insecure;
        target.options.auth_database = self.auth_database;
        target.options.data_dir = self.data_dir;
        target.options.stop_command = self.stop_command.map(split_command);
        target.options.start_command = self.start_command.map(split_command);
        target
    }
}

fn split_command(command: String) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::ManageTargets(command) => {
            logging::init_console_logging();
            let config = config::load_config(&cli.config)?;
            handle_manage_targets(&config, command)?;
            0
        }
        Commands::Validate => {
            logging::init_console_logging();
            handle_validate(&cli.config)?;
            0
        }
        Commands::Backup { scope, target } => {
            let config = config::load_config(&cli.config)?;
            handle_backup(config, scope, target)?
        }
        Commands::Restore(args) => {
            let config = config::load_config(&cli.config)?;
            handle_restore(config, args)?
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

struct Services {
    runner: Arc<dyn CommandRunner>,
    secrets: Arc<dyn SecretResolver>,
    notifier: NotificationManager,
}

impl Services {
    fn real(config: &Config) -> Result<Self> {
        let secrets: Arc<dyn SecretResolver> = Arc::new(EnvSecrets);
        let notifier = NotificationManager::from_config(&config.notifications, secrets.as_ref());
        Ok(Self {
            runner: Arc::new(RealRunner::new()?),
            secrets,
            notifier,
        })
    }

    fn store(&self, config: &Config) -> Result<Arc<dyn SnapshotStore>> {
        let store = ResticStore::new(
            self.runner.clone(),
            &config.store,
            self.secrets.as_ref(),
            config.timeouts.store(),
        )
        .context("Failed to configure snapshot store")?;
        Ok(Arc::new(store))
    }
}

fn handle_backup(config: Config, scope: BackupScope, target: Option<String>) -> Result<i32> {
    let guard = logging::init_run_logging(&LoggingConfig::from_settings(&config.logging), "backup")?;
    let services = Services::real(&config)?;

    let store = match services.store(&config) {
        Ok(store) => store,
        Err(e) => {
            error!("{:#}", e);
            let mut report = RunReport::new(Operation::Backup);
            report.run_failure = Some(format!("{:#}", e));
            report.log_path = Some(guard.path().to_path_buf());
            services.notifier.notify(&report);
            eprintln!("{}", report.summary_line());
            return Ok(report.exit_code());
        }
    };

    let cancel = CancelFlag::new();
    install_signal_handler(cancel.clone())?;

    let manager = BackupManager::new(
        config,
        services.runner,
        store,
        services.secrets,
        services.notifier,
    )
    .with_cancel_flag(cancel)
    .with_log_path(guard.path().to_path_buf());

    let report = manager.run(scope, target.as_deref());
    print_report(&report, &guard);
    Ok(report.exit_code())
}

fn print_report(report: &RunReport, guard: &LogGuard) {
    if report.exit_code() == 0 {
        println!("✓ {}", report.summary_line());
    } else {
        eprintln!("✗ {}", report.summary_line());
        for failure in &report.failures {
            match failure.unit {
                Some(ref unit) => eprintln!("  {}/{}: {}", failure.target, unit, failure.error),
                None => eprintln!("  {}: {}", failure.target, failure.error),
            }
        }
    }
    println!("Log: {}", guard.path().display());
}

fn handle_restore(config: Config, args: RestoreArgs) -> Result<i32> {
    match args.action {
        Some(RestoreAction::List) => {
            logging::init_console_logging();
            let manager = restore_manager(&config, None)?;
            let snapshots = manager.list()?;
            if snapshots.is_empty() {
                println!("No snapshots found");
            }
            for snapshot in snapshots {
                println!(
                    "{}  {}  {}  [{}]",
                    snapshot.short_id,
                    display_time(&snapshot.time),
                    snapshot.hostname,
                    snapshot.tags.join(", ")
                );
            }
            Ok(0)
        }
        Some(RestoreAction::Show { id }) => {
            logging::init_console_logging();
            let manager = restore_manager(&config, None)?;
            let (snapshot, paths) = manager.show(&id)?;
            println!("Snapshot: {}", snapshot.id);
            println!("Time: {}", display_time(&snapshot.time));
            println!("Host: {}", snapshot.hostname);
            println!("Tags: {}", snapshot.tags.join(", "));
            println!();
            for path in &paths {
                println!("  {}", path);
            }
            println!("\nTotal: {} items", paths.len());
            Ok(0)
        }
        Some(RestoreAction::Files { id, path, target_dir }) => {
            let guard =
                logging::init_run_logging(&LoggingConfig::from_settings(&config.logging), "restore")?;
            let manager = restore_manager(&config, Some(&guard))?;
            let dest = manager.files(&id, &path, target_dir)?;
            println!("✓ Restored {} to {}", path, dest.display());
            Ok(0)
        }
        None => {
            let (engine, snapshot, target) = match (args.engine, args.snapshot, args.target) {
                (Some(engine), Some(snapshot), Some(target)) => (engine, snapshot, target),
                _ => anyhow::bail!(
                    "usage: restore [--confirm <answer>] <engine> <snapshot> <target> [<unit>]"
                ),
            };
            let request = RestoreRequest {
                engine,
                snapshot,
                target,
                unit: args.unit,
            };

            let guard =
                logging::init_run_logging(&LoggingConfig::from_settings(&config.logging), "restore")?;
            let manager = restore_manager(&config, Some(&guard))?;
            let confirmer: Box<dyn Confirmer> = match args.confirm {
                Some(answer) => Box::new(FixedConfirmer(answer)),
                None => Box::new(PromptConfirmer),
            };

            match manager.restore_target(&request, confirmer.as_ref())? {
                RestoreOutcome::Restored(report) => {
                    print_report(&report, &guard);
                    Ok(report.exit_code())
                }
                RestoreOutcome::Cancelled => {
                    println!("Restore cancelled. Nothing was changed.");
                    Ok(0)
                }
            }
        }
    }
}

fn restore_manager(config: &Config, guard: Option<&LogGuard>) -> Result<RestoreManager> {
    let services = Services::real(config)?;
    let store = services.store(config)?;
    let manager = RestoreManager::new(
        config.clone(),
        services.runner,
        store,
        services.secrets,
        services.notifier,
    );
    Ok(match guard {
        Some(guard) => manager.with_log_path(guard.path().to_path_buf()),
        None => manager,
    })
}

/// `2024-03-09T02:30:00.123+00:00` -> `2024-03-09 02:30:00`
fn display_time(time: &str) -> String {
    match time.split_once('T') {
        Some((date, rest)) => {
            let clock = rest.split(['.', '+', 'Z']).next().unwrap_or(rest);
            format!("{} {}", date, clock)
        }
        None => time.to_string(),
    }
}

fn handle_manage_targets(config: &Config, command: TargetCommands) -> Result<()> {
    let registry = TargetRegistry::new(&config.paths.registry_dir);

    match command {
        TargetCommands::List { engine } => {
            let engines = match engine {
                Some(engine) => vec![engine],
                None => Engine::ALL.to_vec(),
            };
            for engine in engines {
                let targets = registry.load(engine)?;
                if targets.is_empty() {
                    continue;
                }
                println!("{}:", engine);
                for target in targets {
                    println!(
                        "  {:<24} {:<13} {}",
                        target.name,
                        target.mode,
                        if target.enabled { "enabled" } else { "disabled" }
                    );
                }
            }
        }
        TargetCommands::Show { engine, name } => {
            let target = registry.find(engine, &name)?;
            let rendered = toml::to_string_pretty(&target).context("Failed to render target")?;
            println!("{}", rendered.trim_end());
            println!("# units: {}", target.logical_units().join(", "));
        }
        TargetCommands::Add(args) => {
            let target = args.into_target();
            let id = target.id();
            registry.add_target(target)?;
            println!("✓ Added {}", id);
        }
        TargetCommands::Remove { engine, name } => {
            let removed = registry.remove_target(engine, &name)?;
            println!("✓ Removed {}", removed.id());
        }
        TargetCommands::Enable { engine, name } => {
            registry.set_enabled(engine, &name, true)?;
            println!("✓ Enabled {}/{}", engine, name);
        }
        TargetCommands::Disable { engine, name } => {
            registry.set_enabled(engine, &name, false)?;
            println!("✓ Disabled {}/{}", engine, name);
        }
    }

    Ok(())
}

fn handle_validate(path: &std::path::Path) -> Result<()> {
    let config = config::load_config(path)?;
    let registry = TargetRegistry::new(&config.paths.registry_dir);

    let mut total = 0;
    let mut enabled = 0;
    for engine in Engine::ALL {
        let targets = registry
            .load(engine)
            .with_context(|| format!("Invalid registry file {:?}", registry.file_path(engine)))?;
        for target in &targets {
            target
                .validate()
                .with_context(|| format!("Invalid target {}", target.id()))?;
        }
        total += targets.len();
        enabled += targets.iter().filter(|t| t.enabled).count();
    }

    println!("Configuration is valid!");
    println!("Repository: {}", config.store.repository);
    println!("Targets: {} ({} enabled)", total, enabled);
    Ok(())
}
