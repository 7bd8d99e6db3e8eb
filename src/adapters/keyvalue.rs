//! Redis: background save, wait for the engine to report it finished, copy the RDB file

use super::{gunzip_file, gzip_file, local_io_error, scratch_beside, AdapterContext, EngineAdapter, Lifecycle};
use crate::backends::Invocation;
use crate::error::BackupError;
use crate::registry::{Engine, Mode, Target};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

const DEFAULT_DATA_DIR: &str = "/data";
const RDB_FILE: &str = "dump.rdb";

pub struct KeyValueAdapter;

/// Parsed `INFO persistence` reply
struct Persistence(HashMap<String, String>);

impl Persistence {
    fn parse(text: &str) -> Self {
        let fields = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self(fields)
    }

    fn last_save(&self) -> Option<i64> {
        self.0.get("rdb_last_save_time").and_then(|v| v.parse().ok())
    }

    fn in_progress(&self) -> bool {
        self.0.get("rdb_bgsave_in_progress").map(String::as_str) == Some("1")
    }

    fn failed(&self) -> bool {
        self.0.get("rdb_last_bgsave_status").map(String::as_str) == Some("err")
    }
}

impl KeyValueAdapter {
    fn data_file(&self, target: &Target) -> String {
        let dir = match target.mode {
            Mode::Path => target
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            _ => target
                .options
                .data_dir
                .clone()
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        };
        format!("{}/{}", dir.trim_end_matches('/'), RDB_FILE)
    }

    fn cli(&self, ctx: &AdapterContext, target: &Target, command: &[&str]) -> Result<String, BackupError> {
        let mut argv = vec!["redis-cli".to_string()];
        if let Some(ref host) = target.host {
            argv.push("-h".to_string());
            argv.push(host.clone());
        }
        if let Some(port) = target.port {
            argv.push("-p".to_string());
            argv.push(port.to_string());
        }
        if let Some(ref user) = target.user {
            argv.push("--user".to_string());
            argv.push(user.clone());
        }
        argv.extend(command.iter().map(|s| s.to_string()));

        let mut invocation = Invocation::new(argv);
        if let Some(password) = ctx.credential(target)? {
            invocation = invocation.env("REDISCLI_AUTH", password);
        }
        let stdout = ctx.backend.exec(invocation)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn persistence(&self, ctx: &AdapterContext, target: &Target) -> Result<Persistence, BackupError> {
        Ok(Persistence::parse(&self.cli(ctx, target, &["INFO", "persistence"])?))
    }

    fn failure(&self, target: &Target, message: String) -> BackupError {
        BackupError::ExecutionFailed {
            target: target.id(),
            backend: target.mode,
            exit_code: None,
            stderr: message,
        }
    }

    /// Trigger BGSAVE and block until the engine reports a newer completed save
    fn background_save(&self, ctx: &AdapterContext, target: &Target) -> Result<(), BackupError> {
        let before = self.persistence(ctx, target)?.last_save();

        let reply = self.cli(ctx, target, &["BGSAVE"])?;
        if reply.starts_with("ERR") && !reply.contains("in progress") {
            return Err(self.failure(target, format!("BGSAVE rejected: {}", reply.trim())));
        }

        let started = Instant::now();
        let mut saw_running = false;
        loop {
            let state = self.persistence(ctx, target)?;
            if state.in_progress() {
                saw_running = true;
            } else {
                if state.failed() {
                    return Err(self.failure(target, "background save reported status err".to_string()));
                }
                let advanced = match (before, state.last_save()) {
                    (Some(before), Some(now)) => now > before,
                    (None, Some(_)) => true,
                    _ => false,
                };
                if advanced || saw_running {
                    debug!("Background save for {} finished after {:?}", target.id(), started.elapsed());
                    return Ok(());
                }
            }

            if started.elapsed() >= ctx.settle.timeout {
                return Err(self.failure(
                    target,
                    format!("background save did not finish within {:?}", ctx.settle.timeout),
                ));
            }
            std::thread::sleep(ctx.settle.poll);
        }
    }
}

impl EngineAdapter for KeyValueAdapter {
    fn engine(&self) -> Engine {
        Engine::KeyValue
    }

    fn client_tools(&self, _target: &Target) -> Vec<&'static str> {
        vec!["redis-cli"]
    }

    fn artifact_name(&self, _target: &Target, _unit: &str) -> String {
        format!("{}.gz", RDB_FILE)
    }

    fn check_mode(&self, target: &Target) -> Result<(), BackupError> {
        if target.mode == Mode::Network {
            return Err(BackupError::unsupported(
                target.engine,
                target.mode,
                "the RDB file cannot be copied from a remote server",
            ));
        }
        Ok(())
    }

    fn check_restore(&self, target: &Target) -> Result<(), BackupError> {
        self.check_mode(target)?;
        if !Lifecycle::NONE.available(target, target.mode == Mode::Container) {
            return Err(BackupError::unsupported(
                target.engine,
                target.mode,
                "restoring the RDB file needs options.stop_command and options.start_command",
            ));
        }
        Ok(())
    }

    fn dump(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        dest: &Path,
    ) -> Result<(), BackupError> {
        self.check_mode(target)?;
        info!("Saving Redis {} ({})", target.id(), unit);

        self.background_save(ctx, target)?;

        let scratch = scratch_beside(target, dest)?;
        let local = scratch.path().join(RDB_FILE);
        ctx.backend.copy_out(&self.data_file(target), &local)?;
        gzip_file(&local, dest).map_err(|e| local_io_error(target, "compress RDB file", e))
    }

    fn restore(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        _unit: &str,
        artifact: &Path,
    ) -> Result<(), BackupError> {
        self.check_restore(target)?;
        info!("Restoring Redis {} from {:?}", target.id(), artifact);

        let scratch = scratch_beside(target, artifact)?;
        let local = scratch.path().join(RDB_FILE);
        gunzip_file(artifact, &local).map_err(|e| local_io_error(target, "decompress RDB file", e))?;

        let remote = self.data_file(target);
        Lifecycle::NONE.with_engine_stopped(ctx, target, || ctx.backend.copy_in(&local, &remote))
    }
}
