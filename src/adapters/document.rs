//! MongoDB: archive-format mongodump / mongorestore
//!
//! The password never goes on argv. It is written to a private YAML file read
//! through `--config`; when the client runs inside the target the file is
//! copied in first and removed afterwards.

use super::{local_io_error, AdapterContext, EngineAdapter};
use crate::backends::Invocation;
use crate::error::BackupError;
use crate::registry::{Engine, Mode, Target};
use crate::utils::executor::{StdinSource, StdoutSink};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Unit name for a dump covering every database
pub const ALL_DATABASES: &str = "all";

/// `--config` file holding the client password
struct PasswordFile {
    /// Created owner-only (0600)
    local: NamedTempFile,
    /// Path inside the container or pod, when the client runs there
    remote: Option<String>,
}

impl PasswordFile {
    fn stage(ctx: &AdapterContext, target: &Target, password: &str) -> Result<Self, BackupError> {
        let mut local = tempfile::Builder::new()
            .prefix("stackvault-mongo-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| local_io_error(target, "create client config", e))?;
        writeln!(local, "password: {}", yaml_quote(password))
            .and_then(|()| local.flush())
            .map_err(|e| local_io_error(target, "write client config", e))?;

        let remote = match target.mode {
            Mode::Container | Mode::Orchestrated => {
                let name = local
                    .path()
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "stackvault-mongo.yaml".to_string());
                let remote = format!("/tmp/{}", name);
                ctx.backend.copy_in(local.path(), &remote)?;
                Some(remote)
            }
            Mode::Network | Mode::Path => None,
        };
        Ok(Self { local, remote })
    }

    fn client_path(&self) -> String {
        match self.remote {
            Some(ref remote) => remote.clone(),
            None => self.local.path().display().to_string(),
        }
    }

    /// Best effort; the local copy goes with `self`
    fn remove(self, ctx: &AdapterContext) {
        if let Some(remote) = self.remote {
            if let Err(e) = ctx.backend.exec(Invocation::new(["rm", "-f", remote.as_str()])) {
                warn!("Failed to remove client config {}: {}", remote, e);
            }
        }
    }
}

/// Single-quoted YAML scalar
fn yaml_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub struct DocumentAdapter;

impl DocumentAdapter {
    fn argv(
        &self,
        target: &Target,
        program: &str,
        config: Option<String>,
        extra: &[String],
    ) -> Vec<String> {
        let mut argv = vec![
            program.to_string(),
            "--archive".to_string(),
            "--gzip".to_string(),
        ];
        if let Some(config) = config {
            argv.push(format!("--config={}", config));
        }

        let host = match target.mode {
            Mode::Path => target.path.as_ref().map(|p| p.display().to_string()),
            _ => target.host.clone(),
        };
        if let Some(host) = host {
            argv.push(format!("--host={}", host));
        }
        if let Some(port) = target.port {
            argv.push(format!("--port={}", port));
        }
        if let Some(ref user) = target.user {
            argv.push(format!("--username={}", user));
        }
        if let Some(ref auth_db) = target.options.auth_database {
            argv.push(format!("--authenticationDatabase={}", auth_db));
        }
        if target.options.tls {
            argv.push("--tls".to_string());
        }
        if target.options.tls_insecure {
            argv.push("--tlsInsecure".to_string());
        }
        argv.extend(extra.iter().cloned());
        argv
    }

    /// Run one client command, staging the password file around it
    fn run_client(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        program: &str,
        extra: &[String],
        io: impl FnOnce(Invocation) -> Invocation,
    ) -> Result<(), BackupError> {
        let config = match ctx.credential(target)? {
            Some(password) => Some(PasswordFile::stage(ctx, target, &password)?),
            None => None,
        };
        let argv = self.argv(target, program, config.as_ref().map(PasswordFile::client_path), extra);

        let result = ctx.backend.exec(io(Invocation::new(argv)));
        if let Some(config) = config {
            config.remove(ctx);
        }
        result.map(|_| ())
    }
}

impl EngineAdapter for DocumentAdapter {
    fn engine(&self) -> Engine {
        Engine::Document
    }

    fn client_tools(&self, _target: &Target) -> Vec<&'static str> {
        vec!["mongodump", "mongorestore"]
    }

    fn artifact_name(&self, _target: &Target, unit: &str) -> String {
        format!("{}.archive.gz", unit)
    }

    fn dump(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        dest: &Path,
    ) -> Result<(), BackupError> {
        info!("Dumping MongoDB {} from {}", unit, target.id());

        let mut extra = Vec::new();
        if unit != ALL_DATABASES {
            extra.push(format!("--db={}", unit));
        }
        if target.options.replica_aware {
            extra.push("--readPreference=secondaryPreferred".to_string());
        }

        self.run_client(ctx, target, "mongodump", &extra, |invocation| {
            invocation.stdout(StdoutSink::File(dest.to_path_buf()))
        })
    }

    fn restore(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        artifact: &Path,
    ) -> Result<(), BackupError> {
        info!("Restoring MongoDB {} on {}", unit, target.id());

        let mut extra = vec!["--drop".to_string()];
        if unit != ALL_DATABASES {
            extra.push(format!("--nsInclude={}.*", unit));
        }

        self.run_client(ctx, target, "mongorestore", &extra, |invocation| {
            invocation.stdin(StdinSource::File(artifact.to_path_buf()))
        })
    }
}
