use super::{connection_flags, AdapterContext, EngineAdapter};
use crate::backends::Invocation;
use crate::error::BackupError;
use crate::registry::{Engine, Mode, Target};
use crate::utils::executor::{StdinSource, StdoutSink};
use std::path::Path;
use tracing::info;

pub struct MysqlAdapter;

impl MysqlAdapter {
    fn connection(&self, target: &Target) -> Vec<String> {
        // Path mode talks over the socket file rather than a host name
        if target.mode == Mode::Path {
            let mut flags = Vec::new();
            if let Some(ref path) = target.path {
                flags.push(format!("--socket={}", path.display()));
            }
            flags.push("-u".to_string());
            flags.push(target.user.clone().unwrap_or_else(|| "root".to_string()));
            flags
        } else {
            connection_flags(target, "-h", "-P", "-u", "root")
        }
    }

    fn invocation(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        argv: Vec<String>,
    ) -> Result<Invocation, BackupError> {
        let invocation = Invocation::new(argv);
        Ok(match ctx.credential(target)? {
            Some(password) => invocation.env("MYSQL_PWD", password),
            None => invocation,
        })
    }
}

impl EngineAdapter for MysqlAdapter {
    fn engine(&self) -> Engine {
        Engine::RelationalMysql
    }

    fn client_tools(&self, _target: &Target) -> Vec<&'static str> {
        vec!["mysqldump", "mysql"]
    }

    fn artifact_name(&self, _target: &Target, unit: &str) -> String {
        format!("{}.sql.gz", unit)
    }

    fn dump(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        dest: &Path,
    ) -> Result<(), BackupError> {
        info!("Dumping MySQL database {} from {}", unit, target.id());

        let mut argv: Vec<String> = [
            "mysqldump",
            "--single-transaction",
            "--quick",
            "--routines",
            "--triggers",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        argv.extend(self.connection(target));
        argv.push(unit.to_string());

        ctx.backend.exec(
            self.invocation(ctx, target, argv)?
                .stdout(StdoutSink::GzipFile(dest.to_path_buf())),
        )?;
        Ok(())
    }

    fn restore(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        artifact: &Path,
    ) -> Result<(), BackupError> {
        info!("Restoring MySQL database {} on {}", unit, target.id());

        let mut argv = vec!["mysql".to_string()];
        argv.extend(self.connection(target));
        argv.push(unit.to_string());

        ctx.backend.exec(
            self.invocation(ctx, target, argv)?
                .stdin(StdinSource::GzipFile(artifact.to_path_buf())),
        )?;
        Ok(())
    }
}
