//! PostgreSQL: pg_dump / psql, or the custom format with pg_restore

use super::{connection_flags, AdapterContext, EngineAdapter};
use crate::backends::Invocation;
use crate::error::BackupError;
use crate::registry::{Engine, Target};
use crate::utils::executor::{StdinSource, StdoutSink};
use std::path::Path;
use tracing::info;

pub struct PostgresAdapter;

impl PostgresAdapter {
    fn invocation(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        argv: Vec<String>,
    ) -> Result<Invocation, BackupError> {
        let invocation = Invocation::new(argv);
        Ok(match ctx.credential(target)? {
            Some(password) => invocation.env("PGPASSWORD", password),
            None => invocation,
        })
    }
}

impl EngineAdapter for PostgresAdapter {
    fn engine(&self) -> Engine {
        Engine::RelationalPg
    }

    fn client_tools(&self, target: &Target) -> Vec<&'static str> {
        if target.options.custom_format {
            vec!["pg_dump", "pg_restore"]
        } else {
            vec!["pg_dump", "psql"]
        }
    }

    fn artifact_name(&self, target: &Target, unit: &str) -> String {
        if target.options.custom_format {
            format!("{}.dump", unit)
        } else {
            format!("{}.sql.gz", unit)
        }
    }

    fn dump(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        dest: &Path,
    ) -> Result<(), BackupError> {
        info!("Dumping PostgreSQL database {} from {}", unit, target.id());

        let mut argv = vec!["pg_dump".to_string()];
        argv.extend(connection_flags(target, "-h", "-p", "-U", "postgres"));
        let sink = if target.options.custom_format {
            argv.push("--format=custom".to_string());
            StdoutSink::File(dest.to_path_buf())
        } else {
            // psql replays into the live database, so drop objects before recreating them
            argv.push("--clean".to_string());
            argv.push("--if-exists".to_string());
            StdoutSink::GzipFile(dest.to_path_buf())
        };
        argv.push("-d".to_string());
        argv.push(unit.to_string());

        ctx.backend
            .exec(self.invocation(ctx, target, argv)?.stdout(sink))?;
        Ok(())
    }

    fn restore(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        artifact: &Path,
    ) -> Result<(), BackupError> {
        let (argv, stdin) = if target.options.custom_format {
            let mut argv = vec![
                "pg_restore".to_string(),
                "--clean".to_string(),
                "--if-exists".to_string(),
            ];
            argv.extend(connection_flags(target, "-h", "-p", "-U", "postgres"));
            argv.push("-d".to_string());
            argv.push(unit.to_string());
            for table in &target.options.tables {
                argv.push("-t".to_string());
                argv.push(table.clone());
            }
            (argv, StdinSource::File(artifact.to_path_buf()))
        } else {
            let mut argv = vec![
                "psql".to_string(),
                "-v".to_string(),
                "ON_ERROR_STOP=1".to_string(),
            ];
            argv.extend(connection_flags(target, "-h", "-p", "-U", "postgres"));
            argv.push("-d".to_string());
            argv.push(unit.to_string());
            (argv, StdinSource::GzipFile(artifact.to_path_buf()))
        };

        info!(
            "Restoring PostgreSQL database {} on {}{}",
            unit,
            target.id(),
            if target.options.tables.is_empty() || !target.options.custom_format {
                String::new()
            } else {
                format!(" (tables: {})", target.options.tables.join(", "))
            }
        );
        ctx.backend
            .exec(self.invocation(ctx, target, argv)?.stdin(stdin))?;
        Ok(())
    }
}
