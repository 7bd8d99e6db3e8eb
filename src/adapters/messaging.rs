//! RabbitMQ: tarball of the mnesia directory, restored with the app stopped

use super::{archive, AdapterContext, EngineAdapter, Lifecycle};
use crate::error::BackupError;
use crate::registry::{Engine, Mode, Target};
use std::path::Path;
use tracing::info;

const DEFAULT_DATA_DIR: &str = "/var/lib/rabbitmq/mnesia";

const LIFECYCLE: Lifecycle<'static> = Lifecycle {
    default_stop: Some(&["rabbitmqctl", "stop_app"]),
    default_start: Some(&["rabbitmqctl", "start_app"]),
};

pub struct MessagingAdapter;

impl MessagingAdapter {
    fn data_dir(&self, target: &Target) -> String {
        match target.mode {
            Mode::Path => target.path.as_ref().map(|p| p.display().to_string()),
            _ => target.options.data_dir.clone(),
        }
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
    }
}

impl EngineAdapter for MessagingAdapter {
    fn engine(&self) -> Engine {
        Engine::Messaging
    }

    fn client_tools(&self, _target: &Target) -> Vec<&'static str> {
        vec!["tar", "find", "rabbitmqctl"]
    }

    fn artifact_name(&self, _target: &Target, _unit: &str) -> String {
        "data.tar.gz".to_string()
    }

    fn check_mode(&self, target: &Target) -> Result<(), BackupError> {
        if target.mode == Mode::Network {
            return Err(BackupError::unsupported(
                target.engine,
                target.mode,
                "the persistence directory is not reachable over the network",
            ));
        }
        Ok(())
    }

    fn dump(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        _unit: &str,
        dest: &Path,
    ) -> Result<(), BackupError> {
        self.check_mode(target)?;
        info!("Archiving RabbitMQ data for {}", target.id());
        archive::dump_tree(ctx, &self.data_dir(target), dest)
    }

    fn restore(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        _unit: &str,
        artifact: &Path,
    ) -> Result<(), BackupError> {
        self.check_restore(target)?;
        let dir = self.data_dir(target);
        LIFECYCLE.with_engine_stopped(ctx, target, || archive::restore_tree(ctx, &dir, artifact))
    }
}
