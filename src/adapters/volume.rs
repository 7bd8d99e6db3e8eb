//! Plain directory trees with no engine semantics

use super::{archive, AdapterContext, EngineAdapter};
use crate::error::BackupError;
use crate::registry::{Engine, Mode, Target};
use std::path::Path;
use tracing::info;

pub struct VolumeAdapter;

impl VolumeAdapter {
    fn data_dir(&self, target: &Target) -> Result<String, BackupError> {
        let dir = match target.mode {
            Mode::Path => target.path.as_ref().map(|p| p.display().to_string()),
            _ => target.options.data_dir.clone(),
        };
        dir.ok_or_else(|| {
            BackupError::Configuration(format!(
                "{} needs {} to know which directory to archive",
                target.id(),
                if target.mode == Mode::Path { "path" } else { "options.data_dir" }
            ))
        })
    }
}

impl EngineAdapter for VolumeAdapter {
    fn engine(&self) -> Engine {
        Engine::Volume
    }

    fn client_tools(&self, _target: &Target) -> Vec<&'static str> {
        vec!["tar", "find"]
    }

    fn artifact_name(&self, _target: &Target, _unit: &str) -> String {
        "data.tar.gz".to_string()
    }

    fn check_mode(&self, target: &Target) -> Result<(), BackupError> {
        if target.mode == Mode::Network {
            return Err(BackupError::unsupported(
                target.engine,
                target.mode,
                "a volume has no network protocol",
            ));
        }
        self.data_dir(target).map(|_| ())
    }

    fn dump(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        _unit: &str,
        dest: &Path,
    ) -> Result<(), BackupError> {
        self.check_mode(target)?;
        let dir = self.data_dir(target)?;
        info!("Archiving volume {} ({})", target.id(), dir);
        archive::dump_tree(ctx, &dir, dest)
    }

    fn restore(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        _unit: &str,
        artifact: &Path,
    ) -> Result<(), BackupError> {
        self.check_restore(target)?;
        archive::restore_tree(ctx, &self.data_dir(target)?, artifact)
    }
}
