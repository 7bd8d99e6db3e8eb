//! Backends that run engine clients on this host
//!
//! Network mode points a native client at a remote host and has no file
//! access; path mode works against local sockets and directories.

use super::{BackendBase, ExecutionBackend, Invocation};
use crate::error::BackupError;
use crate::registry::Mode;
use std::fs;
use std::path::Path;

pub struct NetworkBackend {
    base: BackendBase,
}

impl NetworkBackend {
    pub(crate) fn new(base: BackendBase) -> Self {
        Self { base }
    }
}

impl ExecutionBackend for NetworkBackend {
    fn mode(&self) -> Mode {
        Mode::Network
    }

    fn exec(&self, invocation: Invocation) -> Result<Vec<u8>, BackupError> {
        self.base.run(invocation.into_local_spec()?)
    }

    fn copy_out(&self, _remote: &str, _local: &Path) -> Result<(), BackupError> {
        Err(self
            .base
            .unsupported("a direct network connection cannot copy files from the server"))
    }

    fn copy_in(&self, _local: &Path, _remote: &str) -> Result<(), BackupError> {
        Err(self
            .base
            .unsupported("a direct network connection cannot copy files to the server"))
    }

    fn stop_engine(&self) -> Result<(), BackupError> {
        Err(self.base.no_lifecycle())
    }

    fn start_engine(&self) -> Result<(), BackupError> {
        Err(self.base.no_lifecycle())
    }

    fn required_tools(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

pub struct PathBackend {
    base: BackendBase,
}

impl PathBackend {
    pub(crate) fn new(base: BackendBase) -> Self {
        Self { base }
    }

    fn io_failure(&self, what: String, err: std::io::Error) -> BackupError {
        BackupError::ExecutionFailed {
            target: self.base.target_id.clone(),
            backend: Mode::Path,
            exit_code: None,
            stderr: format!("{}: {}", what, err),
        }
    }
}

impl ExecutionBackend for PathBackend {
    fn mode(&self) -> Mode {
        Mode::Path
    }

    fn exec(&self, invocation: Invocation) -> Result<Vec<u8>, BackupError> {
        self.base.run(invocation.into_local_spec()?)
    }

    fn copy_out(&self, remote: &str, local: &Path) -> Result<(), BackupError> {
        fs::copy(remote, local)
            .map_err(|e| self.io_failure(format!("copy {} -> {:?}", remote, local), e))?;
        Ok(())
    }

    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), BackupError> {
        if let Some(parent) = Path::new(remote).parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.io_failure(format!("create {:?}", parent), e))?;
        }
        fs::copy(local, remote)
            .map_err(|e| self.io_failure(format!("copy {:?} -> {}", local, remote), e))?;
        Ok(())
    }

    fn stop_engine(&self) -> Result<(), BackupError> {
        Err(self.base.no_lifecycle())
    }

    fn start_engine(&self) -> Result<(), BackupError> {
        Err(self.base.no_lifecycle())
    }

    fn required_tools(&self) -> Vec<&'static str> {
        Vec::new()
    }
}
