//! Credential lookup
//!
//! Targets and the store only ever name an environment variable; the value is
//! looked up when a command is about to run.

use crate::error::BackupError;

pub trait SecretResolver: Send + Sync {
    /// Resolve the value behind a credential reference
    fn resolve(&self, var: &str) -> Result<String, BackupError>;

    /// Resolve an optional reference; `None` stays `None`
    fn resolve_optional(&self, var: Option<&str>) -> Result<Option<String>, BackupError> {
        var.map(|v| self.resolve(v)).transpose()
    }
}

/// Reads the current process environment at call time
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretResolver for EnvSecrets {
    fn resolve(&self, var: &str) -> Result<String, BackupError> {
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Ok(value),
            Ok(_) => Err(BackupError::Configuration(format!(
                "credential variable {} is empty",
                var
            ))),
            Err(_) => Err(BackupError::Configuration(format!(
                "credential variable {} is not set",
                var
            ))),
        }
    }
}

/// Fixed secrets for tests
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Default)]
    pub struct StaticSecrets {
        values: HashMap<String, String>,
    }

    impl StaticSecrets {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, var: &str, value: &str) -> Self {
            self.values.insert(var.to_string(), value.to_string());
            self
        }
    }

    impl SecretResolver for StaticSecrets {
        fn resolve(&self, var: &str) -> Result<String, BackupError> {
            self.values.get(var).cloned().ok_or_else(|| {
                BackupError::Configuration(format!("credential variable {} is not set", var))
            })
        }
    }
}
