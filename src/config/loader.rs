use super::expand_tilde;
use super::types::*;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load, expand and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse configuration text; used by `load_config` and tests
pub fn parse_config(contents: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(contents)?;
    expand_paths(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn expand_paths(config: &mut Config) {
    let paths = &mut config.paths;
    for path in [
        &mut paths.registry_dir,
        &mut paths.staging_dir,
        &mut paths.scratch_dir,
        &mut paths.lock_dir,
        &mut config.logging.log_directory,
    ] {
        *path = expand_tilde(path);
    }
    if let Some(ref mut file) = config.store.password_file {
        *file = expand_tilde(file);
    }
}

/// Validate the configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.store.repository.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "store.repository must not be empty".to_string(),
        ));
    }

    match (&config.store.password_env, &config.store.password_file) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::ValidationError(
                "set only one of store.password_env and store.password_file".to_string(),
            ))
        }
        (None, None) => {
            return Err(ConfigError::ValidationError(
                "store needs password_env or password_file".to_string(),
            ))
        }
        _ => {}
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("command_timeout_seconds", timeouts.command_timeout_seconds),
        ("store_timeout_seconds", timeouts.store_timeout_seconds),
        ("settle_timeout_seconds", timeouts.settle_timeout_seconds),
        ("settle_poll_seconds", timeouts.settle_poll_seconds),
    ] {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "timeouts.{} must be greater than zero",
                name
            )));
        }
    }
    if timeouts.settle_poll_seconds > timeouts.settle_timeout_seconds {
        return Err(ConfigError::ValidationError(
            "timeouts.settle_poll_seconds exceeds settle_timeout_seconds".to_string(),
        ));
    }

    if config.logging.log_retention_days == 0 {
        return Err(ConfigError::ValidationError(
            "logging.log_retention_days must be at least 1".to_string(),
        ));
    }

    Ok(())
}
