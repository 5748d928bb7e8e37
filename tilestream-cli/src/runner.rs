//! Shared command setup: configuration loading and logging.

use std::path::{Path, PathBuf};

use tilestream::config::ConfigFile;
use tilestream::logging::{init_logging, LoggingGuard};
use tracing::info;

use crate::error::CliError;

/// Loads configuration and installs logging for a command.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// # Arguments
    ///
    /// * `config_path` - Explicit config file; the default location is used
    ///   when `None`
    /// * `verbose` - Raise the log filter to `tilestream=debug`
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let (config, config_path) = load_config(config_path)?;

        let mut log_config = config.logging.clone();
        if verbose {
            log_config = log_config.with_filter("tilestream=debug,tilestream_cli=debug");
        }
        let logging = init_logging(&log_config)?;

        Ok(Self {
            config,
            config_path,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = tilestream::VERSION,
            command,
            config = %self.config_path.display(),
            "tilestream starting"
        );
    }
}

/// Loads the config file, falling back to defaults if the default file is
/// missing. An explicitly named file must exist.
pub fn load_config(path: Option<&Path>) -> Result<(ConfigFile, PathBuf), CliError> {
    match path {
        Some(path) => Ok((ConfigFile::load(path)?, path.to_path_buf())),
        None => {
            let path = ConfigFile::default_path();
            let config = if path.is_file() {
                ConfigFile::load(&path)?
            } else {
                ConfigFile::default()
            };
            Ok((config, path))
        }
    }
}
