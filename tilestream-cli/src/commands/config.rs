//! Configuration CLI commands.
//!
//! `config show` prints the effective configuration, `config path` the file
//! location and `config init` writes a file with every default spelled out.

use std::path::Path;

use clap::Subcommand;
use console::style;
use tilestream::config::ConfigFile;

use crate::error::CliError;
use crate::runner::load_config;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (file values over defaults)
    Show,

    /// Show the configuration file path
    Path,

    /// Write a configuration file containing the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_show(config_path),
        ConfigCommands::Path => run_path(config_path),
        ConfigCommands::Init { force } => run_init(config_path, force),
    }
}

fn run_show(config_path: Option<&Path>) -> Result<(), CliError> {
    let (config, path) = load_config(config_path)?;
    let source = if path.is_file() {
        path.display().to_string()
    } else {
        "built-in defaults".to_string()
    };

    println!("{} {}", style("# Effective configuration from").dim(), style(source).dim());
    print!("{}", config.to_ini_string()?);
    Ok(())
}

fn run_path(config_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(ConfigFile::default_path);
    let status = if path.is_file() { "exists" } else { "not created" };
    println!("{} ({})", path.display(), status);
    Ok(())
}

fn run_init(config_path: Option<&Path>, force: bool) -> Result<(), CliError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(ConfigFile::default_path);
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        )));
    }

    ConfigFile::default().save(&path)?;
    println!("{} {}", style("Wrote").green(), path.display());
    Ok(())
}
