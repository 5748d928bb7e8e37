//! INI configuration file.
//!
//! ```ini
//! [cache]
//! memory_capacity = 256MB
//! disk_directory = /var/cache/tilestream
//!
//! [pools]
//! decode_workers = 4
//! retrieval_workers = 8
//! retrieval_queue_size = 200
//!
//! [retrieval]
//! enabled = true
//! connect_timeout_ms = 8000
//! read_timeout_ms = 5000
//! stale_horizon_ms = 20000
//! host_failure_threshold = 3
//! host_cooldown_ms = 30000
//!
//! [selection]
//! detail_hint = 0.0
//! max_arena_tiles = 8192
//!
//! [source]
//! cache_name = bmng
//! format_suffix = .jpg
//! format_override = image/jpeg
//!
//! [logging]
//! filter = tilestream=info
//! file = /var/log/tilestream.log
//! ```
//!
//! Missing sections and keys keep their defaults. Unknown keys are ignored.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;
use tracing::debug;

use super::StreamConfig;
use crate::logging::LogConfig;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed as INI.
    #[error("Failed to load config {}: {message}", path.display())]
    Load { path: PathBuf, message: String },

    /// A key holds a value of the wrong shape.
    #[error("Invalid value for [{section}] {key}: '{value}'")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },

    #[error("Failed to write config: {0}")]
    Write(#[source] std::io::Error),
}

/// Parses a byte size such as `4096`, `512KB`, `256MB` or `2GB`.
pub fn parse_size(value: &str) -> Option<usize> {
    let trimmed = value.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (digits, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = upper.strip_suffix('B') {
        (n, 1)
    } else {
        (upper.as_str(), 1)
    };
    digits
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
}

/// Engine settings plus logging, as loaded from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub stream: StreamConfig,
    pub logging: LogConfig,
}

impl ConfigFile {
    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_ini(&ini)
    }

    /// Parses configuration from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Load {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = ConfigFile::default();
        let stream = &mut config.stream;

        if let Some(section) = ini.section(Some("cache")) {
            if let Some(value) = section.get("memory_capacity") {
                stream.cache.memory_capacity =
                    parse_size(value).ok_or_else(|| invalid("cache", "memory_capacity", value))?;
            }
            if let Some(value) = section.get("disk_directory") {
                stream.cache.disk_directory = PathBuf::from(value);
            }
        }

        if let Some(section) = ini.section(Some("pools")) {
            read(section, "pools", "decode_workers", &mut stream.pools.decode_workers)?;
            read(section, "pools", "retrieval_workers", &mut stream.pools.retrieval_workers)?;
            read(
                section,
                "pools",
                "retrieval_queue_size",
                &mut stream.pools.retrieval_queue_size,
            )?;
        }

        if let Some(section) = ini.section(Some("retrieval")) {
            let retrieval = &mut stream.retrieval;
            read(section, "retrieval", "enabled", &mut retrieval.enabled)?;
            read_millis(section, "retrieval", "connect_timeout_ms", &mut retrieval.connect_timeout)?;
            read_millis(section, "retrieval", "read_timeout_ms", &mut retrieval.read_timeout)?;
            read_millis(section, "retrieval", "stale_horizon_ms", &mut retrieval.stale_horizon)?;
            read(
                section,
                "retrieval",
                "host_failure_threshold",
                &mut retrieval.host_failure_threshold,
            )?;
            read_millis(section, "retrieval", "host_cooldown_ms", &mut retrieval.host_cooldown)?;
        }

        if let Some(section) = ini.section(Some("selection")) {
            read(section, "selection", "detail_hint", &mut stream.selection.detail_hint)?;
            read(
                section,
                "selection",
                "max_arena_tiles",
                &mut stream.selection.max_arena_tiles,
            )?;
        }

        if let Some(section) = ini.section(Some("source")) {
            if let Some(value) = section.get("cache_name") {
                stream.source.cache_name = value.to_string();
            }
            if let Some(value) = section.get("format_suffix") {
                stream.source.format_suffix = value.to_string();
            }
            if let Some(value) = section.get("format_override") {
                stream.source.format_override = (!value.is_empty()).then(|| value.to_string());
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(value) = section.get("filter") {
                config.logging.filter = value.to_string();
            }
            if let Some(value) = section.get("file") {
                config.logging.file = (!value.is_empty()).then(|| PathBuf::from(value));
            }
        }

        Ok(config)
    }

    /// Renders the configuration as INI text.
    pub fn to_ini_string(&self) -> Result<String, ConfigError> {
        let s = &self.stream;
        let mut ini = Ini::new();

        ini.with_section(Some("cache"))
            .set("memory_capacity", s.cache.memory_capacity.to_string())
            .set("disk_directory", s.cache.disk_directory.display().to_string());
        ini.with_section(Some("pools"))
            .set("decode_workers", s.pools.decode_workers.to_string())
            .set("retrieval_workers", s.pools.retrieval_workers.to_string())
            .set("retrieval_queue_size", s.pools.retrieval_queue_size.to_string());
        ini.with_section(Some("retrieval"))
            .set("enabled", s.retrieval.enabled.to_string())
            .set("connect_timeout_ms", millis(s.retrieval.connect_timeout))
            .set("read_timeout_ms", millis(s.retrieval.read_timeout))
            .set("stale_horizon_ms", millis(s.retrieval.stale_horizon))
            .set(
                "host_failure_threshold",
                s.retrieval.host_failure_threshold.to_string(),
            )
            .set("host_cooldown_ms", millis(s.retrieval.host_cooldown));
        ini.with_section(Some("selection"))
            .set("detail_hint", s.selection.detail_hint.to_string())
            .set("max_arena_tiles", s.selection.max_arena_tiles.to_string());
        ini.with_section(Some("source"))
            .set("cache_name", s.source.cache_name.clone())
            .set("format_suffix", s.source.format_suffix.clone())
            .set(
                "format_override",
                s.source.format_override.clone().unwrap_or_default(),
            );
        ini.with_section(Some("logging"))
            .set("filter", self.logging.filter.clone())
            .set(
                "file",
                self.logging
                    .file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            );

        let mut out = Vec::new();
        ini.write_to(&mut out).map_err(ConfigError::Write)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }
        std::fs::write(path, self.to_ini_string()?).map_err(ConfigError::Write)
    }

    /// Default location: `<config dir>/tilestream/config.ini`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tilestream")
            .join("config.ini")
    }
}

fn invalid(section: &'static str, key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section,
        key,
        value: value.to_string(),
    }
}

fn read<T: FromStr>(
    props: &Properties,
    section: &'static str,
    key: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = props.get(key) {
        *target = value.trim().parse().map_err(|_| invalid(section, key, value))?;
    }
    Ok(())
}

fn read_millis(
    props: &Properties,
    section: &'static str,
    key: &'static str,
    target: &mut Duration,
) -> Result<(), ConfigError> {
    let mut ms = target.as_millis() as u64;
    read(props, section, key, &mut ms)?;
    *target = Duration::from_millis(ms);
    Ok(())
}

fn millis(duration: Duration) -> String {
    duration.as_millis().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("512KB"), Some(512 * 1024));
        assert_eq!(parse_size("256mb"), Some(256 * 1024 * 1024));
        assert_eq!(parse_size(" 2GB "), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("100B"), Some(100));
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn test_missing_sections_keep_defaults() {
        let config = ConfigFile::parse("[selection]\ndetail_hint = 0.25\n").unwrap();
        assert_eq!(config.stream.selection.detail_hint, 0.25);
        assert_eq!(config.stream.pools, StreamConfig::default().pools);
        assert_eq!(config.logging, LogConfig::default());
    }

    #[test]
    fn test_parses_all_sections() {
        let text = "\
[cache]
memory_capacity = 64MB
disk_directory = /tmp/tiles

[pools]
decode_workers = 2
retrieval_workers = 3
retrieval_queue_size = 10

[retrieval]
enabled = false
connect_timeout_ms = 1500
stale_horizon_ms = 100

[source]
cache_name = bmng
format_suffix = .jpg
format_override = image/jpeg

[logging]
filter = tilestream=debug
file = /tmp/tilestream.log
";
        let config = ConfigFile::parse(text).unwrap();
        let s = &config.stream;
        assert_eq!(s.cache.memory_capacity, 64 * 1024 * 1024);
        assert_eq!(s.cache.disk_directory, PathBuf::from("/tmp/tiles"));
        assert_eq!(s.pools.retrieval_workers, 3);
        assert!(!s.retrieval.enabled);
        assert_eq!(s.retrieval.connect_timeout, Duration::from_millis(1500));
        assert_eq!(s.retrieval.stale_horizon, Duration::from_millis(100));
        assert_eq!(s.source.format_override.as_deref(), Some("image/jpeg"));
        assert_eq!(config.logging.filter, "tilestream=debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/tilestream.log")));
    }

    #[test]
    fn test_invalid_value_reports_key() {
        let err = ConfigFile::parse("[pools]\ndecode_workers = many\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                section: "pools",
                key: "decode_workers",
                ..
            }
        ));
        assert!(err.to_string().contains("decode_workers"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.stream.selection.detail_hint = 0.5;
        config.stream.source.cache_name = "earth".to_string();
        config.save(&path).unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ConfigFile::load(&dir.path().join("absent.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Load { .. }));
    }
}
