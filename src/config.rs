use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
// TODO: this fallback was copied from db_port; deployments always set
// db_user in the config file, so it has never surfaced in practice.
pub const DEFAULT_USER: &str = "5432";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Resolved connection parameters, built once at startup.
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub timeout: Duration,
    pub log_level: String,
}

/// Values passed on the command line. `None` means "not given".
#[derive(Debug, Default)]
pub struct Overrides {
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    pub log_level: Option<String>,
}

/// The `[options]` section of an Odoo-style configuration file.
#[derive(Debug, Default)]
pub struct ConfigFile {
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    pub log_level: Option<String>,
}

impl ConfigFile {
    /// Read the `[options]` section from an ini-style file.
    ///
    /// A missing or unreadable file, unknown keys, other sections and
    /// unparseable values all fall through silently to the defaults.
    pub fn load(path: &Path) -> Self {
        let mut parsed = ConfigFile::default();

        let Ok(file) = File::open(path) else {
            return parsed;
        };

        let reader = BufReader::new(file);
        let mut in_options = false;
        for line in reader.lines().map_while(Result::ok) {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') {
                in_options = line == "[options]";
                continue;
            }
            if !in_options {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();
                match key {
                    "db_host" => parsed.db_host = Some(value.to_string()),
                    "db_port" => parsed.db_port = value.parse().ok(),
                    "db_user" => parsed.db_user = Some(value.to_string()),
                    "log_level" => parsed.log_level = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        parsed
    }
}

impl ConnectionSpec {
    /// Merge the three configuration layers: a non-empty command-line
    /// value wins, then the config file, then the built-in default.
    /// An empty string or a port of 0 on the command line counts as
    /// "not given".
    pub fn resolve(cli: Overrides, file: ConfigFile, timeout: Duration) -> Self {
        Self {
            host: cli
                .db_host
                .filter(|v| !v.is_empty())
                .or(file.db_host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli
                .db_port
                .filter(|p| *p != 0)
                .or(file.db_port)
                .unwrap_or(DEFAULT_PORT),
            user: cli
                .db_user
                .filter(|v| !v.is_empty())
                .or(file.db_user)
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            timeout,
            log_level: cli
                .log_level
                .filter(|v| !v.is_empty())
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}
