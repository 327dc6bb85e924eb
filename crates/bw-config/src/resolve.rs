//! Configuration and data directory discovery.
//!
//! Config resolution order: CLI argument → `BUNCHWATCH_CONFIG_DIR` →
//! XDG config (`~/.config/bunchwatch`) → `/etc/bunchwatch` → none.
//!
//! Data resolution order: CLI argument → `BUNCHWATCH_DATA` →
//! XDG data (`~/.local/share/bunchwatch`) → `./.bunchwatch`.

use std::path::{Path, PathBuf};

const ENV_CONFIG_DIR: &str = "BUNCHWATCH_CONFIG_DIR";
const ENV_DATA_DIR: &str = "BUNCHWATCH_DATA";
const APP_NAME: &str = "bunchwatch";

/// Where a directory was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    CliArgument,
    Environment,
    XdgConfig,
    SystemConfig,
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG directory"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Resolved directories.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// `None` when nothing was found; loading then fails.
    pub config_dir: Option<PathBuf>,
    pub config_source: ConfigSource,
    pub data_dir: PathBuf,
    pub data_source: ConfigSource,
}

impl ConfigPaths {
    /// Explicit directories, no discovery.
    pub fn explicit(config_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        ConfigPaths {
            config_dir: Some(config_dir.into()),
            config_source: ConfigSource::CliArgument,
            data_dir: data_dir.into(),
            data_source: ConfigSource::CliArgument,
        }
    }
}

/// Resolve both directories against the process environment.
pub fn resolve_paths(cli_config: Option<&Path>, cli_data: Option<&Path>) -> ConfigPaths {
    resolve_paths_with(cli_config, cli_data, |key| std::env::var(key).ok())
}

/// Resolution with an injectable environment lookup.
pub fn resolve_paths_with(
    cli_config: Option<&Path>,
    cli_data: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> ConfigPaths {
    let (config_dir, config_source) = resolve_config_dir(cli_config, &env);
    let (data_dir, data_source) = resolve_data_dir(cli_data, &env);
    ConfigPaths {
        config_dir,
        config_source,
        data_dir,
        data_source,
    }
}

fn resolve_config_dir(
    cli: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
) -> (Option<PathBuf>, ConfigSource) {
    // An explicit directory is used even if missing so the error names it
    if let Some(dir) = cli {
        return (Some(dir.to_path_buf()), ConfigSource::CliArgument);
    }
    if let Some(dir) = env(ENV_CONFIG_DIR).filter(|s| !s.is_empty()) {
        return (Some(PathBuf::from(dir)), ConfigSource::Environment);
    }
    if let Some(dir) = xdg_config_dir().filter(|d| d.is_dir()) {
        return (Some(dir), ConfigSource::XdgConfig);
    }
    let system = system_config_dir();
    if system.is_dir() {
        return (Some(system), ConfigSource::SystemConfig);
    }
    (None, ConfigSource::BuiltinDefault)
}

fn resolve_data_dir(
    cli: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
) -> (PathBuf, ConfigSource) {
    if let Some(dir) = cli {
        return (dir.to_path_buf(), ConfigSource::CliArgument);
    }
    if let Some(dir) = env(ENV_DATA_DIR).filter(|s| !s.is_empty()) {
        return (PathBuf::from(dir), ConfigSource::Environment);
    }
    match dirs::data_dir() {
        Some(d) => (d.join(APP_NAME), ConfigSource::XdgConfig),
        None => (PathBuf::from(".bunchwatch"), ConfigSource::BuiltinDefault),
    }
}

pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}
