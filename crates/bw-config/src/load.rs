//! Loading the configuration directory.
//!
//! Topology, travel times and models are required. The calendar falls back
//! to its defaults. Hyperparameters are not loaded here: they change while
//! the process runs and are re-read every burst through
//! [`HyperparamSource`](crate::hyperparams::HyperparamSource).

use crate::calendar::ServiceCalendar;
use crate::models::{CompiledModels, ModelStore};
use crate::resolve::ConfigPaths;
use crate::snapshot::{ConfigSnapshot, FileDigest};
use crate::topology::Topology;
use crate::travel_times::TravelTimes;
use crate::validate::{
    validate_calendar, validate_models, validate_topology, validate_travel_times, ValidationError,
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The files that make up a configuration directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFile {
    Topology,
    TravelTimes,
    Models,
    Hyperparams,
    Calendar,
}

impl ConfigFile {
    pub const ALL: [ConfigFile; 5] = [
        ConfigFile::Topology,
        ConfigFile::TravelTimes,
        ConfigFile::Models,
        ConfigFile::Hyperparams,
        ConfigFile::Calendar,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ConfigFile::Topology => "topology.json",
            ConfigFile::TravelTimes => "travel_times.json",
            ConfigFile::Models => "models.json",
            ConfigFile::Hyperparams => "hyperparams.json",
            ConfigFile::Calendar => "calendar.json",
        }
    }
}

impl fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory found (set --config-dir or BUNCHWATCH_CONFIG_DIR)")]
    NoConfigDir,

    #[error("config file not found: {path}")]
    NotFound { file: ConfigFile, path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    Io {
        file: ConfigFile,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        file: ConfigFile,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: {source}")]
    Invalid {
        file: ConfigFile,
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn file(&self) -> Option<ConfigFile> {
        match self {
            ConfigError::NoConfigDir => None,
            ConfigError::NotFound { file, .. }
            | ConfigError::Io { file, .. }
            | ConfigError::Parse { file, .. }
            | ConfigError::Invalid { file, .. } => Some(*file),
        }
    }
}

impl From<ConfigError> for bw_common::Error {
    fn from(err: ConfigError) -> Self {
        use bw_common::Error;
        let msg = err.to_string();
        let file = err.file();
        if let ConfigError::Io { source, .. } = err {
            return Error::Io(source);
        }
        match file {
            Some(ConfigFile::Topology) => Error::InvalidTopology(msg),
            Some(ConfigFile::TravelTimes) => Error::InvalidTravelTimes(msg),
            Some(ConfigFile::Models) => Error::InvalidModels(msg),
            Some(ConfigFile::Hyperparams) => Error::InvalidHyperparams(msg),
            Some(ConfigFile::Calendar) => Error::InvalidCalendar(msg),
            None => Error::Config(msg),
        }
    }
}

/// Read a file and parse it, returning the raw text for hashing.
pub(crate) fn read_json<T: DeserializeOwned>(
    file: ConfigFile,
    path: &Path,
) -> Result<(T, String), ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                file,
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                file,
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let value = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        file,
        path: path.to_path_buf(),
        source,
    })?;
    Ok((value, raw))
}

fn invalid(file: ConfigFile, path: &Path) -> impl FnOnce(ValidationError) -> ConfigError + '_ {
    move |source| ConfigError::Invalid {
        file,
        path: path.to_path_buf(),
        source,
    }
}

/// Everything the pipeline needs that stays fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_dir: PathBuf,
    pub topology: Topology,
    pub travel_times: TravelTimes,
    pub models: CompiledModels,
    pub calendar: ServiceCalendar,
    pub snapshot: ConfigSnapshot,
}

impl LoadedConfig {
    pub fn hyperparams_path(&self) -> PathBuf {
        self.config_dir.join(ConfigFile::Hyperparams.file_name())
    }
}

/// Load and validate the static configuration.
pub fn load_config(paths: &ConfigPaths) -> Result<LoadedConfig, ConfigError> {
    let dir = paths.config_dir.as_deref().ok_or(ConfigError::NoConfigDir)?;
    let mut digests = Vec::new();

    let topo_path = dir.join(ConfigFile::Topology.file_name());
    let (topology, raw): (Topology, _) = read_json(ConfigFile::Topology, &topo_path)?;
    validate_topology(&topology).map_err(invalid(ConfigFile::Topology, &topo_path))?;
    digests.push(FileDigest::new(ConfigFile::Topology, &topo_path, &raw));

    let tt_path = dir.join(ConfigFile::TravelTimes.file_name());
    let (travel_times, raw): (TravelTimes, _) = read_json(ConfigFile::TravelTimes, &tt_path)?;
    validate_travel_times(&travel_times, &topology)
        .map_err(invalid(ConfigFile::TravelTimes, &tt_path))?;
    digests.push(FileDigest::new(ConfigFile::TravelTimes, &tt_path, &raw));

    let models_path = dir.join(ConfigFile::Models.file_name());
    let (store, raw): (ModelStore, _) = read_json(ConfigFile::Models, &models_path)?;
    validate_models(&store).map_err(invalid(ConfigFile::Models, &models_path))?;
    digests.push(FileDigest::new(ConfigFile::Models, &models_path, &raw));
    let models = CompiledModels::compile(&store);

    let cal_path = dir.join(ConfigFile::Calendar.file_name());
    let calendar = match read_json::<ServiceCalendar>(ConfigFile::Calendar, &cal_path) {
        Ok((calendar, raw)) => {
            digests.push(FileDigest::new(ConfigFile::Calendar, &cal_path, &raw));
            calendar
        }
        Err(ConfigError::NotFound { .. }) => ServiceCalendar::default(),
        Err(e) => return Err(e),
    };
    validate_calendar(&calendar).map_err(invalid(ConfigFile::Calendar, &cal_path))?;

    let snapshot = ConfigSnapshot::new(
        paths,
        digests,
        &topology,
        &travel_times,
        &store,
        &models,
        &calendar,
    );

    Ok(LoadedConfig {
        config_dir: dir.to_path_buf(),
        topology,
        travel_times,
        models,
        calendar,
        snapshot,
    })
}
