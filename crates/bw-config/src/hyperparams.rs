//! Per-line detection hyperparameters (`hyperparams.json`).
//!
//! ```json
//! {"44": {"conf": 0.99, "size_th": 3}, "82": {"conf": 0.95, "size_th": 2}}
//! ```
//!
//! The file is edited by operators while the detector runs, so it is read
//! again before every burst. A bad read never fails the burst: the last
//! good values stay in effect, and before any good read the safe defaults
//! apply (confidence 0.95, a size threshold nothing can reach).

use crate::load::{read_json, ConfigError, ConfigFile};
use crate::validate::{validate_hyperparams, validate_line_hyperparams};
use bw_common::fsutil::write_json_pretty_atomic;
use bw_common::LineId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIDENCE: f64 = 0.95;
pub const DEFAULT_SIZE_THRESHOLD: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineHyperparams {
    /// Chi-square confidence for the distance threshold, in (0, 1).
    #[serde(rename = "conf", alias = "confidence")]
    pub confidence: f64,

    /// Minimum episode length that is reported.
    #[serde(rename = "size_th", alias = "size_threshold")]
    pub size_threshold: u32,
}

impl Default for LineHyperparams {
    fn default() -> Self {
        LineHyperparams {
            confidence: DEFAULT_CONFIDENCE,
            size_threshold: DEFAULT_SIZE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparams(pub BTreeMap<LineId, LineHyperparams>);

impl Hyperparams {
    /// Values for `line`, defaults when the line is not listed.
    pub fn for_line(&self, line: &LineId) -> LineHyperparams {
        self.0.get(line).copied().unwrap_or_default()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let (hp, _raw): (Hyperparams, String) = read_json(ConfigFile::Hyperparams, path)?;
        validate_hyperparams(&hp).map_err(|source| ConfigError::Invalid {
            file: ConfigFile::Hyperparams,
            path: path.to_path_buf(),
            source,
        })?;
        Ok(hp)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        write_json_pretty_atomic(path, self).map_err(|source| ConfigError::Io {
            file: ConfigFile::Hyperparams,
            path: path.to_path_buf(),
            source,
        })
    }

    /// Change one line's values in the file at `path`.
    ///
    /// Unspecified fields keep their current value (or the default for a
    /// new line). The result is validated before anything is written.
    pub fn update_line(
        path: &Path,
        line: &LineId,
        confidence: Option<f64>,
        size_threshold: Option<u32>,
    ) -> Result<Hyperparams, ConfigError> {
        let mut hp = match Hyperparams::load(path) {
            Ok(hp) => hp,
            Err(ConfigError::NotFound { .. }) => Hyperparams::default(),
            Err(e) => return Err(e),
        };
        let mut values = hp.for_line(line);
        if let Some(c) = confidence {
            values.confidence = c;
        }
        if let Some(s) = size_threshold {
            values.size_threshold = s;
        }
        validate_line_hyperparams(line, &values).map_err(|source| ConfigError::Invalid {
            file: ConfigFile::Hyperparams,
            path: path.to_path_buf(),
            source,
        })?;
        hp.0.insert(line.clone(), values);
        hp.save(path)?;
        Ok(hp)
    }
}

/// Where the values used for a burst came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HyperparamOrigin {
    File,
    Previous,
    Defaults,
}

/// Result of one [`HyperparamSource::refresh`].
#[derive(Debug)]
pub struct HyperparamRead {
    pub values: Hyperparams,
    pub origin: HyperparamOrigin,
    /// Why the file could not be used, when `origin` is not `File`.
    pub error: Option<ConfigError>,
}

/// Re-reads the hyperparameter file and remembers the last good copy.
#[derive(Debug, Clone)]
pub struct HyperparamSource {
    path: PathBuf,
    last_good: Option<Hyperparams>,
}

impl HyperparamSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HyperparamSource {
            path: path.into(),
            last_good: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn refresh(&mut self) -> HyperparamRead {
        match Hyperparams::load(&self.path) {
            Ok(values) => {
                self.last_good = Some(values.clone());
                HyperparamRead {
                    values,
                    origin: HyperparamOrigin::File,
                    error: None,
                }
            }
            Err(error) => match &self.last_good {
                Some(prev) => HyperparamRead {
                    values: prev.clone(),
                    origin: HyperparamOrigin::Previous,
                    error: Some(error),
                },
                None => HyperparamRead {
                    values: Hyperparams::default(),
                    origin: HyperparamOrigin::Defaults,
                    error: Some(error),
                },
            },
        }
    }
}
