//! Statistical model store (`models.json`).
//!
//! The trainer exports, per line, day type and hour range, the Gaussian
//! parameters of the headway vector for every dimension it could fit:
//!
//! ```json
//! {"44": {"LA": {"7-8": {
//!     "max_dim": 2,
//!     "1": {"mean": 412.0, "cov_matrix": 96.5},
//!     "2": {"mean": [405.0, 398.0], "cov_matrix": [[9100.0, -2100.0], [-2100.0, 8800.0]]}
//! }}}}
//! ```
//!
//! For dimension 1 `cov_matrix` holds the standard deviation, not the
//! variance. A matrix-shaped value is always a covariance.
//!
//! [`CompiledModels`] is the form the scorer uses: every dimension is
//! validated once and its covariance inverted once at load. A dimension
//! that fails (bad shape, singular covariance) keeps its error so the
//! scorer can skip and report it without affecting other dimensions.

use crate::calendar::{DayType, HourRange, TimeSlot};
use bw_common::{LineId, MAX_DIM};
use bw_math::{invert_spd, mahalanobis, LinalgError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeanSpec {
    Scalar(f64),
    Vector(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CovSpec {
    /// Standard deviation (dimension 1 only).
    Scalar(f64),
    Matrix(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDimModel {
    pub mean: MeanSpec,
    pub cov_matrix: CovSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSlice {
    pub max_dim: usize,
    #[serde(flatten)]
    pub dims: BTreeMap<String, RawDimModel>,
}

/// `models.json` as exported by the trainer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelStore(pub BTreeMap<LineId, BTreeMap<DayType, BTreeMap<HourRange, RawSlice>>>);

impl ModelStore {
    pub fn slices(&self) -> impl Iterator<Item = (&LineId, TimeSlot, &RawSlice)> {
        self.0.iter().flat_map(|(line, days)| {
            days.iter().flat_map(move |(&day_type, hours)| {
                hours.iter().map(move |(&hour_range, slice)| {
                    (
                        line,
                        TimeSlot {
                            day_type,
                            hour_range,
                        },
                        slice,
                    )
                })
            })
        })
    }

    pub fn slice_count(&self) -> usize {
        self.slices().count()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("dimension key '{key}' is not an integer")]
    BadDimensionKey { key: String },

    #[error("dimension {dimension} is outside 1..={max_dim}")]
    DimensionOutOfRange { dimension: usize, max_dim: usize },

    #[error("dimension {dimension}: mean has {len} entries")]
    MeanShape { dimension: usize, len: usize },

    #[error("dimension {dimension}: covariance must be {dimension}x{dimension}, got {shape}")]
    CovarianceShape { dimension: usize, shape: String },

    #[error("dimension 1: standard deviation must be finite and positive, got {std}")]
    NonPositiveStd { std: f64 },

    #[error("dimension {dimension}: mean contains a non-finite value")]
    NonFiniteMean { dimension: usize },

    #[error("dimension {dimension}: covariance is singular or ill-conditioned")]
    Singular {
        dimension: usize,
        #[source]
        source: LinalgError,
    },

    #[error("no model trained for dimension {dimension}")]
    Missing { dimension: usize },
}

/// One dimension's parameters, ready for scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct DimModel {
    pub dimension: usize,
    pub mean: Vec<f64>,
    /// Inverse covariance.
    pub precision: Vec<Vec<f64>>,
    /// Set for dimension 1 when the store gave a standard deviation.
    pub std: Option<f64>,
}

impl DimModel {
    pub fn from_raw(dimension: usize, raw: &RawDimModel) -> Result<Self, ModelError> {
        let mean = match &raw.mean {
            MeanSpec::Scalar(m) => vec![*m],
            MeanSpec::Vector(v) => v.clone(),
        };
        if mean.len() != dimension {
            return Err(ModelError::MeanShape {
                dimension,
                len: mean.len(),
            });
        }
        if mean.iter().any(|m| !m.is_finite()) {
            return Err(ModelError::NonFiniteMean { dimension });
        }

        let (covariance, std) = match &raw.cov_matrix {
            CovSpec::Scalar(std) if dimension == 1 => {
                if !(std.is_finite() && *std > 0.0) {
                    return Err(ModelError::NonPositiveStd { std: *std });
                }
                (vec![vec![std * std]], Some(*std))
            }
            CovSpec::Scalar(_) => {
                return Err(ModelError::CovarianceShape {
                    dimension,
                    shape: "a scalar".to_string(),
                })
            }
            CovSpec::Matrix(m) => {
                if m.len() != dimension || m.iter().any(|row| row.len() != dimension) {
                    let cols = m.first().map_or(0, Vec::len);
                    return Err(ModelError::CovarianceShape {
                        dimension,
                        shape: format!("{}x{}", m.len(), cols),
                    });
                }
                (m.clone(), None)
            }
        };

        let precision = invert_spd(&covariance)
            .map_err(|source| ModelError::Singular { dimension, source })?;

        Ok(DimModel {
            dimension,
            mean,
            precision,
            std,
        })
    }

    /// Standardized distance of a headway vector from the model mean.
    ///
    /// `|h - mean| / std` in one dimension, Mahalanobis distance otherwise.
    pub fn distance(&self, headways: &[f64]) -> Result<f64, LinalgError> {
        match (self.std, headways) {
            (Some(std), [h]) => Ok((h - self.mean[0]).abs() / std),
            _ => mahalanobis(headways, &self.mean, &self.precision),
        }
    }
}

/// Validated parameters of one (line, day type, hour range) slice.
#[derive(Debug, Clone)]
pub struct CompiledSlice {
    /// Highest trained dimension, capped at [`MAX_DIM`].
    pub max_dim: usize,
    dims: BTreeMap<usize, Result<DimModel, ModelError>>,
    rejected: Vec<ModelError>,
}

impl CompiledSlice {
    pub fn compile(raw: &RawSlice) -> Self {
        let max_dim = raw.max_dim.min(MAX_DIM);
        let mut dims = BTreeMap::new();
        let mut rejected = Vec::new();

        for (key, dim_raw) in &raw.dims {
            let dimension = match key.trim().parse::<usize>() {
                Ok(d) => d,
                Err(_) => {
                    rejected.push(ModelError::BadDimensionKey { key: key.clone() });
                    continue;
                }
            };
            if dimension == 0 || dimension > max_dim {
                rejected.push(ModelError::DimensionOutOfRange { dimension, max_dim });
                continue;
            }
            dims.insert(dimension, DimModel::from_raw(dimension, dim_raw));
        }

        CompiledSlice {
            max_dim,
            dims,
            rejected,
        }
    }

    /// Model for `dimension`, or why it cannot be used.
    pub fn model(&self, dimension: usize) -> Result<&DimModel, ModelError> {
        match self.dims.get(&dimension) {
            Some(Ok(m)) => Ok(m),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ModelError::Missing { dimension }),
        }
    }

    /// Every problem found while compiling, per-dimension failures included.
    pub fn issues(&self) -> impl Iterator<Item = &ModelError> {
        self.rejected
            .iter()
            .chain(self.dims.values().filter_map(|r| r.as_ref().err()))
    }

    pub fn usable_dimensions(&self) -> usize {
        self.dims.values().filter(|r| r.is_ok()).count()
    }
}

/// The whole store, compiled, keyed by line and time slot.
#[derive(Debug, Clone, Default)]
pub struct CompiledModels {
    slices: HashMap<(LineId, TimeSlot), CompiledSlice>,
}

impl CompiledModels {
    pub fn compile(store: &ModelStore) -> Self {
        let slices = store
            .slices()
            .map(|(line, slot, raw)| ((line.clone(), slot), CompiledSlice::compile(raw)))
            .collect();
        CompiledModels { slices }
    }

    pub fn slice(&self, line: &LineId, slot: TimeSlot) -> Option<&CompiledSlice> {
        self.slices.get(&(line.clone(), slot))
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// All compile problems, sorted for stable reporting.
    pub fn issues(&self) -> Vec<(LineId, TimeSlot, ModelError)> {
        let mut out: Vec<_> = self
            .slices
            .iter()
            .flat_map(|((line, slot), s)| s.issues().map(move |e| (line.clone(), *slot, e.clone())))
            .collect();
        out.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"{
        "44": {"LA": {"7-8": {
            "max_dim": 3,
            "1": {"mean": 400, "cov_matrix": 100},
            "2": {"mean": [400, 380], "cov_matrix": [[10000, 2000], [2000, 9000]]},
            "3": {"mean": [400, 380, 390], "cov_matrix": [[1, 2, 3], [2, 4, 6], [3, 6, 9]]}
        }}}
    }"#;

    fn slot() -> TimeSlot {
        TimeSlot {
            day_type: DayType::Weekday,
            hour_range: HourRange::new(7, 8).unwrap(),
        }
    }

    fn compiled() -> CompiledModels {
        let store: ModelStore = serde_json::from_str(STORE).unwrap();
        CompiledModels::compile(&store)
    }

    #[test]
    fn parses_trainer_format() {
        let store: ModelStore = serde_json::from_str(STORE).unwrap();
        assert_eq!(store.slice_count(), 1);
        let (_, s, raw) = store.slices().next().unwrap();
        assert_eq!(s, slot());
        assert_eq!(raw.max_dim, 3);
        assert_eq!(raw.dims.len(), 3);
        assert_eq!(raw.dims["1"].cov_matrix, CovSpec::Scalar(100.0));
    }

    #[test]
    fn one_dimension_uses_z_score() {
        let models = compiled();
        let slice = models.slice(&LineId::from("44"), slot()).unwrap();
        let m = slice.model(1).unwrap();
        assert_eq!(m.distance(&[650.0]).unwrap(), 2.5);
        assert_eq!(m.distance(&[150.0]).unwrap(), 2.5);
    }

    #[test]
    fn singular_dimension_is_isolated() {
        let models = compiled();
        let slice = models.slice(&LineId::from("44"), slot()).unwrap();
        assert!(slice.model(2).is_ok());
        assert!(matches!(slice.model(3), Err(ModelError::Singular { dimension: 3, .. })));
        assert!(matches!(slice.model(4), Err(ModelError::Missing { dimension: 4 })));
        assert_eq!(slice.usable_dimensions(), 2);
        assert_eq!(models.issues().len(), 1);
    }

    #[test]
    fn shape_errors() {
        let bad_mean = RawDimModel {
            mean: MeanSpec::Vector(vec![1.0]),
            cov_matrix: CovSpec::Matrix(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
        };
        assert!(matches!(
            DimModel::from_raw(2, &bad_mean),
            Err(ModelError::MeanShape { dimension: 2, len: 1 })
        ));

        let scalar_cov = RawDimModel {
            mean: MeanSpec::Vector(vec![1.0, 2.0]),
            cov_matrix: CovSpec::Scalar(3.0),
        };
        assert!(matches!(
            DimModel::from_raw(2, &scalar_cov),
            Err(ModelError::CovarianceShape { .. })
        ));

        let zero_std = RawDimModel {
            mean: MeanSpec::Scalar(300.0),
            cov_matrix: CovSpec::Scalar(0.0),
        };
        assert!(matches!(
            DimModel::from_raw(1, &zero_std),
            Err(ModelError::NonPositiveStd { .. })
        ));
    }

    #[test]
    fn dimensions_beyond_max_dim_are_rejected() {
        let raw: RawSlice = serde_json::from_str(
            r#"{"max_dim": 1,
                "1": {"mean": 300, "cov_matrix": 50},
                "2": {"mean": [1, 2], "cov_matrix": [[1, 0], [0, 1]]},
                "x": {"mean": 1, "cov_matrix": 1}}"#,
        )
        .unwrap();
        let slice = CompiledSlice::compile(&raw);
        assert_eq!(slice.max_dim, 1);
        assert_eq!(slice.issues().count(), 2);
        assert!(matches!(slice.model(2), Err(ModelError::Missing { .. })));
    }

    #[test]
    fn max_dim_is_capped() {
        let raw: RawSlice = serde_json::from_str(r#"{"max_dim": 12}"#).unwrap();
        assert_eq!(CompiledSlice::compile(&raw).max_dim, MAX_DIM);
    }
}
