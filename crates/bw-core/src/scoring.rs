//! Distance scoring of headway windows against the slice models.
//!
//! A window of dimension `d` is anomalous when its distance from the model
//! mean exceeds `sqrt(χ²_d⁻¹(confidence))`. Dimensions are walked upward
//! from 1 until no window of that width exists in either direction. A
//! dimension whose model is missing or unusable is skipped on its own;
//! the others are still scored.

use crate::headway::LineHeadways;
use crate::window::{line_windows, Window};
use bw_common::{BusGroupKey, Direction, LineId};
use bw_config::{CompiledSlice, ModelError};
use bw_math::{distance_threshold, LinalgError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// One scored window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSample {
    pub line: LineId,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub dimension: usize,
    pub key: BusGroupKey,
    pub headways: Vec<f64>,
    pub distance: f64,
    pub threshold: f64,
    pub is_anomalous: bool,
}

/// Why a dimension (or a single window of it) was not scored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreSkip {
    #[error("no usable model for dimension {dimension}: {source}")]
    Model {
        dimension: usize,
        #[source]
        source: ModelError,
    },

    #[error("dimension {dimension}: distance failed: {source}")]
    Numerical {
        dimension: usize,
        #[source]
        source: LinalgError,
    },

    #[error("dimension {dimension}: confidence {confidence} gives no finite threshold")]
    Threshold { dimension: usize, confidence: f64 },
}

impl ScoreSkip {
    pub fn dimension(&self) -> usize {
        match self {
            ScoreSkip::Model { dimension, .. }
            | ScoreSkip::Numerical { dimension, .. }
            | ScoreSkip::Threshold { dimension, .. } => *dimension,
        }
    }

    /// Degenerate covariance, as opposed to a model that is simply absent.
    pub fn is_singular(&self) -> bool {
        matches!(
            self,
            ScoreSkip::Model {
                source: ModelError::Singular { .. },
                ..
            }
        )
    }
}

/// Thresholds memoized per (confidence, dimension).
#[derive(Debug, Default)]
pub struct ThresholdCache {
    values: HashMap<(u64, usize), f64>,
}

impl ThresholdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(&mut self, confidence: f64, dimension: usize) -> f64 {
        *self
            .values
            .entry((confidence.to_bits(), dimension))
            .or_insert_with(|| distance_threshold(confidence, dimension))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LineScores {
    pub samples: Vec<WindowSample>,
    /// Windows scored, by dimension.
    pub windows_by_dimension: BTreeMap<usize, usize>,
    pub skipped: Vec<ScoreSkip>,
}

impl LineScores {
    pub fn anomalous(&self) -> usize {
        self.samples.iter().filter(|s| s.is_anomalous).count()
    }
}

fn score_window(window: Window, distance: f64, threshold: f64) -> WindowSample {
    let dimension = window.dimension();
    WindowSample {
        line: window.line,
        direction: window.direction,
        timestamp: window.timestamp,
        dimension,
        key: window.key,
        headways: window.headways,
        distance,
        threshold,
        is_anomalous: distance > threshold,
    }
}

/// Score every window of one line against its slice.
pub fn score_line(
    headways: &LineHeadways,
    slice: &CompiledSlice,
    confidence: f64,
    thresholds: &mut ThresholdCache,
) -> LineScores {
    let mut out = LineScores::default();

    for dimension in 1..=slice.max_dim {
        let windows = line_windows(headways, dimension);
        if windows.is_empty() {
            break;
        }

        let model = match slice.model(dimension) {
            Ok(m) => m,
            Err(source) => {
                out.skipped.push(ScoreSkip::Model { dimension, source });
                continue;
            }
        };
        let threshold = thresholds.threshold(confidence, dimension);
        if threshold.is_nan() {
            out.skipped.push(ScoreSkip::Threshold {
                dimension,
                confidence,
            });
            continue;
        }

        let mut scored = 0;
        for window in windows {
            match model.distance(&window.headways) {
                Ok(distance) if distance.is_finite() => {
                    out.samples.push(score_window(window, distance, threshold));
                    scored += 1;
                }
                Ok(_) => out.skipped.push(ScoreSkip::Numerical {
                    dimension,
                    source: LinalgError::NonFinite { row: 0, col: 0 },
                }),
                Err(source) => out.skipped.push(ScoreSkip::Numerical { dimension, source }),
            }
        }
        out.windows_by_dimension.insert(dimension, scored);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headway::{chain_records, ChainedBus};
    use bw_common::BusId;
    use bw_config::models::{CovSpec, MeanSpec, RawDimModel, RawSlice};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn headways(ttts: &[f64]) -> LineHeadways {
        let buses: Vec<ChainedBus> = ttts
            .iter()
            .enumerate()
            .map(|(i, &t)| ChainedBus {
                bus: BusId(i as u32 + 1),
                time_to_terminal: t,
            })
            .collect();
        LineHeadways {
            outbound: chain_records(
                &LineId::from("44"),
                Direction::Outbound,
                Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(),
                &buses,
            ),
            inbound: Vec::new(),
        }
    }

    fn raw(dims: Vec<(&str, RawDimModel)>, max_dim: usize) -> RawSlice {
        RawSlice {
            max_dim,
            dims: dims.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn d1() -> RawDimModel {
        RawDimModel {
            mean: MeanSpec::Scalar(300.0),
            cov_matrix: CovSpec::Scalar(60.0),
        }
    }

    fn d2(cov: Vec<Vec<f64>>) -> RawDimModel {
        RawDimModel {
            mean: MeanSpec::Vector(vec![300.0, 300.0]),
            cov_matrix: CovSpec::Matrix(cov),
        }
    }

    #[test]
    fn flags_bunched_windows() {
        let slice = CompiledSlice::compile(&raw(
            vec![("1", d1()), ("2", d2(vec![vec![3600.0, 0.0], vec![0.0, 3600.0]]))],
            2,
        ));
        let mut cache = ThresholdCache::new();
        // Headways 30 and 290
        let scores = score_line(&headways(&[30.0, 60.0, 350.0]), &slice, 0.95, &mut cache);

        assert_eq!(scores.windows_by_dimension[&1], 2);
        assert_eq!(scores.windows_by_dimension[&2], 1);
        let first = &scores.samples[0];
        assert_eq!(first.dimension, 1);
        assert!((first.distance - 4.5).abs() < 1e-9);
        assert!(first.is_anomalous);
        assert!(!scores.samples[1].is_anomalous);
        assert!((first.threshold - 1.959964).abs() < 1e-4);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn stops_when_chain_runs_out() {
        let slice = CompiledSlice::compile(&raw(vec![("1", d1())], 8));
        let scores = score_line(&headways(&[30.0, 60.0]), &slice, 0.95, &mut ThresholdCache::new());
        assert_eq!(scores.samples.len(), 1);
        assert!(scores.skipped.is_empty());
        assert!(!scores.windows_by_dimension.contains_key(&2));
    }

    #[test]
    fn missing_dimension_skips_only_itself() {
        let slice = CompiledSlice::compile(&raw(
            vec![
                ("2", d2(vec![vec![1.0, 1.0], vec![1.0, 1.0]])),
                ("3", RawDimModel {
                    mean: MeanSpec::Vector(vec![300.0; 3]),
                    cov_matrix: CovSpec::Matrix(vec![
                        vec![3600.0, 0.0, 0.0],
                        vec![0.0, 3600.0, 0.0],
                        vec![0.0, 0.0, 3600.0],
                    ]),
                }),
            ],
            3,
        ));
        let scores = score_line(
            &headways(&[30.0, 60.0, 350.0, 400.0]),
            &slice,
            0.95,
            &mut ThresholdCache::new(),
        );
        assert_eq!(scores.skipped.len(), 2);
        assert_eq!(scores.skipped[0].dimension(), 1);
        assert!(!scores.skipped[0].is_singular());
        assert!(scores.skipped[1].is_singular());
        assert_eq!(scores.samples.len(), 1);
        assert_eq!(scores.samples[0].dimension, 3);
    }

    #[test]
    fn bad_confidence_skips_dimension() {
        let slice = CompiledSlice::compile(&raw(vec![("1", d1())], 1));
        let scores = score_line(&headways(&[30.0, 60.0]), &slice, 1.5, &mut ThresholdCache::new());
        assert!(scores.samples.is_empty());
        assert!(matches!(scores.skipped[0], ScoreSkip::Threshold { .. }));
    }

    proptest! {
        #[test]
        fn z_score_is_symmetric(x in 0.0f64..290.0) {
            let slice = CompiledSlice::compile(&raw(vec![("1", d1())], 1));
            let model = slice.model(1).unwrap();
            let above = model.distance(&[300.0 + x]).unwrap();
            let below = model.distance(&[300.0 - x]).unwrap();
            prop_assert!((above - below).abs() < 1e-9);
        }
    }
}
