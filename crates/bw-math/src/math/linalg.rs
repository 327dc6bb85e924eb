//! Dense symmetric positive-definite helpers for small matrices.
//!
//! Covariance matrices here are at most 8x8, so plain `Vec<Vec<f64>>`
//! with a Cholesky factorization is all that is needed.

use thiserror::Error;

/// Pivots below `PIVOT_RTOL * max(diag)` are treated as singular.
const PIVOT_RTOL: f64 = 1.0e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinalgError {
    #[error("matrix is empty")]
    Empty,

    #[error("matrix is not square: row {row} has {len} columns, expected {expected}")]
    NotSquare {
        row: usize,
        len: usize,
        expected: usize,
    },

    #[error("matrix contains a non-finite entry at ({row}, {col})")]
    NonFinite { row: usize, col: usize },

    #[error("matrix is singular or not positive definite (pivot {pivot} = {value:e})")]
    NotPositiveDefinite { pivot: usize, value: f64 },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

fn check_square(m: &[Vec<f64>]) -> Result<usize, LinalgError> {
    let n = m.len();
    if n == 0 {
        return Err(LinalgError::Empty);
    }
    for (row, r) in m.iter().enumerate() {
        if r.len() != n {
            return Err(LinalgError::NotSquare {
                row,
                len: r.len(),
                expected: n,
            });
        }
        if let Some(col) = r.iter().position(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite { row, col });
        }
    }
    Ok(n)
}

/// Lower-triangular `L` with `A = L Lᵀ`.
///
/// Only the lower triangle of `a` is read.
pub fn cholesky(a: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, LinalgError> {
    let n = check_square(a)?;
    let scale = (0..n).map(|i| a[i][i].abs()).fold(0.0_f64, f64::max);
    let floor = PIVOT_RTOL * scale.max(f64::MIN_POSITIVE);

    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let dot: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            let s = a[i][j] - dot;
            if i == j {
                if !(s > floor) {
                    return Err(LinalgError::NotPositiveDefinite { pivot: i, value: s });
                }
                l[i][i] = s.sqrt();
            } else {
                l[i][j] = s / l[j][j];
            }
        }
    }
    Ok(l)
}

/// Inverse of a symmetric positive-definite matrix via `A⁻¹ = L⁻ᵀ L⁻¹`.
pub fn invert_spd(a: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, LinalgError> {
    let l = cholesky(a)?;
    let n = l.len();

    // forward substitution, column by column
    let mut l_inv = vec![vec![0.0; n]; n];
    for col in 0..n {
        l_inv[col][col] = 1.0 / l[col][col];
        for row in (col + 1)..n {
            let acc: f64 = (col..row).map(|k| l[row][k] * l_inv[k][col]).sum();
            l_inv[row][col] = -acc / l[row][row];
        }
    }

    let mut inv = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let v: f64 = (i..n).map(|k| l_inv[k][i] * l_inv[k][j]).sum();
            inv[i][j] = v;
            inv[j][i] = v;
        }
    }
    Ok(inv)
}

/// `vᵀ M v`.
pub fn quadratic_form(m: &[Vec<f64>], v: &[f64]) -> Result<f64, LinalgError> {
    if m.len() != v.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: m.len(),
            actual: v.len(),
        });
    }
    let mut total = 0.0;
    for (row, vi) in m.iter().zip(v) {
        if row.len() != v.len() {
            return Err(LinalgError::DimensionMismatch {
                expected: v.len(),
                actual: row.len(),
            });
        }
        total += vi * row.iter().zip(v).map(|(a, b)| a * b).sum::<f64>();
    }
    Ok(total)
}

/// Mahalanobis distance `sqrt((x-μ)ᵀ Σ⁻¹ (x-μ))` given a precomputed `Σ⁻¹`.
///
/// Tiny negative quadratic forms from rounding are clamped to zero.
pub fn mahalanobis(x: &[f64], mean: &[f64], precision: &[Vec<f64>]) -> Result<f64, LinalgError> {
    if x.len() != mean.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: mean.len(),
            actual: x.len(),
        });
    }
    let diff: Vec<f64> = x.iter().zip(mean).map(|(a, b)| a - b).collect();
    Ok(quadratic_form(precision, &diff)?.max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn matmul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let n = a.len();
        (0..n)
            .map(|i| (0..n).map(|j| (0..n).map(|k| a[i][k] * b[k][j]).sum()).collect())
            .collect()
    }

    #[test]
    fn inverse_times_matrix_is_identity() {
        let a = vec![
            vec![4.0, 1.2, 0.5],
            vec![1.2, 3.0, 0.7],
            vec![0.5, 0.7, 2.0],
        ];
        let inv = invert_spd(&a).unwrap();
        let prod = matmul(&a, &inv);
        for (i, row) in prod.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(close(*v, expected), "({i},{j}) = {v}");
            }
        }
    }

    #[test]
    fn one_by_one_reduces_to_z_score() {
        let std = 45.0_f64;
        let inv = invert_spd(&[vec![std * std]]).unwrap();
        let d = mahalanobis(&[300.0], &[210.0], &inv).unwrap();
        assert!(close(d, 2.0));
        let d_low = mahalanobis(&[120.0], &[210.0], &inv).unwrap();
        assert!(close(d_low, 2.0));
    }

    #[test]
    fn singular_matrix_rejected() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(matches!(
            invert_spd(&a),
            Err(LinalgError::NotPositiveDefinite { pivot: 1, .. })
        ));
    }

    #[test]
    fn indefinite_matrix_rejected() {
        let a = vec![vec![-1.0, 0.0], vec![0.0, 1.0]];
        assert!(matches!(
            cholesky(&a),
            Err(LinalgError::NotPositiveDefinite { pivot: 0, .. })
        ));
    }

    #[test]
    fn shape_errors() {
        assert_eq!(invert_spd(&[]), Err(LinalgError::Empty));
        assert!(matches!(
            invert_spd(&[vec![1.0, 0.0], vec![0.0]]),
            Err(LinalgError::NotSquare { row: 1, .. })
        ));
        assert!(matches!(
            invert_spd(&[vec![f64::NAN]]),
            Err(LinalgError::NonFinite { row: 0, col: 0 })
        ));
        let id = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert!(matches!(
            mahalanobis(&[1.0], &[0.0, 0.0], &id),
            Err(LinalgError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn identity_precision_gives_euclidean_distance() {
        let id = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let d = mahalanobis(&[3.0, 4.0], &[0.0, 0.0], &id).unwrap();
        assert!(close(d, 5.0));
    }
}
