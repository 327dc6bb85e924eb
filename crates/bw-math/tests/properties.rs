//! Property-based tests for bw-math numerical functions.

use bw_math::{
    chi2_cdf, chi2_quantile, distance_threshold, gamma_p, gamma_q, invert_spd, log_gamma,
    mahalanobis,
};
use proptest::prelude::*;

const TOL: f64 = 1e-9;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

/// Diagonally dominant symmetric matrices are always SPD.
fn spd_matrix(d: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(-1.0..1.0f64, d * d).prop_map(move |raw| {
        let mut m = vec![vec![0.0; d]; d];
        for i in 0..d {
            for j in 0..i {
                let v = raw[i * d + j];
                m[i][j] = v;
                m[j][i] = v;
            }
        }
        for (i, row) in m.iter_mut().enumerate() {
            let off: f64 = row.iter().map(|v| v.abs()).sum();
            row[i] = off + 0.5 + raw[i * d + i].abs();
        }
        m
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Γ(z+1) = z Γ(z).
    #[test]
    fn log_gamma_recurrence(z in 0.1..60.0f64) {
        let lhs = log_gamma(z + 1.0);
        let rhs = z.ln() + log_gamma(z);
        prop_assert!(approx_eq(lhs, rhs, 1e-8), "z={} lhs={} rhs={}", z, lhs, rhs);
    }

    #[test]
    fn gamma_p_q_sum_to_one(a in 0.1..30.0f64, x in 0.0..100.0f64) {
        prop_assert!(approx_eq(gamma_p(a, x) + gamma_q(a, x), 1.0, 1e-10));
    }

    #[test]
    fn chi2_cdf_monotone(df in 1u32..9, x in 0.0..50.0f64, dx in 0.0..10.0f64) {
        let df = df as f64;
        prop_assert!(chi2_cdf(x, df) <= chi2_cdf(x + dx, df) + 1e-15);
    }

    #[test]
    fn quantile_inverts_cdf(p in 0.01..0.999f64, df in 1u32..9) {
        let df = df as f64;
        let q = chi2_quantile(p, df);
        prop_assert!(approx_eq(chi2_cdf(q, df), p, 1e-8), "p={} df={} q={}", p, df, q);
    }

    /// Higher confidence never lowers the cut-off.
    #[test]
    fn threshold_monotone_in_confidence(a in 0.5..0.999f64, b in 0.5..0.999f64, d in 1usize..9) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(distance_threshold(lo, d) <= distance_threshold(hi, d) + TOL);
    }

    /// One-dimensional distance is symmetric about the mean.
    #[test]
    fn one_dim_distance_symmetric(mean in 0.0..900.0f64, std in 1.0..300.0f64, delta in 0.0..600.0f64) {
        let precision = invert_spd(&[vec![std * std]]).unwrap();
        let above = mahalanobis(&[mean + delta], &[mean], &precision).unwrap();
        let below = mahalanobis(&[mean - delta], &[mean], &precision).unwrap();
        prop_assert!(approx_eq(above, below, TOL));
        prop_assert!(approx_eq(above, delta / std, 1e-8));
    }

    #[test]
    fn spd_inverse_round_trips(m in (1usize..7).prop_flat_map(spd_matrix)) {
        let inv = invert_spd(&m).unwrap();
        let n = m.len();
        for i in 0..n {
            for j in 0..n {
                let v: f64 = (0..n).map(|k| m[i][k] * inv[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                prop_assert!((v - expected).abs() < 1e-8, "({},{})={}", i, j, v);
            }
        }
    }

    #[test]
    fn distance_is_non_negative(m in spd_matrix(3), x in prop::collection::vec(-500.0..500.0f64, 3)) {
        let inv = invert_spd(&m).unwrap();
        let d = mahalanobis(&x, &[0.0, 0.0, 0.0], &inv).unwrap();
        prop_assert!(d >= 0.0 && d.is_finite());
    }
}
