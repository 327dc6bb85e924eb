//! Chi-square distribution: CDF, quantile and the Mahalanobis cut-off.
//!
//! For a `d`-dimensional Gaussian, the squared Mahalanobis distance of a
//! sample follows `χ²(d)`. A sample is flagged when its distance exceeds
//! `sqrt(χ²_d⁻¹(confidence))`. In one dimension this reduces to the
//! two-sided normal quantile (1.96 at 95%).

use super::special::gamma_p;

const BISECT_ITERS: usize = 200;
const BRACKET_LIMIT: f64 = 1.0e6;

/// `P(X <= x)` for `X ~ χ²(df)`.
pub fn chi2_cdf(x: f64, df: f64) -> f64 {
    if x.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    gamma_p(df / 2.0, x / 2.0)
}

/// Inverse CDF of `χ²(df)`.
///
/// `p` must lie in `[0, 1]`; `p = 1` maps to `+∞`. Solved by bracketing
/// then bisection, which is plenty for the handful of (confidence, dim)
/// pairs a run ever asks for.
pub fn chi2_quantile(p: f64, df: f64) -> f64 {
    if p.is_nan() || df.is_nan() || !(0.0..=1.0).contains(&p) || df <= 0.0 {
        return f64::NAN;
    }
    if p == 0.0 {
        return 0.0;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let mut lo = 0.0;
    let mut hi = df.max(1.0);
    while chi2_cdf(hi, df) < p {
        lo = hi;
        hi *= 2.0;
        if hi > BRACKET_LIMIT {
            return f64::INFINITY;
        }
    }

    for _ in 0..BISECT_ITERS {
        let mid = 0.5 * (lo + hi);
        if chi2_cdf(mid, df) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * hi.max(1.0) {
            break;
        }
    }
    0.5 * (lo + hi)
}

/// Distance threshold for a `dim`-dimensional sample at `confidence`.
///
/// Returns NaN when `dim == 0` or `confidence` is outside `(0, 1)`.
pub fn distance_threshold(confidence: f64, dim: usize) -> f64 {
    if dim == 0 || !(confidence > 0.0 && confidence < 1.0) {
        return f64::NAN;
    }
    chi2_quantile(confidence, dim as f64).sqrt()
}
