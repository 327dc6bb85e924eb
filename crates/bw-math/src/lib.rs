//! Bunchwatch math utilities.

pub mod math;

pub use math::chi2::{chi2_cdf, chi2_quantile, distance_threshold};
pub use math::linalg::{cholesky, invert_spd, mahalanobis, quadratic_form, LinalgError};
pub use math::special::{gamma_p, gamma_q, log_gamma};
