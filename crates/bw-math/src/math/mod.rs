//! Core math modules.

pub mod chi2;
pub mod linalg;
pub mod special;
