pub mod error;
pub mod ratio_study;
pub mod types;
pub mod worker;

#[cfg(feature = "synthetic")]
pub mod synthetic;

pub use error::RatioStudyError;
pub use ratio_study::report::{compute, compute_with_progress, run_ratio_study};
pub use types::*;

/// Standard result type for all ratio-study operations
pub type RatioStudyResult<T> = Result<T, RatioStudyError>;
