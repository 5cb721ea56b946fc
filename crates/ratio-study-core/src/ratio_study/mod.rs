pub mod central_tendency;
pub mod median_ci;
pub mod prb;
pub mod preprocess;
pub mod report;
pub mod vei;
