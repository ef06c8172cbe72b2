//! Time-series assembly and sliding-window stability statistics.
//!
//! Observations are grouped into per-node series, reduced to the nodes seen on
//! every day of the range, windowed into CoV/stdev records, and finally
//! aggregated into a weekly cross-node median.

pub mod analyzer;
pub mod coverage;
pub mod series;
pub mod types;
pub mod utility;
pub mod weekly;
pub mod window;

pub use analyzer::{StabilityRun, run};
