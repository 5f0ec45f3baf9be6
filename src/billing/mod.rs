//! Billing engine module.
//!
//! Computes monthly maintenance and water charges per flat and runs the
//! building-wide calculation as a progress-tracked batch job.

pub mod calculators;
pub mod models;
pub mod queries;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod services;

// Re-export commonly used items
pub use calculators::{period_key, round_charge, NORM_COLD_WATER, NORM_HOT_WATER};
pub use routes::router;
pub use services::{CalculationError, CalculationOutcome};
