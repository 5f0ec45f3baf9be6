//! vodomer-web: utility billing for apartment buildings.
//!
//! Computes monthly common-property maintenance and cold/hot water
//! charges per flat, by metered usage where a trustworthy counter
//! reading exists and by regulatory norm otherwise. Building-wide runs
//! execute as deferred jobs observable through a TTL-bounded progress
//! store.

pub mod billing;
pub mod cache;
pub mod error;
pub mod jobs;

use sqlx::PgPool;
use tokio::sync::mpsc::Sender;

use crate::cache::ProgressStore;
use crate::jobs::CalculationJob;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub progress: ProgressStore,
    pub jobs: Sender<CalculationJob>,
}
