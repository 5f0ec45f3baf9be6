//! Deferred execution of billing runs.
//!
//! Calculation requests are queued on an in-process channel and drained
//! by a single worker task. The submitting caller gets an immediate
//! acknowledgment and observes the run through the progress store
//! instead of blocking on it.

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use uuid::Uuid;

use crate::billing::services;
use crate::cache::ProgressStore;

#[derive(Debug, Clone)]
pub enum CalculationJob {
    Run {
        building_id: Uuid,
        year: i32,
        month: u32,
    },
}

/// Spawn the worker task and return the submission handle.
///
/// Jobs run sequentially in submission order. A failed run is logged and
/// the worker moves on; it never takes the process down.
pub fn start_worker(pool: PgPool, progress: ProgressStore) -> Sender<CalculationJob> {
    let (tx, mut rx): (Sender<CalculationJob>, Receiver<CalculationJob>) = channel(32);

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let CalculationJob::Run {
                building_id,
                year,
                month,
            } = job;

            let as_of = Utc::now().date_naive();
            match services::run_calculation(&pool, &progress, building_id, year, month, as_of)
                .await
            {
                Ok(outcome) => {
                    tracing::info!(
                        %building_id,
                        year,
                        month,
                        billed = outcome.billed,
                        skipped = outcome.skipped,
                        failed = outcome.failures.len(),
                        "billing run finished"
                    );
                }
                Err(err) => {
                    tracing::error!(%building_id, year, month, error = %err, "billing run failed");
                }
            }
        }
    });

    tx
}
