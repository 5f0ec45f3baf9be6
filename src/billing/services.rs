//! Billing batch services with database access.
//!
//! `run_calculation` drives one building-wide billing run: resolve the
//! tariffs once, walk the flats in ascending number order, skip periods
//! that are already billed, persist each new record and advance the
//! progress store after every flat.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::ProgressStore;
use crate::error::AppError;

use super::calculators::{self, period_key, TariffRates};
use super::models::{Flat, TariffType};
use super::queries;

/// Calculation error types
#[derive(Debug, Clone)]
pub enum CalculationError {
    MissingTariff {
        tariff_type: TariffType,
    },
    AmbiguousTariff {
        tariff_type: TariffType,
    },
    BuildingNotFound {
        building_id: Uuid,
    },
    InvalidReading {
        serial_number: String,
        date: String,
    },
    Storage {
        message: String,
    },
}

impl std::fmt::Display for CalculationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalculationError::MissingTariff { tariff_type } => {
                write!(f, "no tariff configured for type '{}'", tariff_type.as_str())
            }
            CalculationError::AmbiguousTariff { tariff_type } => {
                write!(
                    f,
                    "more than one tariff configured for type '{}'",
                    tariff_type.as_str()
                )
            }
            CalculationError::BuildingNotFound { building_id } => {
                write!(f, "apartment building {} not found", building_id)
            }
            CalculationError::InvalidReading {
                serial_number,
                date,
            } => {
                write!(
                    f,
                    "counter {} has an unparseable reading date '{}'",
                    serial_number, date
                )
            }
            CalculationError::Storage { message } => {
                write!(f, "storage error: {}", message)
            }
        }
    }
}

impl std::error::Error for CalculationError {}

impl From<AppError> for CalculationError {
    fn from(err: AppError) -> Self {
        CalculationError::Storage {
            message: err.to_string(),
        }
    }
}

/// One flat that failed inside an otherwise continuing run
#[derive(Debug, Clone)]
pub struct FlatFailure {
    pub flat_number: i32,
    pub message: String,
}

/// Result of a completed billing run
#[derive(Debug, Clone, Default)]
pub struct CalculationOutcome {
    pub billed: u32,
    pub skipped: u32,
    pub failures: Vec<FlatFailure>,
}

/// Resolve the three required tariff rates for a calculation run.
///
/// Each type must have exactly one tariff record; zero or several are
/// configuration errors that abort the run before any flat is processed.
pub async fn resolve_tariffs(pool: &PgPool) -> Result<TariffRates, CalculationError> {
    Ok(TariffRates {
        maintenance: single_tariff_rate(pool, TariffType::MaintenanceOfCommonProperty).await?,
        cold_water: single_tariff_rate(pool, TariffType::ColdWaterForFlat).await?,
        hot_water: single_tariff_rate(pool, TariffType::HotWaterForFlat).await?,
    })
}

async fn single_tariff_rate(
    pool: &PgPool,
    tariff_type: TariffType,
) -> Result<Decimal, CalculationError> {
    let tariffs = queries::get_tariffs_by_type(pool, tariff_type).await?;
    match tariffs.as_slice() {
        [] => Err(CalculationError::MissingTariff { tariff_type }),
        [only] => Ok(only.price),
        _ => Err(CalculationError::AmbiguousTariff { tariff_type }),
    }
}

/// Run the billing calculation for every flat of a building.
///
/// Progress is written to the store before the first flat and after each
/// one (refreshing its TTL), so a poller sees `completed` climb towards
/// `total`. Flats already billed for the period are skipped without a
/// write. A failure on one flat is logged, recorded in the outcome and
/// does not stop the rest of the batch; records written before a failure
/// stay in place.
pub async fn run_calculation(
    pool: &PgPool,
    progress: &ProgressStore,
    building_id: Uuid,
    year: i32,
    month: u32,
    as_of: NaiveDate,
) -> Result<CalculationOutcome, CalculationError> {
    let flats = queries::get_flats_by_building(pool, building_id).await?;
    if flats.is_empty() {
        // distinguish an empty building from an unknown id
        queries::get_building(pool, building_id)
            .await
            .map_err(|err| match err {
                AppError::BuildingNotFound => CalculationError::BuildingNotFound { building_id },
                other => other.into(),
            })?;
    }

    progress.begin(building_id, flats.len() as u32).await;

    let tariffs = resolve_tariffs(pool).await?;
    let period = period_key(year, month);

    tracing::info!(
        %building_id,
        year,
        month,
        flats = flats.len(),
        "billing run started"
    );

    let mut outcome = CalculationOutcome::default();
    for flat in &flats {
        match bill_single_flat(pool, flat, &tariffs, year, month, as_of, &period).await {
            Ok(true) => outcome.billed += 1,
            Ok(false) => outcome.skipped += 1,
            Err(err) => {
                tracing::warn!(flat_number = flat.number, error = %err, "flat billing failed");
                outcome.failures.push(FlatFailure {
                    flat_number: flat.number,
                    message: err.to_string(),
                });
            }
        }
        progress.advance(building_id).await;
    }

    Ok(outcome)
}

/// Bill one flat for one period. Returns false when the period was
/// already billed and nothing was written.
async fn bill_single_flat(
    pool: &PgPool,
    flat: &Flat,
    tariffs: &TariffRates,
    year: i32,
    month: u32,
    as_of: NaiveDate,
    period: &str,
) -> Result<bool, CalculationError> {
    if flat.is_billed(period) {
        return Ok(false);
    }

    let counters = queries::get_counters_for_flat(pool, flat.id).await?;
    let record = calculators::bill_flat(flat, &counters, tariffs, year, month, as_of)?;
    let written = queries::save_billing_record(pool, flat.id, period, &record).await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculation_error_display() {
        let err = CalculationError::MissingTariff {
            tariff_type: TariffType::ColdWaterForFlat,
        };
        assert!(err.to_string().contains("cold_water_for_flat"));

        let err = CalculationError::AmbiguousTariff {
            tariff_type: TariffType::MaintenanceOfCommonProperty,
        };
        assert!(err.to_string().contains("more than one"));

        let building_id = Uuid::new_v4();
        let err = CalculationError::BuildingNotFound { building_id };
        assert!(err.to_string().contains(&building_id.to_string()));

        let err = CalculationError::InvalidReading {
            serial_number: "12345678".to_string(),
            date: "bogus".to_string(),
        };
        assert!(err.to_string().contains("12345678"));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_app_error_converts_to_storage() {
        let err: CalculationError = AppError::FlatNotFound.into();
        assert!(matches!(err, CalculationError::Storage { .. }));
    }
}
