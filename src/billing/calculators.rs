//! Core billing calculation functions.
//!
//! Pure functions for charge math - no database access. Given a flat, its
//! counters and the resolved tariff rates, these decide per counter whether
//! to bill by metered usage or by the regulatory norm and produce the
//! billing record for one period.

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::models::{BillingRecord, Flat, MeterReading, WaterCounter, WaterType};
use super::services::CalculationError;

/// Regulatory per-capita monthly cold water consumption, cubic meters
pub const NORM_COLD_WATER: Decimal = dec!(6.935);

/// Regulatory per-capita monthly hot water consumption, cubic meters
pub const NORM_HOT_WATER: Decimal = dec!(4.745);

/// Tariff rates resolved once per calculation run
#[derive(Debug, Clone, Copy)]
pub struct TariffRates {
    /// Currency per square meter of flat area
    pub maintenance: Decimal,
    /// Currency per cubic meter of cold water
    pub cold_water: Decimal,
    /// Currency per cubic meter of hot water
    pub hot_water: Decimal,
}

/// Cold and hot volume usage for one flat and period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterUsage {
    pub cold: Decimal,
    pub hot: Decimal,
}

/// Round a charge to two decimal places using half-up rounding
/// (0.005 rounds to 0.01).
pub fn round_charge(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Billing period key, e.g. `"2024-07"`
pub fn period_key(year: i32, month: u32) -> String {
    format!("{year}-{month:02}")
}

/// Norm-based usage for a supply type and registered-occupant count
pub fn norm_usage(water_type: WaterType, occupants: i32) -> Decimal {
    water_type.monthly_norm() * Decimal::from(occupants)
}

/// Resolve the billable volume for one counter in the target period.
///
/// Falls back to the norm when the counter's verification window has
/// lapsed, when it has no readings, or when its most recent reading is
/// not from the target month. A counter with a single in-period reading
/// is treated as brand new with an implicit zero baseline. Usage is
/// clamped at zero so decreasing readings never produce a negative
/// contribution.
pub fn counter_usage(
    counter: &WaterCounter,
    year: i32,
    month: u32,
    occupants: i32,
    as_of: NaiveDate,
) -> Result<Decimal, CalculationError> {
    let norm = norm_usage(counter.water_type, occupants);

    if counter.is_expired(as_of) {
        return Ok(norm);
    }

    let readings = &counter.meters.0;
    match readings.len() {
        0 => Ok(norm),
        1 => {
            let only = &readings[0];
            if in_period(reading_date(counter, only)?, year, month) {
                // new counter: previous reading taken as zero
                Ok((only.value() - Decimal::ZERO).max(Decimal::ZERO))
            } else {
                Ok(norm)
            }
        }
        len => {
            let last = &readings[len - 1];
            if in_period(reading_date(counter, last)?, year, month) {
                let previous = &readings[len - 2];
                Ok((last.value() - previous.value()).max(Decimal::ZERO))
            } else {
                Ok(norm)
            }
        }
    }
}

/// Aggregate cold and hot usage for a flat across all of its counters.
///
/// A supply type with no counter at all is billed entirely by norm;
/// several counters of one type sum their usages.
pub fn water_usage(
    flat: &Flat,
    counters: &[WaterCounter],
    year: i32,
    month: u32,
    as_of: NaiveDate,
) -> Result<WaterUsage, CalculationError> {
    let mut cold = Decimal::ZERO;
    let mut hot = Decimal::ZERO;
    let mut cold_counter_exists = false;
    let mut hot_counter_exists = false;

    for counter in counters {
        let usage = counter_usage(counter, year, month, flat.number_of_registered, as_of)?;
        match counter.water_type {
            WaterType::Cold => {
                cold_counter_exists = true;
                cold += usage;
            }
            WaterType::Hot => {
                hot_counter_exists = true;
                hot += usage;
            }
        }
    }

    if !cold_counter_exists {
        cold += norm_usage(WaterType::Cold, flat.number_of_registered);
    }
    if !hot_counter_exists {
        hot += norm_usage(WaterType::Hot, flat.number_of_registered);
    }

    Ok(WaterUsage { cold, hot })
}

/// Compute one flat's billing record for one period.
///
/// Maintenance is stored as computed; water charges are rounded half-up
/// to two decimal places. Pure computation - persistence is the caller's
/// responsibility.
pub fn bill_flat(
    flat: &Flat,
    counters: &[WaterCounter],
    tariffs: &TariffRates,
    year: i32,
    month: u32,
    as_of: NaiveDate,
) -> Result<BillingRecord, CalculationError> {
    let usage = water_usage(flat, counters, year, month, as_of)?;

    Ok(BillingRecord {
        maintenance_of_common_property: flat.area * tariffs.maintenance,
        cold_water_usage_price: round_charge(usage.cold * tariffs.cold_water),
        hot_water_usage_price: round_charge(usage.hot * tariffs.hot_water),
    })
}

fn in_period(date: NaiveDate, year: i32, month: u32) -> bool {
    date.year() == year && date.month() == month
}

fn reading_date(
    counter: &WaterCounter,
    reading: &MeterReading,
) -> Result<NaiveDate, CalculationError> {
    reading.date().map_err(|_| CalculationError::InvalidReading {
        serial_number: counter.serial_number.clone(),
        date: reading.meter_reading_date.clone(),
    })
}
