//! Database models for the billing domain.
//!
//! These models use sqlx's FromRow derive for direct database deserialization.
//! Meter readings and per-period billing records live in jsonb columns and are
//! typed through `sqlx::types::Json`.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::calculators::{NORM_COLD_WATER, NORM_HOT_WATER};

/// Water supply type served by a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WaterType {
    Cold,
    Hot,
}

impl WaterType {
    /// Regulatory per-capita monthly consumption for this supply type
    pub fn monthly_norm(self) -> Decimal {
        match self {
            WaterType::Cold => NORM_COLD_WATER,
            WaterType::Hot => NORM_HOT_WATER,
        }
    }

    /// Calibration validity window counted from the verification date
    pub fn verification_window(self) -> Duration {
        match self {
            WaterType::Cold => Duration::days(6 * 365),
            WaterType::Hot => Duration::days(4 * 365),
        }
    }
}

/// Tariff category from the tariffs table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TariffType {
    MaintenanceOfCommonProperty,
    ColdWaterForFlat,
    HotWaterForFlat,
}

impl TariffType {
    pub fn as_str(self) -> &'static str {
        match self {
            TariffType::MaintenanceOfCommonProperty => "maintenance_of_common_property",
            TariffType::ColdWaterForFlat => "cold_water_for_flat",
            TariffType::HotWaterForFlat => "hot_water_for_flat",
        }
    }
}

/// Apartment building from apartment_buildings
#[derive(Debug, Clone, FromRow)]
pub struct ApartmentBuilding {
    pub id: Uuid,
    pub total_area: Decimal,
    pub address: String,
}

/// Flat from flats
#[derive(Debug, Clone, FromRow)]
pub struct Flat {
    pub id: Uuid,
    pub number: i32,
    pub number_of_registered: i32,
    pub area: Decimal,
    pub apartment_building_id: Uuid,
    pub calculations: Json<BTreeMap<String, BillingRecord>>,
}

impl Flat {
    /// Whether a billing record already exists for the period key
    pub fn is_billed(&self, period_key: &str) -> bool {
        self.calculations.0.contains_key(period_key)
    }
}

/// Tariff from tariffs
#[derive(Debug, Clone, FromRow)]
pub struct Tariff {
    pub id: Uuid,
    pub tariff_type: TariffType,
    pub price: Decimal,
}

/// One dated meter reading inside a counter's jsonb history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub meter_reading_date: String,
    pub meter_reading_value: i64,
}

impl MeterReading {
    pub fn date(&self) -> Result<NaiveDate, chrono::ParseError> {
        NaiveDate::parse_from_str(&self.meter_reading_date, "%Y-%m-%d")
    }

    pub fn value(&self) -> Decimal {
        Decimal::from(self.meter_reading_value)
    }
}

/// Water counter from water_counters
#[derive(Debug, Clone, FromRow)]
pub struct WaterCounter {
    pub id: Uuid,
    pub serial_number: String,
    pub verification_date: NaiveDate,
    pub water_type: WaterType,
    pub meters: Json<Vec<MeterReading>>,
    pub flat_id: Uuid,
}

impl WaterCounter {
    /// Retained reading history; appending past this drops the oldest entry
    pub const MAX_READINGS: usize = 12;

    /// Last date the counter's calibration is still considered valid
    pub fn expiration_date(&self) -> NaiveDate {
        self.verification_date + self.water_type.verification_window()
    }

    /// Readings are presumed unreliable strictly after the expiration date
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        as_of > self.expiration_date()
    }

    /// Append a reading, keeping at most `MAX_READINGS` entries (oldest out)
    pub fn push_reading(&mut self, reading: MeterReading) {
        self.meters.0.push(reading);
        if self.meters.0.len() > Self::MAX_READINGS {
            self.meters.0.remove(0);
        }
    }
}

/// Charges stored under a period key in Flat.calculations.
///
/// Immutable once written for a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    pub maintenance_of_common_property: Decimal,
    pub cold_water_usage_price: Decimal,
    pub hot_water_usage_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reading(date: &str, value: i64) -> MeterReading {
        MeterReading {
            meter_reading_date: date.to_string(),
            meter_reading_value: value,
        }
    }

    fn counter(water_type: WaterType, verification_date: &str) -> WaterCounter {
        WaterCounter {
            id: Uuid::new_v4(),
            serial_number: "12345678".to_string(),
            verification_date: NaiveDate::parse_from_str(verification_date, "%Y-%m-%d").unwrap(),
            water_type,
            meters: Json(Vec::new()),
            flat_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_push_reading_keeps_sliding_window() {
        let mut c = counter(WaterType::Cold, "2023-01-10");
        for month in 1..=12 {
            c.push_reading(reading(&format!("2023-{:02}-01", month), month as i64));
        }
        assert_eq!(c.meters.0.len(), WaterCounter::MAX_READINGS);

        c.push_reading(reading("2024-01-01", 13));
        assert_eq!(c.meters.0.len(), WaterCounter::MAX_READINGS);
        // oldest entry dropped, newest appended
        assert_eq!(c.meters.0[0].meter_reading_value, 2);
        assert_eq!(c.meters.0[11].meter_reading_value, 13);
    }

    #[test]
    fn test_expiration_windows_by_type() {
        let cold = counter(WaterType::Cold, "2020-03-15");
        let hot = counter(WaterType::Hot, "2020-03-15");
        assert_eq!(
            cold.expiration_date() - cold.verification_date,
            Duration::days(6 * 365)
        );
        assert_eq!(
            hot.expiration_date() - hot.verification_date,
            Duration::days(4 * 365)
        );
    }

    #[test]
    fn test_is_expired_boundary() {
        let c = counter(WaterType::Hot, "2021-06-01");
        // valid through the expiration date itself, expired the day after
        assert!(!c.is_expired(c.expiration_date()));
        assert!(c.is_expired(c.expiration_date() + Duration::days(1)));
    }

    #[test]
    fn test_reading_date_parsing() {
        assert_eq!(
            reading("2024-07-01", 10).date().unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
        );
        assert!(reading("07/01/2024", 10).date().is_err());
    }
}
