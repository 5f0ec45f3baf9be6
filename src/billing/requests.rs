//! Request DTOs for the billing API endpoints.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::models::WaterType;

/// Request to register an apartment building
#[derive(Debug, Deserialize)]
pub struct CreateBuildingRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub total_area: Decimal,
    pub address: String,
}

/// Request to register a flat in a building
#[derive(Debug, Deserialize)]
pub struct CreateFlatRequest {
    pub number: i32,
    #[serde(default = "default_registered")]
    pub number_of_registered: i32,
    #[serde(with = "rust_decimal::serde::str")]
    pub area: Decimal,
    pub apartment_building: Uuid,
}

// there is always at least the owner
fn default_registered() -> i32 {
    1
}

/// Request to install a water counter; the flat is addressed by
/// building and flat number
#[derive(Debug, Deserialize)]
pub struct CreateWaterCounterRequest {
    pub serial_number: String,
    pub verification_date: NaiveDate,
    pub type_water_counter: WaterType,
    pub apartment_building_id: Uuid,
    pub flat_number: i32,
}

/// Request to submit a meter reading
#[derive(Debug, Deserialize)]
pub struct AddMeterReadingRequest {
    pub apartment_building_id: Uuid,
    pub flat_number: i32,
    pub serial_number: String,
    pub meter_reading_date: String,
    pub meter_reading_value: i64,
}

/// Request to start a billing run for one period
#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub year: i32,
    pub month: u32,
}
