//! Response DTOs for the billing API endpoints.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::models::{ApartmentBuilding, BillingRecord, Flat, MeterReading, WaterCounter, WaterType};

/// Apartment building as returned by the create endpoint
#[derive(Debug, Serialize)]
pub struct BuildingResponse {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_area: Decimal,
    pub address: String,
}

impl From<ApartmentBuilding> for BuildingResponse {
    fn from(building: ApartmentBuilding) -> Self {
        Self {
            id: building.id,
            total_area: building.total_area,
            address: building.address,
        }
    }
}

/// Building detail with its (possibly filtered) flats
#[derive(Debug, Serialize)]
pub struct BuildingDetailResponse {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_area: Decimal,
    pub address: String,
    pub flats: Vec<FlatResponse>,
}

/// Flat with nested counters and past calculations
#[derive(Debug, Serialize)]
pub struct FlatResponse {
    pub id: Uuid,
    pub number: i32,
    pub number_of_registered: i32,
    #[serde(with = "rust_decimal::serde::str")]
    pub area: Decimal,
    pub water_counters: Vec<WaterCounterResponse>,
    pub calculations: BTreeMap<String, BillingRecord>,
}

impl FlatResponse {
    pub fn from_parts(flat: Flat, counters: Vec<WaterCounter>) -> Self {
        Self {
            id: flat.id,
            number: flat.number,
            number_of_registered: flat.number_of_registered,
            area: flat.area,
            water_counters: counters.into_iter().map(Into::into).collect(),
            calculations: flat.calculations.0,
        }
    }
}

/// Water counter with its reading history
#[derive(Debug, Serialize)]
pub struct WaterCounterResponse {
    pub id: Uuid,
    pub serial_number: String,
    pub verification_date: NaiveDate,
    pub type_water_counter: WaterType,
    pub meters: Vec<MeterReading>,
}

impl From<WaterCounter> for WaterCounterResponse {
    fn from(counter: WaterCounter) -> Self {
        Self {
            id: counter.id,
            serial_number: counter.serial_number,
            verification_date: counter.verification_date,
            type_water_counter: counter.water_type,
            meters: counter.meters.0,
        }
    }
}

/// Acknowledgment returned when a billing run is queued
#[derive(Debug, Serialize)]
pub struct CalculationAcceptedResponse {
    pub status: &'static str,
}

impl CalculationAcceptedResponse {
    pub fn accepted() -> Self {
        Self { status: "accepted" }
    }
}
