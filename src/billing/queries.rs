//! Database queries for the billing domain.
//!
//! All SQL lives here. Writes that touch jsonb histories are single
//! atomic statements (or a transaction with a row lock) so concurrent
//! writers cannot drop sibling entries.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::models::{
    ApartmentBuilding, BillingRecord, Flat, MeterReading, Tariff, TariffType, WaterCounter,
    WaterType,
};

/// Get an apartment building by id
pub async fn get_building(pool: &PgPool, building_id: Uuid) -> Result<ApartmentBuilding> {
    sqlx::query_as::<_, ApartmentBuilding>(
        r#"
        SELECT id, total_area, address
        FROM apartment_buildings
        WHERE id = $1
        "#,
    )
    .bind(building_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::BuildingNotFound)
}

/// Insert a new apartment building
pub async fn insert_building(
    pool: &PgPool,
    total_area: Decimal,
    address: &str,
) -> Result<ApartmentBuilding> {
    let building = sqlx::query_as::<_, ApartmentBuilding>(
        r#"
        INSERT INTO apartment_buildings (id, total_area, address)
        VALUES ($1, $2, $3)
        RETURNING id, total_area, address
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(total_area)
    .bind(address)
    .fetch_one(pool)
    .await?;

    Ok(building)
}

/// Get all flats of a building in ascending flat-number order
pub async fn get_flats_by_building(pool: &PgPool, building_id: Uuid) -> Result<Vec<Flat>> {
    let flats = sqlx::query_as::<_, Flat>(
        r#"
        SELECT id, number, number_of_registered, area, apartment_building_id, calculations
        FROM flats
        WHERE apartment_building_id = $1
        ORDER BY number
        "#,
    )
    .bind(building_id)
    .fetch_all(pool)
    .await?;

    Ok(flats)
}

/// Get flats of a building with the detail-view filters applied
pub async fn get_flats_by_building_filtered(
    pool: &PgPool,
    building_id: Uuid,
    without_counters: bool,
    descending: bool,
) -> Result<Vec<Flat>> {
    let flats = match descending {
        false => {
            sqlx::query_as::<_, Flat>(
                r#"
                SELECT id, number, number_of_registered, area, apartment_building_id, calculations
                FROM flats
                WHERE apartment_building_id = $1
                  AND ($2 = false OR NOT EXISTS (
                        SELECT 1 FROM water_counters wc WHERE wc.flat_id = flats.id))
                ORDER BY number ASC
                "#,
            )
            .bind(building_id)
            .bind(without_counters)
            .fetch_all(pool)
            .await?
        }
        true => {
            sqlx::query_as::<_, Flat>(
                r#"
                SELECT id, number, number_of_registered, area, apartment_building_id, calculations
                FROM flats
                WHERE apartment_building_id = $1
                  AND ($2 = false OR NOT EXISTS (
                        SELECT 1 FROM water_counters wc WHERE wc.flat_id = flats.id))
                ORDER BY number DESC
                "#,
            )
            .bind(building_id)
            .bind(without_counters)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(flats)
}

/// Get one flat addressed by building and flat number
pub async fn get_flat_by_number(pool: &PgPool, building_id: Uuid, number: i32) -> Result<Flat> {
    sqlx::query_as::<_, Flat>(
        r#"
        SELECT id, number, number_of_registered, area, apartment_building_id, calculations
        FROM flats
        WHERE apartment_building_id = $1 AND number = $2
        "#,
    )
    .bind(building_id)
    .bind(number)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::FlatNotFound)
}

/// Insert a new flat
pub async fn insert_flat(
    pool: &PgPool,
    building_id: Uuid,
    number: i32,
    number_of_registered: i32,
    area: Decimal,
) -> Result<Flat> {
    let flat = sqlx::query_as::<_, Flat>(
        r#"
        INSERT INTO flats (id, number, number_of_registered, area, apartment_building_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, number, number_of_registered, area, apartment_building_id, calculations
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(number)
    .bind(number_of_registered)
    .bind(area)
    .bind(building_id)
    .fetch_one(pool)
    .await?;

    Ok(flat)
}

/// Get all counters of one flat
pub async fn get_counters_for_flat(pool: &PgPool, flat_id: Uuid) -> Result<Vec<WaterCounter>> {
    let counters = sqlx::query_as::<_, WaterCounter>(
        r#"
        SELECT id, serial_number, verification_date, water_type, meters, flat_id
        FROM water_counters
        WHERE flat_id = $1
        ORDER BY serial_number
        "#,
    )
    .bind(flat_id)
    .fetch_all(pool)
    .await?;

    Ok(counters)
}

/// Get all counters across a building (for the detail view)
pub async fn get_counters_by_building(
    pool: &PgPool,
    building_id: Uuid,
) -> Result<Vec<WaterCounter>> {
    let counters = sqlx::query_as::<_, WaterCounter>(
        r#"
        SELECT wc.id, wc.serial_number, wc.verification_date, wc.water_type, wc.meters, wc.flat_id
        FROM water_counters wc
        JOIN flats f ON wc.flat_id = f.id
        WHERE f.apartment_building_id = $1
        ORDER BY wc.serial_number
        "#,
    )
    .bind(building_id)
    .fetch_all(pool)
    .await?;

    Ok(counters)
}

/// Get one counter addressed by flat and serial number
pub async fn get_counter_by_serial(
    pool: &PgPool,
    flat_id: Uuid,
    serial_number: &str,
) -> Result<WaterCounter> {
    sqlx::query_as::<_, WaterCounter>(
        r#"
        SELECT id, serial_number, verification_date, water_type, meters, flat_id
        FROM water_counters
        WHERE flat_id = $1 AND serial_number = $2
        "#,
    )
    .bind(flat_id)
    .bind(serial_number)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::CounterNotFound)
}

/// Insert a new water counter with an empty reading history
pub async fn insert_counter(
    pool: &PgPool,
    flat_id: Uuid,
    serial_number: &str,
    verification_date: NaiveDate,
    water_type: WaterType,
) -> Result<WaterCounter> {
    let counter = sqlx::query_as::<_, WaterCounter>(
        r#"
        INSERT INTO water_counters (id, serial_number, verification_date, water_type, flat_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, serial_number, verification_date, water_type, meters, flat_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(serial_number)
    .bind(verification_date)
    .bind(water_type)
    .bind(flat_id)
    .fetch_one(pool)
    .await?;

    Ok(counter)
}

/// Append a reading to a counter's sliding-window history.
///
/// Runs under a row lock so concurrent submissions cannot lose updates.
pub async fn append_meter_reading(
    pool: &PgPool,
    counter_id: Uuid,
    reading: MeterReading,
) -> Result<WaterCounter> {
    let mut tx = pool.begin().await?;

    let mut counter = sqlx::query_as::<_, WaterCounter>(
        r#"
        SELECT id, serial_number, verification_date, water_type, meters, flat_id
        FROM water_counters
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(counter_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::CounterNotFound)?;

    counter.push_reading(reading);

    sqlx::query("UPDATE water_counters SET meters = $1 WHERE id = $2")
        .bind(Json(&counter.meters.0))
        .bind(counter_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(counter)
}

/// Get all tariff records of one type
pub async fn get_tariffs_by_type(pool: &PgPool, tariff_type: TariffType) -> Result<Vec<Tariff>> {
    let tariffs = sqlx::query_as::<_, Tariff>(
        r#"
        SELECT id, tariff_type, price
        FROM tariffs
        WHERE tariff_type = $1
        "#,
    )
    .bind(tariff_type)
    .fetch_all(pool)
    .await?;

    Ok(tariffs)
}

/// Append a billing record under its period key.
///
/// The jsonb concatenation adds the key in one statement and the guard
/// refuses to touch a flat that already carries the period, so a record,
/// once written, is never overwritten. Returns false when the period was
/// already present.
pub async fn save_billing_record(
    pool: &PgPool,
    flat_id: Uuid,
    period_key: &str,
    record: &BillingRecord,
) -> Result<bool> {
    let mut patch = serde_json::Map::new();
    patch.insert(period_key.to_string(), serde_json::to_value(record)?);

    let result = sqlx::query(
        r#"
        UPDATE flats
        SET calculations = calculations || $2
        WHERE id = $1 AND NOT (calculations ? $3)
        "#,
    )
    .bind(flat_id)
    .bind(serde_json::Value::Object(patch))
    .bind(period_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
