//! Billing route handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::cache::CalculationProgress;
use crate::error::{AppError, Result};
use crate::jobs::CalculationJob;
use crate::AppState;

use super::models::{MeterReading, WaterCounter};
use super::queries;
use super::requests::{
    AddMeterReadingRequest, CalculateRequest, CreateBuildingRequest, CreateFlatRequest,
    CreateWaterCounterRequest,
};
use super::responses::{
    BuildingDetailResponse, BuildingResponse, CalculationAcceptedResponse, FlatResponse,
    WaterCounterResponse,
};

/// Query parameters for the building detail view
#[derive(Debug, Deserialize)]
pub struct BuildingDetailQuery {
    /// "number" (default) or "-number" for descending
    #[serde(default)]
    pub ordering: Option<String>,
    /// Only flats without any water counter
    #[serde(default)]
    pub no_water_counters: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/apartment-building/:id", get(building_detail))
        .route("/create/apartment-building", post(create_building))
        .route("/create/flat", post(create_flat))
        .route("/create/water-counter", post(create_water_counter))
        .route("/add-meter-reading", post(add_meter_reading))
        .route("/calculate/:building_id", post(calculate))
        .route("/calculation-progress/:building_id", get(calculation_progress))
}

/// Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Building detail with nested flats, counters and past calculations
pub async fn building_detail(
    State(state): State<AppState>,
    Path(building_id): Path<Uuid>,
    Query(query): Query<BuildingDetailQuery>,
) -> Result<Json<BuildingDetailResponse>> {
    let building = queries::get_building(&state.db, building_id).await?;

    let descending = matches!(query.ordering.as_deref(), Some("-number"));
    let flats = queries::get_flats_by_building_filtered(
        &state.db,
        building_id,
        query.no_water_counters,
        descending,
    )
    .await?;

    let mut counters_by_flat: HashMap<Uuid, Vec<WaterCounter>> = HashMap::new();
    for counter in queries::get_counters_by_building(&state.db, building_id).await? {
        counters_by_flat
            .entry(counter.flat_id)
            .or_default()
            .push(counter);
    }

    let mut flat_responses = Vec::with_capacity(flats.len());
    for flat in flats {
        let counters = counters_by_flat.remove(&flat.id).unwrap_or_default();
        flat_responses.push(FlatResponse::from_parts(flat, counters));
    }

    Ok(Json(BuildingDetailResponse {
        id: building.id,
        total_area: building.total_area,
        address: building.address,
        flats: flat_responses,
    }))
}

/// Register an apartment building
pub async fn create_building(
    State(state): State<AppState>,
    Json(req): Json<CreateBuildingRequest>,
) -> Result<(StatusCode, Json<BuildingResponse>)> {
    if req.total_area <= Decimal::ZERO {
        return Err(AppError::Validation(
            "total_area must be a positive number".to_string(),
        ));
    }

    let building = queries::insert_building(&state.db, req.total_area, &req.address).await?;
    Ok((StatusCode::CREATED, Json(building.into())))
}

/// Register a flat in a building
pub async fn create_flat(
    State(state): State<AppState>,
    Json(req): Json<CreateFlatRequest>,
) -> Result<(StatusCode, Json<FlatResponse>)> {
    if req.number_of_registered < 1 {
        return Err(AppError::Validation(
            "number_of_registered must be a positive number".to_string(),
        ));
    }
    if req.area <= Decimal::ZERO {
        return Err(AppError::Validation(
            "area must be a positive number".to_string(),
        ));
    }

    queries::get_building(&state.db, req.apartment_building).await?;

    let flat = queries::insert_flat(
        &state.db,
        req.apartment_building,
        req.number,
        req.number_of_registered,
        req.area,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(FlatResponse::from_parts(flat, Vec::new())),
    ))
}

/// Install a water counter on a flat addressed by building + number
pub async fn create_water_counter(
    State(state): State<AppState>,
    Json(req): Json<CreateWaterCounterRequest>,
) -> Result<(StatusCode, Json<WaterCounterResponse>)> {
    let flat =
        queries::get_flat_by_number(&state.db, req.apartment_building_id, req.flat_number).await?;

    let counter = queries::insert_counter(
        &state.db,
        flat.id,
        &req.serial_number,
        req.verification_date,
        req.type_water_counter,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(counter.into())))
}

/// Submit a meter reading into a counter's sliding-window history
pub async fn add_meter_reading(
    State(state): State<AppState>,
    Json(req): Json<AddMeterReadingRequest>,
) -> Result<Json<WaterCounterResponse>> {
    if NaiveDate::parse_from_str(&req.meter_reading_date, "%Y-%m-%d").is_err() {
        return Err(AppError::Validation(
            "meter_reading_date must be formatted YYYY-MM-DD".to_string(),
        ));
    }

    let flat =
        queries::get_flat_by_number(&state.db, req.apartment_building_id, req.flat_number).await?;
    let counter = queries::get_counter_by_serial(&state.db, flat.id, &req.serial_number).await?;

    let reading = MeterReading {
        meter_reading_date: req.meter_reading_date,
        meter_reading_value: req.meter_reading_value,
    };
    let counter = queries::append_meter_reading(&state.db, counter.id, reading).await?;

    Ok(Json(counter.into()))
}

/// Queue a billing run for one building and period.
///
/// Returns 202 immediately; the run executes on the worker and is
/// observable through the progress endpoint.
pub async fn calculate(
    State(state): State<AppState>,
    Path(building_id): Path<Uuid>,
    Json(req): Json<CalculateRequest>,
) -> Result<(StatusCode, Json<CalculationAcceptedResponse>)> {
    if !(1..=12).contains(&req.month) {
        return Err(AppError::Validation(
            "month must be between 1 and 12".to_string(),
        ));
    }

    queries::get_building(&state.db, building_id).await?;

    let job = CalculationJob::Run {
        building_id,
        year: req.year,
        month: req.month,
    };
    state
        .jobs
        .send(job)
        .await
        .map_err(|_| AppError::Internal("calculation worker is not running".to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CalculationAcceptedResponse::accepted()),
    ))
}

/// Poll the progress of a running billing batch
pub async fn calculation_progress(
    State(state): State<AppState>,
    Path(building_id): Path<Uuid>,
) -> Result<Json<CalculationProgress>> {
    match state.progress.get(building_id).await {
        Some(progress) => Ok(Json(progress)),
        None => Err(AppError::ProgressNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ProgressStore;
    use crate::jobs;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    // lazy pool: no connection is made until a handler touches the db,
    // so routes that stay out of the database are testable offline
    fn test_state() -> AppState {
        let db = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/vodomer_test")
            .expect("lazy pool");
        let progress = ProgressStore::new();
        let jobs = jobs::start_worker(db.clone(), progress.clone());
        AppState { db, progress, jobs }
    }

    fn test_app() -> (Router, AppState) {
        let state = test_state();
        (router().with_state(state.clone()), state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let (app, _state) = test_app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_progress_absent_returns_not_found() {
        let (app, _state) = test_app();
        let uri = format!("/calculation-progress/{}", Uuid::new_v4());
        let response = app
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"],
            "no calculation in progress"
        );
    }

    #[tokio::test]
    async fn test_progress_reports_counts() {
        let (app, state) = test_app();
        let building_id = Uuid::new_v4();
        state.progress.begin(building_id, 3).await;
        state.progress.advance(building_id).await;

        let uri = format!("/calculation-progress/{}", building_id);
        let response = app
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["completed"], 1);
    }

    #[tokio::test]
    async fn test_calculate_rejects_invalid_month() {
        let (app, _state) = test_app();
        let uri = format!("/calculate/{}", Uuid::new_v4());
        let response = app
            .oneshot(
                Request::post(uri.as_str())
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"year": 2024, "month": 13}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["error"],
            "month must be between 1 and 12"
        );
    }

    #[tokio::test]
    async fn test_create_building_rejects_non_positive_area() {
        let (app, _state) = test_app();
        let response = app
            .oneshot(
                Request::post("/create/apartment-building")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"total_area": "0.00", "address": "Test street 1"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_create_flat_rejects_zero_registered() {
        let (app, _state) = test_app();
        let body = format!(
            r#"{{"number": 101, "number_of_registered": 0, "area": "45.00", "apartment_building": "{}"}}"#,
            Uuid::new_v4()
        );
        let response = app
            .oneshot(
                Request::post("/create/flat")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["error"],
            "number_of_registered must be a positive number"
        );
    }

    #[tokio::test]
    async fn test_add_meter_reading_rejects_bad_date() {
        let (app, _state) = test_app();
        let body = format!(
            r#"{{"apartment_building_id": "{}", "flat_number": 101, "serial_number": "12345678", "meter_reading_date": "10.07.2024", "meter_reading_value": 15}}"#,
            Uuid::new_v4()
        );
        let response = app
            .oneshot(
                Request::post("/add-meter-reading")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
