//! Error handling for the application

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("apartment building not found")]
    BuildingNotFound,

    #[error("flat not found")]
    FlatNotFound,

    #[error("water counter not found")]
    CounterNotFound,

    #[error("no calculation in progress")]
    ProgressNotFound,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                let message = match db_err.constraint() {
                    Some("unique_building_address") => {
                        "a building with this address already exists"
                    }
                    Some("unique_flat_in_building") => {
                        "this flat number already exists in the building"
                    }
                    Some("unique_water_counter_in_flat") => {
                        "a counter with this serial number already exists in the flat"
                    }
                    _ => "record already exists",
                };
                return AppError::Conflict(message.to_string());
            }
        }
        AppError::Database(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BuildingNotFound
            | AppError::FlatNotFound
            | AppError::CounterNotFound
            | AppError::ProgressNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
