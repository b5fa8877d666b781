//! Sistema de manejo de errores
//!
//! Este módulo define la taxonomía de errores del núcleo (importación,
//! lotes, clasificación, solicitudes, migraciones) y su conversión a
//! respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

/// Error de una fila concreta de un archivo importado
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// Índice de la fila de datos (1 = primera fila tras la cabecera, 0 = cabecera)
    pub row: usize,
    pub reason: String,
}

impl RowError {
    pub fn new(row: usize, reason: impl Into<String>) -> Self {
        Self { row, reason: reason.into() }
    }
}

/// Reporte agregado de errores de un archivo
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<RowError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(row: usize, reason: impl Into<String>) -> Self {
        Self { errors: vec![RowError::new(row, reason)] }
    }

    pub fn push(&mut self, row: usize, reason: impl Into<String>) {
        self.errors.push(RowError::new(row, reason));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Convierte el reporte en error si contiene al menos una fila inválida
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} invalid row(s)", self.errors.len())?;
        for e in self.errors.iter().take(5) {
            write!(f, "; row {}: {}", e.row, e.reason)?;
        }
        if self.errors.len() > 5 {
            write!(f, "; ...")?;
        }
        Ok(())
    }
}

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(ValidationReport),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No active batch has been activated yet")]
    NoActiveBatch,

    #[error("Another activation is in progress, retry later")]
    ConcurrentActivation,

    #[error("Mirror write failed: {0}")]
    MirrorWrite(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] validator::ValidationErrors),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Código estable para el llamador (tipo de error)
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NoActiveBatch => "SERVICE_NOT_READY",
            AppError::ConcurrentActivation => "CONCURRENT_ACTIVATION",
            AppError::MirrorWrite(_) => "MIRROR_WRITE_FAILURE",
            AppError::Migration(_) => "MIGRATION_ERROR",
            AppError::Database(_) => "DB_ERROR",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Conflict(_) => "CONFLICT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Indica si el llamador puede reintentar la operación tal cual
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentActivation)
    }
}

/// Respuesta de error para la API
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    code: &'static str,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let retryable = self.is_retryable();

        let (status, error, message, details) = match self {
            AppError::Validation(report) => {
                warn!("Validation error: {}", report);
                (
                    StatusCode::BAD_REQUEST,
                    "Validation Error",
                    "The uploaded data is invalid".to_string(),
                    Some(json!({ "rows": report.errors })),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", msg, None),
            AppError::NoActiveBatch => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service Not Ready",
                "No data batch is active yet".to_string(),
                None,
            ),
            AppError::ConcurrentActivation => (
                StatusCode::CONFLICT,
                "Concurrent Activation",
                "Another batch activation is in progress".to_string(),
                None,
            ),
            AppError::InvalidRequest(e) => {
                warn!("Invalid request: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    "Invalid Request",
                    "The provided data is invalid".to_string(),
                    Some(json!(e)),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", msg, None),
            AppError::Database(e) => {
                error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database Error",
                    "An error occurred while accessing the database".to_string(),
                    None,
                )
            }
            AppError::MirrorWrite(msg) | AppError::Migration(msg) | AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    "An unexpected error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
            details,
            code,
            retryable,
        };

        (status, Json(body)).into_response()
    }
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

/// Función helper para crear errores de recurso no encontrado
pub fn not_found_error(resource: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} with id '{}' not found", resource, id))
}

/// Función helper para crear errores de conflicto
pub fn conflict_error(resource: &str, field: &str, value: &str) -> AppError {
    AppError::Conflict(format!("{} with {} '{}' already exists", resource, field, value))
}
