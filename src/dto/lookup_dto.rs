//! DTOs de la consulta ciudadana

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{FormNumber, NewRequest, PlateCategory, RequestFields, RequestStatus, UpdateRequest};
use crate::services::LookupHint;
use crate::utils::validation::{validate_not_empty, validate_plate, validate_tracking_code};

/// Parámetros de `GET /api/lookup`
#[derive(Debug, Deserialize, Validate)]
pub struct LookupQuery {
    #[validate(custom = "validate_plate")]
    pub plate: String,
    pub category: Option<PlateCategory>,
    pub owner_name: Option<String>,
    pub owner_address: Option<String>,
    pub national_id: Option<String>,
}

impl LookupQuery {
    pub fn hint(&self) -> LookupHint {
        LookupHint {
            category: self.category,
            owner_name: self.owner_name.clone(),
            owner_address: self.owner_address.clone(),
            national_id: self.national_id.clone(),
        }
    }
}

/// Parámetros de `GET /api/lookup/national-id`
#[derive(Debug, Deserialize, Validate)]
pub struct NationalIdQuery {
    #[validate(custom = "validate_not_empty")]
    pub national_id: String,
}

/// Envío con número de formulario explícito.
///
/// El lote no lo elige el ciudadano: se registra el que esté activo.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(custom = "validate_plate")]
    pub plate: String,
    pub form_number: FormNumber,
    #[serde(default)]
    pub fields: RequestFields,
}

impl From<SubmitRequest> for NewRequest {
    fn from(request: SubmitRequest) -> Self {
        NewRequest {
            plate: request.plate,
            form_number: request.form_number,
            batch_id: None,
            fields: request.fields,
        }
    }
}

/// Consulta y envío en un paso; el formulario lo decide la clasificación
#[derive(Debug, Deserialize, Validate)]
pub struct LookupAndSubmitRequest {
    #[validate(custom = "validate_plate")]
    pub plate: String,
    pub category: Option<PlateCategory>,
    pub owner_name: Option<String>,
    pub owner_address: Option<String>,
    pub national_id: Option<String>,
    #[serde(default)]
    pub fields: RequestFields,
}

impl LookupAndSubmitRequest {
    pub fn hint(&self) -> LookupHint {
        LookupHint {
            category: self.category,
            owner_name: self.owner_name.clone(),
            owner_address: self.owner_address.clone(),
            national_id: self.national_id.clone(),
        }
    }
}

/// Parámetro de ruta con código de seguimiento
#[derive(Debug, Deserialize, Validate)]
pub struct TrackingCodePath {
    #[validate(custom = "validate_tracking_code")]
    pub tracking_code: String,
}

/// Respuesta de un envío
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub tracking_code: String,
    pub form_number: FormNumber,
    pub plate: String,
    pub submitted_at: DateTime<Utc>,
}

impl From<&UpdateRequest> for SubmitResponse {
    fn from(request: &UpdateRequest) -> Self {
        Self {
            tracking_code: request.tracking_code.clone(),
            form_number: request.form_number,
            plate: request.plate.clone(),
            submitted_at: request.submitted_at,
        }
    }
}

/// Estado visible para el ciudadano (sin los datos enviados)
#[derive(Debug, Serialize)]
pub struct RequestStatusResponse {
    pub tracking_code: String,
    pub form_number: FormNumber,
    pub plate: String,
    pub status: RequestStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub exported_at: Option<DateTime<Utc>>,
}

impl From<UpdateRequest> for RequestStatusResponse {
    fn from(request: UpdateRequest) -> Self {
        Self {
            tracking_code: request.tracking_code,
            form_number: request.form_number,
            plate: request.plate,
            status: request.status,
            submitted_at: request.submitted_at,
            reviewed_at: request.reviewed_at,
            exported_at: request.exported_at,
        }
    }
}
