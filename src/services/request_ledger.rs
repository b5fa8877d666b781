//! Ledger de solicitudes de actualización
//!
//! El almacén primario se escribe de forma síncrona antes de devolver el
//! código de seguimiento; la copia en el mirror se encola después y sus
//! fallos nunca llegan al ciudadano.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::mirror_worker::MirrorHandle;
use super::tracking_code::generate_tracking_code;
use crate::models::{NewRequest, RequestFilter, RequestStats, RequestStatus, UpdateRequest};
use crate::repositories::RequestStore;
use crate::utils::errors::{not_found_error, AppError, AppResult};
use crate::utils::normalize::normalize_plate;

/// Intentos de generar un código libre antes de rendirse
pub const MAX_CODE_ATTEMPTS: usize = 5;

pub struct RequestLedger {
    store: Arc<dyn RequestStore>,
    mirror: MirrorHandle,
    rng: Mutex<StdRng>,
}

impl RequestLedger {
    pub fn new(store: Arc<dyn RequestStore>, mirror: MirrorHandle) -> Self {
        Self { store, mirror, rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Ledger con generador determinista
    pub fn with_seed(store: Arc<dyn RequestStore>, mirror: MirrorHandle, seed: u64) -> Self {
        Self { store, mirror, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// Persiste la solicitud y devuelve la versión guardada (con su código)
    pub async fn submit(&self, new: NewRequest) -> AppResult<UpdateRequest> {
        let plate = normalize_plate(&new.plate);
        if plate.is_empty() {
            return Err(AppError::BadRequest("plate number is required".to_string()));
        }
        let new = NewRequest { plate, ..new };

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let submitted_at = Utc::now();
            let code = {
                let mut rng = self.rng.lock().await;
                generate_tracking_code(&mut *rng, submitted_at)
            };
            let request = UpdateRequest::from_new(code, new.clone(), submitted_at);

            if self.store.insert(&request).await? {
                info!(
                    "📝 Solicitud {} registrada (placa {}, formulario {})",
                    request.tracking_code, request.plate, request.form_number
                );
                self.mirror.enqueue(request.clone());
                return Ok(request);
            }
            warn!(
                "⚠️ Colisión de código {} (intento {}/{})",
                request.tracking_code, attempt, MAX_CODE_ATTEMPTS
            );
        }

        Err(AppError::Internal(format!(
            "could not allocate a unique tracking code after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    pub async fn get(&self, tracking_code: &str) -> AppResult<UpdateRequest> {
        self.store
            .get(tracking_code.trim())
            .await?
            .ok_or_else(|| not_found_error("Request", tracking_code))
    }

    pub async fn list(&self, filter: &RequestFilter) -> AppResult<Vec<UpdateRequest>> {
        self.store.list(filter).await
    }

    /// `received → reviewed`; repetir sobre una revisada no cambia nada
    pub async fn mark_reviewed(&self, tracking_code: &str, reviewer: &str) -> AppResult<UpdateRequest> {
        if let Some(updated) = self.store.mark_reviewed(tracking_code, reviewer, Utc::now()).await? {
            info!("✅ Solicitud {} revisada por {}", tracking_code, reviewer);
            self.mirror.enqueue(updated.clone());
            return Ok(updated);
        }

        let current = self.get(tracking_code).await?;
        match current.status {
            RequestStatus::Reviewed => Ok(current),
            RequestStatus::Exported => Err(AppError::Conflict(format!(
                "request {} has already been exported",
                tracking_code
            ))),
            RequestStatus::Received => Err(AppError::Internal(format!(
                "request {} could not be marked as reviewed",
                tracking_code
            ))),
        }
    }

    /// Marca como exportada; idempotente
    pub async fn mark_exported(&self, tracking_code: &str) -> AppResult<UpdateRequest> {
        let updated = self
            .store
            .mark_exported(tracking_code, Utc::now())
            .await?
            .ok_or_else(|| not_found_error("Request", tracking_code))?;
        self.mirror.enqueue(updated.clone());
        Ok(updated)
    }

    pub async fn stats(&self) -> AppResult<RequestStats> {
        self.store.stats().await
    }

    pub fn mirror(&self) -> &MirrorHandle {
        &self.mirror
    }
}
