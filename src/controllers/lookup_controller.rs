use std::sync::Arc;
use tracing::info;

use crate::models::{NewRequest, RequestFields, UpdateRequest, VehicleRecord};
use crate::services::{Classification, LookupHint, MatchEngine, RequestLedger};
use crate::utils::errors::AppResult;

/// Operaciones del ciudadano
pub struct LookupController {
    engine: Arc<MatchEngine>,
    ledger: Arc<RequestLedger>,
}

impl LookupController {
    pub fn new(engine: Arc<MatchEngine>, ledger: Arc<RequestLedger>) -> Self {
        Self { engine, ledger }
    }

    pub async fn lookup(&self, plate: &str, hint: &LookupHint) -> AppResult<Classification> {
        self.engine.classify(plate, hint).await
    }

    pub async fn lookup_by_national_id(&self, national_id: &str) -> AppResult<Vec<VehicleRecord>> {
        self.engine.lookup_by_national_id(national_id).await
    }

    /// Envío con formulario explícito, ligado al lote activo si lo hay
    pub async fn submit(&self, request: NewRequest) -> AppResult<UpdateRequest> {
        let batch_id = self.engine.active_batch_id().await?;
        self.ledger.submit(NewRequest { batch_id, ..request }).await
    }

    /// Clasifica contra el lote activo y envía con el formulario resultante
    pub async fn lookup_and_submit(
        &self,
        plate: &str,
        hint: &LookupHint,
        fields: RequestFields,
    ) -> AppResult<(Classification, UpdateRequest)> {
        let classification = self.engine.classify(plate, hint).await?;
        let request = self
            .ledger
            .submit(NewRequest {
                plate: classification.plate.clone(),
                form_number: classification.form_number,
                batch_id: Some(classification.batch_id),
                fields,
            })
            .await?;
        info!(
            "📨 Placa {} clasificada y enviada como formulario {} ({})",
            request.plate, request.form_number, request.tracking_code
        );
        Ok((classification, request))
    }

    pub async fn request_status(&self, tracking_code: &str) -> AppResult<UpdateRequest> {
        self.ledger.get(tracking_code).await
    }
}
