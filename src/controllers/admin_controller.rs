use std::sync::Arc;

use crate::models::{
    Batch, DataFile, FormNumber, RecordPage, RequestFilter, RequestStats, SheetKind, UpdateRequest,
};
use crate::repositories::BatchStore;
use crate::services::{ExportFormatter, ExportOutput, RecordImporter, RequestLedger};
use crate::utils::errors::AppResult;

/// Operaciones del panel; la autenticación la resuelve el middleware
pub struct AdminController {
    batches: Arc<dyn BatchStore>,
    importer: RecordImporter,
    ledger: Arc<RequestLedger>,
    exporter: ExportFormatter,
}

impl AdminController {
    pub fn new(batches: Arc<dyn BatchStore>, ledger: Arc<RequestLedger>) -> Self {
        Self {
            importer: RecordImporter::new(batches.clone()),
            exporter: ExportFormatter::new(ledger.clone()),
            batches,
            ledger,
        }
    }

    pub async fn create_batch(&self, label: &str, description: Option<&str>) -> AppResult<Batch> {
        self.batches.create_batch(label.trim(), description).await
    }

    pub async fn list_batches(&self) -> AppResult<Vec<Batch>> {
        self.batches.list_batches().await
    }

    pub async fn get_batch(&self, batch_id: i64) -> AppResult<Batch> {
        self.batches.get_batch(batch_id).await
    }

    pub async fn active_batch(&self) -> AppResult<Batch> {
        self.batches.get_active().await
    }

    pub async fn delete_batch(&self, batch_id: i64) -> AppResult<()> {
        self.batches.delete_batch(batch_id).await
    }

    pub async fn import_file(
        &self,
        batch_id: i64,
        kind: SheetKind,
        filename: &str,
        bytes: &[u8],
    ) -> AppResult<DataFile> {
        self.importer.import_file(batch_id, kind, filename, bytes).await
    }

    pub async fn activate(&self, batch_id: i64) -> AppResult<Batch> {
        self.batches.activate(batch_id).await
    }

    pub async fn list_files(&self, batch_id: i64) -> AppResult<Vec<DataFile>> {
        self.batches.list_files(batch_id).await
    }

    /// Retira un archivo subido por error a un lote en borrador
    pub async fn delete_file(&self, file_id: i64) -> AppResult<DataFile> {
        self.batches.delete_file(file_id).await
    }

    pub async fn batch_records(
        &self,
        batch_id: i64,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<RecordPage> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        self.batches.batch_records(batch_id, search, limit, offset).await
    }

    pub async fn list_requests(&self, filter: &RequestFilter) -> AppResult<Vec<UpdateRequest>> {
        self.ledger.list(filter).await
    }

    pub async fn get_request(&self, tracking_code: &str) -> AppResult<UpdateRequest> {
        self.ledger.get(tracking_code).await
    }

    pub async fn review_request(&self, tracking_code: &str, reviewer: &str) -> AppResult<UpdateRequest> {
        self.ledger.mark_reviewed(tracking_code, reviewer).await
    }

    pub async fn mark_exported(&self, tracking_code: &str) -> AppResult<UpdateRequest> {
        self.ledger.mark_exported(tracking_code).await
    }

    pub async fn request_stats(&self) -> AppResult<RequestStats> {
        self.ledger.stats().await
    }

    pub async fn export(&self, form: FormNumber, filter: RequestFilter) -> AppResult<ExportOutput> {
        self.exporter.export(form, filter).await
    }
}
