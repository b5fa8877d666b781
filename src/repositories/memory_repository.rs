//! Repositorios en memoria
//!
//! Implementaciones completas de `BatchStore` y `RequestStore` sin base de
//! datos, usadas en tests y desarrollo local. Respetan las mismas garantías
//! que las de PostgreSQL: un único lote activo, activación serializada e
//! importaciones todo-o-nada.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::batch_repository::{duplicate_report, ensure_importable, BatchStore};
use super::request_repository::{stats_of, RequestStore};
use crate::models::{
    Batch, BatchStatus, DataFile, OwnerIdentity, OwnerRecord, ParsedRows, PlateCategory,
    RecordPage, RequestFilter, RequestStats, RequestStatus, UpdateRequest, VehicleRecord,
};
use crate::utils::errors::{conflict_error, not_found_error, AppError, AppResult, ValidationReport};

#[derive(Default)]
struct BatchState {
    next_batch_id: i64,
    next_file_id: i64,
    next_record_id: i64,
    batches: BTreeMap<i64, Batch>,
    files: Vec<DataFile>,
    vehicles: Vec<VehicleRecord>,
    /// (batch, categoría, placa) → posición en `vehicles`
    plate_index: HashMap<(i64, PlateCategory, String), usize>,
    owners: Vec<OwnerRecord>,
}

impl BatchState {
    fn batch(&self, batch_id: i64) -> AppResult<&Batch> {
        self.batches
            .get(&batch_id)
            .ok_or_else(|| not_found_error("Batch", &batch_id.to_string()))
    }

    fn rebuild_index(&mut self) {
        self.plate_index = self
            .vehicles
            .iter()
            .enumerate()
            .map(|(pos, v)| ((v.batch_id, v.category, v.data.plate.clone()), pos))
            .collect();
    }
}

/// `BatchStore` en memoria
pub struct MemoryBatchStore {
    state: RwLock<BatchState>,
    activation: Mutex<()>,
    activation_delay: Duration,
}

impl Default for MemoryBatchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BatchState::default()),
            activation: Mutex::new(()),
            activation_delay: Duration::ZERO,
        }
    }

    /// Simula una activación lenta (la sección crítica dura `delay`)
    pub fn with_activation_delay(mut self, delay: Duration) -> Self {
        self.activation_delay = delay;
        self
    }
}

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn create_batch(&self, label: &str, description: Option<&str>) -> AppResult<Batch> {
        let mut state = self.state.write().await;
        if state.batches.values().any(|b| b.label == label) {
            return Err(conflict_error("Batch", "label", label));
        }

        state.next_batch_id += 1;
        let batch = Batch {
            id: state.next_batch_id,
            label: label.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
            status: BatchStatus::Draft,
        };
        state.batches.insert(batch.id, batch.clone());
        info!("📦 Lote creado: {} ({})", batch.id, batch.label);
        Ok(batch)
    }

    async fn list_batches(&self) -> AppResult<Vec<Batch>> {
        let state = self.state.read().await;
        Ok(state.batches.values().rev().cloned().collect())
    }

    async fn get_batch(&self, batch_id: i64) -> AppResult<Batch> {
        self.state.read().await.batch(batch_id).cloned()
    }

    async fn get_active(&self) -> AppResult<Batch> {
        let state = self.state.read().await;
        state
            .batches
            .values()
            .find(|b| b.status == BatchStatus::Active)
            .cloned()
            .ok_or(AppError::NoActiveBatch)
    }

    async fn import_into(
        &self,
        batch_id: i64,
        rows: ParsedRows,
        meta: crate::models::UploadMeta,
    ) -> AppResult<DataFile> {
        if rows.is_empty() {
            return Err(AppError::Validation(ValidationReport::single(0, "file contains no data rows")));
        }

        let mut state = self.state.write().await;
        ensure_importable(state.batch(batch_id)?)?;

        if let ParsedRows::Vehicles { category, rows } = &rows {
            let category = *category;
            duplicate_report(rows, |plate| {
                state.plate_index.contains_key(&(batch_id, category, plate.to_string()))
            })
            .into_result()?;
        }

        // A partir de aquí nada puede fallar: el archivo entra completo
        state.next_file_id += 1;
        let data_file_id = state.next_file_id;
        let file = DataFile {
            id: data_file_id,
            batch_id,
            original_filename: meta.original_filename,
            sheet_kind: rows.sheet_kind(),
            file_size: meta.file_size,
            checksum: meta.checksum,
            record_count: rows.len() as i64,
            uploaded_at: Utc::now(),
        };

        match rows {
            ParsedRows::Vehicles { category, rows } => {
                for data in rows {
                    state.next_record_id += 1;
                    let record = VehicleRecord {
                        id: state.next_record_id,
                        batch_id,
                        data_file_id,
                        category,
                        data,
                    };
                    let pos = state.vehicles.len();
                    state
                        .plate_index
                        .insert((batch_id, category, record.data.plate.clone()), pos);
                    state.vehicles.push(record);
                }
            }
            ParsedRows::Owners(owners) => {
                for data in owners {
                    state.next_record_id += 1;
                    let record = OwnerRecord { id: state.next_record_id, batch_id, data_file_id, data };
                    state.owners.push(record);
                }
            }
        }

        state.files.push(file.clone());
        info!(
            "📥 Importadas {} filas ({}) en lote {}",
            file.record_count,
            file.sheet_kind.as_str(),
            batch_id
        );
        Ok(file)
    }

    async fn activate(&self, batch_id: i64) -> AppResult<Batch> {
        let _guard = self.activation.try_lock().map_err(|_| {
            warn!("⚠️ Activación concurrente rechazada para lote {}", batch_id);
            AppError::ConcurrentActivation
        })?;

        self.state.read().await.batch(batch_id)?;

        if !self.activation_delay.is_zero() {
            tokio::time::sleep(self.activation_delay).await;
        }

        // Un único write lock: los lectores ven el estado anterior o el nuevo
        let mut state = self.state.write().await;
        let current = state.batch(batch_id)?.status;
        if current != BatchStatus::Active {
            for batch in state.batches.values_mut() {
                if batch.status == BatchStatus::Active {
                    batch.status = BatchStatus::Archived;
                }
            }
            if let Some(target) = state.batches.get_mut(&batch_id) {
                target.status = BatchStatus::Active;
            }
            info!("🔄 Lote {} activado", batch_id);
        }
        state.batch(batch_id).cloned()
    }

    async fn delete_batch(&self, batch_id: i64) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.batch(batch_id)?.status == BatchStatus::Active {
            return Err(AppError::Conflict(format!(
                "batch {} is active and cannot be deleted",
                batch_id
            )));
        }

        state.batches.remove(&batch_id);
        state.files.retain(|f| f.batch_id != batch_id);
        state.vehicles.retain(|v| v.batch_id != batch_id);
        state.owners.retain(|o| o.batch_id != batch_id);
        state.rebuild_index();
        info!("🗑️ Lote {} eliminado", batch_id);
        Ok(())
    }

    async fn list_files(&self, batch_id: i64) -> AppResult<Vec<DataFile>> {
        let state = self.state.read().await;
        state.batch(batch_id)?;
        Ok(state.files.iter().rev().filter(|f| f.batch_id == batch_id).cloned().collect())
    }

    async fn delete_file(&self, file_id: i64) -> AppResult<DataFile> {
        let mut state = self.state.write().await;
        let pos = state
            .files
            .iter()
            .position(|f| f.id == file_id)
            .ok_or_else(|| not_found_error("DataFile", &file_id.to_string()))?;
        ensure_importable(state.batch(state.files[pos].batch_id)?)?;

        let file = state.files.remove(pos);
        state.vehicles.retain(|v| v.data_file_id != file_id);
        state.owners.retain(|o| o.data_file_id != file_id);
        state.rebuild_index();
        info!(
            "🗑️ Archivo {} ('{}') eliminado del lote {} ({} registros)",
            file.id, file.original_filename, file.batch_id, file.record_count
        );
        Ok(file)
    }

    async fn batch_records(
        &self,
        batch_id: i64,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<RecordPage> {
        let state = self.state.read().await;
        state.batch(batch_id)?;

        let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let contains = |value: Option<&str>, needle: &str| {
            value.map_or(false, |v| v.to_lowercase().contains(needle))
        };

        let matching: Vec<&VehicleRecord> = state
            .vehicles
            .iter()
            .rev()
            .filter(|v| v.batch_id == batch_id)
            .filter(|v| match &needle {
                None => true,
                Some(n) => {
                    contains(Some(&v.data.plate), n)
                        || contains(Some(&v.data.owner_name), n)
                        || contains(v.data.chassis_number.as_deref(), n)
                        || contains(v.data.engine_number.as_deref(), n)
                        || contains(v.data.phone.as_deref(), n)
                }
            })
            .collect();

        Ok(RecordPage {
            total: matching.len() as i64,
            records: matching
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .cloned()
                .collect(),
        })
    }

    async fn find_vehicle(
        &self,
        batch_id: i64,
        category: PlateCategory,
        plate: &str,
    ) -> AppResult<Option<VehicleRecord>> {
        let state = self.state.read().await;
        Ok(state
            .plate_index
            .get(&(batch_id, category, plate.to_string()))
            .and_then(|pos| state.vehicles.get(*pos))
            .cloned())
    }

    async fn owner_candidates(
        &self,
        batch_id: i64,
        identity: &OwnerIdentity,
    ) -> AppResult<Vec<OwnerRecord>> {
        let state = self.state.read().await;
        Ok(state
            .owners
            .iter()
            .filter(|o| o.batch_id == batch_id && identity.matches_owner(&o.data))
            .cloned()
            .collect())
    }

    async fn owners_declaring_plate(
        &self,
        batch_id: i64,
        plate: &str,
    ) -> AppResult<Vec<OwnerRecord>> {
        let state = self.state.read().await;
        Ok(state
            .owners
            .iter()
            .filter(|o| o.batch_id == batch_id && o.data.declared_plate.as_deref() == Some(plate))
            .cloned()
            .collect())
    }

    async fn vehicles_by_document(
        &self,
        batch_id: i64,
        document: &str,
    ) -> AppResult<Vec<VehicleRecord>> {
        let state = self.state.read().await;
        Ok(state
            .vehicles
            .iter()
            .filter(|v| {
                v.batch_id == batch_id
                    && OwnerIdentity::of_vehicle(&v.data).national_id.as_deref() == Some(document)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct RequestState {
    requests: Vec<UpdateRequest>,
    index: HashMap<String, usize>,
}

/// `RequestStore` en memoria
#[derive(Default)]
pub struct MemoryRequestStore {
    state: RwLock<RequestState>,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserta una solicitud con código fijo (simular colisiones en tests)
    pub async fn seed(&self, request: UpdateRequest) {
        let mut state = self.state.write().await;
        let pos = state.requests.len();
        state.index.insert(request.tracking_code.clone(), pos);
        state.requests.push(request);
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn insert(&self, request: &UpdateRequest) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.index.contains_key(&request.tracking_code) {
            return Ok(false);
        }
        let pos = state.requests.len();
        state.index.insert(request.tracking_code.clone(), pos);
        state.requests.push(request.clone());
        Ok(true)
    }

    async fn get(&self, tracking_code: &str) -> AppResult<Option<UpdateRequest>> {
        let state = self.state.read().await;
        Ok(state.index.get(tracking_code).map(|pos| state.requests[*pos].clone()))
    }

    async fn list(&self, filter: &RequestFilter) -> AppResult<Vec<UpdateRequest>> {
        let state = self.state.read().await;
        let mut matching: Vec<UpdateRequest> =
            state.requests.iter().filter(|r| filter.matches(r)).cloned().collect();
        // Orden estable: a igual fecha, orden de inserción
        matching.sort_by_key(|r| r.submitted_at);
        Ok(matching)
    }

    async fn mark_reviewed(
        &self,
        tracking_code: &str,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Option<UpdateRequest>> {
        let mut state = self.state.write().await;
        let Some(pos) = state.index.get(tracking_code).copied() else {
            return Ok(None);
        };
        let request = &mut state.requests[pos];
        if request.status != RequestStatus::Received {
            return Ok(None);
        }
        request.status = RequestStatus::Reviewed;
        request.reviewed_by = Some(reviewer.to_string());
        request.reviewed_at = Some(at);
        Ok(Some(request.clone()))
    }

    async fn mark_exported(
        &self,
        tracking_code: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Option<UpdateRequest>> {
        let mut state = self.state.write().await;
        let Some(pos) = state.index.get(tracking_code).copied() else {
            return Ok(None);
        };
        let request = &mut state.requests[pos];
        request.status = RequestStatus::Exported;
        request.exported_at.get_or_insert(at);
        Ok(Some(request.clone()))
    }

    async fn stats(&self) -> AppResult<RequestStats> {
        let state = self.state.read().await;
        Ok(stats_of(state.requests.iter()))
    }
}
