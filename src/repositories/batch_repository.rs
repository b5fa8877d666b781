//! Repositorio de lotes
//!
//! `BatchStore` es el contrato de almacenamiento de lotes, archivos y
//! registros importados. `PgBatchStore` lo implementa sobre PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::models::{
    Batch, BatchStatus, DataFile, NewOwner, NewVehicle, OwnerIdentity, OwnerRecord, ParsedRows,
    PlateCategory, RecordPage, SheetKind, UploadMeta, VehicleRecord,
};
use crate::utils::errors::{conflict_error, not_found_error, AppError, AppResult, ValidationReport};

/// Clave del advisory lock de activación
pub const ACTIVATION_LOCK_KEY: i64 = 0x5645_4849_4143_5456;

/// Filas por sentencia INSERT en importaciones masivas
const INSERT_CHUNK: usize = 1000;

/// Contrato de almacenamiento de lotes
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Crea un lote en estado `draft`; etiquetas únicas
    async fn create_batch(&self, label: &str, description: Option<&str>) -> AppResult<Batch>;

    /// Lotes ordenados del más reciente al más antiguo
    async fn list_batches(&self) -> AppResult<Vec<Batch>>;

    async fn get_batch(&self, batch_id: i64) -> AppResult<Batch>;

    /// Lote activo; `NoActiveBatch` si nunca se activó ninguno
    async fn get_active(&self) -> AppResult<Batch>;

    /// Importa todas las filas de un archivo o ninguna
    async fn import_into(
        &self,
        batch_id: i64,
        rows: ParsedRows,
        meta: UploadMeta,
    ) -> AppResult<DataFile>;

    /// Activa el lote y archiva el anterior en una sola operación atómica
    async fn activate(&self, batch_id: i64) -> AppResult<Batch>;

    /// Elimina un lote no activo junto con sus archivos y registros
    async fn delete_batch(&self, batch_id: i64) -> AppResult<()>;

    async fn list_files(&self, batch_id: i64) -> AppResult<Vec<DataFile>>;

    /// Elimina un archivo y sus registros; solo en lotes `draft`
    async fn delete_file(&self, file_id: i64) -> AppResult<DataFile>;

    async fn batch_records(
        &self,
        batch_id: i64,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<RecordPage>;

    async fn find_vehicle(
        &self,
        batch_id: i64,
        category: PlateCategory,
        plate: &str,
    ) -> AppResult<Option<VehicleRecord>>;

    /// Candidatos del registro de residentes para una identidad, en orden de importación.
    /// Puede devolver un superconjunto; el llamador aplica `OwnerIdentity::matches_owner`.
    async fn owner_candidates(
        &self,
        batch_id: i64,
        identity: &OwnerIdentity,
    ) -> AppResult<Vec<OwnerRecord>>;

    /// Residentes que declaran la placa, en orden de importación
    async fn owners_declaring_plate(&self, batch_id: i64, plate: &str)
        -> AppResult<Vec<OwnerRecord>>;

    /// Vehículos cuyo documento del propietario coincide (normalizado)
    async fn vehicles_by_document(
        &self,
        batch_id: i64,
        document: &str,
    ) -> AppResult<Vec<VehicleRecord>>;
}

/// Valida que el lote acepte importaciones o bajas de archivos
pub(crate) fn ensure_importable(batch: &Batch) -> AppResult<()> {
    if batch.status != BatchStatus::Draft {
        return Err(AppError::Conflict(format!(
            "batch {} is {}; only draft batches can change their files",
            batch.id,
            batch.status.as_str()
        )));
    }
    Ok(())
}

/// Reporte de placas ya presentes en el lote (índices 1-based del archivo)
pub(crate) fn duplicate_report(
    rows: &[NewVehicle],
    existing: impl Fn(&str) -> bool,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    for (idx, row) in rows.iter().enumerate() {
        if existing(&row.plate) {
            report.push(idx + 1, format!("plate {} already exists in this batch", row.plate));
        }
    }
    report
}

/// Implementación PostgreSQL
#[derive(Clone)]
pub struct PgBatchStore {
    pool: PgPool,
}

impl PgBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_vehicles(
        tx: &mut Transaction<'_, Postgres>,
        batch_id: i64,
        file_id: i64,
        category: PlateCategory,
        rows: &[NewVehicle],
    ) -> AppResult<()> {
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO vehicle_records (batch_id, data_file_id, category, plate, vehicle_type, \
                 owner_name, owner_name_norm, registered_address, neighborhood, permanent_address, \
                 current_address, owner_address_norm, chassis_number, engine_number, phone, \
                 document_type, document_number, document_number_norm, plate_color, \
                 vehicle_status, registration_status) ",
            );
            builder.push_values(chunk, |mut b, v| {
                let identity = OwnerIdentity::of_vehicle(v);
                b.push_bind(batch_id)
                    .push_bind(file_id)
                    .push_bind(category.as_str())
                    .push_bind(v.plate.clone())
                    .push_bind(v.vehicle_type.clone())
                    .push_bind(v.owner_name.clone())
                    .push_bind(identity.name.unwrap_or_default())
                    .push_bind(v.registered_address.clone())
                    .push_bind(v.neighborhood.clone())
                    .push_bind(v.permanent_address.clone())
                    .push_bind(v.current_address.clone())
                    .push_bind(identity.address)
                    .push_bind(v.chassis_number.clone())
                    .push_bind(v.engine_number.clone())
                    .push_bind(v.phone.clone())
                    .push_bind(v.document_type.clone())
                    .push_bind(v.document_number.clone())
                    .push_bind(identity.national_id)
                    .push_bind(v.plate_color.clone())
                    .push_bind(v.vehicle_status.clone())
                    .push_bind(v.registration_status.clone());
            });
            builder.build().execute(&mut **tx).await.map_err(map_unique_plate)?;
        }
        Ok(())
    }

    async fn insert_owners(
        tx: &mut Transaction<'_, Postgres>,
        batch_id: i64,
        file_id: i64,
        rows: &[NewOwner],
    ) -> AppResult<()> {
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO owner_records (batch_id, data_file_id, full_name, name_norm, address, \
                 address_norm, national_id, national_id_norm, declared_plate, resident) ",
            );
            builder.push_values(chunk, |mut b, o| {
                let identity = OwnerIdentity::of_owner(o);
                b.push_bind(batch_id)
                    .push_bind(file_id)
                    .push_bind(o.full_name.clone())
                    .push_bind(identity.name.unwrap_or_default())
                    .push_bind(o.address.clone())
                    .push_bind(identity.address)
                    .push_bind(o.national_id.clone())
                    .push_bind(identity.national_id)
                    .push_bind(o.declared_plate.clone())
                    .push_bind(o.resident);
            });
            builder.build().execute(&mut **tx).await?;
        }
        Ok(())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn map_unique_plate(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Validation(ValidationReport::single(0, "duplicate plate within batch and category"))
    } else {
        AppError::Database(e)
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> AppResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(AppError::Internal)
}

fn batch_from_row(row: &PgRow) -> AppResult<Batch> {
    Ok(Batch {
        id: row.try_get("id")?,
        label: row.try_get("label")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        status: parse_column(row, "status")?,
    })
}

fn file_from_row(row: &PgRow) -> AppResult<DataFile> {
    Ok(DataFile {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        original_filename: row.try_get("original_filename")?,
        sheet_kind: parse_column::<SheetKind>(row, "sheet_kind")?,
        file_size: row.try_get("file_size")?,
        checksum: row.try_get("checksum")?,
        record_count: row.try_get("record_count")?,
        uploaded_at: row.try_get("uploaded_at")?,
    })
}

fn vehicle_from_row(row: &PgRow) -> AppResult<VehicleRecord> {
    Ok(VehicleRecord {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        data_file_id: row.try_get("data_file_id")?,
        category: parse_column(row, "category")?,
        data: NewVehicle {
            plate: row.try_get("plate")?,
            vehicle_type: row.try_get("vehicle_type")?,
            owner_name: row.try_get("owner_name")?,
            registered_address: row.try_get("registered_address")?,
            neighborhood: row.try_get("neighborhood")?,
            permanent_address: row.try_get("permanent_address")?,
            current_address: row.try_get("current_address")?,
            chassis_number: row.try_get("chassis_number")?,
            engine_number: row.try_get("engine_number")?,
            phone: row.try_get("phone")?,
            document_type: row.try_get("document_type")?,
            document_number: row.try_get("document_number")?,
            plate_color: row.try_get("plate_color")?,
            vehicle_status: row.try_get("vehicle_status")?,
            registration_status: row.try_get("registration_status")?,
        },
    })
}

fn owner_from_row(row: &PgRow) -> AppResult<OwnerRecord> {
    Ok(OwnerRecord {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        data_file_id: row.try_get("data_file_id")?,
        data: NewOwner {
            full_name: row.try_get("full_name")?,
            address: row.try_get("address")?,
            national_id: row.try_get("national_id")?,
            declared_plate: row.try_get("declared_plate")?,
            resident: row.try_get("resident")?,
        },
    })
}

/// Escapa los comodines de LIKE
fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

const BATCH_COLUMNS: &str = "id, label, description, created_at, status";

#[async_trait]
impl BatchStore for PgBatchStore {
    async fn create_batch(&self, label: &str, description: Option<&str>) -> AppResult<Batch> {
        let row = sqlx::query(&format!(
            "INSERT INTO batches (label, description, created_at, status)
             VALUES ($1, $2, $3, 'draft')
             RETURNING {}",
            BATCH_COLUMNS
        ))
        .bind(label)
        .bind(description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                conflict_error("Batch", "label", label)
            } else {
                AppError::Database(e)
            }
        })?;

        let batch = batch_from_row(&row)?;
        info!("📦 Lote creado: {} ({})", batch.id, batch.label);
        Ok(batch)
    }

    async fn list_batches(&self) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM batches ORDER BY created_at DESC, id DESC",
            BATCH_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_from_row).collect()
    }

    async fn get_batch(&self, batch_id: i64) -> AppResult<Batch> {
        let row = sqlx::query(&format!("SELECT {} FROM batches WHERE id = $1", BATCH_COLUMNS))
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found_error("Batch", &batch_id.to_string()))?;
        batch_from_row(&row)
    }

    async fn get_active(&self) -> AppResult<Batch> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM batches WHERE status = 'active'",
            BATCH_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NoActiveBatch)?;
        batch_from_row(&row)
    }

    async fn import_into(
        &self,
        batch_id: i64,
        rows: ParsedRows,
        meta: UploadMeta,
    ) -> AppResult<DataFile> {
        if rows.is_empty() {
            return Err(AppError::Validation(ValidationReport::single(0, "file contains no data rows")));
        }

        let mut tx = self.pool.begin().await?;

        let batch_row = sqlx::query(&format!(
            "SELECT {} FROM batches WHERE id = $1 FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| not_found_error("Batch", &batch_id.to_string()))?;
        ensure_importable(&batch_from_row(&batch_row)?)?;

        if let ParsedRows::Vehicles { category, rows } = &rows {
            let plates: Vec<String> = rows.iter().map(|r| r.plate.clone()).collect();
            let existing: Vec<String> = sqlx::query_scalar(
                "SELECT plate FROM vehicle_records
                 WHERE batch_id = $1 AND category = $2 AND plate = ANY($3)",
            )
            .bind(batch_id)
            .bind(category.as_str())
            .bind(&plates)
            .fetch_all(&mut *tx)
            .await?;

            if !existing.is_empty() {
                let existing: HashSet<String> = existing.into_iter().collect();
                duplicate_report(rows, |p| existing.contains(p)).into_result()?;
            }
        }

        let file_row = sqlx::query(
            "INSERT INTO data_files
                (batch_id, original_filename, sheet_kind, file_size, checksum, record_count, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, batch_id, original_filename, sheet_kind, file_size, checksum,
                       record_count, uploaded_at",
        )
        .bind(batch_id)
        .bind(&meta.original_filename)
        .bind(rows.sheet_kind().as_str())
        .bind(meta.file_size)
        .bind(&meta.checksum)
        .bind(rows.len() as i64)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        let file = file_from_row(&file_row)?;

        match &rows {
            ParsedRows::Vehicles { category, rows } => {
                Self::insert_vehicles(&mut tx, batch_id, file.id, *category, rows).await?
            }
            ParsedRows::Owners(owners) => {
                Self::insert_owners(&mut tx, batch_id, file.id, owners).await?
            }
        }

        tx.commit().await?;
        info!(
            "📥 Importadas {} filas ({}) en lote {} desde '{}'",
            file.record_count,
            file.sheet_kind.as_str(),
            batch_id,
            file.original_filename
        );
        Ok(file)
    }

    async fn activate(&self, batch_id: i64) -> AppResult<Batch> {
        let mut tx = self.pool.begin().await?;

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(ACTIVATION_LOCK_KEY)
            .fetch_one(&mut *tx)
            .await?;
        if !locked {
            warn!("⚠️ Activación concurrente rechazada para lote {}", batch_id);
            return Err(AppError::ConcurrentActivation);
        }

        let target = sqlx::query(&format!(
            "SELECT {} FROM batches WHERE id = $1 FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| not_found_error("Batch", &batch_id.to_string()))?;
        let target = batch_from_row(&target)?;

        if target.status == BatchStatus::Active {
            tx.commit().await?;
            debug!("Lote {} ya estaba activo", batch_id);
            return Ok(target);
        }

        let archived = sqlx::query(
            "UPDATE batches SET status = 'archived' WHERE status = 'active' AND id <> $1",
        )
        .bind(batch_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query(&format!(
            "UPDATE batches SET status = 'active' WHERE id = $1 RETURNING {}",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::ConcurrentActivation
            } else {
                AppError::Database(e)
            }
        })?;

        tx.commit().await?;
        let batch = batch_from_row(&row)?;
        info!("🔄 Lote {} activado ({} archivado/s)", batch.id, archived);
        Ok(batch)
    }

    async fn delete_batch(&self, batch_id: i64) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM batches WHERE id = $1 AND status <> 'active'")
            .bind(batch_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            // Distinguir entre inexistente y activo
            let batch = self.get_batch(batch_id).await?;
            return Err(AppError::Conflict(format!(
                "batch {} is active and cannot be deleted",
                batch.id
            )));
        }

        info!("🗑️ Lote {} eliminado", batch_id);
        Ok(())
    }

    async fn list_files(&self, batch_id: i64) -> AppResult<Vec<DataFile>> {
        self.get_batch(batch_id).await?;
        let rows = sqlx::query(
            "SELECT id, batch_id, original_filename, sheet_kind, file_size, checksum,
                    record_count, uploaded_at
             FROM data_files WHERE batch_id = $1 ORDER BY uploaded_at DESC, id DESC",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(file_from_row).collect()
    }

    async fn delete_file(&self, file_id: i64) -> AppResult<DataFile> {
        let mut tx = self.pool.begin().await?;

        let file_row = sqlx::query(
            "SELECT id, batch_id, original_filename, sheet_kind, file_size, checksum,
                    record_count, uploaded_at
             FROM data_files WHERE id = $1",
        )
        .bind(file_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| not_found_error("DataFile", &file_id.to_string()))?;
        let file = file_from_row(&file_row)?;

        // Bloquea el lote frente a una activación concurrente
        let batch_row = sqlx::query(&format!(
            "SELECT {} FROM batches WHERE id = $1 FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(file.batch_id)
        .fetch_one(&mut *tx)
        .await?;
        ensure_importable(&batch_from_row(&batch_row)?)?;

        // Los registros caen por ON DELETE CASCADE
        sqlx::query("DELETE FROM data_files WHERE id = $1")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
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
        self.get_batch(batch_id).await?;
        let pattern = search.map(str::trim).filter(|s| !s.is_empty()).map(like_pattern);

        const FILTER: &str = "batch_id = $1 AND ($2::text IS NULL
            OR plate ILIKE $2 OR owner_name ILIKE $2 OR chassis_number ILIKE $2
            OR engine_number ILIKE $2 OR phone ILIKE $2)";

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM vehicle_records WHERE {}", FILTER))
                .bind(batch_id)
                .bind(pattern.as_deref())
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query(&format!(
            "SELECT * FROM vehicle_records WHERE {} ORDER BY id DESC LIMIT $3 OFFSET $4",
            FILTER
        ))
        .bind(batch_id)
        .bind(pattern.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(RecordPage {
            records: rows.iter().map(vehicle_from_row).collect::<AppResult<_>>()?,
            total,
        })
    }

    async fn find_vehicle(
        &self,
        batch_id: i64,
        category: PlateCategory,
        plate: &str,
    ) -> AppResult<Option<VehicleRecord>> {
        sqlx::query(
            "SELECT * FROM vehicle_records WHERE batch_id = $1 AND category = $2 AND plate = $3",
        )
        .bind(batch_id)
        .bind(category.as_str())
        .bind(plate)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(vehicle_from_row)
        .transpose()
    }

    async fn owner_candidates(
        &self,
        batch_id: i64,
        identity: &OwnerIdentity,
    ) -> AppResult<Vec<OwnerRecord>> {
        if identity.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT * FROM owner_records
             WHERE batch_id = $1
               AND ((national_id_norm IS NOT NULL AND national_id_norm = $2)
                    OR (name_norm = $3 AND address_norm = $4))
             ORDER BY id",
        )
        .bind(batch_id)
        .bind(identity.national_id.as_deref())
        .bind(identity.name.as_deref())
        .bind(identity.address.as_deref())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(owner_from_row).collect()
    }

    async fn owners_declaring_plate(
        &self,
        batch_id: i64,
        plate: &str,
    ) -> AppResult<Vec<OwnerRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM owner_records WHERE batch_id = $1 AND declared_plate = $2 ORDER BY id",
        )
        .bind(batch_id)
        .bind(plate)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(owner_from_row).collect()
    }

    async fn vehicles_by_document(
        &self,
        batch_id: i64,
        document: &str,
    ) -> AppResult<Vec<VehicleRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM vehicle_records
             WHERE batch_id = $1 AND document_number_norm = $2 ORDER BY id",
        )
        .bind(batch_id)
        .bind(document)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(vehicle_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(plate: &str) -> NewVehicle {
        NewVehicle { plate: plate.into(), owner_name: "A".into(), ..Default::default() }
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("51A"), "%51A%");
        assert_eq!(like_pattern("50%_x"), "%50\\%\\_x%");
    }

    #[test]
    fn test_duplicate_report_indexes() {
        let rows = vec![vehicle("51A11111"), vehicle("51A22222"), vehicle("51A33333")];
        let report = duplicate_report(&rows, |p| p == "51A22222");
        assert_eq!(report.len(), 1);
        assert_eq!(report.errors[0].row, 2);
    }

    #[test]
    fn test_only_draft_batches_import() {
        let mut batch = Batch {
            id: 1,
            label: "2024-Q1".into(),
            description: None,
            created_at: Utc::now(),
            status: BatchStatus::Draft,
        };
        assert!(ensure_importable(&batch).is_ok());
        batch.status = BatchStatus::Active;
        assert!(matches!(ensure_importable(&batch), Err(AppError::Conflict(_))));
    }
}
