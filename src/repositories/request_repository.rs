//! Repositorio de solicitudes
//!
//! Almacén primario del ledger de solicitudes. Es la fuente de verdad; el
//! mirror secundario vive en `cache`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::models::{
    FormNumber, RequestFields, RequestFilter, RequestStats, RequestStatus, UpdateRequest,
};
use crate::utils::errors::{AppError, AppResult};

/// Contrato del almacén primario de solicitudes
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Inserta la solicitud; `Ok(false)` si el código de seguimiento ya existe
    async fn insert(&self, request: &UpdateRequest) -> AppResult<bool>;

    async fn get(&self, tracking_code: &str) -> AppResult<Option<UpdateRequest>>;

    /// Solicitudes filtradas, por fecha de envío ascendente
    async fn list(&self, filter: &RequestFilter) -> AppResult<Vec<UpdateRequest>>;

    /// `received → reviewed`; `None` si la solicitud no está en `received`
    async fn mark_reviewed(
        &self,
        tracking_code: &str,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Option<UpdateRequest>>;

    /// Marca como exportada conservando la primera fecha de exportación; `None` si no existe
    async fn mark_exported(
        &self,
        tracking_code: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Option<UpdateRequest>>;

    async fn stats(&self) -> AppResult<RequestStats>;
}

/// Implementación PostgreSQL
#[derive(Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const REQUEST_COLUMNS: &str = "tracking_code, form_number, plate, category, batch_id, fields, \
     status, submitted_at, reviewed_by, reviewed_at, exported_at";

fn request_from_row(row: &PgRow) -> AppResult<UpdateRequest> {
    let form: i16 = row.try_get("form_number")?;
    let form_number = u8::try_from(form)
        .map_err(|_| AppError::Internal(format!("invalid stored form number {}", form)))
        .and_then(|n| FormNumber::new(n).map_err(AppError::Internal))?;
    let category: String = row.try_get("category")?;
    let status: String = row.try_get("status")?;
    let Json(fields): Json<RequestFields> = row.try_get("fields")?;

    Ok(UpdateRequest {
        tracking_code: row.try_get("tracking_code")?,
        form_number,
        plate: row.try_get("plate")?,
        category: category.parse().map_err(AppError::Internal)?,
        batch_id: row.try_get("batch_id")?,
        fields,
        status: status.parse().map_err(AppError::Internal)?,
        submitted_at: row.try_get("submitted_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: row.try_get("reviewed_at")?,
        exported_at: row.try_get("exported_at")?,
    })
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn insert(&self, request: &UpdateRequest) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO requests
                (tracking_code, form_number, plate, category, batch_id, fields, status, submitted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (tracking_code) DO NOTHING",
        )
        .bind(&request.tracking_code)
        .bind(request.form_number.value() as i16)
        .bind(&request.plate)
        .bind(request.category.as_str())
        .bind(request.batch_id)
        .bind(Json(&request.fields))
        .bind(request.status.as_str())
        .bind(request.submitted_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(inserted == 1)
    }

    async fn get(&self, tracking_code: &str) -> AppResult<Option<UpdateRequest>> {
        sqlx::query(&format!(
            "SELECT {} FROM requests WHERE tracking_code = $1",
            REQUEST_COLUMNS
        ))
        .bind(tracking_code)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(request_from_row)
        .transpose()
    }

    async fn list(&self, filter: &RequestFilter) -> AppResult<Vec<UpdateRequest>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM requests WHERE TRUE", REQUEST_COLUMNS));

        if let Some(form) = filter.form_number {
            builder.push(" AND form_number = ").push_bind(form.value() as i16);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.submitted_from {
            builder.push(" AND submitted_at >= ").push_bind(from);
        }
        if let Some(to) = filter.submitted_to {
            builder.push(" AND submitted_at < ").push_bind(to);
        }
        builder.push(" ORDER BY submitted_at ASC, tracking_code ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn mark_reviewed(
        &self,
        tracking_code: &str,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Option<UpdateRequest>> {
        sqlx::query(&format!(
            "UPDATE requests SET status = 'reviewed', reviewed_by = $2, reviewed_at = $3
             WHERE tracking_code = $1 AND status = 'received'
             RETURNING {}",
            REQUEST_COLUMNS
        ))
        .bind(tracking_code)
        .bind(reviewer)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(request_from_row)
        .transpose()
    }

    async fn mark_exported(
        &self,
        tracking_code: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Option<UpdateRequest>> {
        sqlx::query(&format!(
            "UPDATE requests SET status = 'exported', exported_at = COALESCE(exported_at, $2)
             WHERE tracking_code = $1
             RETURNING {}",
            REQUEST_COLUMNS
        ))
        .bind(tracking_code)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(request_from_row)
        .transpose()
    }

    async fn stats(&self) -> AppResult<RequestStats> {
        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM requests GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let by_form: Vec<(i16, i64)> =
            sqlx::query_as("SELECT form_number, COUNT(*) FROM requests GROUP BY form_number")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = stats_of(std::iter::empty());
        for (status, count) in by_status {
            stats.total += count;
            stats.by_status.insert(status, count);
        }
        for (form, count) in by_form {
            stats.by_form.insert(form as u8, count);
        }
        Ok(stats)
    }
}

/// Acumula estadísticas a partir de solicitudes ya cargadas
pub(crate) fn stats_of<'a>(requests: impl Iterator<Item = &'a UpdateRequest>) -> RequestStats {
    let mut stats = RequestStats::default();
    for status in [RequestStatus::Received, RequestStatus::Reviewed, RequestStatus::Exported] {
        stats.by_status.insert(status.as_str().to_string(), 0);
    }
    for request in requests {
        stats.total += 1;
        *stats.by_status.entry(request.status.as_str().to_string()).or_insert(0) += 1;
        *stats.by_form.entry(request.form_number.value()).or_insert(0) += 1;
    }
    stats
}
