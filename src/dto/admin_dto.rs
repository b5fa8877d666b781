//! DTOs del panel de administración

use serde::Deserialize;
use validator::Validate;

use crate::models::{FormNumber, RequestFilter, RequestStatus, SheetKind};
use crate::utils::errors::{AppError, AppResult};
use crate::utils::validation::{parse_date_bound, validate_not_empty};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom = "validate_not_empty")]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBatchRequest {
    #[validate(length(min = 1, max = 100), custom = "validate_not_empty")]
    pub label: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// Parámetros de `POST /admin/batches/:id/import` (el cuerpo es el CSV)
#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub kind: SheetKind,
    pub filename: Option<String>,
}

impl ImportQuery {
    pub fn filename(&self) -> String {
        self.filename
            .clone()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| format!("{}.csv", self.kind.as_str()))
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl RecordsQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Filtro de solicitudes en la query string; `to` es exclusivo
#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub form_number: Option<u8>,
    pub status: Option<RequestStatus>,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn date_bound(name: &str, value: Option<&str>) -> AppResult<Option<chrono::DateTime<chrono::Utc>>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_date_bound(raw)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("invalid '{}' date: {}", name, raw))),
    }
}

impl RequestListQuery {
    pub fn to_filter(&self) -> AppResult<RequestFilter> {
        let form_number = self
            .form_number
            .map(FormNumber::new)
            .transpose()
            .map_err(AppError::BadRequest)?;
        Ok(RequestFilter {
            form_number,
            status: self.status,
            submitted_from: date_bound("from", self.from.as_deref())?,
            submitted_to: date_bound("to", self.to.as_deref())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_list_query_to_filter() {
        let query = RequestListQuery {
            form_number: Some(6),
            from: Some("2024-03-01".into()),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.form_number.map(|f| f.value()), Some(6));
        assert!(filter.submitted_from.is_some());

        let bad = RequestListQuery { form_number: Some(11), ..Default::default() };
        assert!(matches!(bad.to_filter(), Err(AppError::BadRequest(_))));

        let bad_date = RequestListQuery { to: Some("yesterday".into()), ..Default::default() };
        assert!(bad_date.to_filter().is_err());
    }

    #[test]
    fn test_records_query_bounds() {
        let query = RecordsQuery { search: None, limit: Some(10_000), offset: Some(-3) };
        assert_eq!(query.limit(), MAX_PAGE_SIZE);
        assert_eq!(query.offset(), 0);
    }
}
