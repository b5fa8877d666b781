//! Utilidades de validación
//!
//! Validadores `custom` para los DTOs (crate `validator`).

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

use super::normalize::normalize_plate;

/// Longitud máxima de una placa normalizada
pub const MAX_PLATE_LEN: usize = 12;

fn tracking_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^REQ-[0-9]{8}-[2-9A-HJ-NP-Z]{8}$").expect("valid tracking code regex")
    })
}

/// Validar que una placa tenga contenido alfanumérico razonable
pub fn validate_plate(value: &str) -> Result<(), ValidationError> {
    let normalized = normalize_plate(value);
    if normalized.is_empty() || normalized.len() > MAX_PLATE_LEN {
        let mut error = ValidationError::new("plate");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar el formato de un código de seguimiento
pub fn validate_tracking_code(value: &str) -> Result<(), ValidationError> {
    if !tracking_code_re().is_match(value.trim()) {
        let mut error = ValidationError::new("tracking_code");
        error.add_param("value".into(), &value.to_string());
        error.add_param("format".into(), &"REQ-YYYYMMDD-XXXXXXXX".to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar que un string no esté vacío
pub fn validate_not_empty(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("not_empty"));
    }
    Ok(())
}

/// Interpreta un límite de fecha: RFC3339 o `YYYY-MM-DD` (medianoche UTC)
pub fn parse_date_bound(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_plate() {
        assert!(validate_plate("51A-123.45").is_ok());
        assert!(validate_plate(" - ").is_err());
        assert!(validate_plate("1234567890ABCDEF").is_err());
    }

    #[test]
    fn test_validate_tracking_code() {
        assert!(validate_tracking_code("REQ-20240101-ABCDEFGH").is_ok());
        assert!(validate_tracking_code("REQ-20240101-ABCDEFG0").is_err());
        assert!(validate_tracking_code("REQ_1").is_err());
    }

    #[test]
    fn test_parse_date_bound() {
        let d = parse_date_bound("2024-03-01").unwrap();
        assert_eq!(d.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_date_bound("2024-03-01T10:00:00Z").is_some());
        assert!(parse_date_bound("yesterday").is_none());
    }
}
