//! Modelo de Batch
//!
//! Un lote es una instantánea versionada de datos importados. Como máximo un
//! lote está `active` en cada momento.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::vehicle::SheetKind;

/// Estado del lote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Draft,
    Active,
    Archived,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Draft => "draft",
            BatchStatus::Active => "active",
            BatchStatus::Archived => "archived",
        }
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(BatchStatus::Draft),
            "active" => Ok(BatchStatus::Active),
            "archived" => Ok(BatchStatus::Archived),
            other => Err(format!("unknown batch status '{}'", other)),
        }
    }
}

/// Lote de datos
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    pub label: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: BatchStatus,
}

/// Metadatos de un archivo importado en un lote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    pub id: i64,
    pub batch_id: i64,
    pub original_filename: String,
    pub sheet_kind: SheetKind,
    pub file_size: i64,
    pub checksum: String,
    pub record_count: i64,
    pub uploaded_at: DateTime<Utc>,
}

/// Metadatos del archivo que acompañan a una importación
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMeta {
    pub original_filename: String,
    pub file_size: i64,
    pub checksum: String,
}

impl UploadMeta {
    pub fn from_bytes(filename: &str, bytes: &[u8]) -> Self {
        Self {
            original_filename: filename.to_string(),
            file_size: bytes.len() as i64,
            checksum: format!("{:x}", md5::compute(bytes)),
        }
    }
}

/// Página de registros de un lote para el panel de administración
#[derive(Debug, Clone, Serialize)]
pub struct RecordPage {
    pub records: Vec<super::vehicle::VehicleRecord>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_meta_checksum() {
        let meta = UploadMeta::from_bytes("a.csv", b"BIEN_SO\n");
        assert_eq!(meta.file_size, 8);
        assert_eq!(meta.checksum.len(), 32);
        assert_eq!(meta, UploadMeta::from_bytes("a.csv", b"BIEN_SO\n"));
    }

    #[test]
    fn test_status_round_trip() {
        for s in [BatchStatus::Draft, BatchStatus::Active, BatchStatus::Archived] {
            assert_eq!(s.as_str().parse::<BatchStatus>().unwrap(), s);
        }
    }
}
