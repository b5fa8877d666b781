//! Importación de hojas de registro
//!
//! Lee un CSV (una hoja por archivo) con cabeceras fijas según el tipo de
//! hoja, normaliza cada fila y acumula todos los errores en un único
//! `ValidationReport`. Si hay al menos una fila inválida no se importa nada.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{
    DataFile, NewOwner, NewVehicle, ParsedRows, PlateCategory, SheetKind, UploadMeta,
};
use crate::repositories::BatchStore;
use crate::utils::errors::{AppError, AppResult, ValidationReport};
use crate::utils::normalize::{clean_cell, normalize_plate};

// Cabeceras del registro de vehículos
pub const COL_PLATE: &str = "BIEN_SO";
pub const COL_VEHICLE_TYPE: &str = "LOAI_XE";
pub const COL_OWNER_NAME: &str = "TEN";
pub const COL_REGISTERED_ADDRESS: &str = "DIA_CHI_DANG_KY_XE";
pub const COL_NEIGHBORHOOD: &str = "Khu Phố";
pub const COL_CHASSIS: &str = "SO_KHUNG";
pub const COL_ENGINE: &str = "SO_MAY";
pub const COL_PHONE: &str = "SO_DIEN_THOAI";
pub const COL_DOCUMENT: &str = "SO_GIAY_TO";
pub const COL_VEHICLE_STATUS: &str = "TRANG_THAI_XE";
pub const COL_PLATE_COLOR: &str = "MAU_BIEN";
pub const COL_PERMANENT_ADDRESS: &str = "DIA_CHI_THUONG_TRU";
pub const COL_CURRENT_ADDRESS: &str = "NOI_O_HIEN_TAI";
pub const COL_DOCUMENT_TYPE: &str = "LOAI_GIAY_TO";
pub const COL_REGISTRATION_STATUS: &str = "TRANG_THAI_DANG_KY";

// Cabeceras del registro de residentes
pub const COL_FULL_NAME: &str = "HO_TEN";
pub const COL_ADDRESS: &str = "DIA_CHI";
pub const COL_RESIDENCE_STATUS: &str = "TRANG_THAI_CU_TRU";

const MOVED_MARKERS: [&str; 3] = ["đã chuyển đi", "chuyen di", "moved"];

/// Columnas de cada tipo de hoja, en el orden de la plantilla
pub fn sheet_columns(kind: SheetKind) -> &'static [&'static str] {
    match kind {
        SheetKind::BlueVehicles => &[
            COL_PLATE,
            COL_VEHICLE_TYPE,
            COL_OWNER_NAME,
            COL_REGISTERED_ADDRESS,
            COL_NEIGHBORHOOD,
            COL_CHASSIS,
            COL_ENGINE,
            COL_PHONE,
            COL_DOCUMENT,
            COL_VEHICLE_STATUS,
        ],
        SheetKind::WhiteYellowVehicles => &[
            COL_PLATE,
            COL_PLATE_COLOR,
            COL_VEHICLE_TYPE,
            COL_OWNER_NAME,
            COL_REGISTERED_ADDRESS,
            COL_PERMANENT_ADDRESS,
            COL_CURRENT_ADDRESS,
            COL_NEIGHBORHOOD,
            COL_CHASSIS,
            COL_ENGINE,
            COL_PHONE,
            COL_DOCUMENT_TYPE,
            COL_DOCUMENT,
            COL_VEHICLE_STATUS,
            COL_REGISTRATION_STATUS,
        ],
        SheetKind::OwnerRegister => &[
            COL_FULL_NAME,
            COL_ADDRESS,
            COL_DOCUMENT,
            COL_PLATE,
            COL_RESIDENCE_STATUS,
        ],
    }
}

/// Posición de cada cabecera reconocida
struct HeaderMap(HashMap<String, usize>);

impl HeaderMap {
    fn new(headers: &StringRecord) -> Self {
        Self(
            headers
                .iter()
                .enumerate()
                .map(|(idx, h)| (h.trim_start_matches('\u{feff}').trim().to_string(), idx))
                .collect(),
        )
    }

    fn has(&self, header: &str) -> bool {
        self.0.contains_key(header)
    }

    fn cell(&self, record: &StringRecord, header: &str) -> Option<String> {
        self.0.get(header).and_then(|idx| clean_cell(record.get(*idx)))
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}

fn is_resident(status: Option<&str>) -> bool {
    match status {
        None => true,
        Some(raw) => {
            let lowered = raw.to_lowercase();
            !MOVED_MARKERS.iter().any(|m| lowered.contains(m))
        }
    }
}

fn vehicle_row(headers: &HeaderMap, record: &StringRecord) -> Result<NewVehicle, String> {
    let plate = headers
        .cell(record, COL_PLATE)
        .map(|p| normalize_plate(&p))
        .filter(|p| !p.is_empty())
        .ok_or_else(|| format!("missing {}", COL_PLATE))?;
    let owner_name = headers
        .cell(record, COL_OWNER_NAME)
        .ok_or_else(|| format!("missing {} for plate {}", COL_OWNER_NAME, plate))?;

    Ok(NewVehicle {
        plate,
        vehicle_type: headers.cell(record, COL_VEHICLE_TYPE),
        owner_name,
        registered_address: headers.cell(record, COL_REGISTERED_ADDRESS),
        neighborhood: headers.cell(record, COL_NEIGHBORHOOD),
        permanent_address: headers.cell(record, COL_PERMANENT_ADDRESS),
        current_address: headers.cell(record, COL_CURRENT_ADDRESS),
        chassis_number: headers.cell(record, COL_CHASSIS),
        engine_number: headers.cell(record, COL_ENGINE),
        phone: headers.cell(record, COL_PHONE),
        document_type: headers.cell(record, COL_DOCUMENT_TYPE),
        document_number: headers.cell(record, COL_DOCUMENT),
        plate_color: headers.cell(record, COL_PLATE_COLOR),
        vehicle_status: headers.cell(record, COL_VEHICLE_STATUS),
        registration_status: headers.cell(record, COL_REGISTRATION_STATUS),
    })
}

fn owner_row(headers: &HeaderMap, record: &StringRecord) -> Result<NewOwner, String> {
    let full_name = headers
        .cell(record, COL_FULL_NAME)
        .ok_or_else(|| format!("missing {}", COL_FULL_NAME))?;
    let address = headers.cell(record, COL_ADDRESS);
    let national_id = headers.cell(record, COL_DOCUMENT);
    if address.is_none() && national_id.is_none() {
        return Err(format!("missing {} (or {})", COL_ADDRESS, COL_DOCUMENT));
    }

    Ok(NewOwner {
        full_name,
        address,
        national_id,
        declared_plate: headers
            .cell(record, COL_PLATE)
            .map(|p| normalize_plate(&p))
            .filter(|p| !p.is_empty()),
        resident: is_resident(headers.cell(record, COL_RESIDENCE_STATUS).as_deref()),
    })
}

fn check_headers(kind: SheetKind, headers: &HeaderMap) -> AppResult<()> {
    let mut report = ValidationReport::new();
    let required: &[&str] = match kind {
        SheetKind::BlueVehicles | SheetKind::WhiteYellowVehicles => &[COL_PLATE, COL_OWNER_NAME],
        SheetKind::OwnerRegister => &[COL_FULL_NAME],
    };
    for header in required {
        if !headers.has(header) {
            report.push(0, format!("missing required column {}", header));
        }
    }
    if kind == SheetKind::OwnerRegister && !headers.has(COL_ADDRESS) && !headers.has(COL_DOCUMENT)
    {
        report.push(0, format!("missing required column {} (or {})", COL_ADDRESS, COL_DOCUMENT));
    }
    report.into_result()
}

/// Importador de archivos hacia un lote
#[derive(Clone)]
pub struct RecordImporter {
    store: Arc<dyn BatchStore>,
}

impl RecordImporter {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self { store }
    }

    /// Parsea y valida una hoja completa leyendo fila a fila
    pub fn parse<R: Read>(kind: SheetKind, reader: R) -> AppResult<ParsedRows> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map(HeaderMap::new)
            .map_err(|e| AppError::Validation(ValidationReport::single(0, format!("unreadable header: {}", e))))?;
        check_headers(kind, &headers)?;

        let mut report = ValidationReport::new();
        let mut vehicles = Vec::new();
        let mut owners = Vec::new();
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for (idx, result) in csv_reader.records().enumerate() {
            let row = idx + 1;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    report.push(row, format!("unreadable row: {}", e));
                    continue;
                }
            };
            if is_blank(&record) {
                continue;
            }

            match kind {
                SheetKind::OwnerRegister => match owner_row(&headers, &record) {
                    Ok(owner) => owners.push(owner),
                    Err(reason) => report.push(row, reason),
                },
                SheetKind::BlueVehicles | SheetKind::WhiteYellowVehicles => {
                    match vehicle_row(&headers, &record) {
                        Ok(vehicle) => match first_seen.get(&vehicle.plate) {
                            Some(first) => report.push(
                                row,
                                format!("duplicate plate {} (first at row {})", vehicle.plate, first),
                            ),
                            None => {
                                first_seen.insert(vehicle.plate.clone(), row);
                                vehicles.push(vehicle);
                            }
                        },
                        Err(reason) => report.push(row, reason),
                    }
                }
            }
        }

        if !report.is_empty() {
            warn!("⚠️ Archivo rechazado ({}): {}", kind.as_str(), report);
        }
        report.into_result()?;

        Ok(match kind.category() {
            Some(category) => ParsedRows::Vehicles { category, rows: vehicles },
            None => ParsedRows::Owners(owners),
        })
    }

    /// Parsea un archivo subido y lo importa en el lote
    pub async fn import_file(
        &self,
        batch_id: i64,
        kind: SheetKind,
        filename: &str,
        bytes: &[u8],
    ) -> AppResult<DataFile> {
        let meta = UploadMeta::from_bytes(filename, bytes);
        let rows = Self::parse(kind, bytes)?;
        info!("📄 '{}' parseado: {} filas válidas ({})", filename, rows.len(), kind.as_str());
        self.store.import_into(batch_id, rows, meta).await
    }
}

/// Tipo de hoja de vehículos para una categoría
pub fn vehicle_sheet(category: PlateCategory) -> SheetKind {
    match category {
        PlateCategory::Blue => SheetKind::BlueVehicles,
        PlateCategory::WhiteYellow => SheetKind::WhiteYellowVehicles,
    }
}
