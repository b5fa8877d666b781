//! Exportación de solicitudes a las plantillas del regulador
//!
//! Un archivo CSV por número de formulario: tres filas de título, la fila de
//! cabeceras y una fila por solicitud. Las columnas dependen solo del tipo de
//! formulario (`FormKind`); un campo ausente se exporta como celda vacía.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::info;

use super::request_ledger::RequestLedger;
use crate::models::{FieldKey, FormKind, FormNumber, RequestFields, RequestFilter, UpdateRequest};
use crate::utils::errors::{AppError, AppResult, ValidationReport};

pub const APPENDIX_TITLE: &str = "Phụ lục 1: DANH SÁCH CỦA CƠ QUAN ĐĂNG KÝ GỬI CÔNG AN CẤP XÃ ĐỂ \
     RÀ SOÁT, CẬP NHẬT VÀ BỔ SUNG DỮ LIỆU ĐĂNG KÝ XE; GIẤY PHÉP LÁI XE";

const TITLE_ROWS: usize = 3;

/// Filas por trozo al exportar en streaming
pub const EXPORT_CHUNK_ROWS: usize = 500;
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Origen del valor de una columna exportada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    Sequence,
    Plate,
    Field(FieldKey),
    TrackingCode,
    SubmittedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportColumn {
    pub header: &'static str,
    pub source: ColumnSource,
}

const fn col(header: &'static str, source: ColumnSource) -> ExportColumn {
    ExportColumn { header, source }
}

const fn field(header: &'static str, key: FieldKey) -> ExportColumn {
    col(header, ColumnSource::Field(key))
}

const MATCHED_COLUMNS: &[ExportColumn] = &[
    col("STT", ColumnSource::Sequence),
    col("Biển số", ColumnSource::Plate),
    field("Loại xe", FieldKey::VehicleType),
    field("Chủ xe", FieldKey::OwnerName),
    field("Địa chỉ của chủ xe", FieldKey::OwnerAddress),
    field("Số Điện thoại chủ xe", FieldKey::OwnerPhone),
    field("Mã số thuế/Quyết định thành lập của chủ xe", FieldKey::OwnerTaxCode),
    field("Tình trạng phương tiện (tốt/hỏng)", FieldKey::VehicleCondition),
    field("Ghi chú", FieldKey::Notes),
    col("Mã tra cứu", ColumnSource::TrackingCode),
    col("Ngày tiếp nhận", ColumnSource::SubmittedAt),
];

const TRANSFER_COLUMNS: &[ExportColumn] = &[
    col("STT", ColumnSource::Sequence),
    col("Biển số", ColumnSource::Plate),
    field("Loại xe", FieldKey::VehicleType),
    field("Chủ xe", FieldKey::OwnerName),
    field("Địa chỉ của chủ xe", FieldKey::OwnerAddress),
    field("Số Điện thoại chủ xe", FieldKey::OwnerPhone),
    field("Mã số thuế/Quyết định thành lập của chủ xe", FieldKey::OwnerTaxCode),
    field(
        "Tên người mua/ được cho/tặng/thừa kế hoặc người đang sử dụng xe",
        FieldKey::BuyerName,
    ),
    field("Địa chỉ hiện tại người mua/đang sử dụng", FieldKey::BuyerAddress),
    field("Số CCCD/mã số thuế/QĐ thành lập người mua/đang sử dụng", FieldKey::BuyerIdNumber),
    field("Số Điện thoại người mua... hoặc người đang sử dụng xe", FieldKey::BuyerPhone),
    field("Bản sao chứng từ chuyển nhượng (nếu có)", FieldKey::TransferDocument),
    col("Mã tra cứu", ColumnSource::TrackingCode),
    col("Ngày tiếp nhận", ColumnSource::SubmittedAt),
];

const NOT_LISTED_COLUMNS: &[ExportColumn] = &[
    col("STT", ColumnSource::Sequence),
    col("Biển số", ColumnSource::Plate),
    field("Loại xe", FieldKey::VehicleType),
    field("Chủ xe", FieldKey::OwnerName),
    field("Địa chỉ của chủ xe", FieldKey::OwnerAddress),
    field("Số Điện thoại chủ xe", FieldKey::OwnerPhone),
    field("Số khung", FieldKey::ChassisNumber),
    field("Số máy", FieldKey::EngineNumber),
    field("Mã số thuế/Quyết định thành lập của chủ xe", FieldKey::OwnerTaxCode),
    field("Tình trạng phương tiện (tốt/hỏng)", FieldKey::VehicleCondition),
    field("Ghi chú", FieldKey::Notes),
    col("Mã tra cứu", ColumnSource::TrackingCode),
    col("Ngày tiếp nhận", ColumnSource::SubmittedAt),
];

/// Columnas de la plantilla de un formulario, en orden
pub fn columns_for(form: FormNumber) -> &'static [ExportColumn] {
    match form.kind() {
        FormKind::Matched => MATCHED_COLUMNS,
        FormKind::Transfer => TRANSFER_COLUMNS,
        FormKind::NotListed => NOT_LISTED_COLUMNS,
    }
}

/// Campos de solicitud que la plantilla del formulario exporta
pub fn form_fields(form: FormNumber) -> Vec<FieldKey> {
    columns_for(form)
        .iter()
        .filter_map(|c| match c.source {
            ColumnSource::Field(key) => Some(key),
            _ => None,
        })
        .collect()
}

/// Las tres filas de título de la plantilla
pub fn title_rows(form: FormNumber) -> [String; TITLE_ROWS] {
    [
        APPENDIX_TITLE.to_string(),
        form.category().section_title().to_string(),
        format!("Mẫu {}: {}", form.value(), form.title()),
    ]
}

fn export_err(e: csv::Error) -> AppError {
    AppError::Internal(format!("export write failed: {}", e))
}

fn cell(column: &ExportColumn, seq: usize, request: &UpdateRequest) -> String {
    match column.source {
        ColumnSource::Sequence => seq.to_string(),
        ColumnSource::Plate => request.plate.clone(),
        ColumnSource::Field(key) => request.fields.get(key).unwrap_or_default().to_string(),
        ColumnSource::TrackingCode => request.tracking_code.clone(),
        ColumnSource::SubmittedAt => request.submitted_at.format(DATE_FORMAT).to_string(),
    }
}

fn write_head<W: Write>(form: FormNumber, csv_writer: &mut csv::Writer<W>) -> AppResult<()> {
    for title in title_rows(form) {
        csv_writer.write_record([title]).map_err(export_err)?;
    }
    csv_writer
        .write_record(columns_for(form).iter().map(|c| c.header))
        .map_err(export_err)
}

/// `first_seq` es el número STT de la primera fila
fn write_rows<W: Write>(
    form: FormNumber,
    first_seq: usize,
    requests: &[UpdateRequest],
    csv_writer: &mut csv::Writer<W>,
) -> AppResult<()> {
    let columns = columns_for(form);
    for (idx, request) in requests.iter().enumerate() {
        csv_writer
            .write_record(columns.iter().map(|c| cell(c, first_seq + idx, request)))
            .map_err(export_err)?;
    }
    Ok(())
}

fn finish<W: Write>(mut csv_writer: csv::Writer<W>) -> AppResult<()> {
    csv_writer
        .flush()
        .map_err(|e| AppError::Internal(format!("export flush failed: {}", e)))
}

fn new_writer<W: Write>(writer: W) -> csv::Writer<W> {
    WriterBuilder::new().flexible(true).from_writer(writer)
}

/// Escribe la hoja de un formulario en `writer`, fila a fila
pub fn export_to<W: Write>(form: FormNumber, requests: &[UpdateRequest], writer: W) -> AppResult<()> {
    let mut csv_writer = new_writer(writer);
    write_head(form, &mut csv_writer)?;
    write_rows(form, 1, requests, &mut csv_writer)?;
    finish(csv_writer)
}

/// Hoja completa en memoria
pub fn export(form: FormNumber, requests: &[UpdateRequest]) -> AppResult<Vec<u8>> {
    let mut out = Vec::new();
    export_to(form, requests, &mut out)?;
    Ok(out)
}

/// Hoja en trozos: títulos y cabecera primero, luego bloques de `chunk_rows` filas.
/// Cada trozo se genera al pedirlo.
pub fn export_chunks(
    form: FormNumber,
    requests: Vec<UpdateRequest>,
    chunk_rows: usize,
) -> impl Iterator<Item = AppResult<Vec<u8>>> {
    let chunk_rows = chunk_rows.max(1);
    let head = std::iter::once_with(move || -> AppResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut csv_writer = new_writer(&mut out);
        write_head(form, &mut csv_writer)?;
        finish(csv_writer)?;
        Ok(out)
    });
    let rows = (0..requests.len()).step_by(chunk_rows).map(move |start| -> AppResult<Vec<u8>> {
        let end = (start + chunk_rows).min(requests.len());
        let mut out = Vec::new();
        let mut csv_writer = new_writer(&mut out);
        write_rows(form, start + 1, &requests[start..end], &mut csv_writer)?;
        finish(csv_writer)?;
        Ok(out)
    });
    head.chain(rows)
}

/// Fila leída de vuelta de una hoja exportada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedRow {
    pub plate: String,
    pub tracking_code: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub fields: RequestFields,
}

/// Relee una hoja exportada para el formulario dado
pub fn parse_export<R: Read>(form: FormNumber, reader: R) -> AppResult<Vec<ExportedRow>> {
    let columns = columns_for(form);
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = csv_reader.records().enumerate();

    let invalid = |row: usize, reason: String| AppError::Validation(ValidationReport::single(row, reason));

    for _ in 0..TITLE_ROWS {
        records.next();
    }
    let header = match records.next() {
        Some((_, Ok(header))) => header,
        Some((_, Err(e))) => return Err(invalid(0, format!("unreadable header: {}", e))),
        None => return Err(invalid(0, "missing header row".to_string())),
    };
    let expected: Vec<&str> = columns.iter().map(|c| c.header).collect();
    if header.iter().collect::<Vec<_>>() != expected {
        return Err(invalid(0, format!("header does not match form {} template", form)));
    }

    let mut rows = Vec::new();
    for (idx, result) in records {
        let row = idx - TITLE_ROWS;
        let record = result.map_err(|e| invalid(row, format!("unreadable row: {}", e)))?;
        let mut parsed = ExportedRow {
            plate: String::new(),
            tracking_code: String::new(),
            submitted_at: None,
            fields: RequestFields::default(),
        };
        for (column, value) in columns.iter().zip(record.iter()) {
            match column.source {
                ColumnSource::Sequence => {}
                ColumnSource::Plate => parsed.plate = value.to_string(),
                ColumnSource::Field(key) => parsed.fields.set(key, Some(value.to_string())),
                ColumnSource::TrackingCode => parsed.tracking_code = value.to_string(),
                ColumnSource::SubmittedAt => {
                    parsed.submitted_at = NaiveDateTime::parse_from_str(value, DATE_FORMAT)
                        .ok()
                        .map(|naive| Utc.from_utc_datetime(&naive));
                }
            }
        }
        rows.push(parsed);
    }
    Ok(rows)
}

/// Archivo exportado listo para descargar
#[derive(Debug, Clone, Serialize)]
pub struct ExportOutput {
    pub filename: String,
    pub form_number: FormNumber,
    pub row_count: usize,
    #[serde(skip)]
    pub requests: Vec<UpdateRequest>,
}

impl ExportOutput {
    /// Hoja completa en memoria
    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        export(self.form_number, &self.requests)
    }

    /// Cuerpo en streaming para respuestas HTTP
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + 'static {
        let chunks = export_chunks(self.form_number, self.requests, EXPORT_CHUNK_ROWS)
            .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string())));
        stream::iter(chunks)
    }
}

/// Exportación conectada al ledger
#[derive(Clone)]
pub struct ExportFormatter {
    ledger: Arc<RequestLedger>,
}

impl ExportFormatter {
    pub fn new(ledger: Arc<RequestLedger>) -> Self {
        Self { ledger }
    }

    /// Solicitudes del formulario (filtro opcional), en orden de envío, marcadas como exportadas
    pub async fn export(&self, form: FormNumber, filter: RequestFilter) -> AppResult<ExportOutput> {
        let filter = RequestFilter { form_number: Some(form), ..filter };
        let requests = self.ledger.list(&filter).await?;

        for request in &requests {
            self.ledger.mark_exported(&request.tracking_code).await?;
        }

        info!("📤 Exportadas {} solicitudes del formulario {}", requests.len(), form);
        Ok(ExportOutput {
            filename: format!("Mau_{}_Export_{}.csv", form.value(), Utc::now().format("%Y%m%d_%H%M%S")),
            form_number: form,
            row_count: requests.len(),
            requests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewRequest;

    fn request(form: u8, fields: RequestFields) -> UpdateRequest {
        UpdateRequest::from_new(
            "REQ-20240301-ABCDEFGH".into(),
            NewRequest {
                plate: "51A12345".into(),
                form_number: FormNumber::new(form).unwrap(),
                batch_id: None,
                fields,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_every_form_has_common_columns() {
        for form in FormNumber::all() {
            let headers: Vec<&str> = columns_for(form).iter().map(|c| c.header).collect();
            assert_eq!(&headers[..2], &["STT", "Biển số"]);
            assert!(headers.contains(&"Mã tra cứu"));
        }
    }

    #[test]
    fn test_title_rows() {
        let titles = title_rows(FormNumber::new(7).unwrap());
        assert!(titles[1].starts_with("II."));
        assert!(titles[2].starts_with("Mẫu 7: DANH SÁCH CÓ CHỦ XE"));
    }

    #[test]
    fn test_missing_fields_render_empty() {
        let mut fields = RequestFields::default();
        fields.set(FieldKey::OwnerName, Some("Nguyen Van A".into()));
        let bytes = export(FormNumber::new(3).unwrap(), &[request(3, fields)]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let last = text.lines().last().unwrap();
        assert!(last.starts_with("1,51A12345,,Nguyen Van A,,,,,,,,,REQ-20240301-ABCDEFGH,"));
    }

    #[test]
    fn test_not_listed_round_trip_keeps_chassis_and_engine() {
        let mut fields = RequestFields::default();
        fields.set(FieldKey::ChassisNumber, Some("RL4, XW".into()));
        fields.set(FieldKey::EngineNumber, Some("1NZ\"99".into()));
        let form = FormNumber::new(10).unwrap();
        let original = request(10, fields.clone());

        let rows = parse_export(form, export(form, &[original.clone()]).unwrap().as_slice()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields, fields);
        assert_eq!(rows[0].tracking_code, original.tracking_code);
        assert_eq!(
            rows[0].submitted_at.map(|d| d.timestamp()),
            Some(original.submitted_at.timestamp())
        );
    }

    #[test]
    fn test_chunks_concatenate_to_the_full_sheet() {
        let form = FormNumber::new(2).unwrap();
        let requests: Vec<UpdateRequest> = (0..5).map(|_| request(2, RequestFields::default())).collect();

        let chunks: Vec<Vec<u8>> = export_chunks(form, requests.clone(), 2)
            .collect::<AppResult<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.concat(), export(form, &requests).unwrap());

        let text = String::from_utf8(chunks[3].clone()).unwrap();
        assert!(text.starts_with("5,51A12345,"));
    }

    #[test]
    fn test_every_field_reaches_some_template() {
        for key in FieldKey::ALL {
            assert!(
                FormNumber::all().any(|form| form_fields(form).contains(&key)),
                "{} is not exported by any form",
                key.as_str()
            );
        }
    }

    #[test]
    fn test_parse_rejects_other_template() {
        let bytes = export(FormNumber::new(1).unwrap(), &[]).unwrap();
        let err = parse_export(FormNumber::new(2).unwrap(), bytes.as_slice()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
