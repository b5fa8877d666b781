mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use common::ledger_with_mirror;
use vehicle_registry::cache::MemoryMirror;
use vehicle_registry::models::{
    FieldKey, FormNumber, NewRequest, RequestFields, RequestFilter, RequestStatus, UpdateRequest,
};
use vehicle_registry::services::export_formatter::{
    columns_for, export, form_fields, parse_export, title_rows,
};
use vehicle_registry::services::ExportFormatter;

fn form(n: u8) -> FormNumber {
    FormNumber::new(n).unwrap()
}

fn stored(code: &str, plate: &str, form_number: FormNumber, fields: RequestFields) -> UpdateRequest {
    let submitted_at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 15).unwrap();
    UpdateRequest::from_new(
        code.to_string(),
        NewRequest { plate: plate.into(), form_number, batch_id: None, fields },
        submitted_at,
    )
}

fn headers_of(bytes: &[u8]) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    reader
        .records()
        .nth(3)
        .unwrap()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_matched_form_only_exports_its_own_columns() {
    let fields = RequestFields {
        vehicle_type: Some("Ô tô con".into()),
        owner_name: Some("Nguyen Van A".into()),
        owner_address: Some("KP1, Tân Biên".into()),
        owner_phone: Some("0909000111".into()),
        owner_tax_code: Some("0312345678".into()),
        vehicle_condition: Some("tốt".into()),
        notes: Some("đã kiểm tra".into()),
        ..Default::default()
    };
    let request = stored("REQ-20240301-ABCDEFGH", "51F12345", form(6), fields.clone());

    let bytes = export(form(6), &[request.clone()]).unwrap();
    let headers = headers_of(&bytes);
    let expected: Vec<String> = columns_for(form(6)).iter().map(|c| c.header.to_string()).collect();
    assert_eq!(headers, expected);
    assert!(!headers.iter().any(|h| h.contains("người mua")));
    assert!(!headers.iter().any(|h| h == "Số khung" || h == "Số máy"));

    let rows = parse_export(form(6), bytes.as_slice()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].plate, "51F12345");
    assert_eq!(rows[0].tracking_code, request.tracking_code);
    assert_eq!(rows[0].submitted_at, Some(request.submitted_at));
    assert_eq!(rows[0].fields, fields);
}

#[test]
fn test_every_form_round_trips_its_fields() {
    for form_number in FormNumber::all() {
        let mut fields = RequestFields::default();
        for key in form_fields(form_number) {
            fields.set(key, Some(format!("{} value, with comma", key.as_str())));
        }
        let requests = vec![
            stored("REQ-20240301-AAAAAAAA", "51A11111", form_number, fields.clone()),
            stored("REQ-20240301-BBBBBBBB", "51A22222", form_number, RequestFields::default()),
        ];

        let bytes = export(form_number, &requests).unwrap();
        let rows = parse_export(form_number, bytes.as_slice()).unwrap();
        assert_eq!(rows.len(), 2, "form {}", form_number);
        assert_eq!(rows[0].fields, fields, "form {}", form_number);
        assert_eq!(rows[1].fields, RequestFields::default(), "form {}", form_number);
    }
}

#[test]
fn test_fields_outside_the_template_are_not_exported() {
    let fields = RequestFields {
        owner_name: Some("Tran Thi B".into()),
        chassis_number: Some("RL4XW123".into()),
        buyer_name: Some("Le Van C".into()),
        ..Default::default()
    };
    let request = stored("REQ-20240301-CCCCCCCC", "51A12345", form(1), fields);

    let bytes = export(form(1), &[request]).unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(!text.contains("RL4XW123"));
    assert!(!text.contains("Le Van C"));

    let rows = parse_export(form(1), bytes.as_slice()).unwrap();
    assert_eq!(rows[0].fields.get(FieldKey::OwnerName), Some("Tran Thi B"));
    assert_eq!(rows[0].fields.get(FieldKey::ChassisNumber), None);
}

#[test]
fn test_sheet_starts_with_title_rows() {
    let bytes = export(form(3), &[]).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let titles = title_rows(form(3));
    let first_lines: Vec<&str> = text.lines().take(3).collect();
    for (line, title) in first_lines.iter().zip(titles.iter()) {
        assert!(line.contains(title.as_str()));
    }
    assert!(first_lines[2].contains("Mẫu 3"));
}

#[tokio::test]
async fn test_formatter_exports_one_form_and_marks_requests() {
    let (ledger, _worker) = ledger_with_mirror(Arc::new(MemoryMirror::new()));
    let formatter = ExportFormatter::new(ledger.clone());

    let mut fields = RequestFields::default();
    fields.set(FieldKey::OwnerName, Some("Nguyen Van A".into()));
    let submit = |plate: &str, n: u8| NewRequest {
        plate: plate.into(),
        form_number: form(n),
        batch_id: None,
        fields: fields.clone(),
    };
    let first = ledger.submit(submit("51A11111", 5)).await.unwrap();
    let second = ledger.submit(submit("51A22222", 5)).await.unwrap();
    let other = ledger.submit(submit("51A33333", 1)).await.unwrap();

    let output = formatter.export(form(5), RequestFilter::default()).await.unwrap();
    assert_eq!(output.row_count, 2);
    assert!(output.filename.starts_with("Mau_5_Export_"));
    assert!(output.filename.ends_with(".csv"));

    let rows = parse_export(form(5), output.to_bytes().unwrap().as_slice()).unwrap();
    let codes: Vec<&str> = rows.iter().map(|r| r.tracking_code.as_str()).collect();
    assert_eq!(codes, vec![first.tracking_code.as_str(), second.tracking_code.as_str()]);

    for code in [&first.tracking_code, &second.tracking_code] {
        assert_eq!(ledger.get(code).await.unwrap().status, RequestStatus::Exported);
    }
    assert_eq!(ledger.get(&other.tracking_code).await.unwrap().status, RequestStatus::Received);

    let again = formatter.export(form(5), RequestFilter::default()).await.unwrap();
    assert_eq!(again.row_count, 2);
}
