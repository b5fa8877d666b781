mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{activated_batch, BLUE_SHEET, OWNERS_WITHOUT_A, OWNERS_WITH_A};
use vehicle_registry::models::{BatchStatus, PlateCategory, PresenceState, SheetKind};
use vehicle_registry::repositories::{BatchStore, MemoryBatchStore};
use vehicle_registry::services::{LookupHint, MatchEngine, RecordImporter};
use vehicle_registry::AppError;

#[tokio::test]
async fn test_owner_removal_moves_plate_from_form_1_to_form_3() {
    let store = Arc::new(MemoryBatchStore::new());
    let engine = MatchEngine::new(store.clone());

    activated_batch(
        store.clone(),
        "2024-03",
        &[(SheetKind::BlueVehicles, BLUE_SHEET), (SheetKind::OwnerRegister, OWNERS_WITH_A)],
    )
    .await;
    let first = engine.classify("51A-12345", &LookupHint::default()).await.unwrap();
    assert_eq!(first.category, PlateCategory::Blue);
    assert_eq!(first.state, PresenceState::Matched);
    assert_eq!(first.form_number.value(), 1);

    let second_batch = activated_batch(
        store.clone(),
        "2024-04",
        &[(SheetKind::BlueVehicles, BLUE_SHEET), (SheetKind::OwnerRegister, OWNERS_WITHOUT_A)],
    )
    .await;
    let second = engine.classify("51A-12345", &LookupHint::default()).await.unwrap();
    assert_eq!(second.batch_id, second_batch.id);
    assert_eq!(second.state, PresenceState::VehicleOnly);
    assert_eq!(second.form_number.value(), 3);

    let batches = store.list_batches().await.unwrap();
    let statuses: Vec<BatchStatus> = batches.iter().map(|b| b.status).collect();
    assert_eq!(statuses, vec![BatchStatus::Active, BatchStatus::Archived]);
}

#[tokio::test]
async fn test_unknown_plates_map_to_not_listed_form() {
    let store = Arc::new(MemoryBatchStore::new());
    activated_batch(store.clone(), "2024-03", &[(SheetKind::BlueVehicles, BLUE_SHEET)]).await;
    let engine = MatchEngine::new(store);

    for (plate, form) in [("51D-999.99", 5), ("51LD-000.01", 10), ("29X1-234.56", 10)] {
        let result = engine.classify(plate, &LookupHint::default()).await.unwrap();
        assert!(!result.found, "{} should not be listed", plate);
        assert_eq!(result.form_number.value(), form, "plate {}", plate);
    }
}

#[tokio::test]
async fn test_concurrent_activation_has_one_winner() {
    let store = Arc::new(MemoryBatchStore::new().with_activation_delay(Duration::from_millis(50)));
    let a = store.create_batch("a", None).await.unwrap();
    let b = store.create_batch("b", None).await.unwrap();

    let (first, second) = tokio::join!(store.activate(a.id), store.activate(b.id));

    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = if first.is_err() { first } else { second };
    let err = loser.unwrap_err();
    assert!(matches!(err, AppError::ConcurrentActivation));
    assert!(err.is_retryable());

    let active: Vec<_> = store
        .list_batches()
        .await
        .unwrap()
        .into_iter()
        .filter(|b| b.status == BatchStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_readers_always_see_exactly_one_active_batch() {
    let store = Arc::new(MemoryBatchStore::new().with_activation_delay(Duration::from_millis(5)));
    activated_batch(store.clone(), "initial", &[(SheetKind::BlueVehicles, BLUE_SHEET)]).await;

    let reader_store = store.clone();
    let reader = tokio::spawn(async move {
        for _ in 0..200 {
            let active = reader_store
                .list_batches()
                .await
                .unwrap()
                .iter()
                .filter(|b| b.status == BatchStatus::Active)
                .count();
            assert_eq!(active, 1);
            assert!(reader_store.get_active().await.is_ok());
            tokio::task::yield_now().await;
        }
    });

    for i in 0..5 {
        let batch = store.create_batch(&format!("next-{}", i), None).await.unwrap();
        store.activate(batch.id).await.unwrap();
    }
    reader.await.unwrap();
}

#[tokio::test]
async fn test_rejected_file_leaves_batch_untouched() {
    let store = Arc::new(MemoryBatchStore::new());
    let importer = RecordImporter::new(store.clone());
    let batch = store.create_batch("draft", None).await.unwrap();

    let broken = "BIEN_SO,TEN\n51A11111,A\n,B\n51A22222,\n";
    let err = importer
        .import_file(batch.id, SheetKind::BlueVehicles, "broken.csv", broken.as_bytes())
        .await
        .unwrap_err();
    match err {
        AppError::Validation(report) => assert_eq!(report.len(), 2),
        other => panic!("unexpected {:?}", other),
    }

    assert!(store.list_files(batch.id).await.unwrap().is_empty());
    assert_eq!(store.batch_records(batch.id, None, 10, 0).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_import_records_data_file_metadata() {
    let store = Arc::new(MemoryBatchStore::new());
    let importer = RecordImporter::new(store.clone());
    let batch = store.create_batch("draft", Some("marzo")).await.unwrap();

    let file = importer
        .import_file(batch.id, SheetKind::BlueVehicles, "xanh.csv", BLUE_SHEET.as_bytes())
        .await
        .unwrap();
    assert_eq!(file.record_count, 2);
    assert_eq!(file.file_size, BLUE_SHEET.len() as i64);
    assert_eq!(file.checksum, format!("{:x}", md5::compute(BLUE_SHEET.as_bytes())));

    let page = store.batch_records(batch.id, Some("tran"), 10, 0).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].data.plate, "51B67890");
}

#[tokio::test]
async fn test_archived_batch_can_be_reactivated() {
    let store = Arc::new(MemoryBatchStore::new());
    let first = activated_batch(store.clone(), "first", &[(SheetKind::BlueVehicles, BLUE_SHEET)]).await;
    activated_batch(store.clone(), "second", &[]).await;

    let engine = MatchEngine::new(store.clone());
    let missing = engine.classify("51A12345", &LookupHint::default()).await.unwrap();
    assert!(!missing.vehicle_present);

    store.activate(first.id).await.unwrap();
    let back = engine.classify("51A12345", &LookupHint::default()).await.unwrap();
    assert!(back.vehicle_present);
    assert_eq!(back.batch_id, first.id);
}
