#![allow(dead_code)]

use std::sync::Arc;

use vehicle_registry::cache::{MemoryMirror, MirrorConfig};
use vehicle_registry::config::EnvironmentConfig;
use vehicle_registry::models::{Batch, SheetKind};
use vehicle_registry::repositories::{BatchStore, MemoryBatchStore, MemoryRequestStore};
use vehicle_registry::services::{mirror_channel, MirrorWorker, RecordImporter, RequestLedger};
use vehicle_registry::AppState;

pub const BLUE_SHEET: &str = "BIEN_SO,LOAI_XE,TEN,DIA_CHI_DANG_KY_XE,Khu Phố,SO_KHUNG,SO_MAY\n\
51A-123.45,Ô tô con,Nguyen Van A,\"KP1, Tân Biên\",KP1,RL4XW123,1NZ998\n\
51B-678.90,Ô tô tải,Tran Thi B,KP2,KP2,,\n";

pub const OWNERS_WITH_A: &str = "HO_TEN,DIA_CHI,SO_GIAY_TO,BIEN_SO,TRANG_THAI_CU_TRU\n\
nguyen van a,\"kp1,  tân biên\",,51A12345,\n\
Le Van C,KP3,079000111,51C-111.11,\n";

pub const OWNERS_WITHOUT_A: &str = "HO_TEN,DIA_CHI,SO_GIAY_TO,BIEN_SO,TRANG_THAI_CU_TRU\n\
Le Van C,KP3,079000111,51C-111.11,\n";

/// Mirror con reintentos rápidos
pub fn fast_mirror_config() -> MirrorConfig {
    MirrorConfig {
        max_attempts: 2,
        base_backoff_ms: 1,
        max_backoff_ms: 2,
        ..Default::default()
    }
}

/// Crea un lote, importa las hojas y lo activa
pub async fn activated_batch(
    store: Arc<MemoryBatchStore>,
    label: &str,
    sheets: &[(SheetKind, &str)],
) -> Batch {
    let importer = RecordImporter::new(store.clone());
    let batch = store.create_batch(label, None).await.unwrap();
    for (kind, csv) in sheets {
        importer
            .import_file(batch.id, *kind, &format!("{}.csv", kind.as_str()), csv.as_bytes())
            .await
            .unwrap();
    }
    store.activate(batch.id).await.unwrap()
}

pub fn ledger_with_mirror(mirror: Arc<MemoryMirror>) -> (Arc<RequestLedger>, MirrorWorker) {
    let (handle, worker) = mirror_channel(mirror, fast_mirror_config());
    let ledger = Arc::new(RequestLedger::new(Arc::new(MemoryRequestStore::new()), handle));
    (ledger, worker)
}

pub struct TestApp {
    pub state: AppState,
    pub batches: Arc<MemoryBatchStore>,
    pub mirror: Arc<MemoryMirror>,
}

pub const ADMIN_PASSWORD: &str = "correct-horse";

pub fn test_app() -> TestApp {
    let config = EnvironmentConfig {
        admin_password_hash: Some(bcrypt::hash(ADMIN_PASSWORD, 4).unwrap()),
        ..Default::default()
    };
    let batches = Arc::new(MemoryBatchStore::new());
    let mirror = Arc::new(MemoryMirror::new());
    let (ledger, worker) = ledger_with_mirror(mirror.clone());
    tokio::spawn(worker.run());
    let state = AppState::with_ledger(config, batches.clone(), ledger);
    TestApp { state, batches, mirror }
}
