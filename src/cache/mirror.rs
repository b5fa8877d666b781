//! Almacén secundario de solicitudes
//!
//! `MirrorStore` es el destino de la replicación best-effort. El primario
//! sigue siendo la fuente de verdad.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::models::UpdateRequest;
use crate::utils::errors::{AppError, AppResult};

#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Escribe (o sobrescribe) la copia de una solicitud
    async fn put_request(&self, request: &UpdateRequest) -> AppResult<()>;
}

/// Mirror en memoria con interruptor de disponibilidad
#[derive(Default)]
pub struct MemoryMirror {
    entries: RwLock<HashMap<String, String>>,
    unavailable: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror caído: toda escritura falla
    pub fn unavailable() -> Self {
        let mirror = Self::default();
        mirror.set_available(false);
        mirror
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Intentos de escritura recibidos (exitosos o no)
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn get(&self, tracking_code: &str) -> Option<UpdateRequest> {
        let entries = self.entries.read().await;
        entries
            .get(tracking_code)
            .and_then(|json| serde_json::from_str(json).ok())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl MirrorStore for MemoryMirror {
    async fn put_request(&self, request: &UpdateRequest) -> AppResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::MirrorWrite("mirror unavailable".to_string()));
        }
        let json = serde_json::to_string(request)
            .map_err(|e| AppError::MirrorWrite(format!("serialization failed: {}", e)))?;
        self.entries.write().await.insert(request.tracking_code.clone(), json);
        Ok(())
    }
}
