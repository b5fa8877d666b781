//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::environment::EnvironmentConfig;
use crate::controllers::{AdminController, LookupController};
use crate::repositories::{BatchStore, RequestStore};
use crate::services::{AuthService, MatchEngine, MirrorHandle, RequestLedger};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EnvironmentConfig>,
    pub auth: Arc<AuthService>,
    pub lookup: Arc<LookupController>,
    pub admin: Arc<AdminController>,
    pub ledger: Arc<RequestLedger>,
    /// Pool para el health check; `None` con almacenes en memoria
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Construye servicios y controladores sobre los almacenes dados
    pub fn new(
        config: EnvironmentConfig,
        batches: Arc<dyn BatchStore>,
        requests: Arc<dyn RequestStore>,
        mirror: MirrorHandle,
    ) -> Self {
        let ledger = Arc::new(RequestLedger::new(requests, mirror));
        Self::with_ledger(config, batches, ledger)
    }

    pub fn with_ledger(
        config: EnvironmentConfig,
        batches: Arc<dyn BatchStore>,
        ledger: Arc<RequestLedger>,
    ) -> Self {
        let engine = Arc::new(MatchEngine::new(batches.clone()));
        Self {
            auth: Arc::new(AuthService::new(&config)),
            lookup: Arc::new(LookupController::new(engine, ledger.clone())),
            admin: Arc::new(AdminController::new(batches, ledger.clone())),
            ledger,
            config: Arc::new(config),
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}
