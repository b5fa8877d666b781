//! Configuración del mirror
//!
//! Parámetros del almacén secundario (Redis) y de la política de reintentos
//! del `MirrorWorker`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::environment::env_or;

/// Configuración del mirror de solicitudes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub redis_url: String,
    pub key_prefix: String,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub queue_capacity: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vehicle_registry".to_string(),
            max_attempts: 5,
            base_backoff_ms: 200,
            max_backoff_ms: 10_000,
            queue_capacity: 1024,
        }
    }
}

impl MirrorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("MIRROR_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            max_attempts: env_or("MIRROR_MAX_ATTEMPTS", defaults.max_attempts)?.max(1),
            base_backoff_ms: env_or("MIRROR_BASE_BACKOFF_MS", defaults.base_backoff_ms)?,
            max_backoff_ms: env_or("MIRROR_MAX_BACKOFF_MS", defaults.max_backoff_ms)?,
            queue_capacity: env_or("MIRROR_QUEUE_CAPACITY", defaults.queue_capacity)?.max(1),
        })
    }

    /// Espera antes del reintento `attempt` (1 = primer reintento): base·2ⁿ⁻¹, acotada
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self.base_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }
}
