use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::mirror::MirrorStore;
use super::MirrorConfig;
use crate::models::UpdateRequest;
use crate::utils::errors::{AppError, AppResult};

/// Cliente Redis del mirror de solicitudes.
///
/// La conexión se establece de forma perezosa: si Redis no está disponible al
/// arrancar, el servicio sigue en pie y cada escritura vuelve a intentarlo.
pub struct RedisClient {
    client: redis::Client,
    manager: Mutex<Option<ConnectionManager>>,
    key_prefix: String,
}

fn mirror_err(e: redis::RedisError) -> AppError {
    AppError::MirrorWrite(format!("Error de Redis: {}", e))
}

impl RedisClient {
    /// Crear nuevo cliente Redis (no conecta todavía)
    pub fn new(config: &MirrorConfig) -> AppResult<Self> {
        let client = redis::Client::open(config.redis_url.clone()).map_err(mirror_err)?;
        Ok(Self {
            client,
            manager: Mutex::new(None),
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Conexión compartida, creándola si hace falta
    async fn connection(&self) -> AppResult<ConnectionManager> {
        let mut slot = self.manager.lock().await;
        if let Some(manager) = slot.as_ref() {
            return Ok(manager.clone());
        }

        debug!("🔗 Conectando a Redis...");
        let manager = ConnectionManager::new(self.client.clone()).await.map_err(mirror_err)?;
        info!("✅ Redis conectado exitosamente");
        *slot = Some(manager.clone());
        Ok(manager)
    }

    /// Generar clave con prefijo
    fn make_key(&self, kind: &str, identifier: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, kind, identifier)
    }

    /// Clave del blob JSON de una solicitud
    pub fn request_key(&self, tracking_code: &str) -> String {
        self.make_key("request", tracking_code)
    }

    /// Sorted set con todas las solicitudes, puntuado por fecha de envío
    pub fn index_key(&self) -> String {
        format!("{}:requests", self.key_prefix)
    }

    /// Leer la copia de una solicitud
    pub async fn get_request(&self, tracking_code: &str) -> AppResult<Option<UpdateRequest>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.request_key(tracking_code)).await.map_err(mirror_err)?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AppError::MirrorWrite(format!("invalid mirrored JSON: {}", e)))
        })
        .transpose()
    }

    /// Verificar si Redis responde
    pub async fn is_connected(&self) -> bool {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(_) => return false,
        };
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(response) => response == "PONG",
            Err(e) => {
                warn!("⚠️ Redis no responde: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl MirrorStore for RedisClient {
    async fn put_request(&self, request: &UpdateRequest) -> AppResult<()> {
        let json = serde_json::to_string(request)
            .map_err(|e| AppError::MirrorWrite(format!("serialization failed: {}", e)))?;
        let key = self.request_key(&request.tracking_code);
        let mut conn = self.connection().await?;

        redis::pipe()
            .atomic()
            .set(&key, json)
            .ignore()
            .zadd(self.index_key(), &request.tracking_code, request.submitted_at.timestamp_millis())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(mirror_err)?;

        debug!("💾 Mirror SET para clave: {}", key);
        Ok(())
    }
}
