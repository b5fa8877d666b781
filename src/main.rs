use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use dotenvy::dotenv;

use vehicle_registry::cache::{MirrorConfig, RedisClient};
use vehicle_registry::config::{DatabaseConfig, EnvironmentConfig};
use vehicle_registry::database::DatabaseConnection;
use vehicle_registry::repositories::{PgBatchStore, PgRequestStore};
use vehicle_registry::services::mirror_channel;
use vehicle_registry::{create_router, AppState};

/// Tiempo máximo para vaciar la cola del mirror al apagar
const MIRROR_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();
    let config = EnvironmentConfig::from_env()?;

    // Configurar logging
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Vehicle Registry - Consulta y actualización de registros");
    info!("================================================");

    // Inicializar base de datos
    let db_config = DatabaseConfig::from_env()?;
    let db_connection = match DatabaseConnection::new(&db_config).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("❌ Error conectando a la base de datos: {}", e);
            return Err(anyhow::anyhow!("Error de base de datos: {}", e));
        }
    };

    // Migraciones antes de aceptar tráfico
    match db_connection.run_migrations().await {
        Ok(report) => info!(
            "✅ Esquema al día: {} migraciones aplicadas, {} ya presentes",
            report.applied.len(),
            report.skipped.len()
        ),
        Err(e) => {
            error!("❌ Migración fallida, el servicio no arranca: {}", e);
            return Err(e);
        }
    }
    let pool = db_connection.pool().clone();

    // Mirror de solicitudes (Redis); no bloquea el arranque
    let mirror_config = MirrorConfig::from_env()?;
    let redis_client = Arc::new(RedisClient::new(&mirror_config)?);
    if !redis_client.is_connected().await {
        warn!("⚠️ Redis no disponible al arrancar; el mirror seguirá reintentando");
    }
    let (mirror_handle, mirror_worker) = mirror_channel(redis_client, mirror_config);
    let worker_handle = tokio::spawn(mirror_worker.run());

    let addr: SocketAddr = config.server_url().parse()?;
    let app_state = AppState::new(
        config,
        Arc::new(PgBatchStore::new(pool.clone())),
        Arc::new(PgRequestStore::new(pool.clone())),
        mirror_handle,
    )
    .with_pool(pool);
    let app = create_router(app_state);

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints públicos:");
    info!("   GET  /api/lookup?plate=... - Clasificar placa");
    info!("   GET  /api/lookup/national-id?national_id=... - Vehículos por documento");
    info!("   POST /api/requests - Enviar solicitud");
    info!("   POST /api/requests/lookup-and-submit - Clasificar y enviar");
    info!("   GET  /api/requests/:tracking_code - Estado de una solicitud");
    info!("🛠️ Endpoints de administración:");
    info!("   POST /admin/login - Login");
    info!("   GET  /admin/batches - Lotes");
    info!("   POST /admin/batches/:id/import?kind=... - Importar CSV");
    info!("   POST /admin/batches/:id/activate - Activar lote");
    info!("   DELETE /admin/files/:file_id - Retirar archivo de un borrador");
    info!("   GET  /admin/requests - Solicitudes");
    info!("   POST /admin/export/:form_number - Exportar formulario");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Error del servidor: {}", e);
    }

    // El router ya no existe: al cerrarse la cola el worker termina
    match tokio::time::timeout(MIRROR_DRAIN_TIMEOUT, worker_handle).await {
        Ok(Ok(stats)) => info!("💾 Mirror vaciado: {} replicadas, {} fallidas", stats.mirrored, stats.failed),
        Ok(Err(e)) => error!("❌ Worker del mirror terminó con error: {}", e),
        Err(_) => warn!("⚠️ Cola del mirror no vaciada en {:?}", MIRROR_DRAIN_TIMEOUT),
    }

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
