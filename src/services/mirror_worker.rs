//! Worker de replicación hacia el mirror
//!
//! El ledger encola cada solicitud ya persistida en una cola `mpsc` acotada;
//! el worker la escribe en el `MirrorStore` con reintentos y backoff
//! exponencial. Nada de esto bloquea ni hace fallar al `submit`. Las entregas
//! son al menos una vez: una caída de Redis retrasa la copia pero no la
//! pierde mientras queden intentos.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::cache::{MirrorConfig, MirrorStore};
use crate::models::UpdateRequest;

/// Contadores del worker
#[derive(Debug, Default)]
pub struct MirrorStats {
    mirrored: AtomicU64,
    retries: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Copia puntual de `MirrorStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MirrorStatsSnapshot {
    pub mirrored: u64,
    pub retries: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl MirrorStats {
    pub fn snapshot(&self) -> MirrorStatsSnapshot {
        MirrorStatsSnapshot {
            mirrored: self.mirrored.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Extremo productor de la cola
#[derive(Clone)]
pub struct MirrorHandle {
    tx: mpsc::Sender<UpdateRequest>,
    stats: Arc<MirrorStats>,
}

impl MirrorHandle {
    /// Encola sin esperar; cola llena o cerrada cuenta como fallo definitivo.
    ///
    /// La cola solo se llena si el worker no da abasto con los primeros
    /// intentos: los reintentos esperan aparte y no ocupan huecos de la cola.
    pub fn enqueue(&self, request: UpdateRequest) {
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                error!(
                    "❌ Cola del mirror llena, solicitud {} no replicada",
                    request.tracking_code
                );
            }
            Err(TrySendError::Closed(request)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                error!(
                    "❌ Worker del mirror detenido, solicitud {} no replicada",
                    request.tracking_code
                );
            }
        }
    }

    pub fn stats(&self) -> MirrorStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Consumidor de la cola
pub struct MirrorWorker {
    rx: mpsc::Receiver<UpdateRequest>,
    replicator: Replicator,
}

/// Crea la cola y sus dos extremos
pub fn mirror_channel(store: Arc<dyn MirrorStore>, config: MirrorConfig) -> (MirrorHandle, MirrorWorker) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let stats = Arc::new(MirrorStats::default());
    (
        MirrorHandle { tx, stats: stats.clone() },
        MirrorWorker { rx, replicator: Replicator { store, config, stats } },
    )
}

/// Trabajo pendiente de reintento
struct RetryJob {
    request: UpdateRequest,
    attempts: u32,
    due: Instant,
}

impl MirrorWorker {
    /// Procesa trabajos hasta que se cierran todos los productores y se
    /// vacía la lista de reintentos.
    ///
    /// Un trabajo nuevo se intenta en cuanto llega; los fallidos esperan su
    /// backoff en `backlog` sin bloquear a los siguientes.
    pub async fn run(self) -> MirrorStatsSnapshot {
        let MirrorWorker { mut rx, replicator } = self;
        let mut backlog: VecDeque<RetryJob> = VecDeque::new();
        let mut open = true;
        info!("🚀 Worker del mirror iniciado");

        while open || !backlog.is_empty() {
            let next_due = backlog.iter().map(|job| job.due).min();
            tokio::select! {
                received = rx.recv(), if open => match received {
                    Some(request) => {
                        // Una versión más reciente sustituye a la pendiente
                        backlog.retain(|job| job.request.tracking_code != request.tracking_code);
                        let job = RetryJob { request, attempts: 0, due: Instant::now() };
                        replicator.attempt(job, &mut backlog).await;
                    }
                    None => open = false,
                },
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    let now = Instant::now();
                    let (due, pending): (Vec<RetryJob>, Vec<RetryJob>) =
                        backlog.drain(..).partition(|job| job.due <= now);
                    backlog.extend(pending);
                    for job in due {
                        replicator.attempt(job, &mut backlog).await;
                    }
                }
            }
        }

        let stats = replicator.stats.snapshot();
        info!(
            "🛑 Worker del mirror detenido: {} replicadas, {} fallidas",
            stats.mirrored, stats.failed
        );
        stats
    }
}

struct Replicator {
    store: Arc<dyn MirrorStore>,
    config: MirrorConfig,
    stats: Arc<MirrorStats>,
}

impl Replicator {
    /// Un intento de escritura; si falla y quedan intentos, vuelve a `backlog`
    async fn attempt(&self, mut job: RetryJob, backlog: &mut VecDeque<RetryJob>) {
        let max_attempts = self.config.max_attempts.max(1);
        job.attempts += 1;

        match self.store.put_request(&job.request).await {
            Ok(()) => {
                self.stats.mirrored.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "💾 Solicitud {} replicada (intento {})",
                    job.request.tracking_code, job.attempts
                );
            }
            Err(e) if job.attempts < max_attempts => {
                if backlog.len() >= self.config.queue_capacity.max(1) {
                    if let Some(oldest) = backlog.pop_front() {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        error!(
                            "❌ Reintentos del mirror saturados, solicitud {} descartada",
                            oldest.request.tracking_code
                        );
                    }
                }
                self.stats.retries.fetch_add(1, Ordering::Relaxed);
                let wait = self.config.backoff_for(job.attempts);
                warn!(
                    "⚠️ Mirror falló para {} (intento {}/{}): {}; reintento en {:?}",
                    job.request.tracking_code, job.attempts, max_attempts, e, wait
                );
                job.due = Instant::now() + wait;
                backlog.push_back(job);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    "❌ Mirror falló definitivamente para {} tras {} intentos: {}",
                    job.request.tracking_code, job.attempts, e
                );
            }
        }
    }
}
