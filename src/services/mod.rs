//! Services module
//!
//! Este módulo contiene la lógica de negocio: importación de hojas,
//! clasificación de placas, ledger de solicitudes con su mirror y
//! exportación a las plantillas del regulador.

pub mod auth_service;
pub mod export_formatter;
pub mod match_engine;
pub mod mirror_worker;
pub mod record_importer;
pub mod request_ledger;
pub mod tracking_code;

pub use auth_service::{AdminSession, AuthService};
pub use export_formatter::{ExportFormatter, ExportOutput};
pub use match_engine::{Classification, LookupHint, MatchEngine};
pub use mirror_worker::{mirror_channel, MirrorHandle, MirrorStatsSnapshot, MirrorWorker};
pub use record_importer::RecordImporter;
pub use request_ledger::RequestLedger;
