//! Vehicle Registry
//!
//! Consulta de placas contra lotes versionados del registro de vehículos y
//! del registro de residentes, ledger de solicitudes de actualización con
//! mirror en Redis y exportación a las plantillas del regulador.

pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use routes::create_router;
pub use state::AppState;
pub use utils::{AppError, AppResult};
