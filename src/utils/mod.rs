//! Utilidades del sistema
//!
//! Este módulo contiene utilidades para manejo de errores, normalización,
//! validación y JWT.

pub mod errors;
pub mod jwt;
pub mod normalize;
pub mod validation;

pub use errors::{AppError, AppResult};
