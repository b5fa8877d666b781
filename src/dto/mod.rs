//! DTOs de la API HTTP
//!
//! Cuerpos y parámetros de las rutas públicas y de administración.

pub mod admin_dto;
pub mod common_dto;
pub mod lookup_dto;

pub use common_dto::ApiResponse;
