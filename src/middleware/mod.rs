//! Middleware del sistema
//!
//! Este módulo contiene el middleware de autenticación del panel y la
//! configuración de CORS.

pub mod auth;
pub mod cors;

pub use auth::{admin_auth_middleware, AuthenticatedAdmin};
pub use cors::cors_layer;
