//! Controladores
//!
//! Interfaz que consume la capa web: datos planos de entrada y salida, sin
//! conocimiento de HTTP.

pub mod admin_controller;
pub mod lookup_controller;

pub use admin_controller::AdminController;
pub use lookup_controller::LookupController;
