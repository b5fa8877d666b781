//! Módulo de base de datos
//!
//! Maneja la conexión y las migraciones con PostgreSQL

pub mod connection;
pub mod migrator;

pub use connection::DatabaseConnection;
pub use migrator::{MigrationReport, SchemaMigrator};
