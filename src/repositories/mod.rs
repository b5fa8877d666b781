//! Repositorios
//!
//! Contratos de almacenamiento (`BatchStore`, `RequestStore`) y sus
//! implementaciones en PostgreSQL y en memoria.

pub mod batch_repository;
pub mod memory_repository;
pub mod request_repository;

pub use batch_repository::{BatchStore, PgBatchStore};
pub use memory_repository::{MemoryBatchStore, MemoryRequestStore};
pub use request_repository::{PgRequestStore, RequestStore};
