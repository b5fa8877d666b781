//! Cache
//!
//! Este módulo contiene el almacén secundario (mirror) de solicitudes.

pub mod cache_config;
pub mod mirror;
pub mod redis_client;

pub use cache_config::MirrorConfig;
pub use mirror::{MemoryMirror, MirrorStore};
pub use redis_client::RedisClient;
