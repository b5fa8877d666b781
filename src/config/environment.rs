//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y variables de configuración.
//! Todas las variables tienen un valor por defecto salvo `JWT_SECRET` en producción.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub log_level: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub cors_origins: Vec<String>,
    pub admin_username: String,
    /// Hash bcrypt de la contraseña del panel; sin él, el login queda deshabilitado
    pub admin_password_hash: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 8000,
            host: "0.0.0.0".to_string(),
            log_level: "info".to_string(),
            jwt_secret: "development-secret-change-me".to_string(),
            jwt_expiration: 28_800, // 8 horas
            cors_origins: vec!["*".to_string()],
            admin_username: "admin".to_string(),
            admin_password_hash: None,
        }
    }
}

/// Leer una variable y parsearla, con valor por defecto si no existe
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} must be valid: {}", key, e)),
        _ => Ok(default),
    }
}

impl EnvironmentConfig {
    /// Cargar la configuración desde el entorno
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let environment = env::var("ENVIRONMENT").unwrap_or(defaults.environment);

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == "production" => {
                return Err(anyhow!("JWT_SECRET must be set in production"));
            }
            _ => defaults.jwt_secret,
        };

        Ok(Self {
            port: env_or("PORT", defaults.port).context("invalid PORT")?,
            host: env::var("HOST").unwrap_or(defaults.host),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            jwt_secret,
            jwt_expiration: env_or("JWT_EXPIRATION", defaults.jwt_expiration)
                .context("invalid JWT_EXPIRATION")?,
            cors_origins: env::var("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_password_hash: env::var("ADMIN_PASSWORD_HASH")
                .ok()
                .filter(|h| !h.trim().is_empty()),
            environment,
        })
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Verificar si estamos en modo producción
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Obtener la URL del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// CORS abierto cuando no se configuran orígenes concretos
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}
