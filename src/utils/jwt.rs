//! Utilidades JWT
//!
//! Tokens del panel de administración: emitidos por `/admin/login` y
//! verificados por el middleware de las rutas de administración.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::environment::EnvironmentConfig, utils::errors::AppError};

/// Rol único del panel
pub const ADMIN_ROLE: &str = "admin";

/// Claims del JWT de administración
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String, // username
    pub role: String,
    pub jti: String,
    pub exp: usize,
    pub iat: usize,
}

/// Configuración de JWT
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration: u64,
}

impl From<&EnvironmentConfig> for JwtConfig {
    fn from(config: &EnvironmentConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            expiration: config.jwt_expiration,
        }
    }
}

/// Generar JWT token para un administrador
pub fn generate_token(username: &str, config: &JwtConfig) -> Result<String, AppError> {
    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::seconds(config.expiration as i64);

    let claims = AdminClaims {
        sub: username.to_string(),
        role: ADMIN_ROLE.to_string(),
        jti: Uuid::new_v4().to_string(),
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let encoding_key = EncodingKey::from_secret(config.secret.as_ref());

    encode(&Header::default(), &claims, &encoding_key)
        .map_err(|e| AppError::Internal(format!("Error generando token: {}", e)))
}

/// Verificar y decodificar JWT token
pub fn verify_token(token: &str, config: &JwtConfig) -> Result<AdminClaims, AppError> {
    let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

    let token_data = decode::<AdminClaims>(token, &decoding_key, &Validation::default())
        .map_err(|e| AppError::Unauthorized(format!("Token inválido: {}", e)))?;

    if token_data.claims.role != ADMIN_ROLE {
        return Err(AppError::Unauthorized("Se requieren permisos de administrador".to_string()));
    }

    Ok(token_data.claims)
}

/// Extraer token del header Authorization
pub fn extract_token_from_header(auth_header: &str) -> Result<&str, AppError> {
    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized("Header Authorization debe comenzar con 'Bearer '".to_string())
    })?;

    if token.trim().is_empty() {
        return Err(AppError::Unauthorized("Token no puede estar vacío".to_string()));
    }

    Ok(token.trim())
}
