//! Autenticación del panel de administración
//!
//! Un único administrador configurado por entorno (`ADMIN_USERNAME` y el hash
//! bcrypt `ADMIN_PASSWORD_HASH`). El login devuelve un JWT que el middleware
//! exige en todas las rutas `/admin`.

use bcrypt::verify;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::environment::EnvironmentConfig;
use crate::utils::errors::{AppError, AppResult};
use crate::utils::jwt::{generate_token, verify_token, AdminClaims, JwtConfig};

/// Token emitido tras un login correcto
#[derive(Debug, Clone, Serialize)]
pub struct AdminSession {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub username: String,
}

/// Servicio de autenticación
#[derive(Debug, Clone)]
pub struct AuthService {
    username: String,
    password_hash: Option<String>,
    jwt: JwtConfig,
}

impl AuthService {
    pub fn new(config: &EnvironmentConfig) -> Self {
        Self {
            username: config.admin_username.clone(),
            password_hash: config.admin_password_hash.clone(),
            jwt: JwtConfig::from(config),
        }
    }

    pub fn jwt_config(&self) -> &JwtConfig {
        &self.jwt
    }

    /// Verifica credenciales y emite un token
    pub fn login(&self, username: &str, password: &str) -> AppResult<AdminSession> {
        let Some(hash) = self.password_hash.as_deref() else {
            warn!("⚠️ Login de administración deshabilitado: falta ADMIN_PASSWORD_HASH");
            return Err(AppError::Unauthorized("Login de administración deshabilitado".to_string()));
        };

        let valid_password = verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Hash de contraseña inválido: {}", e)))?;
        if username != self.username || !valid_password {
            warn!("🔒 Credenciales inválidas para usuario: {}", username);
            return Err(AppError::Unauthorized("Credenciales inválidas".to_string()));
        }

        let token = generate_token(username, &self.jwt)?;
        info!("✅ Login de administración exitoso: {}", username);
        Ok(AdminSession {
            token,
            token_type: "Bearer",
            expires_in: self.jwt.expiration,
            username: username.to_string(),
        })
    }

    /// Valida un token emitido por `login`
    pub fn authenticate(&self, token: &str) -> AppResult<AdminClaims> {
        verify_token(token, &self.jwt)
    }
}
