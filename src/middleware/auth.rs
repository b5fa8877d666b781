//! Middleware de autenticación JWT
//!
//! Protege las rutas `/admin`: exige `Authorization: Bearer <token>` emitido
//! por `/admin/login` e inyecta el administrador autenticado en la request.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{
    state::AppState,
    utils::{errors::AppError, jwt::extract_token_from_header},
};

/// Administrador autenticado que se inyecta en las requests
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin {
    pub username: String,
}

/// Middleware de autenticación de administración
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Token de autorización requerido".to_string()))?;

    let token = extract_token_from_header(auth_header)?;
    let claims = state.auth.authenticate(token)?;
    debug!("🔐 Administrador autenticado: {}", claims.sub);

    request
        .extensions_mut()
        .insert(AuthenticatedAdmin { username: claims.sub });

    Ok(next.run(request).await)
}
