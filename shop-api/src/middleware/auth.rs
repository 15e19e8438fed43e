use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shop_core::{Caller, Role};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn caller(&self) -> Result<Caller, AppError> {
        let role = Role::from_str(&self.role).map_err(AppError::Authentication)?;
        Ok(Caller::new(self.sub, role))
    }
}

/// Mints a token for `user_id`. Used by operators and tests; the storefront
/// gets its tokens from the identity service.
pub fn issue_token(secret: &str, user_id: Uuid, role: Role, ttl_seconds: u64) -> Result<String, AppError> {
    let exp = chrono::Utc::now().timestamp().max(0) as u64 + ttl_seconds;
    let claims = Claims {
        sub: user_id,
        role: role.to_string(),
        exp: exp as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Anyhow(e.into()))
}

// ============================================================================
// Caller Authentication Middleware
// ============================================================================

/// Resolves the bearer token into a `Caller` and puts it into the request
/// extensions for the handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Authentication("Missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::Authentication("Invalid token".to_string())
    })?;

    let caller = token_data.claims.caller()?;
    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}
