//! Authentication extractor.
//!
//! Admin routes require `Authorization: Bearer <AUTH_SECRET>`. When no
//! secret is configured every request is refused.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Caller that presented the configured admin token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser;

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.auth_secret.as_deref() else {
            tracing::warn!("admin route requested but AUTH_SECRET is not set");
            return Err(AppError::Unauthorized);
        };

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "));

        match token {
            Some(token) if token == secret => Ok(AuthUser),
            _ => Err(AppError::Unauthorized),
        }
    }
}
