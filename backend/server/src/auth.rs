//! # Request credentials
//!
//! Extractors turning request headers into who is asking.
//!
//! - [`Viewer`]: optional credentials for catalog reads. Never rejects, a bad
//!   token simply yields an anonymous request
//! - [`Authenticated`]: a bearer token is required, rejects with 401
//! - [`Admin`]: the `x-admin-key` header must match, rejects with 403
//!
//! Password hashing runs on the blocking pool, bcrypt is deliberately slow.
use std::{convert::Infallible, sync::Arc};

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use crate::{
    config::ADMIN_KEY_HEADER,
    entitlement::AccessRequest,
    error::AppError,
    state::AppState,
    store::SubjectId,
    utils::{bearer_token, header},
};

pub struct Viewer(pub AccessRequest);

impl FromRequestParts<Arc<AppState>> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let admin_key = header(&parts.headers, ADMIN_KEY_HEADER).map(str::to_string);
        let subject = bearer_token(&parts.headers).and_then(|token| state.identity.resolve(token));

        Ok(Self(AccessRequest { admin_key, subject }))
    }
}

pub struct Authenticated(pub SubjectId);

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            debug!("No bearer token on protected route");
            return Err(AppError::Unauthorized);
        };

        state
            .identity
            .resolve(token)
            .map(Self)
            .ok_or(AppError::Unauthorized)
    }
}

pub struct Admin;

impl FromRequestParts<Arc<AppState>> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state
            .entitlements
            .is_admin(header(&parts.headers, ADMIN_KEY_HEADER))
        {
            Ok(Self)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?
        .map_err(|e| AppError::InternalError(Box::new(e)))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?;

    // A hash bcrypt cannot parse never matches
    Ok(verified.unwrap_or_else(|e| {
        debug!(error = %e, "Unverifiable password hash");
        false
    }))
}
