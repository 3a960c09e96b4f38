//! API-side authorization guard.
//!
//! Handlers call [`require`] before touching the engine; the engine itself
//! stays auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use vevurn_auth::{Permission, authorize};

use crate::app::errors;
use crate::context::PrincipalContext;

/// Reject the request with 403 unless the principal holds `permission`.
pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), Response> {
    authorize(principal.principal(), permission)
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}
