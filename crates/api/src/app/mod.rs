//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: engine wiring (store, receipt sequence, bus, realtime relay)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use vevurn_infra::PosConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Also starts the background expiry sweep for pending mobile-money payments.
pub async fn build_app(config: PosConfig) -> Result<Router, services::ServiceError> {
    let jwt = Arc::new(vevurn_auth::Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };
    let callback_state = middleware::CallbackState {
        token: Arc::from(config.callback_token.as_str()),
    };

    let services = Arc::new(services::build_services(&config).await?);
    services::spawn_expiry_sweep(services.engine().clone(), services::EXPIRY_SWEEP_INTERVAL);
    tracing::info!(backend = services.backend(), "services ready");

    // Protected routes: require a bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    // Provider callback: shared secret instead of a user token.
    let callbacks = routes::payments::callback_router().layer(axum::middleware::from_fn_with_state(
        callback_state,
        middleware::callback_token_middleware,
    ));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(callbacks)
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services))))
}
