use axum::{routing::get, Router};

pub mod common;
pub mod event_stream;
pub mod inventory;
pub mod metrics;
pub mod payments;
pub mod products;
pub mod sales;
pub mod system;

/// Router for all endpoints that need an authenticated user.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/events/stream", get(event_stream::stream_events))
        .nest("/sales", sales::router())
        .nest("/payments", payments::router())
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/metrics", metrics::router())
}
