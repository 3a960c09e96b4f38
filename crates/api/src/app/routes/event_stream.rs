//! Live event feed for dashboards.
//!
//! Relays every published event envelope as a server-sent event whose name is
//! the event type (`sale.recorded`, `inventory.stock_low`, ...).

use axum::{
    extract::Extension,
    response::IntoResponse,
};

use vevurn_auth::Permission;

use crate::app::routes::common::{Principal, Services};
use crate::app::services;

/// GET /events/stream
pub async fn stream_events(Extension(services): Services, Extension(principal): Principal) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::METRICS_READ) {
        return resp;
    }

    services::event_sse_stream(&services).into_response()
}
