use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use vevurn_auth::Permission;

use crate::app::errors;
use crate::app::routes::common::{Principal, Services};

pub fn router() -> Router {
    Router::new()
        .route("/daily/:date", get(daily))
        .route("/hourly/:date", get(hourly))
}

/// GET /metrics/daily/:date (business date, `YYYY-MM-DD`)
pub async fn daily(
    Extension(services): Services,
    Extension(principal): Principal,
    Path(date): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::METRICS_READ) {
        return resp;
    }
    let date = match errors::parse_date(&date) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    match services.engine().daily_metrics(date).await {
        Ok(metrics) => Json(metrics).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// GET /metrics/hourly/:date
///
/// Only hours with activity are listed.
pub async fn hourly(
    Extension(services): Services,
    Extension(principal): Principal,
    Path(date): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::METRICS_READ) {
        return resp;
    }
    let date = match errors::parse_date(&date) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    match services.engine().hourly_metrics(date).await {
        Ok(metrics) => Json(metrics).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
