use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use vevurn_auth::Permission;
use vevurn_core::ProductId;

use crate::app::routes::common::{Principal, Services};
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/alerts", get(list_open_alerts))
        .route("/:product_id/adjust", post(adjust_stock))
        .route("/:product_id/movements", get(list_movements))
}

/// POST /inventory/:product_id/adjust
pub async fn adjust_stock(
    Extension(services): Services,
    Extension(principal): Principal,
    Path(product_id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::INVENTORY_ADJUST) {
        return resp;
    }
    let product_id: ProductId = match errors::parse_id(&product_id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .engine()
        .adjust_stock(
            product_id,
            body.delta,
            body.movement_type,
            body.reason.as_deref(),
            principal.user_id(),
        )
        .await
    {
        Ok(adjustment) => Json(adjustment).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// GET /inventory/alerts
pub async fn list_open_alerts(Extension(services): Services, Extension(principal): Principal) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::INVENTORY_READ) {
        return resp;
    }

    match services.engine().open_alerts().await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// GET /inventory/:product_id/movements
///
/// Newest first.
pub async fn list_movements(
    Extension(services): Services,
    Extension(principal): Principal,
    Path(product_id): Path<String>,
    Query(query): Query<dto::PageQuery>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::INVENTORY_READ) {
        return resp;
    }
    let product_id: ProductId = match errors::parse_id(&product_id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let page = query.pagination();
    match services.engine().movements(product_id, page).await {
        Ok(movements) => Json(dto::ListResponse::new(movements, page)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
