use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use vevurn_auth::Permission;
use vevurn_core::SaleId;

use crate::app::routes::common::{Principal, Services};
use crate::app::{dto, errors};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub fn router() -> Router {
    Router::new()
        .route("/", post(checkout).get(list_sales))
        .route("/:id", get(get_sale))
        .route("/:id/void", post(void_sale))
}

/// POST /sales
///
/// 201 with the receipt for a new sale, 200 when the idempotency key replayed
/// an earlier one.
pub async fn checkout(
    Extension(services): Services,
    Extension(principal): Principal,
    headers: HeaderMap,
    Json(body): Json<dto::CheckoutBody>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::SALES_CHECKOUT) {
        return resp;
    }

    let header_key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(v) => match v.to_str() {
            Ok(s) => Some(s.to_string()),
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "Idempotency-Key header must be ASCII",
                );
            }
        },
        None => None,
    };

    let request = body.into_request(principal.user_id(), header_key);
    match services.engine().checkout(request).await {
        Ok(receipt) => {
            let status = if receipt.replayed { StatusCode::OK } else { StatusCode::CREATED };
            (status, Json(receipt)).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// GET /sales
pub async fn list_sales(
    Extension(services): Services,
    Extension(principal): Principal,
    Query(query): Query<dto::ListSalesQuery>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::SALES_READ) {
        return resp;
    }

    let page = query.pagination();
    match services.engine().sales(&query.filter(), page).await {
        Ok(sales) => Json(dto::ListResponse::new(sales, page)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// GET /sales/:id
pub async fn get_sale(
    Extension(services): Services,
    Extension(principal): Principal,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::SALES_READ) {
        return resp;
    }
    let sale_id: SaleId = match errors::parse_id(&id, "sale") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine().sale(sale_id).await {
        Ok(sale) => Json(sale).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// POST /sales/:id/void
pub async fn void_sale(
    Extension(services): Services,
    Extension(principal): Principal,
    Path(id): Path<String>,
    Json(body): Json<dto::VoidSaleRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::SALES_VOID) {
        return resp;
    }
    let sale_id: SaleId = match errors::parse_id(&id, "sale") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .engine()
        .void_sale(sale_id, &body.reason, principal.user_id())
        .await
    {
        Ok(sale) => Json(sale).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
