use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use vevurn_auth::Permission;
use vevurn_core::ProductId;
use vevurn_inventory::ProductStock;

use crate::app::routes::common::{Principal, Services};
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product))
        .route("/:id", get(get_product))
}

/// POST /products
///
/// Opening stock is booked as a restock in the same transaction, so it shows
/// up in the movement log and a failure leaves no half-created product.
pub async fn create_product(
    Extension(services): Services,
    Extension(principal): Principal,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::PRODUCTS_WRITE) {
        return resp;
    }

    let product = ProductStock {
        id: ProductId::new(),
        sku: body.sku.trim().to_string(),
        name: body.name.trim().to_string(),
        unit_price: body.unit_price,
        stock_quantity: 0,
        min_stock_level: body.min_stock_level,
        active: true,
        version: 0,
        updated_at: Utc::now(),
    };

    match services
        .engine()
        .create_product(product, body.stock_quantity, principal.user_id())
        .await
    {
        Ok(created) => (StatusCode::CREATED, Json(created.product)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// GET /products/:id
pub async fn get_product(
    Extension(services): Services,
    Extension(principal): Principal,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::PRODUCTS_READ) {
        return resp;
    }
    let product_id: ProductId = match errors::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine().product(product_id).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
