use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use vevurn_auth::Permission;

use crate::app::routes::common::{Principal, Services};
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/:reference", get(get_payment))
}

/// Routes authenticated by the provider's callback token, not a user JWT.
pub fn callback_router() -> Router {
    Router::new().route("/payments/mobile-money/callback", post(mobile_money_callback))
}

/// GET /payments/:reference
pub async fn get_payment(
    Extension(services): Services,
    Extension(principal): Principal,
    Path(reference): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::PAYMENTS_READ) {
        return resp;
    }

    match services.engine().payment(reference.trim()).await {
        Ok(payment) => Json(payment).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// POST /payments/mobile-money/callback
///
/// Redelivered callbacks are answered with the current state and
/// `changed: false`.
pub async fn mobile_money_callback(
    Extension(services): Services,
    Json(body): Json<dto::MobileMoneyCallback>,
) -> axum::response::Response {
    tracing::info!(reference = %body.reference, "mobile money callback received");

    match services
        .engine()
        .settle_mobile_money(body.reference.trim(), body.outcome)
        .await
    {
        Ok(settlement) => Json(settlement).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
