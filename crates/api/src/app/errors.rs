use core::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::NaiveDate;
use serde_json::json;

use vevurn_infra::{EngineError, StoreError};

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        EngineError::InsufficientStock {
            product_id,
            sku,
            requested,
            available,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!("insufficient stock for {sku}: requested {requested}, available {available}"),
                "product_id": product_id,
                "sku": sku,
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        EngineError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        EngineError::InvalidState(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_state", msg),
        EngineError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        err @ EngineError::RetriesExhausted { .. } => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "retry_later", err.to_string())
        }
        EngineError::Sequence(e) => {
            tracing::error!(error = %e, "receipt sequence unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "sequence_unavailable", e.to_string())
        }
        EngineError::Store(StoreError::NotFound(what)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        EngineError::Store(e @ StoreError::UniqueViolation { .. }) => {
            tracing::warn!(error = %e, "write lost a uniqueness race");
            json_error(StatusCode::CONFLICT, "conflict", "the record was changed concurrently")
        }
        EngineError::Store(e) => {
            tracing::error!(error = %e, "store error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal storage error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, axum::response::Response> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_date",
            "date must be formatted as YYYY-MM-DD",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (EngineError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (EngineError::NotFound("sale".into()), StatusCode::NOT_FOUND),
            (EngineError::InvalidState("neg".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (EngineError::Conflict("dup".into()), StatusCode::CONFLICT),
            (EngineError::RetriesExhausted { attempts: 3 }, StatusCode::SERVICE_UNAVAILABLE),
            (
                EngineError::Store(StoreError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                EngineError::Store(StoreError::NotFound("sale".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                EngineError::Store(StoreError::UniqueViolation {
                    constraint: "products_sku_key".into(),
                    message: "duplicate key".into(),
                }),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(engine_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn dates_are_iso() {
        assert!(parse_date("2026-03-01").is_ok());
        assert_eq!(parse_date("01/03/2026").unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
