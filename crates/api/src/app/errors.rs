use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use feeledger_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let status = match &err {
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidAmount(_) | LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::PaymentExceedsBalance(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
        LedgerError::StorageFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status == StatusCode::SERVICE_UNAVAILABLE {
        tracing::error!(error = %err, "ledger storage failure");
    }
    json_error(status, err.code(), err.to_string())
}

/// Malformed or mistyped request bodies are a 400 `validation` error; 422 is
/// reserved for `payment_exceeds_balance`.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation", rejection.body_text())
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
