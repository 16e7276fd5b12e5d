use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, put},
};
use chrono::Utc;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/:id/lock", put(set_lock))
        .route("/:id/fees", get(fee_history))
}

pub async fn set_lock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::SetLockRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let student_id = match dto::parse_student_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.set_manual_lock(student_id, body.locked, body.reason) {
        Ok(state) => Json(state).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn fee_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let student_id = match dto::parse_student_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.student_fee_history(student_id, Utc::now()) {
        Ok(history) => Json(history).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
