use std::sync::Arc;

use axum::{Json, Router, extract::Extension, response::IntoResponse, routing::get};
use chrono::Utc;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/defaulters", get(defaulters))
}

pub async fn dashboard(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.ledger.dashboard_summary(Utc::now()) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn defaulters(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.ledger.defaulter_list() {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
