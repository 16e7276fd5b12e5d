use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use feeledger_infra::services::{AssignInvoiceRequest, RecordPaymentRequest};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(assign_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/payments", post(record_payment))
}

pub async fn assign_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::AssignInvoiceRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let target = match dto::parse_assign_target(body.student_id.as_deref(), body.class_name.as_deref()) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let due_date = match dto::parse_due_date(&body.due_date) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let request = AssignInvoiceRequest {
        target,
        title: body.title,
        total_amount: body.total_amount,
        due_date,
        remarks: body.remarks.unwrap_or_default(),
    };

    match services.ledger.assign_invoice(request, Utc::now()) {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "count": outcome.count(),
                "created": outcome.created,
                "failed": outcome.failed,
            })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_invoices(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.ledger.list_invoices(Utc::now()) {
        Ok(invoices) => Json(invoices).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.get_invoice(invoice_id, Utc::now()) {
        Ok(view) => Json(view).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::RecordPaymentRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let request = RecordPaymentRequest {
        invoice_id,
        amount: body.amount,
        mode: body.mode,
        note: body.note.unwrap_or_default(),
        paid_on: body.paid_on,
    };

    match services.ledger.record_payment(request, Utc::now()) {
        Ok(view) => Json(view).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
