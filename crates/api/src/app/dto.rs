use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use feeledger_core::AggregateId;
use feeledger_fees::{FeeInvoiceId, PaymentMode};
use feeledger_infra::services::AssignTarget;
use feeledger_students::StudentId;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Exactly one of `student_id` / `class_name` must be set.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignInvoiceRequest {
    pub student_id: Option<String>,
    pub class_name: Option<String>,
    pub title: String,
    pub total_amount: Decimal,
    /// RFC3339 timestamp or plain `YYYY-MM-DD` (midnight UTC).
    pub due_date: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub mode: PaymentMode,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub paid_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SetLockRequest {
    pub locked: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_aggregate_id(raw: &str, what: &str) -> Result<AggregateId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

pub fn parse_invoice_id(raw: &str) -> Result<FeeInvoiceId, axum::response::Response> {
    parse_aggregate_id(raw, "invoice").map(FeeInvoiceId::new)
}

pub fn parse_student_id(raw: &str) -> Result<StudentId, axum::response::Response> {
    parse_aggregate_id(raw, "student").map(StudentId::new)
}

pub fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, axum::response::Response> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation",
                "dueDate must be RFC3339 or YYYY-MM-DD",
            )
        })
}

pub fn parse_assign_target(
    student_id: Option<&str>,
    class_name: Option<&str>,
) -> Result<AssignTarget, axum::response::Response> {
    let student_id = student_id.map(str::trim).filter(|s| !s.is_empty());
    let class_name = class_name.map(str::trim).filter(|s| !s.is_empty());

    match (student_id, class_name) {
        (Some(id), None) => parse_student_id(id).map(AssignTarget::Student),
        (None, Some(class_name)) => Ok(AssignTarget::Class(class_name.to_string())),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            "exactly one of studentId or className is required",
        )),
    }
}
