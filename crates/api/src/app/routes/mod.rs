use axum::Router;

pub mod invoices;
pub mod reports;
pub mod students;
pub mod system;

/// Router for all ledger endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/invoices", invoices::router())
        .nest("/students", students::router())
        .nest("/reports", reports::router())
}
