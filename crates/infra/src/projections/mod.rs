//! Read-side projections fed from committed fee events.

pub mod student_invoices;

pub use student_invoices::{StudentInvoicesProjection, StudentInvoicesProjectionError};
