//! Fee ledger application services.
//!
//! Each service works against the same event store (through the shared
//! `CommandDispatcher`), the external student directory and the
//! student → invoices index.

use std::sync::Arc;

use feeledger_fees::FeeInvoiceId;
use feeledger_students::StudentId;

use crate::projections::StudentInvoicesProjection;
use crate::read_model::ReadStore;

pub mod assignment;
pub mod error;
pub mod lock;
pub mod payments;
pub mod reports;

pub use assignment::{
    AssignInvoiceRequest, AssignTarget, AssignmentFailure, AssignmentOutcome, InvoiceAssignmentService,
};
pub use error::{LedgerError, LedgerResult};
pub use lock::{DEFAULT_LOCK_REASON, LockAutomation, LockPolicy};
pub use payments::{PaymentProcessor, RecordPaymentRequest};
pub use reports::{AggregationReporter, DashboardSummary, DefaulterRow, StudentFeeHistory};

/// Backing store of the student → invoices index.
pub type IndexStore = Arc<dyn ReadStore<StudentId, Vec<FeeInvoiceId>>>;

/// Student → invoices index shared by the services.
pub type StudentInvoiceIndex = StudentInvoicesProjection<IndexStore>;
