//! Fee ledger domain module (event-sourced).
//!
//! Business rules for tuition-fee invoices and the payments recorded against
//! them, implemented purely as deterministic domain logic (no IO, no storage).

pub mod fee_invoice;
pub mod status;

pub use fee_invoice::{
    AGGREGATE_TYPE, AssignInvoice, FeeInvoice, FeeInvoiceCommand, FeeInvoiceEvent, FeeInvoiceId,
    FeeInvoiceView, InvoiceAssigned, InvoiceTerms, LedgerEntry, PaymentMode, PaymentRecorded,
    RecordPayment,
};
pub use status::{FeeStatus, derive_status, remaining_amount};
