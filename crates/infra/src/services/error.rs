//! Error surface of the ledger services.

use thiserror::Error;

use feeledger_core::DomainError;
use feeledger_students::DirectoryError;

use crate::command_dispatcher::DispatchError;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Every failure a ledger operation can return to its caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Invoice or student does not exist, or a class resolved to no students.
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-positive payment amount or invoice total.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The payment would push the paid amount above the invoice total.
    #[error("payment exceeds balance: {0}")]
    PaymentExceedsBalance(String),

    /// A conditional write lost its race; safe for the caller to retry.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Persistence or the student directory is unavailable.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Malformed input.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl LedgerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "not_found",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::PaymentExceedsBalance(_) => "payment_exceeds_balance",
            LedgerError::ConcurrencyConflict(_) => "concurrency_conflict",
            LedgerError::StorageFailure(_) => "storage_failure",
            LedgerError::Validation(_) => "validation",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            // A duplicate invoice id is a bad request, not a lost race.
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::Conflict(msg) => LedgerError::Validation(msg),
            DomainError::InvalidAmount(msg) => LedgerError::InvalidAmount(msg),
            DomainError::PaymentExceedsBalance(msg) => LedgerError::PaymentExceedsBalance(msg),
            DomainError::NotFound => LedgerError::not_found("invoice"),
        }
    }
}

impl From<DispatchError> for LedgerError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Rejected(e) => e.into(),
            DispatchError::Concurrency(msg) => LedgerError::ConcurrencyConflict(msg),
            DispatchError::Deserialize(msg) | DispatchError::CorruptStream(msg) => {
                LedgerError::StorageFailure(msg)
            }
            DispatchError::Store(e) => LedgerError::StorageFailure(e.to_string()),
        }
    }
}

impl From<DirectoryError> for LedgerError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::NotFound(id) => LedgerError::not_found(format!("student {id}")),
            DirectoryError::Unavailable(msg) => LedgerError::StorageFailure(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::EventStoreError;

    #[test]
    fn lost_race_maps_to_retryable_conflict() {
        let err: LedgerError =
            DispatchError::from(EventStoreError::Concurrency("expected 1, found 2".into())).into();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "concurrency_conflict");
    }

    #[test]
    fn store_outage_maps_to_storage_failure() {
        let err: LedgerError =
            DispatchError::from(EventStoreError::Unavailable("lock poisoned".into())).into();
        assert!(matches!(err, LedgerError::StorageFailure(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn domain_rejections_keep_their_kind() {
        let err: LedgerError = DispatchError::Rejected(DomainError::exceeds_balance("x")).into();
        assert_eq!(err, LedgerError::PaymentExceedsBalance("x".into()));

        let err: LedgerError = DomainError::NotFound.into();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn duplicate_assignment_is_not_retryable() {
        let err: LedgerError = DispatchError::Rejected(DomainError::conflict("invoice already exists")).into();
        assert_eq!(err, LedgerError::Validation("invoice already exists".into()));
        assert!(!err.is_retryable());
    }
}
