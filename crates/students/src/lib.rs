//! Student directory contract consumed by the fee ledger.
//!
//! Student onboarding and the directory itself live outside this workspace.
//! The ledger only needs to resolve assignment targets, read display fields
//! for reports, and flip the fee-lock flag; this crate defines exactly that
//! surface so any directory backend can be plugged in.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use feeledger_core::AggregateId;

/// Student identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub AggregateId);

impl StudentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StudentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for StudentId {
    type Err = feeledger_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Fee-lock flag stored on the student record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    pub fee_locked: bool,
    pub lock_reason: Option<String>,
}

impl LockState {
    pub fn unlocked() -> Self {
        Self::default()
    }

    pub fn locked(reason: impl Into<String>) -> Self {
        Self {
            fee_locked: true,
            lock_reason: Some(reason.into()),
        }
    }
}

/// What the ledger needs to know about a student when assigning or reconciling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: StudentId,
    pub class_name: String,
    pub lock: LockState,
}

/// Display-only fields, used to decorate report rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDisplayInfo {
    pub name: String,
    pub mobile: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("student {0} not found")]
    NotFound(StudentId),

    #[error("student directory unavailable: {0}")]
    Unavailable(String),
}

/// Lookup + the single mutation the ledger performs on student records.
pub trait StudentDirectory: Send + Sync {
    fn lookup(&self, id: StudentId) -> Result<StudentRecord, DirectoryError>;

    /// All students whose class equals `class_name` (exact match).
    fn ids_in_class(&self, class_name: &str) -> Result<Vec<StudentId>, DirectoryError>;

    /// Overwrite the student's lock flag and reason; returns the stored state.
    fn set_lock(&self, id: StudentId, lock: LockState) -> Result<LockState, DirectoryError>;

    fn display_info(&self, id: StudentId) -> Result<StudentDisplayInfo, DirectoryError>;
}

impl<S> StudentDirectory for Arc<S>
where
    S: StudentDirectory + ?Sized,
{
    fn lookup(&self, id: StudentId) -> Result<StudentRecord, DirectoryError> {
        (**self).lookup(id)
    }

    fn ids_in_class(&self, class_name: &str) -> Result<Vec<StudentId>, DirectoryError> {
        (**self).ids_in_class(class_name)
    }

    fn set_lock(&self, id: StudentId, lock: LockState) -> Result<LockState, DirectoryError> {
        (**self).set_lock(id, lock)
    }

    fn display_info(&self, id: StudentId) -> Result<StudentDisplayInfo, DirectoryError> {
        (**self).display_info(id)
    }
}
