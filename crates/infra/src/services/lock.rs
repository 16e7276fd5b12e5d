use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;

use feeledger_events::{EventBus, EventEnvelope};
use feeledger_fees::{FeeInvoice, FeeInvoiceId};
use feeledger_students::{LockState, StudentDirectory, StudentId};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;

use super::{LedgerError, LedgerResult, StudentInvoiceIndex};

/// Reason stored when an administrator locks a student without giving one.
pub const DEFAULT_LOCK_REASON: &str = "Administrative Lock";

/// When a successful payment clears a student's fee lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Any successful payment on any invoice unlocks, even with dues left
    /// on other invoices.
    #[default]
    GoodFaith,
    /// Unlock only once every invoice of the student has nothing remaining.
    AllSettled,
}

impl LockPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            LockPolicy::GoodFaith => "good_faith",
            LockPolicy::AllSettled => "all_settled",
        }
    }
}

impl FromStr for LockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "good_faith" | "goodfaith" => Ok(LockPolicy::GoodFaith),
            "all_settled" | "allsettled" => Ok(LockPolicy::AllSettled),
            other => Err(format!(
                "unknown lock policy '{other}' (expected good_faith or all_settled)"
            )),
        }
    }
}

/// Flips the student's fee-lock flag.
///
/// Payment reconciliation and manual overrides are not ordered relative to
/// each other; the directory keeps whichever write lands last.
pub struct LockAutomation<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    directory: Arc<dyn StudentDirectory>,
    index: Arc<StudentInvoiceIndex>,
    policy: LockPolicy,
}

impl<S, B> LockAutomation<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        directory: Arc<dyn StudentDirectory>,
        index: Arc<StudentInvoiceIndex>,
        policy: LockPolicy,
    ) -> Self {
        Self {
            dispatcher,
            directory,
            index,
            policy,
        }
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Called after every successful payment for the invoice's student.
    #[instrument(skip(self), fields(policy = self.policy.as_str()))]
    pub fn reconcile_after_payment(&self, student_id: StudentId) -> LedgerResult<LockState> {
        let record = self.directory.lookup(student_id)?;
        if !record.lock.fee_locked {
            return Ok(record.lock);
        }

        if self.policy == LockPolicy::AllSettled {
            let outstanding = self.outstanding_for(student_id)?;
            if outstanding > Decimal::ZERO {
                tracing::debug!(%outstanding, "student keeps fee lock; dues outstanding");
                return Ok(record.lock);
            }
        }

        let state = self.directory.set_lock(student_id, LockState::unlocked())?;
        tracing::info!(student_id = %student_id, "fee lock cleared after payment");
        Ok(state)
    }

    /// Administrative override, independent of payment state. Idempotent.
    #[instrument(skip(self, reason))]
    pub fn set_manual_lock(
        &self,
        student_id: StudentId,
        locked: bool,
        reason: Option<String>,
    ) -> LedgerResult<LockState> {
        let state = if locked {
            let reason = reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_LOCK_REASON.to_string());
            LockState::locked(reason)
        } else {
            LockState::unlocked()
        };

        let stored = self.directory.set_lock(student_id, state)?;
        tracing::info!(
            student_id = %student_id,
            fee_locked = stored.fee_locked,
            "fee lock set manually"
        );
        Ok(stored)
    }

    fn outstanding_for(&self, student_id: StudentId) -> LedgerResult<Decimal> {
        let mut total = Decimal::ZERO;
        for invoice_id in self.index.invoices_of(student_id) {
            let invoice: FeeInvoice = self
                .dispatcher
                .load(invoice_id.0, |id| FeeInvoice::empty(FeeInvoiceId::new(id)))
                .map_err(LedgerError::from)?;
            total = total.saturating_add(invoice.remaining_amount());
        }
        Ok(total)
    }
}
