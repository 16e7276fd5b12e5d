use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;

use feeledger_core::AggregateId;
use feeledger_events::{EventBus, EventEnvelope};
use feeledger_fees::{AGGREGATE_TYPE, AssignInvoice, FeeInvoice, FeeInvoiceCommand, FeeInvoiceId};
use feeledger_students::{StudentDirectory, StudentId};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;

use super::{LedgerError, LedgerResult, StudentInvoiceIndex};

/// Who an invoice is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignTarget {
    Student(StudentId),
    /// Every student whose class equals the label exactly.
    Class(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignInvoiceRequest {
    pub target: AssignTarget,
    pub title: String,
    pub total_amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub remarks: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFailure {
    pub student_id: StudentId,
    pub reason: String,
}

/// Per-student result of an assignment. Successes and failures are both
/// reported; a fan-out never hides a partial failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentOutcome {
    pub created: Vec<FeeInvoiceId>,
    pub failed: Vec<AssignmentFailure>,
}

impl AssignmentOutcome {
    pub fn count(&self) -> usize {
        self.created.len()
    }
}

/// Creates fee invoices for one student or a whole class.
pub struct InvoiceAssignmentService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    directory: Arc<dyn StudentDirectory>,
    index: Arc<StudentInvoiceIndex>,
}

impl<S, B> InvoiceAssignmentService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        directory: Arc<dyn StudentDirectory>,
        index: Arc<StudentInvoiceIndex>,
    ) -> Self {
        Self {
            dispatcher,
            directory,
            index,
        }
    }

    /// Creates one invoice per resolved student.
    ///
    /// Each creation is independent. If every resolved student fails, the
    /// first failure is returned as the error.
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub fn assign(&self, request: AssignInvoiceRequest, now: DateTime<Utc>) -> LedgerResult<AssignmentOutcome> {
        if request.total_amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "invoice total must be positive, got {}",
                request.total_amount
            )));
        }
        if request.title.trim().is_empty() {
            return Err(LedgerError::Validation("invoice title must not be empty".to_string()));
        }

        let targets = self.resolve(&request.target)?;

        let mut outcome = AssignmentOutcome::default();
        let mut first_error = None;

        for (student_id, class_label) in targets {
            match self.create_one(&request, student_id, class_label, now) {
                Ok(invoice_id) => outcome.created.push(invoice_id),
                Err(e) => {
                    tracing::warn!(student_id = %student_id, error = %e, "invoice assignment failed");
                    outcome.failed.push(AssignmentFailure {
                        student_id,
                        reason: e.to_string(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        if outcome.created.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        tracing::info!(
            created = outcome.created.len(),
            failed = outcome.failed.len(),
            "invoices assigned"
        );
        Ok(outcome)
    }

    /// Resolve the target into `(student, class label)` pairs.
    fn resolve(&self, target: &AssignTarget) -> LedgerResult<Vec<(StudentId, String)>> {
        match target {
            AssignTarget::Student(id) => {
                let record = self.directory.lookup(*id)?;
                Ok(vec![(record.id, record.class_name)])
            }
            AssignTarget::Class(class_name) => {
                let ids = self.directory.ids_in_class(class_name)?;
                if ids.is_empty() {
                    return Err(LedgerError::not_found(format!("no students in class '{class_name}'")));
                }
                Ok(ids.into_iter().map(|id| (id, class_name.clone())).collect())
            }
        }
    }

    fn create_one(
        &self,
        request: &AssignInvoiceRequest,
        student_id: StudentId,
        class_label: String,
        now: DateTime<Utc>,
    ) -> LedgerResult<FeeInvoiceId> {
        let invoice_id = FeeInvoiceId::new(AggregateId::new());
        let command = FeeInvoiceCommand::AssignInvoice(AssignInvoice {
            invoice_id,
            student_id,
            class_label,
            title: request.title.clone(),
            total_amount: request.total_amount,
            due_date: request.due_date,
            remarks: request.remarks.clone(),
            occurred_at: now,
        });

        let dispatched = self
            .dispatcher
            .dispatch(invoice_id.0, AGGREGATE_TYPE, command, |id| {
                FeeInvoice::empty(FeeInvoiceId::new(id))
            })?;

        for stored in &dispatched.committed {
            self.index
                .apply_envelope(&stored.to_envelope())
                .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;
        }

        Ok(invoice_id)
    }
}
