//! Read-only queries over the whole invoice collection.
//!
//! Totals are computed from the event log on every call; there is no running
//! counter to drift from the ledger. Each invoice is read consistently, but
//! under concurrent writes the totals are a best-effort point-in-time
//! snapshot rather than one atomic cut.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;

use feeledger_events::{EventBus, EventEnvelope};
use feeledger_fees::{AGGREGATE_TYPE, FeeInvoice, FeeInvoiceId, FeeInvoiceView, FeeStatus};
use feeledger_students::{LockState, StudentDirectory, StudentId};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;

use super::{LedgerError, LedgerResult, StudentInvoiceIndex};

/// Shown in place of a student's name when the directory can't resolve it.
pub const UNKNOWN_STUDENT_NAME: &str = "Unknown student";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_expected: Decimal,
    pub total_collected: Decimal,
    pub total_pending: Decimal,
    /// Remaining amount on invoices whose status is `Overdue`.
    pub overdue_amount: Decimal,
    pub invoice_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaulterRow {
    pub student_id: StudentId,
    pub total_due: Decimal,
    pub pending_invoice_count: usize,
    pub student_name: String,
    pub class_name: String,
    pub lock_status: LockState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFeeHistory {
    pub student_id: StudentId,
    /// Ordered by due date, earliest first.
    pub invoices: Vec<FeeInvoiceView>,
    pub total_due: Decimal,
}

/// Money totals are accumulated checked; a sum past `Decimal::MAX` fails the
/// report instead of panicking.
fn add_to(total: &mut Decimal, amount: Decimal, what: &str) -> LedgerResult<()> {
    *total = total
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Validation(format!("{what} exceeds the representable amount")))?;
    Ok(())
}

pub struct AggregationReporter<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    directory: Arc<dyn StudentDirectory>,
    index: Arc<StudentInvoiceIndex>,
}

impl<S, B> AggregationReporter<S, B>
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

    fn all_invoices(&self) -> LedgerResult<Vec<FeeInvoice>> {
        let invoices = self
            .dispatcher
            .load_all(AGGREGATE_TYPE, |id| FeeInvoice::empty(FeeInvoiceId::new(id)))?;
        Ok(invoices.into_iter().filter(FeeInvoice::is_assigned).collect())
    }

    #[instrument(skip(self))]
    pub fn dashboard_summary(&self, now: DateTime<Utc>) -> LedgerResult<DashboardSummary> {
        let mut summary = DashboardSummary::default();
        for invoice in self.all_invoices()? {
            add_to(&mut summary.total_expected, invoice.total_amount(), "total expected")?;
            add_to(&mut summary.total_collected, invoice.paid_amount(), "total collected")?;
            add_to(&mut summary.total_pending, invoice.remaining_amount(), "total pending")?;
            if invoice.status_at(now) == Some(FeeStatus::Overdue) {
                add_to(&mut summary.overdue_amount, invoice.remaining_amount(), "overdue amount")?;
            }
            summary.invoice_count += 1;
        }
        Ok(summary)
    }

    /// Students with anything left to pay, highest total due first; ties by
    /// student id.
    #[instrument(skip(self))]
    pub fn defaulter_list(&self) -> LedgerResult<Vec<DefaulterRow>> {
        struct Group {
            total_due: Decimal,
            pending: usize,
            class_label: String,
        }

        let mut groups: BTreeMap<StudentId, Group> = BTreeMap::new();
        for invoice in self.all_invoices()? {
            let remaining = invoice.remaining_amount();
            if remaining <= Decimal::ZERO {
                continue;
            }
            let Some(terms) = invoice.terms() else {
                continue;
            };
            let group = groups.entry(terms.student_id).or_insert_with(|| Group {
                total_due: Decimal::ZERO,
                pending: 0,
                class_label: terms.class_label.clone(),
            });
            add_to(&mut group.total_due, remaining, "total due")?;
            group.pending += 1;
        }

        let mut rows: Vec<DefaulterRow> = groups
            .into_iter()
            .map(|(student_id, group)| self.decorate(student_id, group.total_due, group.pending, group.class_label))
            .collect();

        rows.sort_by(|a, b| {
            b.total_due
                .cmp(&a.total_due)
                .then_with(|| a.student_id.cmp(&b.student_id))
        });
        Ok(rows)
    }

    /// Join a defaulter group to the directory. A failed join falls back to
    /// placeholder fields instead of failing the report.
    fn decorate(
        &self,
        student_id: StudentId,
        total_due: Decimal,
        pending_invoice_count: usize,
        class_label: String,
    ) -> DefaulterRow {
        let (student_name, class_name, lock_status) =
            match (self.directory.display_info(student_id), self.directory.lookup(student_id)) {
                (Ok(info), Ok(record)) => (info.name, record.class_name, record.lock),
                (info, record) => {
                    tracing::debug!(
                        student_id = %student_id,
                        display_ok = info.is_ok(),
                        lookup_ok = record.is_ok(),
                        "student join failed; using placeholders"
                    );
                    (
                        info.map(|i| i.name).unwrap_or_else(|_| UNKNOWN_STUDENT_NAME.to_string()),
                        record.as_ref().map(|r| r.class_name.clone()).unwrap_or(class_label),
                        record.map(|r| r.lock).unwrap_or_default(),
                    )
                }
            };

        DefaulterRow {
            student_id,
            total_due,
            pending_invoice_count,
            student_name,
            class_name,
            lock_status,
        }
    }

    #[instrument(skip(self))]
    pub fn student_fee_history(&self, student_id: StudentId, now: DateTime<Utc>) -> LedgerResult<StudentFeeHistory> {
        self.directory.lookup(student_id)?;

        let mut invoices = Vec::new();
        for invoice_id in self.index.invoices_of(student_id) {
            let invoice = self.load(invoice_id)?;
            if invoice.is_assigned() {
                invoices.push(invoice.view(now)?);
            }
        }
        invoices.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        let mut total_due = Decimal::ZERO;
        for view in &invoices {
            add_to(&mut total_due, view.remaining_amount, "total due")?;
        }
        Ok(StudentFeeHistory {
            student_id,
            invoices,
            total_due,
        })
    }

    pub fn invoice(&self, invoice_id: FeeInvoiceId, now: DateTime<Utc>) -> LedgerResult<FeeInvoiceView> {
        let invoice = self.load(invoice_id)?;
        invoice
            .view(now)
            .map_err(|_| LedgerError::not_found(format!("invoice {invoice_id}")))
    }

    /// Every invoice, oldest first.
    pub fn invoices(&self, now: DateTime<Utc>) -> LedgerResult<Vec<FeeInvoiceView>> {
        let mut views = self
            .all_invoices()?
            .iter()
            .map(|invoice| invoice.view(now))
            .collect::<Result<Vec<_>, _>>()?;
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(views)
    }

    fn load(&self, invoice_id: FeeInvoiceId) -> LedgerResult<FeeInvoice> {
        Ok(self
            .dispatcher
            .load(invoice_id.0, |id| FeeInvoice::empty(FeeInvoiceId::new(id)))?)
    }
}
