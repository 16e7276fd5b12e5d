//! `FeeLedger`: the engine's public surface, wiring the services to one
//! store, one bus and one student directory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use feeledger_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use feeledger_fees::{FeeInvoiceId, FeeInvoiceView};
use feeledger_students::{LockState, StudentDirectory, StudentId};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::read_model::InMemoryReadStore;
use crate::services::{
    AggregationReporter, AssignInvoiceRequest, AssignmentOutcome, DashboardSummary, DefaulterRow, IndexStore,
    InvoiceAssignmentService, LedgerError, LedgerResult, LockAutomation, LockPolicy, PaymentProcessor,
    RecordPaymentRequest, StudentFeeHistory, StudentInvoiceIndex,
};

pub type InMemoryBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

/// Ledger over the in-memory store and bus (tests/dev).
pub type InMemoryFeeLedger = FeeLedger<Arc<InMemoryEventStore>, Arc<InMemoryBus>>;

pub struct FeeLedger<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    index: Arc<StudentInvoiceIndex>,
    assignment: InvoiceAssignmentService<S, B>,
    payments: PaymentProcessor<S, B>,
    locks: Arc<LockAutomation<S, B>>,
    reports: AggregationReporter<S, B>,
}

impl<S, B> FeeLedger<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, directory: Arc<dyn StudentDirectory>, policy: LockPolicy) -> Self {
        let dispatcher = Arc::new(CommandDispatcher::new(store, bus));
        let index_store: IndexStore = Arc::new(InMemoryReadStore::new());
        let index = Arc::new(StudentInvoiceIndex::new(index_store));

        let locks = Arc::new(LockAutomation::new(
            dispatcher.clone(),
            directory.clone(),
            index.clone(),
            policy,
        ));

        Self {
            assignment: InvoiceAssignmentService::new(dispatcher.clone(), directory.clone(), index.clone()),
            payments: PaymentProcessor::new(dispatcher.clone(), locks.clone()),
            reports: AggregationReporter::new(dispatcher.clone(), directory, index.clone()),
            locks,
            index,
            dispatcher,
        }
    }

    pub fn lock_policy(&self) -> LockPolicy {
        self.locks.policy()
    }

    pub fn assign_invoice(&self, request: AssignInvoiceRequest, now: DateTime<Utc>) -> LedgerResult<AssignmentOutcome> {
        self.assignment.assign(request, now)
    }

    pub fn record_payment(&self, request: RecordPaymentRequest, now: DateTime<Utc>) -> LedgerResult<FeeInvoiceView> {
        self.payments.record_payment(request, now)
    }

    pub fn set_manual_lock(&self, student_id: StudentId, locked: bool, reason: Option<String>) -> LedgerResult<LockState> {
        self.locks.set_manual_lock(student_id, locked, reason)
    }

    pub fn dashboard_summary(&self, now: DateTime<Utc>) -> LedgerResult<DashboardSummary> {
        self.reports.dashboard_summary(now)
    }

    pub fn defaulter_list(&self) -> LedgerResult<Vec<DefaulterRow>> {
        self.reports.defaulter_list()
    }

    pub fn student_fee_history(&self, student_id: StudentId, now: DateTime<Utc>) -> LedgerResult<StudentFeeHistory> {
        self.reports.student_fee_history(student_id, now)
    }

    pub fn get_invoice(&self, invoice_id: FeeInvoiceId, now: DateTime<Utc>) -> LedgerResult<FeeInvoiceView> {
        self.reports.invoice(invoice_id, now)
    }

    pub fn list_invoices(&self, now: DateTime<Utc>) -> LedgerResult<Vec<FeeInvoiceView>> {
        self.reports.invoices(now)
    }

    /// Rebuild the student → invoices index from the event log.
    pub fn rebuild_index(&self) -> LedgerResult<()> {
        let streams = self
            .dispatcher
            .store()
            .load_all()
            .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;
        self.index
            .rebuild(&streams)
            .map_err(|e| LedgerError::StorageFailure(e.to_string()))
    }

    /// Subscribe to committed fee events.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }
}

impl InMemoryFeeLedger {
    pub fn in_memory(directory: Arc<dyn StudentDirectory>, policy: LockPolicy) -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryBus::new()),
            directory,
            policy,
        )
    }
}
