use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::instrument;

use feeledger_events::{EventBus, EventEnvelope};
use feeledger_fees::{
    AGGREGATE_TYPE, FeeInvoice, FeeInvoiceCommand, FeeInvoiceId, FeeInvoiceView, PaymentMode, RecordPayment,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use crate::event_store::EventStore;

use super::{LedgerError, LedgerResult, LockAutomation};

/// Appends after a lost race are retried this many times on fresh state.
const CONFLICT_RETRIES: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPaymentRequest {
    pub invoice_id: FeeInvoiceId,
    pub amount: Decimal,
    pub mode: PaymentMode,
    pub note: String,
    /// Business date of the payment; defaults to the recording time.
    pub paid_on: Option<DateTime<Utc>>,
}

/// Applies payments to single invoices.
///
/// The balance check and the ledger append are one conditional append on the
/// invoice stream, so two payments that jointly overshoot the total can never
/// both commit.
pub struct PaymentProcessor<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    locks: Arc<LockAutomation<S, B>>,
}

impl<S, B> PaymentProcessor<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, locks: Arc<LockAutomation<S, B>>) -> Self {
        Self { dispatcher, locks }
    }

    /// Record one payment and return the updated invoice.
    ///
    /// A lock reconciliation failure afterwards is logged; the payment stays
    /// recorded.
    #[instrument(
        skip(self, request),
        fields(invoice_id = %request.invoice_id, amount = %request.amount)
    )]
    pub fn record_payment(&self, request: RecordPaymentRequest, now: DateTime<Utc>) -> LedgerResult<FeeInvoiceView> {
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "payment amount must be positive, got {}",
                request.amount
            )));
        }

        let command = FeeInvoiceCommand::RecordPayment(RecordPayment {
            invoice_id: request.invoice_id,
            amount: request.amount,
            mode: request.mode,
            note: request.note,
            paid_on: request.paid_on,
            occurred_at: now,
        });

        let dispatched = self.dispatch_with_retry(request.invoice_id, command)?;
        let invoice = dispatched.aggregate;

        tracing::info!(
            paid_amount = %invoice.paid_amount(),
            remaining_amount = %invoice.remaining_amount(),
            "payment recorded"
        );

        if let Some(student_id) = invoice.student_id() {
            if let Err(e) = self.locks.reconcile_after_payment(student_id) {
                tracing::warn!(
                    student_id = %student_id,
                    error = %e,
                    "lock reconciliation failed after payment"
                );
            }
        }

        Ok(invoice.view(now)?)
    }

    fn dispatch_with_retry(
        &self,
        invoice_id: FeeInvoiceId,
        command: FeeInvoiceCommand,
    ) -> LedgerResult<Dispatched<FeeInvoice>> {
        let mut retries = 0;
        loop {
            match self.dispatcher.dispatch(invoice_id.0, AGGREGATE_TYPE, command.clone(), |id| {
                FeeInvoice::empty(FeeInvoiceId::new(id))
            }) {
                Ok(dispatched) => return Ok(dispatched),
                Err(DispatchError::Concurrency(msg)) if retries < CONFLICT_RETRIES => {
                    retries += 1;
                    tracing::warn!(%msg, retries, "payment append lost a race; retrying on fresh state");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
