//! Student → invoices index.
//!
//! Fed synchronously from committed `InvoiceAssigned` events and rebuildable
//! from the event log. Delivery may repeat; applying an envelope twice is a
//! no-op.

use serde_json::Value as JsonValue;
use thiserror::Error;

use feeledger_events::EventEnvelope;
use feeledger_fees::{AGGREGATE_TYPE, FeeInvoiceEvent, FeeInvoiceId};
use feeledger_students::StudentId;

use crate::event_store::StoredEvent;
use crate::read_model::{ReadStore, ReadStoreError};

#[derive(Debug, Error)]
pub enum StudentInvoicesProjectionError {
    #[error("failed to deserialize invoice event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(#[from] ReadStoreError),
}

#[derive(Debug)]
pub struct StudentInvoicesProjection<S>
where
    S: ReadStore<StudentId, Vec<FeeInvoiceId>>,
{
    store: S,
}

impl<S> StudentInvoicesProjection<S>
where
    S: ReadStore<StudentId, Vec<FeeInvoiceId>>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Invoice ids for one student, in assignment order.
    pub fn invoices_of(&self, student_id: StudentId) -> Vec<FeeInvoiceId> {
        self.store.get(&student_id).unwrap_or_default()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StudentInvoicesProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let event: FeeInvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StudentInvoicesProjectionError::Deserialize(e.to_string()))?;

        if let FeeInvoiceEvent::InvoiceAssigned(e) = event {
            let invoice_id = e.invoice_id;
            self.store.update(e.terms.student_id, &mut |ids| {
                if !ids.contains(&invoice_id) {
                    ids.push(invoice_id);
                }
            })?;
        }
        Ok(())
    }

    /// Drop the index and replay it from stored streams.
    pub fn rebuild(&self, streams: &[Vec<StoredEvent>]) -> Result<(), StudentInvoicesProjectionError> {
        self.store.clear()?;
        for stored in streams.iter().flatten() {
            self.apply_envelope(&stored.to_envelope())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use feeledger_core::AggregateId;
    use feeledger_fees::{InvoiceAssigned, InvoiceTerms};

    use crate::read_model::InMemoryReadStore;

    fn assigned_envelope(student_id: StudentId, invoice_id: FeeInvoiceId) -> EventEnvelope<JsonValue> {
        let event = FeeInvoiceEvent::InvoiceAssigned(InvoiceAssigned {
            invoice_id,
            terms: InvoiceTerms {
                student_id,
                class_label: "9-A".to_string(),
                title: "Term 1".to_string(),
                total_amount: dec!(100),
                due_date: Utc::now(),
                remarks: String::new(),
            },
            occurred_at: Utc::now(),
        });
        EventEnvelope::new(
            Uuid::now_v7(),
            invoice_id.0,
            AGGREGATE_TYPE,
            1,
            "fees.invoice.assigned",
            serde_json::to_value(&event).unwrap(),
        )
    }

    #[test]
    fn duplicate_delivery_is_idempotent() {
        let projection = StudentInvoicesProjection::new(Arc::new(InMemoryReadStore::new()));
        let student = StudentId::new(AggregateId::new());
        let invoice = FeeInvoiceId::new(AggregateId::new());
        let env = assigned_envelope(student, invoice);

        projection.apply_envelope(&env).unwrap();
        projection.apply_envelope(&env).unwrap();

        assert_eq!(projection.invoices_of(student), vec![invoice]);
    }

    #[test]
    fn foreign_aggregate_types_are_ignored() {
        let projection = StudentInvoicesProjection::new(Arc::new(InMemoryReadStore::new()));
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            AggregateId::new(),
            "something.else",
            1,
            "something.happened",
            serde_json::json!({}),
        );
        projection.apply_envelope(&env).unwrap();
    }

    struct UnavailableStore;

    impl ReadStore<StudentId, Vec<FeeInvoiceId>> for UnavailableStore {
        fn get(&self, _key: &StudentId) -> Option<Vec<FeeInvoiceId>> {
            None
        }

        fn update(&self, _key: StudentId, _f: &mut dyn FnMut(&mut Vec<FeeInvoiceId>)) -> Result<(), ReadStoreError> {
            Err(ReadStoreError::Unavailable("down".to_string()))
        }

        fn clear(&self) -> Result<(), ReadStoreError> {
            Err(ReadStoreError::Unavailable("down".to_string()))
        }
    }

    #[test]
    fn failed_index_write_is_reported() {
        let projection = StudentInvoicesProjection::new(UnavailableStore);
        let student = StudentId::new(AggregateId::new());
        let env = assigned_envelope(student, FeeInvoiceId::new(AggregateId::new()));

        let err = projection.apply_envelope(&env).unwrap_err();
        assert!(matches!(err, StudentInvoicesProjectionError::Store(_)));
        assert!(projection.rebuild(&[]).is_err());
    }
}
