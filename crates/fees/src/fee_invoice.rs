use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use feeledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult};
use feeledger_events::Event;
use feeledger_students::StudentId;

use crate::status::{FeeStatus, derive_status, remaining_amount};

/// Stream type for fee invoice events.
pub const AGGREGATE_TYPE: &str = "fees.invoice";

/// Fee invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeInvoiceId(pub AggregateId);

impl FeeInvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FeeInvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Cash,
    Online,
    #[serde(alias = "UPI")]
    Upi,
    Cheque,
}

/// One payment applied to an invoice. Entries are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub mode: PaymentMode,
    pub note: String,
}

/// Fields fixed when the invoice is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTerms {
    pub student_id: StudentId,
    /// Copy of the student's class at assignment time.
    pub class_label: String,
    pub title: String,
    pub total_amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub remarks: String,
}

/// Aggregate root: FeeInvoice.
///
/// `paid_amount` only ever moves by applying a `PaymentRecorded` event, which
/// also appends the ledger entry, so the ledger always sums to `paid_amount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeInvoice {
    id: FeeInvoiceId,
    terms: Option<InvoiceTerms>,
    paid_amount: Decimal,
    ledger: Vec<LedgerEntry>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
}

impl FeeInvoice {
    /// Create an empty, not-yet-assigned aggregate instance for rehydration.
    pub fn empty(id: FeeInvoiceId) -> Self {
        Self {
            id,
            terms: None,
            paid_amount: Decimal::ZERO,
            ledger: Vec::new(),
            created_at: None,
            updated_at: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> FeeInvoiceId {
        self.id
    }

    pub fn is_assigned(&self) -> bool {
        self.terms.is_some()
    }

    pub fn terms(&self) -> Option<&InvoiceTerms> {
        self.terms.as_ref()
    }

    pub fn student_id(&self) -> Option<StudentId> {
        self.terms.as_ref().map(|t| t.student_id)
    }

    pub fn total_amount(&self) -> Decimal {
        self.terms.as_ref().map_or(Decimal::ZERO, |t| t.total_amount)
    }

    pub fn paid_amount(&self) -> Decimal {
        self.paid_amount
    }

    pub fn remaining_amount(&self) -> Decimal {
        remaining_amount(self.total_amount(), self.paid_amount)
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    /// `None` until the invoice is assigned.
    pub fn status_at(&self, now: DateTime<Utc>) -> Option<FeeStatus> {
        self.terms
            .as_ref()
            .map(|t| derive_status(self.paid_amount, t.total_amount, t.due_date, now))
    }

    /// Read-side snapshot with the derived fields evaluated at `now`.
    pub fn view(&self, now: DateTime<Utc>) -> DomainResult<FeeInvoiceView> {
        let terms = self.terms.as_ref().ok_or_else(DomainError::not_found)?;
        let created_at = self.created_at.ok_or_else(DomainError::not_found)?;
        Ok(FeeInvoiceView {
            id: self.id,
            student_id: terms.student_id,
            class_label: terms.class_label.clone(),
            title: terms.title.clone(),
            total_amount: terms.total_amount,
            paid_amount: self.paid_amount,
            remaining_amount: self.remaining_amount(),
            due_date: terms.due_date,
            status: derive_status(self.paid_amount, terms.total_amount, terms.due_date, now),
            ledger: self.ledger.clone(),
            remarks: terms.remarks.clone(),
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        })
    }
}

impl AggregateRoot for FeeInvoice {
    type Id = FeeInvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Invoice as returned to callers: stored fields plus derived
/// `remaining_amount` and `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeInvoiceView {
    pub id: FeeInvoiceId,
    pub student_id: StudentId,
    pub class_label: String,
    pub title: String,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub status: FeeStatus,
    pub ledger: Vec<LedgerEntry>,
    pub remarks: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Command: AssignInvoice (one student).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignInvoice {
    pub invoice_id: FeeInvoiceId,
    pub student_id: StudentId,
    pub class_label: String,
    pub title: String,
    pub total_amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub remarks: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub invoice_id: FeeInvoiceId,
    pub amount: Decimal,
    pub mode: PaymentMode,
    pub note: String,
    /// Business date of the payment; defaults to `occurred_at`.
    pub paid_on: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeInvoiceCommand {
    AssignInvoice(AssignInvoice),
    RecordPayment(RecordPayment),
}

/// Event: InvoiceAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAssigned {
    pub invoice_id: FeeInvoiceId,
    pub terms: InvoiceTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded. Carries the ledger entry it appends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub invoice_id: FeeInvoiceId,
    pub student_id: StudentId,
    pub entry: LedgerEntry,
    pub new_paid_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeInvoiceEvent {
    InvoiceAssigned(InvoiceAssigned),
    PaymentRecorded(PaymentRecorded),
}

impl Event for FeeInvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FeeInvoiceEvent::InvoiceAssigned(_) => "fees.invoice.assigned",
            FeeInvoiceEvent::PaymentRecorded(_) => "fees.invoice.payment_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FeeInvoiceEvent::InvoiceAssigned(e) => e.occurred_at,
            FeeInvoiceEvent::PaymentRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for FeeInvoice {
    type Command = FeeInvoiceCommand;
    type Event = FeeInvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FeeInvoiceEvent::InvoiceAssigned(e) => {
                self.id = e.invoice_id;
                self.terms = Some(e.terms.clone());
                self.paid_amount = Decimal::ZERO;
                self.ledger.clear();
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
            }
            FeeInvoiceEvent::PaymentRecorded(e) => {
                self.paid_amount += e.entry.amount;
                self.ledger.push(e.entry.clone());
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FeeInvoiceCommand::AssignInvoice(cmd) => self.handle_assign(cmd),
            FeeInvoiceCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
        }
    }
}

impl FeeInvoice {
    fn ensure_invoice_id(&self, invoice_id: FeeInvoiceId) -> Result<(), DomainError> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_assign(&self, cmd: &AssignInvoice) -> Result<Vec<FeeInvoiceEvent>, DomainError> {
        if self.is_assigned() {
            return Err(DomainError::conflict("invoice already exists"));
        }
        self.ensure_invoice_id(cmd.invoice_id)?;

        let title = cmd.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("invoice title must not be empty"));
        }
        if cmd.total_amount <= Decimal::ZERO {
            return Err(DomainError::invalid_amount(format!(
                "invoice total must be positive, got {}",
                cmd.total_amount
            )));
        }

        Ok(vec![FeeInvoiceEvent::InvoiceAssigned(InvoiceAssigned {
            invoice_id: cmd.invoice_id,
            terms: InvoiceTerms {
                student_id: cmd.student_id,
                class_label: cmd.class_label.clone(),
                title: title.to_string(),
                total_amount: cmd.total_amount,
                due_date: cmd.due_date,
                remarks: cmd.remarks.clone(),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(
        &self,
        cmd: &RecordPayment,
    ) -> Result<Vec<FeeInvoiceEvent>, DomainError> {
        let terms = self.terms.as_ref().ok_or_else(DomainError::not_found)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if cmd.amount <= Decimal::ZERO {
            return Err(DomainError::invalid_amount(format!(
                "payment amount must be positive, got {}",
                cmd.amount
            )));
        }

        let new_paid_amount = self
            .paid_amount
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::invariant("paid amount overflow"))?;

        // Rejected outright; never clamped to the remaining balance.
        if new_paid_amount > terms.total_amount {
            return Err(DomainError::exceeds_balance(format!(
                "payment of {} exceeds remaining balance {}",
                cmd.amount,
                self.remaining_amount()
            )));
        }

        Ok(vec![FeeInvoiceEvent::PaymentRecorded(PaymentRecorded {
            invoice_id: cmd.invoice_id,
            student_id: terms.student_id,
            entry: LedgerEntry {
                amount: cmd.amount,
                date: cmd.paid_on.unwrap_or(cmd.occurred_at),
                mode: cmd.mode,
                note: cmd.note.clone(),
            },
            new_paid_amount,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_invoice_id() -> FeeInvoiceId {
        FeeInvoiceId::new(AggregateId::new())
    }

    fn test_student_id() -> StudentId {
        StudentId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 8, 30, 0).unwrap()
    }

    fn assign_cmd(invoice_id: FeeInvoiceId, total: Decimal) -> AssignInvoice {
        AssignInvoice {
            invoice_id,
            student_id: test_student_id(),
            class_label: "9-A".to_string(),
            title: "Term 1 Tuition".to_string(),
            total_amount: total,
            due_date: test_time() + Duration::days(30),
            remarks: String::new(),
            occurred_at: test_time(),
        }
    }

    fn pay_cmd(invoice_id: FeeInvoiceId, amount: Decimal) -> RecordPayment {
        RecordPayment {
            invoice_id,
            amount,
            mode: PaymentMode::Cash,
            note: "counter".to_string(),
            paid_on: None,
            occurred_at: test_time() + Duration::days(1),
        }
    }

    fn assigned(total: Decimal) -> FeeInvoice {
        let invoice_id = test_invoice_id();
        let mut invoice = FeeInvoice::empty(invoice_id);
        let events = invoice
            .handle(&FeeInvoiceCommand::AssignInvoice(assign_cmd(invoice_id, total)))
            .unwrap();
        invoice.apply(&events[0]);
        invoice
    }

    fn pay(invoice: &mut FeeInvoice, amount: Decimal) -> Result<(), DomainError> {
        let events = invoice.handle(&FeeInvoiceCommand::RecordPayment(pay_cmd(
            invoice.id_typed(),
            amount,
        )))?;
        for e in &events {
            invoice.apply(e);
        }
        Ok(())
    }

    #[test]
    fn assign_emits_invoice_assigned_event() {
        let invoice_id = test_invoice_id();
        let invoice = FeeInvoice::empty(invoice_id);
        let cmd = assign_cmd(invoice_id, dec!(5000));

        let events = invoice
            .handle(&FeeInvoiceCommand::AssignInvoice(cmd.clone()))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            FeeInvoiceEvent::InvoiceAssigned(e) => {
                assert_eq!(e.invoice_id, invoice_id);
                assert_eq!(e.terms.student_id, cmd.student_id);
                assert_eq!(e.terms.total_amount, dec!(5000));
                assert_eq!(e.terms.class_label, "9-A");
            }
            _ => panic!("Expected InvoiceAssigned event"),
        }
    }

    #[test]
    fn new_invoice_starts_pending_with_full_balance() {
        let invoice = assigned(dec!(5000));
        assert_eq!(invoice.paid_amount(), Decimal::ZERO);
        assert_eq!(invoice.remaining_amount(), dec!(5000));
        assert_eq!(invoice.status_at(test_time()), Some(FeeStatus::Pending));
        assert_eq!(invoice.version(), 1);
    }

    #[test]
    fn invoice_assigned_past_due_is_overdue() {
        let invoice_id = test_invoice_id();
        let mut invoice = FeeInvoice::empty(invoice_id);
        let mut cmd = assign_cmd(invoice_id, dec!(700));
        cmd.due_date = test_time() - Duration::days(3);
        let events = invoice
            .handle(&FeeInvoiceCommand::AssignInvoice(cmd))
            .unwrap();
        invoice.apply(&events[0]);

        assert_eq!(invoice.status_at(test_time()), Some(FeeStatus::Overdue));
    }

    #[test]
    fn cannot_assign_twice() {
        let invoice = assigned(dec!(100));
        let err = invoice
            .handle(&FeeInvoiceCommand::AssignInvoice(assign_cmd(
                invoice.id_typed(),
                dec!(100),
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn assign_rejects_non_positive_total() {
        let invoice_id = test_invoice_id();
        let invoice = FeeInvoice::empty(invoice_id);
        for total in [dec!(0), dec!(-10)] {
            let err = invoice
                .handle(&FeeInvoiceCommand::AssignInvoice(assign_cmd(invoice_id, total)))
                .unwrap_err();
            assert!(matches!(err, DomainError::InvalidAmount(_)));
        }
    }

    #[test]
    fn assign_rejects_blank_title() {
        let invoice_id = test_invoice_id();
        let mut cmd = assign_cmd(invoice_id, dec!(100));
        cmd.title = "   ".to_string();
        let err = FeeInvoice::empty(invoice_id)
            .handle(&FeeInvoiceCommand::AssignInvoice(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn payment_on_unassigned_invoice_is_not_found() {
        let invoice_id = test_invoice_id();
        let err = FeeInvoice::empty(invoice_id)
            .handle(&FeeInvoiceCommand::RecordPayment(pay_cmd(invoice_id, dec!(10))))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn payment_amount_must_be_positive() {
        let mut invoice = assigned(dec!(1000));
        assert!(matches!(
            pay(&mut invoice, dec!(0)),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(matches!(
            pay(&mut invoice, dec!(-5)),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(invoice.ledger().is_empty());
    }

    #[test]
    fn overshooting_payment_is_rejected_and_state_unchanged() {
        let mut invoice = assigned(dec!(1000));
        pay(&mut invoice, dec!(800)).unwrap();

        let err = pay(&mut invoice, dec!(300)).unwrap_err();
        match err {
            DomainError::PaymentExceedsBalance(msg) => assert!(msg.contains("200")),
            other => panic!("Expected PaymentExceedsBalance, got {other:?}"),
        }
        assert_eq!(invoice.paid_amount(), dec!(800));
        assert_eq!(invoice.ledger().len(), 1);
    }

    #[test]
    fn paying_to_total_marks_invoice_paid() {
        let mut invoice = assigned(dec!(200));

        pay(&mut invoice, dec!(50)).unwrap();
        assert_eq!(invoice.paid_amount(), dec!(50));
        assert_eq!(invoice.status_at(test_time()), Some(FeeStatus::Partial));

        pay(&mut invoice, dec!(150)).unwrap();
        assert_eq!(invoice.paid_amount(), dec!(200));
        assert_eq!(invoice.remaining_amount(), Decimal::ZERO);
        assert_eq!(invoice.status_at(test_time()), Some(FeeStatus::Paid));

        // Nothing left to pay: any further amount overshoots.
        assert!(matches!(
            pay(&mut invoice, dec!(0.01)),
            Err(DomainError::PaymentExceedsBalance(_))
        ));
    }

    #[test]
    fn ledger_entry_uses_paid_on_when_given() {
        let mut invoice = assigned(dec!(300));
        let paid_on = test_time() - Duration::days(2);
        let mut cmd = pay_cmd(invoice.id_typed(), dec!(100));
        cmd.mode = PaymentMode::Upi;
        cmd.paid_on = Some(paid_on);

        let events = invoice
            .handle(&FeeInvoiceCommand::RecordPayment(cmd))
            .unwrap();
        invoice.apply(&events[0]);

        let entry = &invoice.ledger()[0];
        assert_eq!(entry.date, paid_on);
        assert_eq!(entry.mode, PaymentMode::Upi);
    }

    #[test]
    fn view_reports_derived_fields() {
        let mut invoice = assigned(dec!(1000));
        pay(&mut invoice, dec!(250.50)).unwrap();

        let view = invoice.view(test_time()).unwrap();
        assert_eq!(view.remaining_amount, dec!(749.50));
        assert_eq!(view.status, FeeStatus::Partial);
        assert_eq!(view.ledger.len(), 1);
        assert!(view.updated_at > view.created_at);
    }

    #[test]
    fn view_of_unassigned_invoice_is_not_found() {
        let invoice = FeeInvoice::empty(test_invoice_id());
        assert_eq!(invoice.view(test_time()).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn payment_mode_accepts_upper_case_upi() {
        let mode: PaymentMode = serde_json::from_str("\"UPI\"").unwrap();
        assert_eq!(mode, PaymentMode::Upi);
        assert_eq!(serde_json::to_string(&PaymentMode::Upi).unwrap(), "\"upi\"");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Any sequence of attempted payments keeps 0 <= paid <= total and
        /// the ledger summing to the paid amount.
        #[test]
        fn balance_invariant_holds_for_any_payment_sequence(
            total_cents in 1i64..1_000_000i64,
            attempts in prop::collection::vec(1i64..400_000i64, 1..20)
        ) {
            let total = Decimal::new(total_cents, 2);
            let mut invoice = assigned(total);

            for cents in attempts {
                let before = invoice.paid_amount();
                let amount = Decimal::new(cents, 2);
                match pay(&mut invoice, amount) {
                    Ok(()) => prop_assert_eq!(invoice.paid_amount(), before + amount),
                    Err(DomainError::PaymentExceedsBalance(_)) => {
                        prop_assert!(before + amount > total);
                        prop_assert_eq!(invoice.paid_amount(), before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }

                let ledger_sum: Decimal = invoice.ledger().iter().map(|e| e.amount).sum();
                prop_assert!(invoice.paid_amount() >= Decimal::ZERO);
                prop_assert!(invoice.paid_amount() <= total);
                prop_assert_eq!(ledger_sum, invoice.paid_amount());
                prop_assert_eq!(invoice.remaining_amount(), total - invoice.paid_amount());
            }
        }

        /// Status always matches the rule, whatever order the inputs arrive in.
        #[test]
        fn status_is_a_pure_function_of_its_inputs(
            total_cents in 1i64..1_000_000i64,
            paid_permille in 0i64..=1000i64,
            due_offset_days in -60i64..60i64
        ) {
            let total = Decimal::new(total_cents, 2);
            let paid = (total * Decimal::new(paid_permille, 3)).round_dp(2).min(total);
            let now = test_time();
            let due = now + Duration::days(due_offset_days);

            let expected = if total - paid <= Decimal::ZERO {
                FeeStatus::Paid
            } else if paid > Decimal::ZERO {
                FeeStatus::Partial
            } else if due < now {
                FeeStatus::Overdue
            } else {
                FeeStatus::Pending
            };

            prop_assert_eq!(derive_status(paid, total, due, now), expected);
            prop_assert_eq!(derive_status(paid, total, due, now), derive_status(paid, total, due, now));
        }
    }
}
