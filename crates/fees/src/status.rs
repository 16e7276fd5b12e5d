//! Payment status derivation.
//!
//! Status is never stored. Every read derives it from the money fields, the
//! due date and the caller's notion of "now".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Derived payment status of a fee invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
}

impl FeeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeeStatus::Pending => "pending",
            FeeStatus::Partial => "partial",
            FeeStatus::Paid => "paid",
            FeeStatus::Overdue => "overdue",
        }
    }
}

/// `max(total - paid, 0)`.
pub fn remaining_amount(total_amount: Decimal, paid_amount: Decimal) -> Decimal {
    (total_amount - paid_amount).max(Decimal::ZERO)
}

/// Status rule, evaluated top to bottom:
///
/// 1. nothing remaining → `Paid`
/// 2. anything paid → `Partial`
/// 3. due date already passed → `Overdue`
/// 4. otherwise → `Pending`
///
/// A partially paid invoice stays `Partial` after its due date.
pub fn derive_status(
    paid_amount: Decimal,
    total_amount: Decimal,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> FeeStatus {
    if remaining_amount(total_amount, paid_amount).is_zero() {
        FeeStatus::Paid
    } else if paid_amount > Decimal::ZERO {
        FeeStatus::Partial
    } else if due_date < now {
        FeeStatus::Overdue
    } else {
        FeeStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn unpaid_before_due_date_is_pending() {
        let due = now() + Duration::days(10);
        assert_eq!(derive_status(dec!(0), dec!(5000), due, now()), FeeStatus::Pending);
    }

    #[test]
    fn unpaid_after_due_date_is_overdue() {
        let due = now() - Duration::days(1);
        assert_eq!(derive_status(dec!(0), dec!(5000), due, now()), FeeStatus::Overdue);
    }

    #[test]
    fn due_exactly_now_is_not_overdue_yet() {
        assert_eq!(derive_status(dec!(0), dec!(100), now(), now()), FeeStatus::Pending);
    }

    #[test]
    fn partial_payment_wins_over_overdue() {
        let due = now() - Duration::days(30);
        assert_eq!(derive_status(dec!(1), dec!(5000), due, now()), FeeStatus::Partial);
    }

    #[test]
    fn settled_invoice_is_paid_regardless_of_date() {
        let due = now() - Duration::days(30);
        assert_eq!(derive_status(dec!(5000), dec!(5000), due, now()), FeeStatus::Paid);
    }

    #[test]
    fn remaining_never_goes_negative() {
        assert_eq!(remaining_amount(dec!(100), dec!(250)), Decimal::ZERO);
        assert_eq!(remaining_amount(dec!(100), dec!(40.50)), dec!(59.50));
    }
}
