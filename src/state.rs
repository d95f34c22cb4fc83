//! explicit status transition functions for installments and loans.
//!
//! status derivation lives here, independent of storage, so every
//! transition is unit-testable on plain values.

use crate::decimal::Money;
use crate::types::{Installment, InstallmentStatus, LoanStatus};

/// balances at or below one cent count as settled
pub const SETTLEMENT_THRESHOLD: Money = Money::CENT;

/// installment status after its accumulators were increased by a payment
pub fn installment_after_payment(prev: InstallmentStatus, installment: &Installment) -> InstallmentStatus {
    if installment.principal_paid >= installment.principal_portion
        && installment.interest_paid >= installment.interest_portion
    {
        InstallmentStatus::Paid
    } else if installment.principal_paid.is_positive() {
        InstallmentStatus::Partial
    } else {
        prev
    }
}

/// installment status after its accumulators were reversed by a void
pub fn installment_after_void(prev: InstallmentStatus, installment: &Installment) -> InstallmentStatus {
    if installment.principal_paid.is_zero() && installment.interest_paid.is_zero() {
        InstallmentStatus::Pending
    } else if installment.principal_paid.is_positive() {
        InstallmentStatus::Partial
    } else {
        prev
    }
}

/// loan status after its remaining balance was reduced by a collection
pub fn loan_after_collection(prev: LoanStatus, remaining_balance: Money) -> LoanStatus {
    if remaining_balance <= SETTLEMENT_THRESHOLD {
        LoanStatus::Settled
    } else {
        prev
    }
}

/// loan status after a void restored part of its balance
pub fn loan_after_void(prev: LoanStatus, restored_balance: Money) -> LoanStatus {
    if prev == LoanStatus::Settled && restored_balance > SETTLEMENT_THRESHOLD {
        LoanStatus::Active
    } else {
        prev
    }
}
