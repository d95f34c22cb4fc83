//! payment ledger: the transactional collection workflow.
//!
//! every mutating operation runs inside a single store transaction and
//! takes the per-loan lock first, so two concurrent collections against
//! the same loan serialize instead of double-posting.

use chrono::Datelike;
use hourglass_rs::SafeTimeProvider;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::LedgerPolicy;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::latefee::{self, PayoffQuote, QuotedInstallment};
use crate::schedule::{LoanTerms, Schedule};
use crate::state;
use crate::store::LedgerStore;
use crate::types::{
    CashSession, ClientId, Installment, InstallmentId, InstallmentStatus, Loan, LoanId,
    LoanStatus, Payment, PaymentAllocation, PaymentId, PaymentKind, PaymentMethod, SessionId,
    SessionStatus,
};

/// lock registry keyed by loan id.
///
/// locks are created on demand and never dropped; the registry lives as
/// long as the ledger and loan counts stay small enough not to matter.
#[derive(Clone, Default)]
struct LoanLocks {
    map: Arc<Mutex<HashMap<LoanId, Arc<Mutex<()>>>>>,
}

impl LoanLocks {
    fn for_loan(&self, loan: LoanId) -> Arc<Mutex<()>> {
        self.map.lock().entry(loan).or_default().clone()
    }
}

/// the collection workflow over a transactional store.
///
/// cheap to clone; clones share the store and the lock registry.
#[derive(Clone)]
pub struct PaymentLedger<S: LedgerStore> {
    store: S,
    locks: LoanLocks,
}

impl<S: LedgerStore> PaymentLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: LoanLocks::default(),
        }
    }

    /// the underlying store, for read paths outside the workflow
    pub fn store(&self) -> &S {
        &self.store
    }

    // ---- origination ----

    /// register a loan and its full schedule atomically.
    ///
    /// the loan number is minted inside the transaction, so a failed
    /// origination never burns a number.
    pub fn create_loan(
        &self,
        client_id: ClientId,
        terms: &LoanTerms,
        notes: &str,
        time: &SafeTimeProvider,
    ) -> Result<Loan> {
        let schedule = Schedule::generate(terms)?;
        let now = time.now();

        let loan = self.store.transaction(|tx| {
            tx.client(client_id)?;
            let loan_number = tx.mint_loan_number(now.year())?;
            let loan_id = Uuid::new_v4();

            let loan = Loan {
                loan_id,
                client_id,
                loan_number,
                principal: terms.principal,
                rate: terms.rate,
                rate_unit: terms.rate_unit,
                term: terms.term,
                frequency: terms.frequency,
                method: terms.method,
                start_date: terms.start_date,
                maturity_date: schedule.maturity_date,
                base_installment: schedule.base_installment,
                total_interest: schedule.total_interest,
                total_payable: schedule.total_payable,
                status: LoanStatus::Active,
                remaining_balance: terms.principal,
                created_at: now,
                notes: notes.to_string(),
            };

            let installments = schedule
                .rows
                .iter()
                .map(|row| Installment {
                    installment_id: Uuid::new_v4(),
                    loan_id,
                    number: row.number,
                    due_date: row.due_date,
                    total_due: row.total_due,
                    principal_portion: row.principal_portion,
                    interest_portion: row.interest_portion,
                    balance_after: row.balance_after,
                    principal_paid: Money::ZERO,
                    interest_paid: Money::ZERO,
                    late_fee_paid: Money::ZERO,
                    status: InstallmentStatus::Pending,
                    paid_date: None,
                })
                .collect();

            tx.insert_loan(loan.clone(), installments)?;
            Ok(loan)
        })?;

        info!(
            loan = %loan.loan_number,
            principal = %loan.principal,
            term = loan.term,
            "loan created"
        );
        Ok(loan)
    }

    // ---- quotes ----

    /// quote the next collectible installment with its live late fee.
    /// requires an open session, same as the collection it precedes.
    pub fn quote_next_installment(
        &self,
        loan_id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<QuotedInstallment> {
        let today = time.now().date_naive();
        self.store.read(|r| {
            r.open_session()?.ok_or(LedgerError::NoOpenSession)?;
            r.loan(loan_id)?;
            let installment = r
                .next_pending_installment(loan_id)?
                .ok_or(LedgerError::NoPendingInstallments { id: loan_id })?;
            let policy = LedgerPolicy::load(r)?;
            Ok(latefee::quote_installment(&installment, today, &policy.late_fee))
        })
    }

    /// quote a full early payoff: remaining principal, unpaid interest
    /// and the late fees accrued so far
    pub fn quote_payoff(&self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<PayoffQuote> {
        let today = time.now().date_naive();
        self.store.read(|r| {
            r.open_session()?.ok_or(LedgerError::NoOpenSession)?;
            let loan = r.loan(loan_id)?;
            let pending = r.pending_installments(loan_id)?;
            let policy = LedgerPolicy::load(r)?;
            Ok(latefee::quote_payoff(
                loan.remaining_balance,
                &pending,
                today,
                &policy.late_fee,
            ))
        })
    }

    // ---- collections ----

    /// collect one installment in full: outstanding principal, outstanding
    /// interest and the late fee as of today.
    ///
    /// the amounts are requoted inside the transaction, so a stale quote
    /// shown to the teller can never be posted.
    pub fn register_payment(
        &self,
        loan_id: LoanId,
        installment_id: InstallmentId,
        method: PaymentMethod,
        reference: Option<String>,
        time: &SafeTimeProvider,
    ) -> Result<Payment> {
        let lock = self.locks.for_loan(loan_id);
        let _guard = lock.lock();

        let now = time.now();
        let today = now.date_naive();

        let payment = self.store.transaction(|tx| {
            let mut session = tx.open_session()?.ok_or(LedgerError::NoOpenSession)?;
            let mut loan = tx.loan(loan_id)?;
            let mut installment = tx.installment(installment_id)?;
            if installment.loan_id != loan_id {
                return Err(LedgerError::InstallmentLoanMismatch {
                    installment: installment_id,
                    loan: loan_id,
                });
            }

            let policy = LedgerPolicy::load(&*tx)?;
            let quote = latefee::quote_installment(&installment, today, &policy.late_fee);

            let allocation = PaymentAllocation::new(
                installment.principal_outstanding(),
                installment.interest_outstanding(),
                quote.late_fee,
            );
            if !allocation.total.is_positive() {
                return Err(LedgerError::InstallmentSettled { id: installment_id });
            }

            let receipt_number = tx.mint_receipt_number(now.year())?;
            let payment = Payment {
                payment_id: Uuid::new_v4(),
                session_id: session.session_id,
                installment_id,
                loan_id,
                client_id: loan.client_id,
                kind: PaymentKind::Installment,
                allocation,
                receipt_number,
                method,
                reference,
                paid_at: now,
                voided: false,
                void_reason: None,
                voided_at: None,
                notes: String::new(),
            };
            tx.insert_payment(payment.clone())?;

            let prev = installment.status;
            installment.principal_paid += allocation.principal;
            installment.interest_paid += allocation.interest;
            installment.late_fee_paid += allocation.late_fee;
            installment.status = state::installment_after_payment(prev, &installment);
            if installment.status == InstallmentStatus::Paid && prev != InstallmentStatus::Paid {
                installment.paid_date = Some(today);
            }
            tx.update_installment(&installment)?;

            loan.remaining_balance =
                (loan.remaining_balance - allocation.principal).floor_zero();
            loan.status = state::loan_after_collection(loan.status, loan.remaining_balance);
            tx.update_loan(&loan)?;

            session.total_collected += allocation.total;
            tx.update_session(&session)?;

            Ok(payment)
        })?;

        info!(
            receipt = %payment.receipt_number,
            total = %payment.allocation.total,
            late_fee = %payment.allocation.late_fee,
            "payment registered"
        );
        Ok(payment)
    }

    /// settle a loan early by collecting every pending installment at once.
    ///
    /// each installment produces its own payoff payment with its own
    /// receipt. the loan always ends with a zero balance and `Settled`
    /// status, even when per-installment rounding leaves a remainder.
    pub fn cancel_loan(
        &self,
        loan_id: LoanId,
        method: PaymentMethod,
        reference: Option<String>,
        time: &SafeTimeProvider,
    ) -> Result<Vec<Payment>> {
        let lock = self.locks.for_loan(loan_id);
        let _guard = lock.lock();

        let now = time.now();
        let today = now.date_naive();

        let payments = self.store.transaction(|tx| {
            let mut session = tx.open_session()?.ok_or(LedgerError::NoOpenSession)?;
            let mut loan = tx.loan(loan_id)?;
            let pending = tx.pending_installments(loan_id)?;
            let policy = LedgerPolicy::load(&*tx)?;

            let mut payments = Vec::with_capacity(pending.len());
            for mut installment in pending {
                let quote = latefee::quote_installment(&installment, today, &policy.late_fee);
                if !quote.total_owed.is_positive() {
                    continue;
                }

                let allocation = PaymentAllocation::new(
                    installment.principal_outstanding(),
                    installment.interest_outstanding(),
                    quote.late_fee,
                );
                let receipt_number = tx.mint_receipt_number(now.year())?;
                let payment = Payment {
                    payment_id: Uuid::new_v4(),
                    session_id: session.session_id,
                    installment_id: installment.installment_id,
                    loan_id,
                    client_id: loan.client_id,
                    kind: PaymentKind::Payoff,
                    allocation,
                    receipt_number,
                    method,
                    reference: reference.clone(),
                    paid_at: now,
                    voided: false,
                    void_reason: None,
                    voided_at: None,
                    notes: String::new(),
                };
                tx.insert_payment(payment.clone())?;

                installment.principal_paid += allocation.principal;
                installment.interest_paid += allocation.interest;
                installment.late_fee_paid += allocation.late_fee;
                installment.status = InstallmentStatus::Paid;
                installment.paid_date = Some(today);
                tx.update_installment(&installment)?;

                session.total_collected += allocation.total;
                payments.push(payment);
            }

            // forced to exactly zero regardless of rounding remainders
            loan.remaining_balance = Money::ZERO;
            loan.status = LoanStatus::Settled;
            tx.update_loan(&loan)?;
            tx.update_session(&session)?;

            Ok(payments)
        })?;

        let total: Money = payments.iter().map(|p| p.allocation.total).sum();
        info!(
            loan = %loan_id,
            receipts = payments.len(),
            total = %total,
            "loan settled early"
        );
        Ok(payments)
    }

    // ---- voids ----

    /// void a payment and reverse all of its effects.
    ///
    /// the reversal floors accumulators at zero and caps the restored
    /// balance at the original principal, so a void can never leave the
    /// books outside their valid range.
    pub fn void_payment(
        &self,
        payment_id: PaymentId,
        reason: &str,
        time: &SafeTimeProvider,
    ) -> Result<Payment> {
        // resolve the loan first so the reversal runs under its lock
        let loan_id = self.store.read(|r| Ok(r.payment(payment_id)?.loan_id))?;
        let lock = self.locks.for_loan(loan_id);
        let _guard = lock.lock();

        let now = time.now();

        let payment = self.store.transaction(|tx| {
            let mut payment = tx.payment(payment_id)?;
            if payment.voided {
                return Err(LedgerError::PaymentAlreadyVoid { id: payment_id });
            }
            let allocation = payment.allocation;

            payment.voided = true;
            payment.void_reason = Some(reason.to_string());
            payment.voided_at = Some(now);
            tx.update_payment(&payment)?;

            let mut installment = tx.installment(payment.installment_id)?;
            let prev = installment.status;
            installment.principal_paid =
                (installment.principal_paid - allocation.principal).floor_zero();
            installment.interest_paid =
                (installment.interest_paid - allocation.interest).floor_zero();
            installment.late_fee_paid =
                (installment.late_fee_paid - allocation.late_fee).floor_zero();
            installment.status = state::installment_after_void(prev, &installment);
            if installment.status == InstallmentStatus::Pending {
                installment.paid_date = None;
            }
            tx.update_installment(&installment)?;

            let mut loan = tx.loan(payment.loan_id)?;
            loan.remaining_balance =
                (loan.remaining_balance + allocation.principal).min(loan.principal);
            loan.status = state::loan_after_void(loan.status, loan.remaining_balance);
            tx.update_loan(&loan)?;

            let mut session = tx.session(payment.session_id)?;
            session.total_collected = (session.total_collected - allocation.total).floor_zero();
            tx.update_session(&session)?;

            Ok(payment)
        })?;

        info!(
            receipt = %payment.receipt_number,
            reason,
            "payment voided"
        );
        Ok(payment)
    }

    // ---- reporting ----

    pub fn loan(&self, id: LoanId) -> Result<Loan> {
        self.store.read(|r| r.loan(id))
    }

    /// loans filtered by status and/or client, newest first
    pub fn loans(&self, status: Option<LoanStatus>, client: Option<ClientId>) -> Result<Vec<Loan>> {
        self.store.read(|r| r.loans(status, client))
    }

    /// search by loan number, client name or document
    pub fn search_loans(&self, term: &str) -> Result<Vec<Loan>> {
        self.store.read(|r| r.search_loans(term))
    }

    /// full schedule of a loan, ordered by installment number
    pub fn schedule(&self, loan: LoanId) -> Result<Vec<Installment>> {
        self.store.read(|r| {
            r.loan(loan)?;
            r.installments(loan)
        })
    }

    pub fn payments_for_loan(&self, loan: LoanId) -> Result<Vec<Payment>> {
        self.store.read(|r| r.payments_for_loan(loan))
    }

    pub fn payments_for_session(&self, session: SessionId) -> Result<Vec<Payment>> {
        self.store.read(|r| r.payments_for_session(session))
    }

    pub fn session(&self, id: SessionId) -> Result<CashSession> {
        self.store.read(|r| r.session(id))
    }

    /// recent sessions, newest first
    pub fn sessions(&self, limit: usize) -> Result<Vec<CashSession>> {
        self.store.read(|r| r.sessions(limit))
    }

    // ---- cash sessions ----

    /// open today's cash session. one session per calendar date, one open
    /// session system-wide.
    pub fn open_session(
        &self,
        opening_float: Money,
        notes: &str,
        time: &SafeTimeProvider,
    ) -> Result<CashSession> {
        if opening_float.is_negative() {
            return Err(LedgerError::InvalidAmount {
                message: format!("opening float cannot be negative, got {opening_float}"),
            });
        }

        let now = time.now();
        let today = now.date_naive();

        let session = self.store.transaction(|tx| {
            if tx.session_for_date(today)?.is_some() {
                return Err(LedgerError::SessionExistsForDate { date: today });
            }
            let session = CashSession {
                session_id: Uuid::new_v4(),
                date: today,
                opening_float,
                closing_float: None,
                total_collected: Money::ZERO,
                status: SessionStatus::Open,
                opened_at: now,
                closed_at: None,
                notes: notes.to_string(),
            };
            tx.insert_session(session.clone())?;
            Ok(session)
        })?;

        info!(date = %session.date, opening = %session.opening_float, "session opened");
        Ok(session)
    }

    /// close a session with the counted float. closing is one-way; the
    /// collected total stays as accumulated by the day's payments.
    pub fn close_session(
        &self,
        session_id: SessionId,
        closing_float: Money,
        notes: &str,
        time: &SafeTimeProvider,
    ) -> Result<CashSession> {
        if closing_float.is_negative() {
            return Err(LedgerError::InvalidAmount {
                message: format!("closing float cannot be negative, got {closing_float}"),
            });
        }

        let now = time.now();

        let session = self.store.transaction(|tx| {
            let mut session = tx.session(session_id)?;
            if session.status == SessionStatus::Closed {
                return Err(LedgerError::SessionAlreadyClosed);
            }
            session.closing_float = Some(closing_float);
            session.closed_at = Some(now);
            session.status = SessionStatus::Closed;
            if !notes.is_empty() {
                session.notes = notes.to_string();
            }
            tx.update_session(&session)?;
            Ok(session)
        })?;

        info!(
            date = %session.date,
            collected = %session.total_collected,
            closing = %closing_float,
            "session closed"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::errors::ErrorClass;
    use crate::store::MemoryStore;
    use crate::types::{AmortizationMethod, PaymentFrequency, RateUnit};
    use chrono::{NaiveDate, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    fn clock(y: i32, m: u32, d: u32) -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap(),
        ))
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn terms(principal: i64, start: NaiveDate) -> LoanTerms {
        LoanTerms {
            principal: Money::from_major(principal),
            rate: Rate::from_percentage(dec!(5)),
            rate_unit: RateUnit::Monthly,
            term: 6,
            frequency: PaymentFrequency::Monthly,
            method: AmortizationMethod::French,
            start_date: start,
        }
    }

    /// store, ledger and an originated loan, with no session open yet
    fn setup(start: NaiveDate) -> (MemoryStore, PaymentLedger<MemoryStore>, Loan) {
        let store = MemoryStore::new();
        let ledger = PaymentLedger::new(store.clone());
        let client = store.register_client("Ana Pérez", "001-1234567-8");
        let time = clock(start.year(), start.month(), start.day());
        let loan = ledger
            .create_loan(client.client_id, &terms(10_000, start), "", &time)
            .unwrap();
        (store, ledger, loan)
    }

    #[test]
    fn test_create_loan_persists_schedule_and_number() {
        let (store, _, loan) = setup(ymd(2026, 1, 1));

        assert_eq!(loan.loan_number, "PREST-2026-00001");
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.remaining_balance, Money::from_major(10_000));

        let schedule = store.read(|r| r.installments(loan.loan_id)).unwrap();
        assert_eq!(schedule.len(), 6);
        assert!(schedule.iter().all(|i| i.status == InstallmentStatus::Pending));
        assert_eq!(schedule[0].due_date, ymd(2026, 2, 1));
        assert_eq!(schedule.last().unwrap().balance_after, Money::ZERO);
    }

    #[test]
    fn test_create_loan_for_unknown_client_rolls_back() {
        let store = MemoryStore::new();
        let ledger = PaymentLedger::new(store.clone());
        let time = clock(2026, 1, 1);

        let err = ledger
            .create_loan(Uuid::new_v4(), &terms(10_000, ymd(2026, 1, 1)), "", &time)
            .unwrap_err();
        assert!(matches!(err, LedgerError::ClientNotFound { .. }));

        // the failed origination must not have burned the loan number
        let client = store.register_client("Ana Pérez", "001-1234567-8");
        let loan = ledger
            .create_loan(client.client_id, &terms(10_000, ymd(2026, 1, 1)), "", &time)
            .unwrap();
        assert_eq!(loan.loan_number, "PREST-2026-00001");
    }

    #[test]
    fn test_quote_and_register_without_session_fail_as_state_errors() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let time = clock(2026, 2, 1);
        let before = store.read(|r| r.installments(loan.loan_id)).unwrap();

        let err = ledger.quote_next_installment(loan.loan_id, &time).unwrap_err();
        assert_eq!(err.class(), ErrorClass::State);

        let err = ledger
            .register_payment(
                loan.loan_id,
                before[0].installment_id,
                PaymentMethod::Cash,
                None,
                &time,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoOpenSession));

        // nothing moved
        let after = store.read(|r| r.installments(loan.loan_id)).unwrap();
        assert_eq!(before, after);
        let balance = store.read(|r| r.loan(loan.loan_id)).unwrap().remaining_balance;
        assert_eq!(balance, Money::from_major(10_000));
    }

    #[test]
    fn test_register_payment_updates_all_four_records() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let time = clock(2026, 2, 1);
        let session = ledger.open_session(Money::from_major(500), "", &time).unwrap();

        let first = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();
        let payment = ledger
            .register_payment(loan.loan_id, first.installment_id, PaymentMethod::Cash, None, &time)
            .unwrap();

        // on the due date: no late fee, full scheduled amounts
        assert_eq!(payment.allocation.principal, first.principal_portion);
        assert_eq!(payment.allocation.interest, first.interest_portion);
        assert_eq!(payment.allocation.late_fee, Money::ZERO);
        assert_eq!(payment.allocation.total, first.total_due);
        assert_eq!(payment.receipt_number, "REC-2026-00001");

        let inst = store.read(|r| r.installment(first.installment_id)).unwrap();
        assert_eq!(inst.status, InstallmentStatus::Paid);
        assert_eq!(inst.paid_date, Some(ymd(2026, 2, 1)));
        assert_eq!(inst.outstanding(), Money::ZERO);

        let loan = store.read(|r| r.loan(loan.loan_id)).unwrap();
        assert_eq!(
            loan.remaining_balance,
            Money::from_major(10_000) - first.principal_portion
        );
        assert_eq!(loan.status, LoanStatus::Active);

        let session = store.read(|r| r.session(session.session_id)).unwrap();
        assert_eq!(session.total_collected, payment.allocation.total);
    }

    #[test]
    fn test_register_payment_past_grace_includes_late_fee() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        // first installment due 2026-02-01, grace 3 days, paid on the 5th
        let time = clock(2026, 2, 5);
        ledger.open_session(Money::ZERO, "", &time).unwrap();

        let first = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();
        let quote = ledger.quote_next_installment(loan.loan_id, &time).unwrap();
        assert_eq!(quote.days_late, 1);
        assert!(quote.late_fee.is_positive());

        let payment = ledger
            .register_payment(loan.loan_id, first.installment_id, PaymentMethod::Cash, None, &time)
            .unwrap();
        assert_eq!(payment.allocation.late_fee, quote.late_fee);
        assert_eq!(payment.allocation.total, first.total_due + quote.late_fee);

        let inst = store.read(|r| r.installment(first.installment_id)).unwrap();
        assert_eq!(inst.late_fee_paid, quote.late_fee);
    }

    #[test]
    fn test_settled_installment_rejects_second_collection() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let time = clock(2026, 2, 1);
        ledger.open_session(Money::ZERO, "", &time).unwrap();

        let first = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();
        ledger
            .register_payment(loan.loan_id, first.installment_id, PaymentMethod::Cash, None, &time)
            .unwrap();

        let err = ledger
            .register_payment(loan.loan_id, first.installment_id, PaymentMethod::Cash, None, &time)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InstallmentSettled { .. }));
        assert_eq!(err.class(), ErrorClass::State);
    }

    #[test]
    fn test_installment_from_another_loan_is_rejected() {
        let (store, ledger, loan_a) = setup(ymd(2026, 1, 1));
        let client = store.register_client("Luis Gómez", "002-7654321-9");
        let time = clock(2026, 2, 1);
        let loan_b = ledger
            .create_loan(client.client_id, &terms(5_000, ymd(2026, 1, 15)), "", &time)
            .unwrap();
        ledger.open_session(Money::ZERO, "", &time).unwrap();

        let b_first = store
            .read(|r| r.next_pending_installment(loan_b.loan_id))
            .unwrap()
            .unwrap();
        let err = ledger
            .register_payment(loan_a.loan_id, b_first.installment_id, PaymentMethod::Cash, None, &time)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InstallmentLoanMismatch { .. }));
    }

    #[test]
    fn test_void_restores_installment_loan_and_session_exactly() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let time = clock(2026, 2, 5);
        ledger.open_session(Money::from_major(200), "", &time).unwrap();

        let inst_before = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();
        let loan_before = store.read(|r| r.loan(loan.loan_id)).unwrap();

        let payment = ledger
            .register_payment(loan.loan_id, inst_before.installment_id, PaymentMethod::Cash, None, &time)
            .unwrap();
        let voided = ledger.void_payment(payment.payment_id, "teller error", &time).unwrap();
        assert!(voided.voided);
        assert_eq!(voided.void_reason.as_deref(), Some("teller error"));

        let inst_after = store
            .read(|r| r.installment(inst_before.installment_id))
            .unwrap();
        assert_eq!(inst_after.principal_paid, Money::ZERO);
        assert_eq!(inst_after.interest_paid, Money::ZERO);
        assert_eq!(inst_after.late_fee_paid, Money::ZERO);
        assert_eq!(inst_after.status, InstallmentStatus::Pending);
        assert_eq!(inst_after.paid_date, None);

        let loan_after = store.read(|r| r.loan(loan.loan_id)).unwrap();
        assert_eq!(loan_after.remaining_balance, loan_before.remaining_balance);
        assert_eq!(loan_after.status, LoanStatus::Active);

        let session = store
            .read(|r| Ok(r.open_session()?.unwrap()))
            .unwrap();
        assert_eq!(session.total_collected, Money::ZERO);

        // voided payments drop out of the loan's payment listing
        let listed = store.read(|r| r.payments_for_loan(loan.loan_id)).unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_void_is_one_way() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let time = clock(2026, 2, 1);
        ledger.open_session(Money::ZERO, "", &time).unwrap();

        let first = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();
        let payment = ledger
            .register_payment(loan.loan_id, first.installment_id, PaymentMethod::Cash, None, &time)
            .unwrap();

        ledger.void_payment(payment.payment_id, "dup", &time).unwrap();
        let err = ledger.void_payment(payment.payment_id, "again", &time).unwrap_err();
        assert!(matches!(err, LedgerError::PaymentAlreadyVoid { .. }));

        let missing = ledger.void_payment(Uuid::new_v4(), "ghost", &time).unwrap_err();
        assert_eq!(missing.class(), ErrorClass::NotFound);
    }

    #[test]
    fn test_void_reactivates_settled_loan() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let time = clock(2026, 2, 1);
        ledger.open_session(Money::ZERO, "", &time).unwrap();

        let payments = ledger
            .cancel_loan(loan.loan_id, PaymentMethod::Cash, None, &time)
            .unwrap();
        assert_eq!(store.read(|r| r.loan(loan.loan_id)).unwrap().status, LoanStatus::Settled);

        ledger
            .void_payment(payments[0].payment_id, "wrong loan", &time)
            .unwrap();
        let reopened = store.read(|r| r.loan(loan.loan_id)).unwrap();
        assert_eq!(reopened.status, LoanStatus::Active);
        assert!(reopened.remaining_balance.is_positive());
    }

    #[test]
    fn test_cancel_loan_settles_every_installment() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        // two installments already due, one of them past grace
        let time = clock(2026, 3, 10);
        ledger.open_session(Money::ZERO, "", &time).unwrap();

        let quote = ledger.quote_payoff(loan.loan_id, &time).unwrap();
        assert_eq!(quote.principal, Money::from_major(10_000));
        assert!(quote.late_fees.is_positive());

        let payments = ledger
            .cancel_loan(loan.loan_id, PaymentMethod::Transfer, None, &time)
            .unwrap();
        assert_eq!(payments.len(), 6);
        assert!(payments.iter().all(|p| p.kind == PaymentKind::Payoff));

        // receipts are consecutive within the payoff
        for (i, p) in payments.iter().enumerate() {
            assert_eq!(p.receipt_number, format!("REC-2026-{:05}", i + 1));
        }

        let settled = store.read(|r| r.loan(loan.loan_id)).unwrap();
        assert_eq!(settled.remaining_balance, Money::ZERO);
        assert_eq!(settled.status, LoanStatus::Settled);

        let schedule = store.read(|r| r.installments(loan.loan_id)).unwrap();
        assert!(schedule.iter().all(|i| i.status == InstallmentStatus::Paid));
        assert!(schedule.iter().all(|i| i.paid_date == Some(ymd(2026, 3, 10))));

        let session = store.read(|r| Ok(r.open_session()?.unwrap())).unwrap();
        let total: Money = payments.iter().map(|p| p.allocation.total).sum();
        assert_eq!(session.total_collected, total);

        let err = ledger.quote_next_installment(loan.loan_id, &time).unwrap_err();
        assert!(matches!(err, LedgerError::NoPendingInstallments { .. }));
    }

    #[test]
    fn test_cancel_two_pending_installments_collects_exact_payoff() {
        let store = MemoryStore::new();
        let ledger = PaymentLedger::new(store.clone());
        let client = store.register_client("Luis Gómez", "002-7654321-9");
        let loan_id = Uuid::new_v4();

        // hand-built book: 10,000 outstanding over two installments of
        // 5,000 and 5,050; the first is 8 days past grace on 2026-03-10,
        // so it owes 5,000 * 0.5% * 8 = 200 in fees
        let loan = Loan {
            loan_id,
            client_id: client.client_id,
            loan_number: "PREST-2026-00099".to_string(),
            principal: Money::from_major(10_000),
            rate: Rate::from_percentage(dec!(5)),
            rate_unit: RateUnit::Monthly,
            term: 2,
            frequency: PaymentFrequency::Monthly,
            method: AmortizationMethod::InterestOnly,
            start_date: ymd(2026, 1, 27),
            maturity_date: ymd(2026, 3, 27),
            base_installment: Money::from_major(5_000),
            total_interest: Money::from_major(50),
            total_payable: Money::from_major(10_050),
            status: LoanStatus::Active,
            remaining_balance: Money::from_major(10_000),
            created_at: Utc.with_ymd_and_hms(2026, 1, 27, 9, 0, 0).unwrap(),
            notes: String::new(),
        };
        let row = |number: u32, due, principal: i64, interest: i64| Installment {
            installment_id: Uuid::new_v4(),
            loan_id,
            number,
            due_date: due,
            total_due: Money::from_major(principal + interest),
            principal_portion: Money::from_major(principal),
            interest_portion: Money::from_major(interest),
            balance_after: Money::from_major(10_000 - number as i64 * 5_000),
            principal_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            late_fee_paid: Money::ZERO,
            status: InstallmentStatus::Pending,
            paid_date: None,
        };
        store
            .transaction(|tx| {
                tx.insert_loan(
                    loan,
                    vec![
                        row(1, ymd(2026, 2, 27), 5_000, 0),
                        row(2, ymd(2026, 3, 27), 5_000, 50),
                    ],
                )
            })
            .unwrap();

        let time = clock(2026, 3, 10);
        ledger.open_session(Money::ZERO, "", &time).unwrap();

        let payments = ledger
            .cancel_loan(loan_id, PaymentMethod::Cash, None, &time)
            .unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].allocation.total, Money::from_major(5_200));
        assert_eq!(payments[1].allocation.total, Money::from_major(5_050));
        let total: Money = payments.iter().map(|p| p.allocation.total).sum();
        assert_eq!(total, Money::from_major(10_250));

        let settled = store.read(|r| r.loan(loan_id)).unwrap();
        assert_eq!(settled.remaining_balance, Money::ZERO);
        assert_eq!(settled.status, LoanStatus::Settled);
    }

    #[test]
    fn test_cancel_settles_even_with_no_pending_installments() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let time = clock(2026, 2, 1);
        ledger.open_session(Money::ZERO, "", &time).unwrap();
        ledger
            .cancel_loan(loan.loan_id, PaymentMethod::Cash, None, &time)
            .unwrap();

        // a second payoff finds nothing to collect but still reports settled
        let payments = ledger
            .cancel_loan(loan.loan_id, PaymentMethod::Cash, None, &time)
            .unwrap();
        assert!(payments.is_empty());
        assert_eq!(store.read(|r| r.loan(loan.loan_id)).unwrap().status, LoanStatus::Settled);
    }

    #[test]
    fn test_session_lifecycle() {
        let store = MemoryStore::new();
        let ledger = PaymentLedger::new(store.clone());
        let time = clock(2026, 2, 1);

        let err = ledger
            .open_session(Money::from_major(-1), "", &time)
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);

        let session = ledger.open_session(Money::from_major(500), "turno AM", &time).unwrap();
        assert_eq!(session.date, ymd(2026, 2, 1));

        let err = ledger.open_session(Money::ZERO, "", &time).unwrap_err();
        assert!(matches!(err, LedgerError::SessionExistsForDate { .. }));

        let closed = ledger
            .close_session(session.session_id, Money::from_major(500), "", &time)
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.closing_float, Some(Money::from_major(500)));

        let err = ledger
            .close_session(session.session_id, Money::ZERO, "", &time)
            .unwrap_err();
        assert!(matches!(err, LedgerError::SessionAlreadyClosed));

        // a new date gets a new session once the previous one is closed
        let next_day = clock(2026, 2, 2);
        let session2 = ledger.open_session(Money::ZERO, "", &next_day).unwrap();
        assert_eq!(session2.date, ymd(2026, 2, 2));
    }

    #[test]
    fn test_receipt_numbers_continue_across_sessions() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let day1 = clock(2026, 2, 1);
        let session = ledger.open_session(Money::ZERO, "", &day1).unwrap();

        let first = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();
        let p1 = ledger
            .register_payment(loan.loan_id, first.installment_id, PaymentMethod::Cash, None, &day1)
            .unwrap();
        ledger.close_session(session.session_id, Money::ZERO, "", &day1).unwrap();

        let day2 = clock(2026, 3, 1);
        ledger.open_session(Money::ZERO, "", &day2).unwrap();
        let second = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();
        let p2 = ledger
            .register_payment(loan.loan_id, second.installment_id, PaymentMethod::Card, None, &day2)
            .unwrap();

        assert_eq!(p1.receipt_number, "REC-2026-00001");
        assert_eq!(p2.receipt_number, "REC-2026-00002");
    }

    #[test]
    fn test_concurrent_collections_post_exactly_once() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        {
            let time = clock(2026, 2, 1);
            ledger.open_session(Money::ZERO, "", &time).unwrap();
        }
        let first = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let ledger = ledger.clone();
            let loan_id = loan.loan_id;
            let installment_id = first.installment_id;
            handles.push(std::thread::spawn(move || {
                let time = clock(2026, 2, 1);
                ledger.register_payment(loan_id, installment_id, PaymentMethod::Cash, None, &time)
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LedgerError::InstallmentSettled { .. }))));

        // the losing attempt left nothing behind
        let session = store.read(|r| Ok(r.open_session()?.unwrap())).unwrap();
        assert_eq!(session.total_collected, first.total_due);
    }

    #[test]
    fn test_reporting_listings() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let time = clock(2026, 2, 1);
        let session = ledger.open_session(Money::ZERO, "", &time).unwrap();

        let first = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();
        ledger
            .register_payment(loan.loan_id, first.installment_id, PaymentMethod::Cash, None, &time)
            .unwrap();

        let by_number = ledger.search_loans("PREST-2026").unwrap();
        assert_eq!(by_number.len(), 1);
        let by_name = ledger.search_loans("pérez").unwrap();
        assert_eq!(by_name.len(), 1);
        assert!(ledger.search_loans("no such client").unwrap().is_empty());

        let active = ledger.loans(Some(LoanStatus::Active), None).unwrap();
        assert_eq!(active.len(), 1);
        assert!(ledger.loans(Some(LoanStatus::Settled), None).unwrap().is_empty());

        let schedule = ledger.schedule(loan.loan_id).unwrap();
        assert_eq!(schedule.len(), 6);
        assert_eq!(schedule[0].status, InstallmentStatus::Paid);

        assert_eq!(ledger.payments_for_loan(loan.loan_id).unwrap().len(), 1);
        assert_eq!(
            ledger.payments_for_session(session.session_id).unwrap().len(),
            1
        );
        assert_eq!(ledger.sessions(10).unwrap().len(), 1);

        let missing = ledger.schedule(Uuid::new_v4()).unwrap_err();
        assert_eq!(missing.class(), ErrorClass::NotFound);
    }

    #[test]
    fn test_payment_serializes_round_trip() {
        let (store, ledger, loan) = setup(ymd(2026, 1, 1));
        let time = clock(2026, 2, 1);
        ledger.open_session(Money::ZERO, "", &time).unwrap();
        let first = store
            .read(|r| r.next_pending_installment(loan.loan_id))
            .unwrap()
            .unwrap();
        let payment = ledger
            .register_payment(
                loan.loan_id,
                first.installment_id,
                PaymentMethod::Transfer,
                Some("TRX-991".to_string()),
                &time,
            )
            .unwrap();

        let json = serde_json::to_string(&payment).unwrap();
        let back: Payment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payment);
        assert!(json.contains("REC-2026-00001"));
    }
}
