//! persistence boundary for the ledger.
//!
//! the ledger only ever talks to storage through these traits. `read`
//! runs against a consistent snapshot; `transaction` applies every
//! mutation atomically, and a returned error leaves no partial state.

mod memory;

pub use memory::MemoryStore;

use chrono::NaiveDate;

use crate::errors::Result;
use crate::types::{
    CashSession, ClientId, ClientRecord, Installment, InstallmentId, Loan, LoanId, LoanStatus,
    Payment, PaymentId, SessionId,
};

/// read-only access to ledger records
pub trait LedgerReader {
    fn loan(&self, id: LoanId) -> Result<Loan>;
    /// loans filtered by status and/or client, newest first
    fn loans(&self, status: Option<LoanStatus>, client: Option<ClientId>) -> Result<Vec<Loan>>;
    /// search by loan number, client name or document
    fn search_loans(&self, term: &str) -> Result<Vec<Loan>>;

    fn installment(&self, id: InstallmentId) -> Result<Installment>;
    /// full schedule ordered by installment number
    fn installments(&self, loan: LoanId) -> Result<Vec<Installment>>;
    /// installments that can still receive payments, ordered by number
    fn pending_installments(&self, loan: LoanId) -> Result<Vec<Installment>>;
    fn next_pending_installment(&self, loan: LoanId) -> Result<Option<Installment>>;

    /// the system-wide open session, if any
    fn open_session(&self) -> Result<Option<CashSession>>;
    fn session(&self, id: SessionId) -> Result<CashSession>;
    fn session_for_date(&self, date: NaiveDate) -> Result<Option<CashSession>>;
    /// recent sessions, newest first
    fn sessions(&self, limit: usize) -> Result<Vec<CashSession>>;

    fn payment(&self, id: PaymentId) -> Result<Payment>;
    /// non-voided payments of a loan, newest first
    fn payments_for_loan(&self, loan: LoanId) -> Result<Vec<Payment>>;
    /// non-voided payments booked against a session, newest first
    fn payments_for_session(&self, session: SessionId) -> Result<Vec<Payment>>;

    /// client registry lookup (read-only external collaborator)
    fn client(&self, id: ClientId) -> Result<ClientRecord>;

    /// named configuration value, externally mutable
    fn config_value(&self, key: &str) -> Option<String>;
}

/// mutations available inside a transaction
pub trait LedgerWriter: LedgerReader {
    /// insert a loan together with its full schedule
    fn insert_loan(&mut self, loan: Loan, schedule: Vec<Installment>) -> Result<()>;
    fn update_loan(&mut self, loan: &Loan) -> Result<()>;
    fn update_installment(&mut self, installment: &Installment) -> Result<()>;

    /// insert a session, enforcing one-per-date and single-open invariants
    fn insert_session(&mut self, session: CashSession) -> Result<()>;
    fn update_session(&mut self, session: &CashSession) -> Result<()>;

    /// insert a payment, enforcing receipt uniqueness and referential integrity
    fn insert_payment(&mut self, payment: Payment) -> Result<()>;
    fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    fn set_config_value(&mut self, key: &str, value: &str);

    /// mint the next receipt number, bumping the counter in the same transaction
    fn mint_receipt_number(&mut self, year: i32) -> Result<String>;
    /// mint the next loan number, bumping the counter in the same transaction
    fn mint_loan_number(&mut self, year: i32) -> Result<String>;
}

/// transactional store the ledger runs against
pub trait LedgerStore {
    /// run a read-only closure against a consistent snapshot
    fn read<R>(&self, f: impl FnOnce(&dyn LedgerReader) -> Result<R>) -> Result<R>;

    /// run a closure atomically: on error, no mutation is applied
    fn transaction<R>(&self, f: impl FnOnce(&mut dyn LedgerWriter) -> Result<R>) -> Result<R>;
}
