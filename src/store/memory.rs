use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config;
use crate::errors::{LedgerError, Result};
use crate::types::{
    CashSession, ClientId, ClientRecord, Installment, InstallmentId, Loan, LoanId, LoanStatus,
    Payment, PaymentId, SessionId, SessionStatus,
};

use super::{LedgerReader, LedgerStore, LedgerWriter};

/// everything the store holds, cloned wholesale per transaction
#[derive(Debug, Clone, Default)]
struct LedgerState {
    loans: HashMap<LoanId, Loan>,
    installments: HashMap<InstallmentId, Installment>,
    sessions: HashMap<SessionId, CashSession>,
    payments: HashMap<PaymentId, Payment>,
    clients: HashMap<ClientId, ClientRecord>,
    config: HashMap<String, String>,
}

/// in-memory reference store.
///
/// transactions run against a clone of the state and replace it only on
/// success, so a failed commit leaves no partial mutation behind. cheap
/// to clone; clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryStore {
    /// empty store seeded with default configuration values
    pub fn new() -> Self {
        let mut state = LedgerState::default();
        for (key, value) in config::default_values() {
            state.config.insert(key.to_string(), value.to_string());
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// add a client to the registry; stands in for the external registry
    pub fn register_client(&self, name: &str, document: &str) -> ClientRecord {
        let record = ClientRecord {
            client_id: Uuid::new_v4(),
            name: name.to_string(),
            document: document.to_string(),
        };
        self.state
            .lock()
            .clients
            .insert(record.client_id, record.clone());
        record
    }
}

impl LedgerStore for MemoryStore {
    fn read<R>(&self, f: impl FnOnce(&dyn LedgerReader) -> Result<R>) -> Result<R> {
        let state = self.state.lock();
        f(&*state)
    }

    fn transaction<R>(&self, f: impl FnOnce(&mut dyn LedgerWriter) -> Result<R>) -> Result<R> {
        let mut state = self.state.lock();
        let mut working = state.clone();
        let value = f(&mut working)?;
        *state = working;
        Ok(value)
    }
}

impl LedgerReader for LedgerState {
    fn loan(&self, id: LoanId) -> Result<Loan> {
        self.loans
            .get(&id)
            .cloned()
            .ok_or(LedgerError::LoanNotFound { id })
    }

    fn loans(&self, status: Option<LoanStatus>, client: Option<ClientId>) -> Result<Vec<Loan>> {
        let mut result: Vec<Loan> = self
            .loans
            .values()
            .filter(|l| status.map_or(true, |s| l.status == s))
            .filter(|l| client.map_or(true, |c| l.client_id == c))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    fn search_loans(&self, term: &str) -> Result<Vec<Loan>> {
        let needle = term.to_lowercase();
        let mut result: Vec<Loan> = self
            .loans
            .values()
            .filter(|l| {
                if l.loan_number.to_lowercase().contains(&needle) {
                    return true;
                }
                self.clients.get(&l.client_id).is_some_and(|c| {
                    c.name.to_lowercase().contains(&needle)
                        || c.document.to_lowercase().contains(&needle)
                })
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    fn installment(&self, id: InstallmentId) -> Result<Installment> {
        self.installments
            .get(&id)
            .cloned()
            .ok_or(LedgerError::InstallmentNotFound { id })
    }

    fn installments(&self, loan: LoanId) -> Result<Vec<Installment>> {
        let mut result: Vec<Installment> = self
            .installments
            .values()
            .filter(|i| i.loan_id == loan)
            .cloned()
            .collect();
        result.sort_by_key(|i| i.number);
        Ok(result)
    }

    fn pending_installments(&self, loan: LoanId) -> Result<Vec<Installment>> {
        let mut result = self.installments(loan)?;
        result.retain(|i| i.status.is_pending());
        Ok(result)
    }

    fn next_pending_installment(&self, loan: LoanId) -> Result<Option<Installment>> {
        Ok(self.pending_installments(loan)?.into_iter().next())
    }

    fn open_session(&self) -> Result<Option<CashSession>> {
        Ok(self.sessions.values().find(|s| s.is_open()).cloned())
    }

    fn session(&self, id: SessionId) -> Result<CashSession> {
        self.sessions
            .get(&id)
            .cloned()
            .ok_or(LedgerError::SessionNotFound { id })
    }

    fn session_for_date(&self, date: NaiveDate) -> Result<Option<CashSession>> {
        Ok(self.sessions.values().find(|s| s.date == date).cloned())
    }

    fn sessions(&self, limit: usize) -> Result<Vec<CashSession>> {
        let mut result: Vec<CashSession> = self.sessions.values().cloned().collect();
        result.sort_by(|a, b| b.date.cmp(&a.date));
        result.truncate(limit);
        Ok(result)
    }

    fn payment(&self, id: PaymentId) -> Result<Payment> {
        self.payments
            .get(&id)
            .cloned()
            .ok_or(LedgerError::PaymentNotFound { id })
    }

    fn payments_for_loan(&self, loan: LoanId) -> Result<Vec<Payment>> {
        let mut result: Vec<Payment> = self
            .payments
            .values()
            .filter(|p| p.loan_id == loan && !p.voided)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(result)
    }

    fn payments_for_session(&self, session: SessionId) -> Result<Vec<Payment>> {
        let mut result: Vec<Payment> = self
            .payments
            .values()
            .filter(|p| p.session_id == session && !p.voided)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(result)
    }

    fn client(&self, id: ClientId) -> Result<ClientRecord> {
        self.clients
            .get(&id)
            .cloned()
            .ok_or(LedgerError::ClientNotFound { id })
    }

    fn config_value(&self, key: &str) -> Option<String> {
        self.config.get(key).cloned()
    }
}

impl LedgerState {
    /// increment-and-read a sequence counter, formatting the minted number
    fn mint_sequence(&mut self, seq_key: &str, prefix_key: &str, year: i32) -> Result<String> {
        let raw = self
            .config
            .get(seq_key)
            .cloned()
            .unwrap_or_else(|| "1".to_string());
        let sequence: u64 = raw.parse().map_err(|_| LedgerError::InvalidConfig {
            key: seq_key.to_string(),
            value: raw,
        })?;
        let prefix = self
            .config
            .get(prefix_key)
            .cloned()
            .unwrap_or_else(|| "SEQ".to_string());

        self.config
            .insert(seq_key.to_string(), (sequence + 1).to_string());
        Ok(config::format_sequence(&prefix, year, sequence))
    }
}

impl LedgerWriter for LedgerState {
    fn insert_loan(&mut self, loan: Loan, schedule: Vec<Installment>) -> Result<()> {
        if !self.clients.contains_key(&loan.client_id) {
            return Err(LedgerError::ClientNotFound {
                id: loan.client_id,
            });
        }
        for installment in schedule {
            debug_assert_eq!(installment.loan_id, loan.loan_id);
            self.installments
                .insert(installment.installment_id, installment);
        }
        self.loans.insert(loan.loan_id, loan);
        Ok(())
    }

    fn update_loan(&mut self, loan: &Loan) -> Result<()> {
        if !self.loans.contains_key(&loan.loan_id) {
            return Err(LedgerError::LoanNotFound { id: loan.loan_id });
        }
        self.loans.insert(loan.loan_id, loan.clone());
        Ok(())
    }

    fn update_installment(&mut self, installment: &Installment) -> Result<()> {
        if !self.installments.contains_key(&installment.installment_id) {
            return Err(LedgerError::InstallmentNotFound {
                id: installment.installment_id,
            });
        }
        self.installments
            .insert(installment.installment_id, installment.clone());
        Ok(())
    }

    fn insert_session(&mut self, session: CashSession) -> Result<()> {
        if self.sessions.values().any(|s| s.date == session.date) {
            return Err(LedgerError::SessionExistsForDate { date: session.date });
        }
        if session.status == SessionStatus::Open && self.sessions.values().any(|s| s.is_open()) {
            return Err(LedgerError::SessionAlreadyOpen);
        }
        self.sessions.insert(session.session_id, session);
        Ok(())
    }

    fn update_session(&mut self, session: &CashSession) -> Result<()> {
        if !self.sessions.contains_key(&session.session_id) {
            return Err(LedgerError::SessionNotFound {
                id: session.session_id,
            });
        }
        self.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    fn insert_payment(&mut self, payment: Payment) -> Result<()> {
        if self
            .payments
            .values()
            .any(|p| p.receipt_number == payment.receipt_number)
        {
            return Err(LedgerError::DuplicateReceipt {
                number: payment.receipt_number,
            });
        }
        if !self.sessions.contains_key(&payment.session_id) {
            return Err(LedgerError::SessionNotFound {
                id: payment.session_id,
            });
        }
        if !self.installments.contains_key(&payment.installment_id) {
            return Err(LedgerError::InstallmentNotFound {
                id: payment.installment_id,
            });
        }
        if !self.loans.contains_key(&payment.loan_id) {
            return Err(LedgerError::LoanNotFound {
                id: payment.loan_id,
            });
        }
        self.payments.insert(payment.payment_id, payment);
        Ok(())
    }

    fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        if !self.payments.contains_key(&payment.payment_id) {
            return Err(LedgerError::PaymentNotFound {
                id: payment.payment_id,
            });
        }
        self.payments.insert(payment.payment_id, payment.clone());
        Ok(())
    }

    fn set_config_value(&mut self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    fn mint_receipt_number(&mut self, year: i32) -> Result<String> {
        self.mint_sequence(config::keys::NEXT_RECEIPT_SEQ, config::keys::RECEIPT_PREFIX, year)
    }

    fn mint_loan_number(&mut self, year: i32) -> Result<String> {
        self.mint_sequence(config::keys::NEXT_LOAN_SEQ, config::keys::LOAN_PREFIX, year)
    }
}
