use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;

/// broad error families, matching how callers are expected to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// bad input, rejected before any computation or mutation
    Validation,
    /// operation not allowed in the current business state
    State,
    /// an id did not resolve
    NotFound,
    /// internal arithmetic guard
    Calculation,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid loan terms: {message}")]
    InvalidTerms { message: String },

    #[error("invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("allocation parts sum to {parts} but total is {total}")]
    AllocationMismatch { parts: Money, total: Money },

    #[error("no open cash session")]
    NoOpenSession,

    #[error("a cash session already exists for {date}")]
    SessionExistsForDate { date: NaiveDate },

    #[error("another cash session is already open")]
    SessionAlreadyOpen,

    #[error("cash session is already closed")]
    SessionAlreadyClosed,

    #[error("installment has no outstanding balance: {id}")]
    InstallmentSettled { id: Uuid },

    #[error("payment is already void: {id}")]
    PaymentAlreadyVoid { id: Uuid },

    #[error("loan not found: {id}")]
    LoanNotFound { id: Uuid },

    #[error("installment not found: {id}")]
    InstallmentNotFound { id: Uuid },

    #[error("installment {installment} does not belong to loan {loan}")]
    InstallmentLoanMismatch { installment: Uuid, loan: Uuid },

    #[error("loan has no pending installments: {id}")]
    NoPendingInstallments { id: Uuid },

    #[error("payment not found: {id}")]
    PaymentNotFound { id: Uuid },

    #[error("cash session not found: {id}")]
    SessionNotFound { id: Uuid },

    #[error("client not found: {id}")]
    ClientNotFound { id: Uuid },

    #[error("duplicate receipt number: {number}")]
    DuplicateReceipt { number: String },

    #[error("calculation error: {message}")]
    Calculation { message: String },
}

impl LedgerError {
    /// classify the error per the ledger's taxonomy
    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::InvalidTerms { .. }
            | LedgerError::InvalidAmount { .. }
            | LedgerError::InvalidConfig { .. }
            | LedgerError::AllocationMismatch { .. } => ErrorClass::Validation,

            LedgerError::NoOpenSession
            | LedgerError::SessionExistsForDate { .. }
            | LedgerError::SessionAlreadyOpen
            | LedgerError::SessionAlreadyClosed
            | LedgerError::InstallmentSettled { .. }
            | LedgerError::PaymentAlreadyVoid { .. }
            | LedgerError::NoPendingInstallments { .. }
            | LedgerError::DuplicateReceipt { .. } => ErrorClass::State,

            LedgerError::LoanNotFound { .. }
            | LedgerError::InstallmentNotFound { .. }
            | LedgerError::InstallmentLoanMismatch { .. }
            | LedgerError::PaymentNotFound { .. }
            | LedgerError::SessionNotFound { .. }
            | LedgerError::ClientNotFound { .. } => ErrorClass::NotFound,

            LedgerError::Calculation { .. } => ErrorClass::Calculation,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
