use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};

/// unique identifier for a loan
pub type LoanId = Uuid;
/// unique identifier for an installment
pub type InstallmentId = Uuid;
/// unique identifier for a cash session
pub type SessionId = Uuid;
/// unique identifier for a payment
pub type PaymentId = Uuid;
/// unique identifier for a client
pub type ClientId = Uuid;

/// period unit a nominal rate is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUnit {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Annual,
}

impl RateUnit {
    /// fixed day count per unit, used for compound rate conversion
    pub fn days(&self) -> u32 {
        match self {
            RateUnit::Daily => 1,
            RateUnit::Weekly => 7,
            RateUnit::Biweekly => 15,
            RateUnit::Monthly => 30,
            RateUnit::Annual => 360,
        }
    }
}

/// payment frequency of a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl PaymentFrequency {
    /// fixed day count per period, used for compound rate conversion
    pub fn days(&self) -> u32 {
        match self {
            PaymentFrequency::Daily => 1,
            PaymentFrequency::Weekly => 7,
            PaymentFrequency::Biweekly => 15,
            PaymentFrequency::Monthly => 30,
        }
    }
}

/// amortization method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmortizationMethod {
    /// constant payment amount throughout the term (French system)
    French,
    /// interest only each period, principal due with the last one
    InterestOnly,
}

/// loan status
///
/// the ledger only ever moves loans between Active and Settled;
/// Current, Overdue and Refinanced are assigned by outside processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    Active,
    Current,
    Overdue,
    Settled,
    Refinanced,
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    Pending,
    Partial,
    /// assigned by an external scheduler, never derived by the ledger
    Overdue,
    Paid,
}

impl InstallmentStatus {
    /// true when the installment can still receive payments
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            InstallmentStatus::Pending | InstallmentStatus::Partial | InstallmentStatus::Overdue
        )
    }
}

/// cash session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Open,
    Closed,
}

/// payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Other,
}

/// what kind of collection a payment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentKind {
    /// standard next-installment collection
    Installment,
    /// part of a full early payoff
    Payoff,
}

/// a loan with its computed schedule aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: LoanId,
    pub client_id: ClientId,
    pub loan_number: String,
    pub principal: Money,
    pub rate: Rate,
    pub rate_unit: RateUnit,
    pub term: u32,
    pub frequency: PaymentFrequency,
    pub method: AmortizationMethod,
    pub start_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub base_installment: Money,
    pub total_interest: Money,
    pub total_payable: Money,
    pub status: LoanStatus,
    pub remaining_balance: Money,
    pub created_at: DateTime<Utc>,
    pub notes: String,
}

impl Loan {
    /// true when the loan is fully settled
    pub fn is_settled(&self) -> bool {
        self.status == LoanStatus::Settled
    }
}

/// one scheduled payment obligation of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub installment_id: InstallmentId,
    pub loan_id: LoanId,
    /// 1-based position in the schedule, unique per loan
    pub number: u32,
    pub due_date: NaiveDate,
    pub total_due: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    /// schedule balance after this installment
    pub balance_after: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub late_fee_paid: Money,
    pub status: InstallmentStatus,
    pub paid_date: Option<NaiveDate>,
}

impl Installment {
    /// unpaid portion of the scheduled amount (principal + interest)
    pub fn outstanding(&self) -> Money {
        (self.total_due - self.principal_paid - self.interest_paid).floor_zero()
    }

    /// principal still owed on this installment
    pub fn principal_outstanding(&self) -> Money {
        (self.principal_portion - self.principal_paid).floor_zero()
    }

    /// interest still owed on this installment
    pub fn interest_outstanding(&self) -> Money {
        (self.interest_portion - self.interest_paid).floor_zero()
    }
}

/// one calendar day's cash register aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashSession {
    pub session_id: SessionId,
    pub date: NaiveDate,
    pub opening_float: Money,
    pub closing_float: Option<Money>,
    pub total_collected: Money,
    pub status: SessionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub notes: String,
}

impl CashSession {
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

/// how a collected amount splits into principal, interest and late fee
///
/// replaces the loosely typed payment dictionaries of older systems:
/// the total is always the exact sum of the parts, to the cent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PaymentAllocation {
    pub principal: Money,
    pub interest: Money,
    pub late_fee: Money,
    pub total: Money,
}

impl PaymentAllocation {
    /// build an allocation; the total is derived from the parts
    pub fn new(principal: Money, interest: Money, late_fee: Money) -> Self {
        Self {
            principal,
            interest,
            late_fee,
            total: principal + interest + late_fee,
        }
    }

    /// build an allocation from parts and a stated total, rejecting mismatches
    pub fn from_parts(principal: Money, interest: Money, late_fee: Money, total: Money) -> Result<Self> {
        let sum = principal + interest + late_fee;
        if sum != total {
            return Err(LedgerError::AllocationMismatch { parts: sum, total });
        }
        Ok(Self {
            principal,
            interest,
            late_fee,
            total,
        })
    }
}

/// a collected payment, immutable except for the one-way void transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub session_id: SessionId,
    pub installment_id: InstallmentId,
    pub loan_id: LoanId,
    pub client_id: ClientId,
    pub kind: PaymentKind,
    pub allocation: PaymentAllocation,
    pub receipt_number: String,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub voided: bool,
    pub void_reason: Option<String>,
    pub voided_at: Option<DateTime<Utc>>,
    pub notes: String,
}

/// client identity as seen by the ledger (read-only denormalization)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: ClientId,
    pub name: String,
    pub document: String,
}
