pub mod config;
pub mod decimal;
pub mod errors;
pub mod latefee;
pub mod ledger;
pub mod schedule;
pub mod state;
pub mod store;
pub mod types;

// re-export key types
pub use decimal::{Money, Rate};
pub use errors::{ErrorClass, LedgerError, Result};
pub use latefee::{LateFeePolicy, LateFeeQuote, PayoffQuote, QuotedInstallment};
pub use ledger::PaymentLedger;
pub use schedule::{LoanTerms, Schedule, ScheduleRow};
pub use store::{LedgerReader, LedgerStore, LedgerWriter, MemoryStore};
pub use types::{
    AmortizationMethod, CashSession, ClientRecord, Installment, InstallmentStatus, Loan,
    LoanStatus, Payment, PaymentAllocation, PaymentFrequency, PaymentKind, PaymentMethod,
    RateUnit, SessionStatus,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
