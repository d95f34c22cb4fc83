use rust_decimal::Decimal;
use std::str::FromStr;

use crate::decimal::Rate;
use crate::errors::{LedgerError, Result};
use crate::latefee::LateFeePolicy;
use crate::store::LedgerReader;

/// configuration keys shared with the external configuration store
pub mod keys {
    /// late-fee rate as percent per day, e.g. "0.5"
    pub const LATE_FEE_DAILY_RATE: &str = "late_fee_daily_rate";
    /// grace period length in days
    pub const GRACE_DAYS: &str = "grace_days";
    pub const CURRENCY_SYMBOL: &str = "currency_symbol";
    pub const AGENCY_NAME: &str = "agency_name";
    /// next value of the receipt sequence counter
    pub const NEXT_RECEIPT_SEQ: &str = "next_receipt_seq";
    /// next value of the loan-number sequence counter
    pub const NEXT_LOAN_SEQ: &str = "next_loan_seq";
    pub const RECEIPT_PREFIX: &str = "receipt_prefix";
    pub const LOAN_PREFIX: &str = "loan_prefix";
}

/// default configuration values seeded into a fresh store
pub fn default_values() -> Vec<(&'static str, &'static str)> {
    vec![
        (keys::LATE_FEE_DAILY_RATE, "0.5"),
        (keys::GRACE_DAYS, "3"),
        (keys::CURRENCY_SYMBOL, "RD$"),
        (keys::AGENCY_NAME, "Agencia de Préstamos"),
        (keys::NEXT_RECEIPT_SEQ, "1"),
        (keys::NEXT_LOAN_SEQ, "1"),
        (keys::RECEIPT_PREFIX, "REC"),
        (keys::LOAN_PREFIX, "PREST"),
    ]
}

/// policy values the ledger re-reads on every quote, since the
/// configuration store is externally mutable
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPolicy {
    pub late_fee: LateFeePolicy,
    pub currency_symbol: String,
}

impl LedgerPolicy {
    /// load and parse policy values from the configuration store
    pub fn load<R: LedgerReader + ?Sized>(reader: &R) -> Result<LedgerPolicy> {
        let rate_pct = parse_decimal(reader, keys::LATE_FEE_DAILY_RATE)?;
        let grace = parse_u32(reader, keys::GRACE_DAYS)?;
        let currency_symbol = reader
            .config_value(keys::CURRENCY_SYMBOL)
            .unwrap_or_default();

        Ok(LedgerPolicy {
            late_fee: LateFeePolicy {
                daily_rate: Rate::from_percentage(rate_pct),
                grace_days: grace,
            },
            currency_symbol,
        })
    }
}

/// format a minted sequence number: `<PREFIX>-<year>-<5-digit sequence>`
pub fn format_sequence(prefix: &str, year: i32, sequence: u64) -> String {
    format!("{prefix}-{year}-{sequence:05}")
}

fn required<R: LedgerReader + ?Sized>(reader: &R, key: &str) -> Result<String> {
    reader
        .config_value(key)
        .ok_or_else(|| LedgerError::InvalidConfig {
            key: key.to_string(),
            value: "<missing>".to_string(),
        })
}

fn parse_decimal<R: LedgerReader + ?Sized>(reader: &R, key: &str) -> Result<Decimal> {
    let raw = required(reader, key)?;
    Decimal::from_str(&raw).map_err(|_| LedgerError::InvalidConfig {
        key: key.to_string(),
        value: raw,
    })
}

fn parse_u32<R: LedgerReader + ?Sized>(reader: &R, key: &str) -> Result<u32> {
    let raw = required(reader, key)?;
    raw.parse().map_err(|_| LedgerError::InvalidConfig {
        key: key.to_string(),
        value: raw,
    })
}
