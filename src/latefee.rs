use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::Installment;

/// late-fee accrual policy: simple daily interest after a grace period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LateFeePolicy {
    /// daily rate as a decimal, e.g. 0.005 for 0.5% per day
    pub daily_rate: Rate,
    /// days past the due date during which no fee accrues
    pub grace_days: u32,
}

/// accrued late fee for one installment at a given date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LateFeeQuote {
    pub days_late: u32,
    pub amount: Money,
    /// last date without penalty
    pub grace_deadline: NaiveDate,
}

/// late fee on an outstanding balance, recomputed fresh at every quote.
/// simple accrual on the instant balance, never compounded or persisted.
pub fn late_fee(
    outstanding: Money,
    due_date: NaiveDate,
    calc_date: NaiveDate,
    policy: &LateFeePolicy,
) -> LateFeeQuote {
    let grace_deadline = due_date
        .checked_add_days(Days::new(policy.grace_days as u64))
        .unwrap_or(due_date);

    if !outstanding.is_positive() || calc_date <= grace_deadline {
        return LateFeeQuote {
            days_late: 0,
            amount: Money::ZERO,
            grace_deadline,
        };
    }

    let days_late = (calc_date - grace_deadline).num_days() as u32;
    let amount = Money::from_decimal(
        outstanding.as_decimal() * policy.daily_rate.as_decimal() * Decimal::from(days_late),
    );

    LateFeeQuote {
        days_late,
        amount,
        grace_deadline,
    }
}

/// an installment enriched with its live late-fee quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedInstallment {
    pub installment: Installment,
    /// unpaid portion of the scheduled amount
    pub outstanding: Money,
    pub days_late: u32,
    pub late_fee: Money,
    /// amount currently owed: outstanding plus late fee
    pub total_owed: Money,
    pub grace_deadline: NaiveDate,
}

/// enrich a single installment with its fee as of `calc_date`
pub fn quote_installment(
    installment: &Installment,
    calc_date: NaiveDate,
    policy: &LateFeePolicy,
) -> QuotedInstallment {
    let outstanding = installment.outstanding();
    let fee = late_fee(outstanding, installment.due_date, calc_date, policy);

    QuotedInstallment {
        installment: installment.clone(),
        outstanding,
        days_late: fee.days_late,
        late_fee: fee.amount,
        total_owed: outstanding + fee.amount,
        grace_deadline: fee.grace_deadline,
    }
}

/// enrich every pending installment of a loan
pub fn quote_loan(
    pending: &[Installment],
    calc_date: NaiveDate,
    policy: &LateFeePolicy,
) -> Vec<QuotedInstallment> {
    pending
        .iter()
        .map(|i| quote_installment(i, calc_date, policy))
        .collect()
}

/// full early-payoff breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffQuote {
    pub principal: Money,
    pub pending_interest: Money,
    pub late_fees: Money,
    pub total: Money,
}

/// total payoff = remaining principal + unpaid interest portions + late fees
pub fn quote_payoff(
    remaining_principal: Money,
    pending: &[Installment],
    calc_date: NaiveDate,
    policy: &LateFeePolicy,
) -> PayoffQuote {
    let quotes = quote_loan(pending, calc_date, policy);

    let pending_interest: Money = pending.iter().map(|i| i.interest_outstanding()).sum();
    let late_fees: Money = quotes.iter().map(|q| q.late_fee).sum();

    PayoffQuote {
        principal: remaining_principal,
        pending_interest,
        late_fees,
        total: remaining_principal + pending_interest + late_fees,
    }
}
