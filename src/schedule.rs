use chrono::{Days, Months, NaiveDate};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{AmortizationMethod, PaymentFrequency, RateUnit};

/// terms a schedule is generated from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    /// nominal rate expressed in `rate_unit` terms
    pub rate: Rate,
    pub rate_unit: RateUnit,
    /// number of payment periods
    pub term: u32,
    pub frequency: PaymentFrequency,
    pub method: AmortizationMethod,
    pub start_date: NaiveDate,
}

impl LoanTerms {
    /// reject non-positive principal, rate or term before any computation
    pub fn validate(&self) -> Result<()> {
        if !self.principal.is_positive() {
            return Err(LedgerError::InvalidTerms {
                message: format!("principal must be positive, got {}", self.principal),
            });
        }
        if !self.rate.is_positive() {
            return Err(LedgerError::InvalidTerms {
                message: format!("rate must be positive, got {}", self.rate),
            });
        }
        if self.term == 0 {
            return Err(LedgerError::InvalidTerms {
                message: "term must be at least one period".to_string(),
            });
        }
        Ok(())
    }
}

/// one row of an amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    /// 1-based period number
    pub number: u32,
    pub due_date: NaiveDate,
    pub total_due: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    /// schedule balance after this row
    pub balance_after: Money,
}

/// generated amortization schedule with aggregate totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub rows: Vec<ScheduleRow>,
    /// payment amount of period 1 (fixed for the French method)
    pub base_installment: Money,
    pub total_interest: Money,
    pub total_payable: Money,
    pub maturity_date: NaiveDate,
    /// effective rate per payment period
    pub period_rate: Rate,
}

impl Schedule {
    /// generate a schedule from loan terms; pure, no side effects
    pub fn generate(terms: &LoanTerms) -> Result<Schedule> {
        terms.validate()?;

        let period_rate = convert_rate(terms.rate, terms.rate_unit, terms.frequency)?;
        let rows = match terms.method {
            AmortizationMethod::French => french_rows(terms, period_rate)?,
            AmortizationMethod::InterestOnly => interest_only_rows(terms, period_rate)?,
        };

        let total_interest: Money = rows.iter().map(|r| r.interest_portion).sum();
        let maturity_date = rows
            .last()
            .map(|r| r.due_date)
            .ok_or_else(|| LedgerError::Calculation {
                message: "empty schedule".to_string(),
            })?;

        Ok(Schedule {
            base_installment: rows[0].total_due,
            total_interest,
            total_payable: terms.principal + total_interest,
            maturity_date,
            period_rate,
            rows,
        })
    }
}

/// convert a nominal rate to the payment-frequency rate by compound
/// equivalence: r_freq = (1 + r)^(days(freq) / days(unit)) - 1
pub fn convert_rate(rate: Rate, unit: RateUnit, frequency: PaymentFrequency) -> Result<Rate> {
    let exponent = Decimal::from(frequency.days()) / Decimal::from(unit.days());
    let base = Decimal::ONE + rate.as_decimal();
    let factor = base
        .checked_powd(exponent)
        .ok_or_else(|| LedgerError::Calculation {
            message: format!("rate conversion overflow for {rate}"),
        })?;
    Ok(Rate::from_decimal(factor - Decimal::ONE))
}

/// due date of period n (1-indexed) from the start date
pub fn due_date(start: NaiveDate, frequency: PaymentFrequency, n: u32) -> Result<NaiveDate> {
    let date = match frequency {
        PaymentFrequency::Daily => start.checked_add_days(Days::new(n as u64)),
        PaymentFrequency::Weekly => start.checked_add_days(Days::new(7 * n as u64)),
        PaymentFrequency::Biweekly => start.checked_add_days(Days::new(15 * n as u64)),
        // calendar months, clamped to the end of shorter months
        PaymentFrequency::Monthly => start.checked_add_months(Months::new(n)),
    };
    date.ok_or_else(|| LedgerError::Calculation {
        message: format!("due date out of range at period {n}"),
    })
}

/// constant-payment (French) schedule
fn french_rows(terms: &LoanTerms, period_rate: Rate) -> Result<Vec<ScheduleRow>> {
    let i = period_rate.as_decimal();
    let n = terms.term;
    let payment = french_payment(terms.principal, i, n);

    let mut rows = Vec::with_capacity(n as usize);
    let mut balance = terms.principal;

    for k in 1..=n {
        let interest = Money::from_decimal(balance.as_decimal() * i);
        let mut principal = payment - interest;
        let mut total = payment;

        // last period absorbs accumulated rounding drift
        if k == n {
            principal = balance;
            total = principal + interest;
        }

        balance = (balance - principal).floor_zero();

        rows.push(ScheduleRow {
            number: k,
            due_date: due_date(terms.start_date, terms.frequency, k)?,
            total_due: total,
            principal_portion: principal,
            interest_portion: interest,
            balance_after: balance,
        });
    }

    Ok(rows)
}

/// fixed payment amount: A = P * i * (1+i)^n / ((1+i)^n - 1), or P/n at i = 0
fn french_payment(principal: Money, i: Decimal, n: u32) -> Money {
    if i.is_zero() {
        return principal / Decimal::from(n);
    }

    let mut compound = Decimal::ONE;
    let base = Decimal::ONE + i;
    for _ in 0..n {
        compound *= base;
    }

    let numerator = principal.as_decimal() * i * compound;
    Money::from_decimal(numerator / (compound - Decimal::ONE))
}

/// interest-only schedule: principal stays untouched until the last period
fn interest_only_rows(terms: &LoanTerms, period_rate: Rate) -> Result<Vec<ScheduleRow>> {
    let i = period_rate.as_decimal();
    let n = terms.term;
    let interest = Money::from_decimal(terms.principal.as_decimal() * i);

    let mut rows = Vec::with_capacity(n as usize);

    for k in 1..=n {
        let last = k == n;
        let (total, principal, balance) = if last {
            (terms.principal + interest, terms.principal, Money::ZERO)
        } else {
            (interest, Money::ZERO, terms.principal)
        };

        rows.push(ScheduleRow {
            number: k,
            due_date: due_date(terms.start_date, terms.frequency, k)?,
            total_due: total,
            principal_portion: principal,
            interest_portion: interest,
            balance_after: balance,
        });
    }

    Ok(rows)
}
