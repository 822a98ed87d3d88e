//! Financial records as the store holds them, and the drafts that become them.
//!
//! Charges and payments are immutable once committed. Corrections are new
//! records, never edits.

use crate::error::ValidationError;
use crate::{MemberID, Money, RecordID};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Messing,
    Bar,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Messing => f.write_str("Messing"),
            Category::Bar => f.write_str("Bar"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub label: String,
    pub unit_cost: Money,
    pub quantity: u32,
}

impl LineItem {
    pub fn new<S: Into<String>>(label: S, unit_cost: Money, quantity: u32) -> Self {
        Self {
            label: label.into(),
            unit_cost,
            quantity,
        }
    }

    /// Unit cost times quantity, refused when it exceeds [`MAX_AMOUNT`].
    pub fn cost(&self) -> Result<Money, ValidationError> {
        self.unit_cost
            .checked_mul(Money::from(self.quantity))
            .ok_or(ValidationError::AmountTooLarge(self.unit_cost))
            .and_then(check_amount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Charge {
    pub id: RecordID,
    pub member: MemberID,
    pub date: NaiveDate,
    pub category: Category,
    pub items: Vec<LineItem>,
    /// Frozen at write time; never recomputed from current prices.
    pub total_cost: Money,
    pub created_at: DateTime<Utc>,
}

impl Charge {
    /// Line-item labels joined for display, with quantities above one noted.
    pub fn description(&self) -> String {
        self.items
            .iter()
            .map(|item| match item.quantity {
                0 | 1 => item.label.clone(),
                n => format!("{} (x{n})", item.label),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: RecordID,
    pub member: MemberID,
    pub date: NaiveDate,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

/// A borrowed view of either kind of committed record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record<'a> {
    Charge(&'a Charge),
    Payment(&'a Payment),
}

/// A charge before the store has assigned its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCharge {
    pub member: MemberID,
    pub date: NaiveDate,
    pub category: Category,
    pub items: Vec<LineItem>,
    pub total_cost: Money,
}

impl NewCharge {
    /// One line item of quantity one; the total is the cost itself.
    pub fn single<S: Into<String>>(
        member: MemberID,
        date: NaiveDate,
        category: Category,
        label: S,
        cost: Money,
    ) -> Self {
        Self {
            member,
            date,
            category,
            items: vec![LineItem::new(label, cost, 1)],
            total_cost: cost,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::NoLineItems);
        }
        if let Some(item) = self.items.iter().find(|item| item.quantity < 1) {
            return Err(ValidationError::InvalidQuantity(item.quantity));
        }
        if self.total_cost < Money::ZERO {
            return Err(ValidationError::NegativeTotal(self.total_cost));
        }
        check_amount(self.total_cost)?;
        let mut computed = Money::ZERO;
        for item in &self.items {
            computed = computed
                .checked_add(item.cost()?)
                .ok_or(ValidationError::AmountTooLarge(self.total_cost))?;
        }
        if computed != self.total_cost {
            return Err(ValidationError::TotalMismatch {
                stated: self.total_cost,
                computed,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub member: MemberID,
    pub date: NaiveDate,
    pub amount: Money,
}

impl NewPayment {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount <= Money::ZERO {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        check_amount(self.amount)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewRecord {
    Charge(NewCharge),
    Payment(NewPayment),
}

impl NewRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            NewRecord::Charge(charge) => charge.validate(),
            NewRecord::Payment(payment) => payment.validate(),
        }
    }
}

/// Inclusive calendar-day range. An open end means "all history" on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, ValidationError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ValidationError::InvertedRange { start, end });
            }
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, ValidationError> {
        Self::new(start.map(parse_day).transpose()?, end.map(parse_day).transpose()?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub member: Option<MemberID>,
    pub range: DateRange,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn member(member: MemberID) -> Self {
        Self {
            member: Some(member),
            range: DateRange::all(),
        }
    }

    pub fn within(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn matches(&self, member: MemberID, date: NaiveDate) -> bool {
        self.member.is_none_or(|m| m == member) && self.range.contains(date)
    }
}

pub fn parse_day(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::from_str(value.trim()).map_err(|_| ValidationError::InvalidDate(value.to_string()))
}

/// Largest single amount the ledger accepts (10^15). Keeps every balance fold
/// far inside `Decimal`'s range however many records a member accumulates.
pub const MAX_AMOUNT: Money = Money::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

pub fn check_amount(amount: Money) -> Result<Money, ValidationError> {
    if amount.abs() > MAX_AMOUNT {
        return Err(ValidationError::AmountTooLarge(amount));
    }
    Ok(amount)
}

/// Rounds to the currency's minor unit (two decimal places).
pub fn round_money(amount: Money) -> Money {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parses operator input as an amount in minor-unit precision.
pub fn parse_amount(value: &str) -> Result<Money, ValidationError> {
    let amount = Money::from_str(value.trim())
        .map(round_money)
        .map_err(|_| ValidationError::InvalidAmount(value.to_string()))?;
    check_amount(amount)
}

pub fn parse_positive_amount(value: &str) -> Result<Money, ValidationError> {
    let amount = parse_amount(value)?;
    if amount <= Money::ZERO {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    Ok(amount)
}

/// Fixed two-decimal rendering used by every export.
pub fn format_money(amount: Money) -> String {
    let mut amount = round_money(amount);
    amount.rescale(2);
    amount.to_string()
}
