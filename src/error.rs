use crate::{BrandID, MemberID, Money};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("record store rejected the write: {0}")]
    Store(#[from] StoreError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Store failures leave the operator's input intact and can be retried as-is.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LedgerError::Store(_))
    }
}

/// Input rejected before any store interaction.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("amount must be greater than zero, got {0}")]
    NonPositiveAmount(Money),

    #[error("amount exceeds the ledger limit of 1000000000000000: {0}")]
    AmountTooLarge(Money),

    #[error("not a valid amount: {0:?}")]
    InvalidAmount(String),

    #[error("description must not be empty")]
    EmptyDescription,

    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),

    #[error("a charge needs at least one line item")]
    NoLineItems,

    #[error("charge total must not be negative, got {0}")]
    NegativeTotal(Money),

    #[error("stated total {stated} does not match line items ({computed})")]
    TotalMismatch { stated: Money, computed: Money },

    #[error("unknown member: {0}")]
    UnknownMember(MemberID),

    #[error("unknown inventory item: {0}")]
    UnknownBrand(BrandID),

    #[error("inventory item is no longer available: {0}")]
    BrandUnavailable(String),

    #[error("no members selected")]
    EmptySelection,

    #[error("none of the {0} selected rows has a positive cost")]
    NoPostableRows(usize),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("not a calendar day: {0:?}")]
    InvalidDate(String),

    #[error("date range starts after it ends: {start} > {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("record store is unavailable")]
    Unavailable,

    #[error("batch of {size} records exceeds the store limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("batch is empty")]
    EmptyBatch,
}

pub type Result<T> = std::result::Result<T, LedgerError>;
