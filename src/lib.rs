use crate::records::Record;
use rust_decimal::Decimal;

pub mod balance;
pub mod bulk;
pub mod config;
pub mod directory;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod records;
pub mod rollup;
pub mod store;
pub mod subscription;

pub type MemberID = u32;
pub type RecordID = u64;
pub type BrandID = u32;
pub type Money = Decimal;

/// Folds one record at a time into an accumulated read model.
pub trait Projector {
    fn project(&mut self, record: Record<'_>);
}
