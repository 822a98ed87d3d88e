use crate::error::ValidationError;
use crate::records::{DateRange, parse_day};
use crate::rollup::{RollupQuery, SortKey, SortOrder};
use crate::store::StoreSettings;
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;

/// Builds the mess billing roster from member and record files.
#[derive(Debug, Parser)]
#[command(name = "mess-ledger", version)]
pub struct Config {
    /// Member directory CSV (id,member_no,rank,name,role)
    #[arg(long, env = "MESS_LEDGER_MEMBERS")]
    pub members: PathBuf,

    /// Record history CSV (kind,member,date,category,label,unit_cost,quantity,amount)
    #[arg(long, env = "MESS_LEDGER_RECORDS")]
    pub records: PathBuf,

    /// Case-insensitive match on member name or number
    #[arg(long, default_value = "")]
    pub search: String,

    #[arg(long, value_enum, default_value_t = SortKey::Outstanding)]
    pub sort: SortKey,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub ascending: bool,

    /// First calendar day to include (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<String>,

    /// Last calendar day to include (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<String>,

    /// Directory to write the export into; stdout when absent
    #[arg(long, env = "MESS_LEDGER_OUT")]
    pub out: Option<PathBuf>,

    /// Report date used in the export filename; defaults to today
    #[arg(long)]
    pub date: Option<String>,

    /// Maximum records per store commit
    #[arg(long, env = "MESS_LEDGER_BATCH_LIMIT", default_value_t = 500)]
    pub batch_limit: usize,
}

impl Config {
    pub fn range(&self) -> Result<DateRange, ValidationError> {
        DateRange::parse(self.from.as_deref(), self.to.as_deref())
    }

    pub fn report_date(&self) -> Result<NaiveDate, ValidationError> {
        match &self.date {
            Some(date) => parse_day(date),
            None => Ok(Local::now().date_naive()),
        }
    }

    pub fn query(&self) -> RollupQuery {
        let order = if self.ascending {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        };
        RollupQuery::sorted(self.sort, order).search(self.search.clone())
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            batch_limit: self.batch_limit,
        }
    }
}
