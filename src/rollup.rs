//! Fleet-wide billing roster: one balance row per billable member.
//!
//! Rows come from [`balance::compute`], the same aggregation the member
//! ledger uses, so a member's row always agrees with their own ledger.

use crate::balance::{self, Balance};
use crate::directory::{Member, MemberDirectory};
use crate::error::Result;
use crate::records::{Charge, DateRange, Payment, RecordFilter, format_money};
use crate::store::{RecordStore, RecordWatch, watch_records};
use crate::{MemberID, Money};
use chrono::NaiveDate;
use clap::ValueEnum;
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceRow {
    pub member: MemberID,
    pub member_no: String,
    pub rank: String,
    pub name: String,
    pub messing_total: Money,
    pub bar_total: Money,
    pub paid_total: Money,
    pub outstanding: Money,
}

impl BalanceRow {
    fn new(member: &Member, balance: Balance) -> Self {
        Self {
            member: member.id,
            member_no: member.member_no.clone(),
            rank: member.rank.clone(),
            name: member.name.clone(),
            messing_total: balance.messing_total,
            bar_total: balance.bar_total,
            paid_total: balance.paid_total,
            outstanding: balance.outstanding,
        }
    }

    fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.name.to_lowercase().contains(needle)
            || self.member_no.to_lowercase().contains(needle)
    }

    fn compare(&self, other: &Self, key: SortKey) -> Ordering {
        fn text(a: &str, b: &str) -> Ordering {
            a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
        }
        match key {
            SortKey::MemberNo => text(&self.member_no, &other.member_no),
            SortKey::Rank => text(&self.rank, &other.rank),
            SortKey::Name => text(&self.name, &other.name),
            SortKey::Messing => self.messing_total.cmp(&other.messing_total),
            SortKey::Bar => self.bar_total.cmp(&other.bar_total),
            SortKey::Paid => self.paid_total.cmp(&other.paid_total),
            SortKey::Outstanding => self.outstanding.cmp(&other.outstanding),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    MemberNo,
    Rank,
    Name,
    Messing,
    Bar,
    Paid,
    Outstanding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// How to present a rollup. Never changes the rollup itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupQuery {
    pub search: String,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl RollupQuery {
    pub fn sorted(sort: SortKey, order: SortOrder) -> Self {
        Self {
            search: String::new(),
            sort,
            order,
        }
    }

    pub fn search<S: Into<String>>(mut self, search: S) -> Self {
        self.search = search.into();
        self
    }
}

impl Default for RollupQuery {
    fn default() -> Self {
        Self::sorted(SortKey::Outstanding, SortOrder::Descending)
    }
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Member No")]
    member_no: &'a str,
    #[serde(rename = "Rank")]
    rank: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Messing")]
    messing: String,
    #[serde(rename = "Bar")]
    bar: String,
    #[serde(rename = "Paid")]
    paid: String,
    #[serde(rename = "Outstanding")]
    outstanding: String,
}

impl<'a> From<&'a BalanceRow> for ExportRow<'a> {
    fn from(row: &'a BalanceRow) -> Self {
        Self {
            member_no: &row.member_no,
            rank: &row.rank,
            name: &row.name,
            messing: format_money(row.messing_total),
            bar: format_money(row.bar_total),
            paid: format_money(row.paid_total),
            outstanding: format_money(row.outstanding),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rollup {
    pub range: DateRange,
    rows: Vec<BalanceRow>,
}

impl Rollup {
    /// Groups the records by member and folds each group with the shared
    /// balance computation. Records of non-billable members are ignored.
    pub fn from_records(
        members: &[Member],
        range: DateRange,
        charges: &[Charge],
        payments: &[Payment],
    ) -> Self {
        let mut grouped: BTreeMap<MemberID, (Vec<Charge>, Vec<Payment>)> = members
            .iter()
            .map(|member| (member.id, Default::default()))
            .collect();
        for charge in charges.iter().filter(|c| range.contains(c.date)) {
            if let Some((charges, _)) = grouped.get_mut(&charge.member) {
                charges.push(charge.clone());
            }
        }
        for payment in payments.iter().filter(|p| range.contains(p.date)) {
            if let Some((_, payments)) = grouped.get_mut(&payment.member) {
                payments.push(payment.clone());
            }
        }
        let rows = members
            .iter()
            .map(|member| {
                let balance = grouped
                    .get(&member.id)
                    .map(|(charges, payments)| balance::compute(charges, payments))
                    .unwrap_or_default();
                BalanceRow::new(member, balance)
            })
            .collect();
        Self { range, rows }
    }

    /// Rows in directory order.
    pub fn rows(&self) -> &[BalanceRow] {
        &self.rows
    }

    pub fn row(&self, member: MemberID) -> Option<&BalanceRow> {
        self.rows.iter().find(|row| row.member == member)
    }

    /// Sum over every member, regardless of any view filter.
    pub fn total_outstanding(&self) -> Money {
        self.rows.iter().map(|row| row.outstanding).sum()
    }

    /// Filtered, sorted view. Ties always fall back to member id, ascending.
    pub fn view(&self, query: &RollupQuery) -> Vec<&BalanceRow> {
        let needle = query.search.trim().to_lowercase();
        let mut rows: Vec<&BalanceRow> =
            self.rows.iter().filter(|row| row.matches(&needle)).collect();
        rows.sort_by(|a, b| {
            let ordering = match query.order {
                SortOrder::Ascending => a.compare(b, query.sort),
                SortOrder::Descending => b.compare(a, query.sort),
            };
            ordering.then(a.member.cmp(&b.member))
        });
        rows
    }

    /// Header plus one line per row of `view(query)`, amounts fixed to two decimals.
    pub fn write_csv<W: std::io::Write>(&self, query: &RollupQuery, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        let rows = self.view(query);
        if rows.is_empty() {
            writer.write_record([
                "Member No",
                "Rank",
                "Name",
                "Messing",
                "Bar",
                "Paid",
                "Outstanding",
            ])?;
        }
        for row in rows {
            writer.serialize(ExportRow::from(row))?;
        }
        writer.flush()?;
        Ok(())
    }
}

pub fn export_filename(report_date: NaiveDate) -> String {
    format!("mess_billing_summary_{}.csv", report_date.format("%Y-%m-%d"))
}

pub fn build(store: &dyn RecordStore, directory: &dyn MemberDirectory, range: DateRange) -> Rollup {
    let filter = RecordFilter::all().within(range);
    Rollup::from_records(
        &directory.members(),
        range,
        &store.charges(&filter),
        &store.payments(&filter),
    )
}

#[must_use = "dropping a watch releases it immediately"]
#[derive(Debug)]
pub struct RollupWatch {
    records: RecordWatch,
}

impl RollupWatch {
    pub fn cancel(self) {
        self.records.cancel();
    }
}

/// Recomputes the whole rollup on every charge or payment notification. The
/// member list is read once, when the watch starts: records of members
/// registered later stay out of the rows until the caller watches again.
pub fn watch<L>(
    store: &dyn RecordStore,
    directory: &dyn MemberDirectory,
    range: DateRange,
    mut listener: L,
) -> RollupWatch
where
    L: FnMut(&Rollup) + 'static,
{
    let members = directory.members();
    let filter = RecordFilter::all().within(range);
    let records = watch_records(store, filter, move |charges, payments| {
        debug!("Recomputing rollup over {} members", members.len());
        listener(&Rollup::from_records(&members, range, charges, payments));
    });
    RollupWatch { records }
}
