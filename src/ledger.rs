use crate::balance::{self, Balance};
use crate::directory::{Member, MemberDirectory, Role};
use crate::error::{Result, ValidationError};
use crate::inventory::{Inventory, UnitType};
use crate::records::{
    Category, Charge, DateRange, LineItem, NewCharge, NewPayment, Payment, RecordFilter,
    format_money, round_money,
};
use crate::rollup::{self, Rollup};
use crate::store::{RecordStore, RecordWatch, watch_records};
use crate::{BrandID, MemberID, Money, RecordID};
use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use serde::Serialize;

/// One member's charges and payments, newest first, with their balance.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberLedger {
    pub member: MemberID,
    pub range: DateRange,
    pub charges: Vec<Charge>,
    pub payments: Vec<Payment>,
    pub balance: Balance,
}

impl MemberLedger {
    pub fn from_records(
        member: MemberID,
        range: DateRange,
        mut charges: Vec<Charge>,
        mut payments: Vec<Payment>,
    ) -> Self {
        charges.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        payments.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        let balance = balance::compute(&charges, &payments);
        Self {
            member,
            range,
            charges,
            payments,
            balance,
        }
    }

    pub fn charges_in(&self, category: Category) -> impl Iterator<Item = &Charge> {
        self.charges
            .iter()
            .filter(move |charge| charge.category == category)
    }

    /// Charges dated in the calendar month of `today`, up to and including it.
    /// Payments settle the running balance, not a month.
    pub fn month_to_date(&self, today: NaiveDate) -> Money {
        self.charges
            .iter()
            .filter(|charge| {
                charge.date.year() == today.year()
                    && charge.date.month() == today.month()
                    && charge.date <= today
            })
            .map(|charge| charge.total_cost)
            .sum()
    }

    /// `Date,Description,Category,Cost` for every charge in the view. An empty
    /// view still gets the header row.
    pub fn write_statement_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        if self.charges.is_empty() {
            writer.write_record(["Date", "Description", "Category", "Cost"])?;
        }
        for charge in &self.charges {
            writer.serialize(StatementRow {
                date: charge.date,
                description: charge.description(),
                category: charge.category.to_string(),
                cost: format_money(charge.total_cost),
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// `history_<start>_to_<end>.csv`; an open start reads `all`, an open end
/// falls back to `today`.
pub fn statement_filename(range: DateRange, today: NaiveDate) -> String {
    let start = range
        .start
        .map_or_else(|| "all".to_string(), |start| start.format("%Y-%m-%d").to_string());
    let end = range.end.unwrap_or(today).format("%Y-%m-%d");
    format!("history_{start}_to_{end}.csv")
}

#[derive(Debug, Serialize)]
struct StatementRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Category")]
    category: String,
    #[serde(rename = "Cost")]
    cost: String,
}

/// Live member ledger. Cancel it when the member is deselected or the view
/// closes; watching another member means cancelling this one first.
#[must_use = "dropping a watch releases it immediately"]
#[derive(Debug)]
pub struct LedgerWatch {
    member: MemberID,
    records: RecordWatch,
}

impl LedgerWatch {
    pub fn member(&self) -> MemberID {
        self.member
    }

    pub fn cancel(self) {
        self.records.cancel();
    }
}

/// Entry points for reading and posting to member accounts.
pub struct Ledger<'a> {
    store: &'a dyn RecordStore,
    inventory: &'a dyn Inventory,
    directory: &'a dyn MemberDirectory,
}

impl<'a> Ledger<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        inventory: &'a dyn Inventory,
        directory: &'a dyn MemberDirectory,
    ) -> Self {
        Self {
            store,
            inventory,
            directory,
        }
    }

    fn billable(&self, member: MemberID) -> std::result::Result<Member, ValidationError> {
        self.directory
            .lookup(member)
            .filter(|m| m.role == Role::Member)
            .ok_or(ValidationError::UnknownMember(member))
    }

    pub fn member_ledger(&self, member: MemberID, range: DateRange) -> Result<MemberLedger> {
        self.billable(member)?;
        let filter = RecordFilter::member(member).within(range);
        Ok(MemberLedger::from_records(
            member,
            range,
            self.store.charges(&filter),
            self.store.payments(&filter),
        ))
    }

    /// Streams `member`'s ledger, recomputed from the full record sets on every
    /// change to either of them.
    pub fn watch_member<L>(
        &self,
        member: MemberID,
        range: DateRange,
        mut listener: L,
    ) -> Result<LedgerWatch>
    where
        L: FnMut(&MemberLedger) + 'static,
    {
        self.billable(member)?;
        let filter = RecordFilter::member(member).within(range);
        let records = watch_records(self.store, filter, move |charges, payments| {
            debug!("Recomputing ledger for member {member}");
            let view =
                MemberLedger::from_records(member, range, charges.to_vec(), payments.to_vec());
            listener(&view);
        });
        Ok(LedgerWatch { member, records })
    }

    /// Free-form messing entry for one member.
    pub fn add_charge(
        &self,
        member: MemberID,
        description: &str,
        cost: Money,
        date: NaiveDate,
    ) -> Result<RecordID> {
        self.billable(member)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(ValidationError::EmptyDescription.into());
        }
        let cost = round_money(cost);
        if cost <= Money::ZERO {
            return Err(ValidationError::NonPositiveAmount(cost).into());
        }
        let id = self.store.create_charge(NewCharge::single(
            member,
            date,
            Category::Messing,
            description,
            cost,
        ))?;
        info!("Charged member {member} {cost} for {description:?}");
        Ok(id)
    }

    /// Bar entry priced from the inventory as it stands right now. The price is
    /// copied into the charge, so later repricing leaves it untouched.
    pub fn add_bar_charge(
        &self,
        member: MemberID,
        brand: BrandID,
        unit: UnitType,
        quantity: u32,
        date: NaiveDate,
    ) -> Result<RecordID> {
        self.billable(member)?;
        if quantity < 1 {
            return Err(ValidationError::InvalidQuantity(quantity).into());
        }
        let item = self
            .inventory
            .lookup(brand)
            .ok_or(ValidationError::UnknownBrand(brand))?;
        if !item.available {
            return Err(ValidationError::BrandUnavailable(item.brand).into());
        }
        let label = format!("{} ({unit})", item.brand);
        let line = LineItem::new(label, item.unit_price(unit), quantity);
        let total_cost = line.cost()?;
        let id = self.store.create_charge(NewCharge {
            member,
            date,
            category: Category::Bar,
            items: vec![line],
            total_cost,
        })?;
        info!("Charged member {member} {total_cost} for {quantity} x {} ({unit})", item.brand);
        Ok(id)
    }

    pub fn add_payment(
        &self,
        member: MemberID,
        amount: Money,
        date: NaiveDate,
    ) -> Result<RecordID> {
        self.billable(member)?;
        let amount = round_money(amount);
        if amount <= Money::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount).into());
        }
        let id = self.store.create_payment(NewPayment { member, date, amount })?;
        info!("Recorded payment of {amount} from member {member}");
        Ok(id)
    }

    pub fn rollup(&self, range: DateRange) -> Rollup {
        rollup::build(self.store, self.directory, range)
    }

    /// Live rollup over the members registered when the watch starts. After a
    /// registration, cancel and watch again so the new member gets a row.
    pub fn watch_rollup<L>(&self, range: DateRange, listener: L) -> rollup::RollupWatch
    where
        L: FnMut(&Rollup) + 'static,
    {
        rollup::watch(self.store, self.directory, range, listener)
    }
}
