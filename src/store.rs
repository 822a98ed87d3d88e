use crate::error::{LedgerError, Result, StoreError, ValidationError};
use crate::records::{
    Category, Charge, LineItem, NewCharge, NewPayment, NewRecord, Payment, RecordFilter,
};
use crate::subscription::{self, Listeners, SharedListeners, Subscription};
use crate::{MemberID, Money, RecordID};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Append-only persistence for financial records.
///
/// There is no update or delete: history is corrected with new
/// records. `batch_create` commits every record or none of them.
pub trait RecordStore {
    fn batch_create(&self, records: Vec<NewRecord>) -> Result<Vec<RecordID>>;

    fn charges(&self, filter: &RecordFilter) -> Vec<Charge>;

    fn payments(&self, filter: &RecordFilter) -> Vec<Payment>;

    fn subscribe_charges(
        &self,
        filter: RecordFilter,
        listener: Box<dyn FnMut(&[Charge])>,
    ) -> Subscription;

    fn subscribe_payments(
        &self,
        filter: RecordFilter,
        listener: Box<dyn FnMut(&[Payment])>,
    ) -> Subscription;

    fn create_charge(&self, charge: NewCharge) -> Result<RecordID> {
        self.batch_create(vec![NewRecord::Charge(charge)])?
            .pop()
            .ok_or_else(|| StoreError::EmptyBatch.into())
    }

    fn create_payment(&self, payment: NewPayment) -> Result<RecordID> {
        self.batch_create(vec![NewRecord::Payment(payment)])?
            .pop()
            .ok_or_else(|| StoreError::EmptyBatch.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// Largest number of records accepted in one commit.
    pub batch_limit: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { batch_limit: 500 }
    }
}

#[derive(Debug, Default)]
struct MemberIndex {
    charges: Vec<usize>,
    payments: Vec<usize>,
}

#[derive(Debug, Default)]
struct StoreState {
    charges: Vec<Charge>,
    payments: Vec<Payment>,
    index: BTreeMap<MemberID, MemberIndex>,
    next_id: RecordID,
}

impl StoreState {
    fn next_id(&mut self) -> RecordID {
        self.next_id += 1;
        self.next_id
    }

    fn commit_charge(&mut self, charge: NewCharge, created_at: DateTime<Utc>) -> RecordID {
        let id = self.next_id();
        self.index
            .entry(charge.member)
            .or_default()
            .charges
            .push(self.charges.len());
        self.charges.push(Charge {
            id,
            member: charge.member,
            date: charge.date,
            category: charge.category,
            items: charge.items,
            total_cost: charge.total_cost,
            created_at,
        });
        id
    }

    fn commit_payment(&mut self, payment: NewPayment, created_at: DateTime<Utc>) -> RecordID {
        let id = self.next_id();
        self.index
            .entry(payment.member)
            .or_default()
            .payments
            .push(self.payments.len());
        self.payments.push(Payment {
            id,
            member: payment.member,
            date: payment.date,
            amount: payment.amount,
            created_at,
        });
        id
    }

    fn charges(&self, filter: &RecordFilter) -> Vec<Charge> {
        let candidates: Vec<&Charge> = match filter.member {
            Some(member) => match self.index.get(&member) {
                Some(index) => index.charges.iter().map(|i| &self.charges[*i]).collect(),
                None => Vec::new(),
            },
            None => self.charges.iter().collect(),
        };
        candidates
            .into_iter()
            .filter(|charge| filter.matches(charge.member, charge.date))
            .cloned()
            .collect()
    }

    fn payments(&self, filter: &RecordFilter) -> Vec<Payment> {
        let candidates: Vec<&Payment> = match filter.member {
            Some(member) => match self.index.get(&member) {
                Some(index) => index.payments.iter().map(|i| &self.payments[*i]).collect(),
                None => Vec::new(),
            },
            None => self.payments.iter().collect(),
        };
        candidates
            .into_iter()
            .filter(|payment| filter.matches(payment.member, payment.date))
            .cloned()
            .collect()
    }
}

/// In-process record store with change notification.
///
/// Single-threaded: listeners run synchronously after each commit and must not
/// write back into the store from inside the callback.
pub struct MemoryStore {
    state: RefCell<StoreState>,
    charge_listeners: SharedListeners<RecordFilter, Charge>,
    payment_listeners: SharedListeners<RecordFilter, Payment>,
    settings: StoreSettings,
    offline: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_settings(StoreSettings::default())
    }

    pub fn with_settings(settings: StoreSettings) -> Self {
        Self {
            state: Default::default(),
            charge_listeners: Listeners::shared(),
            payment_listeners: Listeners::shared(),
            settings,
            offline: Cell::new(false),
        }
    }

    /// Appends historical records from CSV. Rows that cannot be read or fail
    /// validation are logged and skipped; returns how many were stored.
    pub fn load_csv<R: std::io::Read>(&self, reader: R) -> Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut loaded = 0;
        for row in reader.deserialize::<CsvRecord>() {
            let result = row
                .map_err(LedgerError::from)
                .and_then(|row| NewRecord::try_from(row).map_err(LedgerError::from))
                .and_then(|record| self.batch_create(vec![record]));
            match result {
                Ok(_) => loaded += 1,
                Err(err) => warn!("{err}; skipping row"),
            }
        }
        info!("Loaded {loaded} records from CSV");
        Ok(loaded)
    }

    /// Simulates losing (or regaining) the connection to the backing store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    pub fn settings(&self) -> StoreSettings {
        self.settings
    }

    pub fn len(&self) -> usize {
        let state = self.state.borrow();
        state.charges.len() + state.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_subscriptions(&self) -> usize {
        self.charge_listeners.borrow().len() + self.payment_listeners.borrow().len()
    }

    fn check_batch(&self, records: &[NewRecord]) -> Result<()> {
        if self.offline.get() {
            return Err(StoreError::Unavailable.into());
        }
        if records.is_empty() {
            return Err(StoreError::EmptyBatch.into());
        }
        if records.len() > self.settings.batch_limit {
            return Err(StoreError::BatchTooLarge {
                size: records.len(),
                limit: self.settings.batch_limit,
            }
            .into());
        }
        for record in records {
            record.validate()?;
        }
        Ok(())
    }

    fn commit(&self, records: Vec<NewRecord>) -> Commit {
        let created_at = Utc::now();
        let mut state = self.state.borrow_mut();
        let mut commit = Commit::default();
        for record in records {
            match record {
                NewRecord::Charge(charge) => {
                    commit.charges.push((charge.member, charge.date));
                    commit.ids.push(state.commit_charge(charge, created_at));
                }
                NewRecord::Payment(payment) => {
                    commit.payments.push((payment.member, payment.date));
                    commit.ids.push(state.commit_payment(payment, created_at));
                }
            }
        }
        commit
    }
}

/// What one commit wrote, kept to decide which listeners need a new snapshot.
#[derive(Debug, Default)]
struct Commit {
    ids: Vec<RecordID>,
    charges: Vec<(MemberID, NaiveDate)>,
    payments: Vec<(MemberID, NaiveDate)>,
}

impl Commit {
    fn touches(written: &[(MemberID, NaiveDate)], filter: &RecordFilter) -> bool {
        written
            .iter()
            .any(|(member, date)| filter.matches(*member, *date))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn batch_create(&self, records: Vec<NewRecord>) -> Result<Vec<RecordID>> {
        if let Err(err) = self.check_batch(&records) {
            warn!("Rejected batch of {} records: {err}", records.len());
            return Err(err);
        }
        let commit = self.commit(records);
        info!("Committed {} records", commit.ids.len());
        if !commit.charges.is_empty() {
            debug!("Notifying charge listeners");
            subscription::notify(
                &self.charge_listeners,
                |filter| Commit::touches(&commit.charges, filter),
                |filter| self.state.borrow().charges(filter),
            );
        }
        if !commit.payments.is_empty() {
            debug!("Notifying payment listeners");
            subscription::notify(
                &self.payment_listeners,
                |filter| Commit::touches(&commit.payments, filter),
                |filter| self.state.borrow().payments(filter),
            );
        }
        Ok(commit.ids)
    }

    fn charges(&self, filter: &RecordFilter) -> Vec<Charge> {
        self.state.borrow().charges(filter)
    }

    fn payments(&self, filter: &RecordFilter) -> Vec<Payment> {
        self.state.borrow().payments(filter)
    }

    fn subscribe_charges(
        &self,
        filter: RecordFilter,
        listener: Box<dyn FnMut(&[Charge])>,
    ) -> Subscription {
        subscription::subscribe(&self.charge_listeners, filter, listener, |filter| {
            self.state.borrow().charges(filter)
        })
    }

    fn subscribe_payments(
        &self,
        filter: RecordFilter,
        listener: Box<dyn FnMut(&[Payment])>,
    ) -> Subscription {
        subscription::subscribe(&self.payment_listeners, filter, listener, |filter| {
            self.state.borrow().payments(filter)
        })
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum RecordKind {
    Charge,
    Payment,
}

/// One line of the flat history file.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    kind: RecordKind,
    member: MemberID,
    date: NaiveDate,
    category: Option<Category>,
    label: Option<String>,
    unit_cost: Option<Money>,
    quantity: Option<u32>,
    amount: Option<Money>,
}

impl TryFrom<CsvRecord> for NewRecord {
    type Error = ValidationError;

    fn try_from(row: CsvRecord) -> std::result::Result<Self, Self::Error> {
        match row.kind {
            RecordKind::Charge => {
                let label = row
                    .label
                    .filter(|label| !label.is_empty())
                    .ok_or(ValidationError::MissingField("label"))?;
                let unit_cost = row.unit_cost.ok_or(ValidationError::MissingField("unit_cost"))?;
                let item = LineItem::new(label, unit_cost, row.quantity.unwrap_or(1));
                Ok(NewRecord::Charge(NewCharge {
                    member: row.member,
                    date: row.date,
                    category: row.category.unwrap_or(Category::Messing),
                    total_cost: item.cost()?,
                    items: vec![item],
                }))
            }
            RecordKind::Payment => Ok(NewRecord::Payment(NewPayment {
                member: row.member,
                date: row.date,
                amount: row.amount.ok_or(ValidationError::MissingField("amount"))?,
            })),
        }
    }
}

struct Latest<L> {
    charges: Option<Vec<Charge>>,
    payments: Option<Vec<Payment>>,
    listener: L,
}

impl<L: FnMut(&[Charge], &[Payment])> Latest<L> {
    fn emit(&mut self) {
        if let (Some(charges), Some(payments)) = (&self.charges, &self.payments) {
            (self.listener)(charges, payments);
        }
    }
}

/// Live charge and payment streams for one filter.
///
/// The listener first fires once both streams have delivered, then again on
/// every later delivery from either, always with the latest full sets.
#[must_use = "dropping a watch releases it immediately"]
#[derive(Debug)]
pub struct RecordWatch {
    subscriptions: Vec<Subscription>,
}

impl RecordWatch {
    pub fn cancel(self) {
        for subscription in self.subscriptions {
            subscription.cancel();
        }
    }
}

pub fn watch_records<L>(store: &dyn RecordStore, filter: RecordFilter, listener: L) -> RecordWatch
where
    L: FnMut(&[Charge], &[Payment]) + 'static,
{
    let latest = Rc::new(RefCell::new(Latest {
        charges: None,
        payments: None,
        listener,
    }));

    let on_charges = {
        let latest = Rc::clone(&latest);
        move |charges: &[Charge]| match latest.try_borrow_mut() {
            Ok(mut latest) => {
                latest.charges = Some(charges.to_vec());
                latest.emit();
            }
            Err(_) => warn!("Charge update arrived while the watch was busy; dropped"),
        }
    };
    let on_payments = move |payments: &[Payment]| match latest.try_borrow_mut() {
        Ok(mut latest) => {
            latest.payments = Some(payments.to_vec());
            latest.emit();
        }
        Err(_) => warn!("Payment update arrived while the watch was busy; dropped"),
    };

    RecordWatch {
        subscriptions: vec![
            store.subscribe_charges(filter, Box::new(on_charges)),
            store.subscribe_payments(filter, Box::new(on_payments)),
        ],
    }
}
