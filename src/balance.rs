use crate::records::{Category, Charge, Payment, Record};
use crate::{Money, Projector};
use serde::Serialize;

/// Per-member totals derived from the full charge and payment sets.
///
/// Never stored: every consumer recomputes it from records, so it cannot
/// drift from the history it summarises.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub messing_total: Money,
    pub bar_total: Money,
    pub paid_total: Money,
    pub outstanding: Money,
}

impl Balance {
    pub fn total_debit(&self) -> Money {
        self.messing_total + self.bar_total
    }
}

#[cfg(test)]
impl Balance {
    pub fn new<M, B, P>(messing: M, bar: B, paid: P) -> Self
    where
        M: Into<Money>,
        B: Into<Money>,
        P: Into<Money>,
    {
        let messing_total = messing.into();
        let bar_total = bar.into();
        let paid_total = paid.into();
        Self {
            messing_total,
            bar_total,
            paid_total,
            outstanding: messing_total + bar_total - paid_total,
        }
    }
}

impl Projector for Balance {
    fn project(&mut self, record: Record<'_>) {
        match record {
            Record::Charge(charge) => match charge.category {
                Category::Messing => self.messing_total += charge.total_cost,
                Category::Bar => self.bar_total += charge.total_cost,
            },
            Record::Payment(payment) => self.paid_total += payment.amount,
        }
        self.outstanding = self.messing_total + self.bar_total - self.paid_total;
    }
}

/// The one balance computation in the crate. Always a fresh fold over the
/// complete record sets, so delivery order between the two streams is irrelevant.
pub fn compute(charges: &[Charge], payments: &[Payment]) -> Balance {
    let mut balance = Balance::default();
    for charge in charges {
        balance.project(Record::Charge(charge));
    }
    for payment in payments {
        balance.project(Record::Payment(payment));
    }
    balance
}
