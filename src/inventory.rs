use crate::error::{Result, ValidationError};
use crate::subscription::{self, Listeners, SharedListeners, Subscription};
use crate::{BrandID, Money};
use log::info;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Shot,
    Bottle,
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitType::Shot => f.write_str("shot"),
            UnitType::Bottle => f.write_str("bottle"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: BrandID,
    pub brand: String,
    pub price_bottle: Money,
    pub price_shot: Money,
    pub available: bool,
}

impl InventoryItem {
    pub fn new<S: Into<String>>(
        id: BrandID,
        brand: S,
        price_bottle: Money,
        price_shot: Money,
    ) -> Self {
        Self {
            id,
            brand: brand.into(),
            price_bottle,
            price_shot,
            available: true,
        }
    }

    pub fn unit_price(&self, unit: UnitType) -> Money {
        match unit {
            UnitType::Shot => self.price_shot,
            UnitType::Bottle => self.price_bottle,
        }
    }
}

/// Bar price list as the ledger sees it: read-only, current prices only.
pub trait Inventory {
    fn lookup(&self, id: BrandID) -> Option<InventoryItem>;
}

/// Price list kept in memory. Edits here never touch recorded charges.
pub struct MemoryInventory {
    items: RefCell<BTreeMap<BrandID, InventoryItem>>,
    listeners: SharedListeners<(), InventoryItem>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self {
            items: Default::default(),
            listeners: Listeners::shared(),
        }
    }

    pub fn insert(&self, item: InventoryItem) {
        self.items.borrow_mut().insert(item.id, item);
        self.changed();
    }

    pub fn set_prices(&self, id: BrandID, price_bottle: Money, price_shot: Money) -> Result<()> {
        self.update(id, |item| {
            item.price_bottle = price_bottle;
            item.price_shot = price_shot;
        })?;
        info!("Repriced inventory item {id}: bottle {price_bottle}, shot {price_shot}");
        Ok(())
    }

    pub fn set_available(&self, id: BrandID, available: bool) -> Result<()> {
        self.update(id, |item| item.available = available)
    }

    pub fn remove(&self, id: BrandID) -> Option<InventoryItem> {
        let removed = self.items.borrow_mut().remove(&id);
        if removed.is_some() {
            self.changed();
        }
        removed
    }

    /// In-stock items ordered by brand name.
    pub fn available_items(&self) -> Vec<InventoryItem> {
        let mut items: Vec<InventoryItem> = self
            .items
            .borrow()
            .values()
            .filter(|item| item.available)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.brand.cmp(&b.brand).then(a.id.cmp(&b.id)));
        items
    }

    /// Streams the full price list (all items, by brand) now and after every edit.
    pub fn watch(&self, listener: Box<dyn FnMut(&[InventoryItem])>) -> Subscription {
        subscription::subscribe(&self.listeners, (), listener, |_| self.all_items())
    }

    pub fn active_watches(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn all_items(&self) -> Vec<InventoryItem> {
        let mut items: Vec<InventoryItem> = self.items.borrow().values().cloned().collect();
        items.sort_by(|a, b| a.brand.cmp(&b.brand).then(a.id.cmp(&b.id)));
        items
    }

    fn update<F: FnOnce(&mut InventoryItem)>(&self, id: BrandID, edit: F) -> Result<()> {
        {
            let mut items = self.items.borrow_mut();
            let item = items.get_mut(&id).ok_or(ValidationError::UnknownBrand(id))?;
            edit(item);
        }
        self.changed();
        Ok(())
    }

    fn changed(&self) {
        subscription::notify(&self.listeners, |_| true, |_| self.all_items());
    }
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory for MemoryInventory {
    fn lookup(&self, id: BrandID) -> Option<InventoryItem> {
        self.items.borrow().get(&id).cloned()
    }
}
