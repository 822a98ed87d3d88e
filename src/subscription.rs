//! Change-notification plumbing shared by the record store and inventory.
//!
//! Every `subscribe` hands back exactly one [`Subscription`]. Consumers call
//! [`Subscription::cancel`] on their lifecycle boundary (view closed, member
//! deselected); dropping a handle that was never cancelled releases it too.

use log::warn;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

pub type Callback<T> = Rc<RefCell<Box<dyn FnMut(&[T])>>>;
pub type SharedListeners<F, T> = Rc<RefCell<Listeners<F, T>>>;

struct Entry<F, T> {
    filter: F,
    callback: Callback<T>,
}

pub struct Listeners<F, T> {
    next_id: u64,
    entries: BTreeMap<u64, Entry<F, T>>,
}

impl<F: Clone, T> Listeners<F, T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn shared() -> SharedListeners<F, T> {
        Rc::new(RefCell::new(Self::new()))
    }

    fn insert(&mut self, filter: F, callback: Callback<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, Entry { filter, callback });
        id
    }

    fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn targets(&self) -> Vec<(u64, F, Callback<T>)> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.filter.clone(), entry.callback.clone()))
            .collect()
    }
}

impl<F: Clone, T> Default for Listeners<F, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers `callback`, delivers the current snapshot to it straight away and
/// returns the handle that releases it.
pub fn subscribe<F, T, S>(
    registry: &SharedListeners<F, T>,
    filter: F,
    callback: Box<dyn FnMut(&[T])>,
    snapshot: S,
) -> Subscription
where
    F: Clone + 'static,
    T: 'static,
    S: Fn(&F) -> Vec<T>,
{
    let callback: Callback<T> = Rc::new(RefCell::new(callback));
    let initial = snapshot(&filter);
    let id = registry.borrow_mut().insert(filter, callback.clone());
    let weak: Weak<RefCell<Listeners<F, T>>> = Rc::downgrade(registry);
    let subscription = Subscription::new(move || {
        if let Some(registry) = weak.upgrade() {
            registry.borrow_mut().remove(id);
        }
    });
    (&mut *callback.borrow_mut())(&initial);
    subscription
}

/// Pushes a fresh snapshot to every live listener whose filter is `affected`.
/// Listeners cancelled by an earlier callback in the same round are skipped.
pub fn notify<F, T, A, S>(registry: &SharedListeners<F, T>, affected: A, snapshot: S)
where
    F: Clone,
    A: Fn(&F) -> bool,
    S: Fn(&F) -> Vec<T>,
{
    let targets = registry.borrow().targets();
    for (id, filter, callback) in targets {
        if !affected(&filter) || !registry.borrow().contains(id) {
            continue;
        }
        let records = snapshot(&filter);
        match callback.try_borrow_mut() {
            Ok(mut callback) => (&mut *callback)(&records),
            Err(_) => warn!("Listener {id} is still running; dropping re-entrant update"),
        }
    }
}

#[must_use = "dropping a subscription releases it immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new<R: FnOnce() + 'static>(release: R) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
