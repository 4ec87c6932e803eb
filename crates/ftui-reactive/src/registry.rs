#![forbid(unsafe_code)]

//! Ordered subscription registry with snapshot iteration.
//!
//! Every [`Observable`](crate::Observable) owns two registries: one for its
//! listeners and one for the binding links that push its value into other
//! properties. Both need the same re-entrancy guarantees, so the registry is
//! generic over the stored callback type.
//!
//! # Invariants
//!
//! 1. Entries are visited in subscription order.
//! 2. A pass iterates over a snapshot taken when it starts: entries added
//!    during the pass are not visited by it.
//! 3. An entry removed during a pass (including by itself) is not visited
//!    afterwards in that pass.
//! 4. Removed entries are deallocated once the last pass holding them ends,
//!    never while the registry is borrowed.
//! 5. `unsubscribe` of an unknown or already-removed id is a no-op.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

thread_local! {
    static NEXT_SUBSCRIPTION_ID: Cell<u64> = const { Cell::new(1) };
}

/// Handle identifying one registered callback.
///
/// Ids are unique per thread, so an id obtained from one property can never
/// remove a callback registered on another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        NEXT_SUBSCRIPTION_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            Self(id)
        })
    }

    /// Raw numeric value of the id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

struct Entry<F: ?Sized> {
    id: SubscriptionId,
    active: Cell<bool>,
    callback: Box<F>,
}

/// Ordered collection of callbacks that tolerates mutation during iteration.
pub struct Registry<F: ?Sized> {
    entries: RefCell<Vec<Rc<Entry<F>>>>,
}

impl<F: ?Sized> Registry<F> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Append a callback and return its handle. O(1) amortized.
    pub fn subscribe(&self, callback: Box<F>) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.entries.borrow_mut().push(Rc::new(Entry {
            id,
            active: Cell::new(true),
            callback,
        }));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        // The entry is dropped after the borrow ends: its callback may own
        // handles whose drop re-enters this registry.
        let removed = {
            let mut entries = self.entries.borrow_mut();
            entries
                .iter()
                .position(|entry| entry.id == id)
                .map(|pos| entries.remove(pos))
        };
        match removed {
            Some(entry) => {
                entry.active.set(false);
                true
            }
            None => false,
        }
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.borrow().iter().any(|entry| entry.id == id)
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Remove every callback.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.entries.borrow_mut());
        for entry in &drained {
            entry.active.set(false);
        }
    }

    /// Visit every live callback over a snapshot of the registry, stopping at
    /// the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`. Callbacks after it are not
    /// visited.
    pub fn try_for_each<E>(&self, mut f: impl FnMut(&F) -> Result<(), E>) -> Result<(), E> {
        let snapshot: Vec<Rc<Entry<F>>> = self.entries.borrow().clone();
        for entry in &snapshot {
            if entry.active.get() {
                f(entry.callback.as_ref())?;
            }
        }
        Ok(())
    }
}

impl<F: ?Sized> Default for Registry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = dyn Fn(u32) -> Result<(), String>;

    fn recorder(log: &Rc<RefCell<Vec<String>>>, name: &'static str) -> Box<Callback> {
        let log = Rc::clone(log);
        Box::new(move |v| {
            log.borrow_mut().push(format!("{name}{v}"));
            Ok(())
        })
    }

    #[test]
    fn visits_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry: Registry<Callback> = Registry::new();
        registry.subscribe(recorder(&log, "a"));
        registry.subscribe(recorder(&log, "b"));
        registry.subscribe(recorder(&log, "c"));

        registry.try_for_each(|cb| cb(1)).unwrap();
        assert_eq!(*log.borrow(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry: Registry<Callback> = Registry::new();
        let id = registry.subscribe(Box::new(|_| Ok(())));
        assert!(registry.contains(id));
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_are_unique_across_registries() {
        let first: Registry<Callback> = Registry::new();
        let second: Registry<Callback> = Registry::new();
        let a = first.subscribe(Box::new(|_| Ok(())));
        let b = second.subscribe(Box::new(|_| Ok(())));
        assert_ne!(a, b);
        assert!(!second.unsubscribe(a));
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn entries_added_during_pass_are_skipped() {
        let registry: Rc<Registry<Callback>> = Rc::new(Registry::new());
        let calls = Rc::new(Cell::new(0u32));

        let reg = Rc::clone(&registry);
        let c = Rc::clone(&calls);
        registry.subscribe(Box::new(move |_| {
            let inner = Rc::clone(&c);
            reg.subscribe(Box::new(move |_| {
                inner.set(inner.get() + 100);
                Ok(())
            }));
            c.set(c.get() + 1);
            Ok(())
        }));

        registry.try_for_each(|cb| cb(0)).unwrap();
        assert_eq!(calls.get(), 1, "late subscriber must not run in the same pass");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn entries_removed_during_pass_are_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry: Rc<Registry<Callback>> = Rc::new(Registry::new());
        let victim = Rc::new(Cell::new(None));

        let reg = Rc::clone(&registry);
        let v = Rc::clone(&victim);
        registry.subscribe(Box::new(move |_| {
            if let Some(id) = v.get() {
                reg.unsubscribe(id);
            }
            Ok(())
        }));
        victim.set(Some(registry.subscribe(recorder(&log, "victim"))));
        registry.subscribe(recorder(&log, "tail"));

        registry.try_for_each(|cb| cb(7)).unwrap();
        assert_eq!(*log.borrow(), vec!["tail7"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn self_removal_during_pass() {
        let registry: Rc<Registry<Callback>> = Rc::new(Registry::new());
        let own_id = Rc::new(Cell::new(None));
        let calls = Rc::new(Cell::new(0u32));

        let reg = Rc::clone(&registry);
        let id_slot = Rc::clone(&own_id);
        let c = Rc::clone(&calls);
        let id = registry.subscribe(Box::new(move |_| {
            c.set(c.get() + 1);
            if let Some(id) = id_slot.get() {
                reg.unsubscribe(id);
            }
            Ok(())
        }));
        own_id.set(Some(id));

        registry.try_for_each(|cb| cb(0)).unwrap();
        registry.try_for_each(|cb| cb(1)).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn first_error_stops_the_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry: Registry<Callback> = Registry::new();
        registry.subscribe(recorder(&log, "a"));
        registry.subscribe(Box::new(|v| Err(format!("boom{v}"))));
        registry.subscribe(recorder(&log, "c"));

        let err = registry.try_for_each(|cb| cb(3)).unwrap_err();
        assert_eq!(err, "boom3");
        assert_eq!(*log.borrow(), vec!["a3"]);
    }

    #[test]
    fn clear_removes_everything() {
        let registry: Registry<Callback> = Registry::new();
        registry.subscribe(Box::new(|_| Ok(())));
        registry.subscribe(Box::new(|_| Ok(())));
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(format!("{registry:?}"), "Registry { len: 0 }");
    }
}
