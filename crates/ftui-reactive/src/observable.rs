#![forbid(unsafe_code)]

//! Observable value cell with change notification and version tracking.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value of type `T` in shared, reference-counted
//! storage. When the value changes (determined by `PartialEq`), the property
//! first drives every attached binding link in attachment order, then notifies
//! its listeners in registration order. Both lists live in a snapshotting
//! [`Registry`], so callbacks may freely subscribe, unsubscribe, write other
//! properties, or drop bindings while being notified.
//!
//! # Performance
//!
//! | Operation     | Complexity                        |
//! |---------------|-----------------------------------|
//! | `get()`       | O(1) + clone                      |
//! | `set()`       | O(L + S) links and subscribers    |
//! | `subscribe()` | O(1) amortized                    |
//! | `unsubscribe()` | O(S)                            |
//!
//! # Failure Modes
//!
//! - **Listener error**: `try_set` returns [`ReactiveError::Listener`]; the
//!   value has already been written and remaining listeners of that pass are
//!   skipped. `set` panics instead.
//! - **Borrow inside `with`**: writing the same property from inside the
//!   closure passed to [`Observable::with`] panics (the value is borrowed).
//! - **Runaway listeners**: listeners that keep writing properties from their
//!   callbacks hit [`ReactiveError::CascadeDepthExceeded`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::binding::BindingCore;
use crate::config::{ReactiveConfig, TargetWritePolicy};
use crate::error::{BoxError, ReactiveError};
use crate::propagation;
use crate::registry::{Registry, SubscriptionId};

thread_local! {
    static NEXT_PROPERTY_ID: Cell<u64> = const { Cell::new(1) };
}

/// Identity of one property cell. Clones of an [`Observable`] share it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(u64);

impl PropertyId {
    fn next() -> Self {
        NEXT_PROPERTY_ID.with(|next| {
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

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Capability invoked when a property changes.
///
/// Closures are adapted through [`Observable::subscribe`],
/// [`Observable::subscribe_change`] and [`Observable::try_subscribe`];
/// implement the trait directly for listeners that carry their own state.
pub trait Listener<T> {
    /// Called with the new and the previous value after a change.
    ///
    /// # Errors
    ///
    /// An error aborts the current notification pass and is returned to the
    /// caller of `try_set` wrapped in [`ReactiveError::Listener`].
    fn on_change(&self, new: &T, old: &T) -> Result<(), BoxError>;
}

struct ChangeFn<F>(F);

impl<T, F: Fn(&T, &T)> Listener<T> for ChangeFn<F> {
    fn on_change(&self, new: &T, old: &T) -> Result<(), BoxError> {
        (self.0)(new, old);
        Ok(())
    }
}

struct TryChangeFn<F>(F);

impl<T, F: Fn(&T, &T) -> Result<(), BoxError>> Listener<T> for TryChangeFn<F> {
    fn on_change(&self, new: &T, old: &T) -> Result<(), BoxError> {
        (self.0)(new, old)
    }
}

/// Binding link: pushes a freshly written value into a linked property.
pub(crate) type LinkFn<T> = dyn Fn(&T) -> Result<(), ReactiveError>;

/// Shared interior for [`Observable<T>`].
pub(crate) struct Shared<T> {
    id: PropertyId,
    value: RefCell<T>,
    version: Cell<u64>,
    links: Registry<LinkFn<T>>,
    listeners: Registry<dyn Listener<T>>,
    /// Bindings referencing this property, invalidated when it is dropped.
    dependents: RefCell<Vec<Weak<BindingCore>>>,
    /// Number of active one-way bindings driving this property.
    driven_by: Cell<usize>,
}

impl<T> Shared<T> {
    pub(crate) fn remove_link(&self, id: SubscriptionId) -> bool {
        self.links.unsubscribe(id)
    }

    pub(crate) fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub(crate) fn add_dependent(&self, core: &Rc<BindingCore>) {
        let mut dependents = self.dependents.borrow_mut();
        dependents.retain(|weak| weak.strong_count() > 0);
        dependents.push(Rc::downgrade(core));
    }

    pub(crate) fn forget_dependent(&self, core: &BindingCore) {
        self.dependents
            .borrow_mut()
            .retain(|weak| weak.strong_count() > 0 && !std::ptr::eq(weak.as_ptr(), core));
    }

    pub(crate) fn acquire_driver(&self) {
        self.driven_by.set(self.driven_by.get() + 1);
    }

    pub(crate) fn release_driver(&self) {
        self.driven_by.set(self.driven_by.get().saturating_sub(1));
    }

    fn active_bindings(&self) -> usize {
        self.dependents
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|core| core.is_active())
            .count()
    }
}

impl<T: Clone + PartialEq + 'static> Shared<T> {
    pub(crate) fn add_link(&self, link: Box<LinkFn<T>>) -> SubscriptionId {
        self.links.subscribe(link)
    }

    /// External write: opens a cascade frame and applies the target policy.
    fn write(&self, value: T) -> Result<bool, ReactiveError> {
        let _frame = propagation::enter_cascade(self.id)?;
        if self.driven_by.get() > 0 && *self.value.borrow() != value {
            match ReactiveConfig::current().target_writes {
                TargetWritePolicy::Overwrite => {}
                TargetWritePolicy::Warn => tracing::warn!(
                    property = %self.id,
                    "direct write to a one-way binding target; the next source change overwrites it"
                ),
                TargetWritePolicy::Reject => return Err(ReactiveError::ReadOnlyTarget(self.id)),
            }
        }
        self.apply(value)
    }

    /// Write issued by a binding outside of any cascade (initial sync and
    /// resync): opens its own frame but bypasses the target policy.
    pub(crate) fn write_from_binding(&self, value: T) -> Result<bool, ReactiveError> {
        let _frame = propagation::enter_cascade(self.id)?;
        self.apply(value)
    }

    /// Store `value` and cascade it. Must run inside a cascade frame.
    pub(crate) fn apply(&self, value: T) -> Result<bool, ReactiveError> {
        let old = {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return Ok(false);
            }
            std::mem::replace(&mut *current, value)
        };
        let written = self.version.get() + 1;
        self.version.set(written);
        let new = self.value.borrow().clone();

        // A nested cascade that rewrote this property has already pushed the
        // newer value everywhere; `new` is stale from then on.
        let superseded = || self.version.get() != written;
        self.links.try_for_each(|link| {
            if superseded() {
                return Ok(());
            }
            link(&new)
        })?;
        self.listeners.try_for_each(|listener| {
            if superseded() {
                return Ok(());
            }
            listener
                .on_change(&new, &old)
                .map_err(|source| ReactiveError::Listener {
                    property: self.id,
                    source,
                })
        })?;
        Ok(true)
    }

    pub(crate) fn get(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let dependents = std::mem::take(self.dependents.get_mut());
        for core in dependents.iter().filter_map(Weak::upgrade) {
            core.invalidate(self.id);
        }
        self.listeners.clear();
        self.links.clear();
    }
}

/// A shared, version-tracked value with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** cell: both
/// handles see the same value, share subscribers and have the same
/// [`PropertyId`]. The cell is destroyed with its last handle; bindings and
/// subscriptions only hold weak references and never keep it alive.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each value-changing write.
/// 2. `set(v)` where `v == current` is a no-op: no version bump, no link
///    traversal, no notification.
/// 3. Links run before listeners, each in attachment order.
/// 4. A pass stops as soon as a nested write changes the value again; later
///    links and listeners only see the newest value.
pub struct Observable<T> {
    pub(crate) shared: Rc<Shared<T>>,
}

// Manual Clone: shares the same Rc.
impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Observable");
        dbg.field("id", &self.shared.id);
        match self.shared.value.try_borrow() {
            Ok(value) => dbg.field("value", &*value),
            Err(_) => dbg.field("value", &format_args!("<borrowed>")),
        };
        dbg.field("version", &self.shared.version.get())
            .field("subscriber_count", &self.shared.listeners.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a new observable with the given initial value.
    ///
    /// The initial version is 0 and no subscribers are registered.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            shared: Rc::new(Shared {
                id: PropertyId::next(),
                value: RefCell::new(value),
                version: Cell::new(0),
                links: Registry::new(),
                listeners: Registry::new(),
                dependents: RefCell::new(Vec::new()),
                driven_by: Cell::new(0),
            }),
        }
    }

    /// Identity of the underlying cell.
    #[must_use]
    pub fn id(&self) -> PropertyId {
        self.shared.id
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.shared.get()
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same property.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.shared.value.borrow())
    }

    /// Set a new value, cascading it through bindings and notifying
    /// listeners when it differs from the current one.
    ///
    /// # Panics
    ///
    /// Panics if [`try_set`](Self::try_set) would return an error: a fallible
    /// listener failed, the cascade depth limit was hit, or the write was
    /// rejected by [`TargetWritePolicy::Reject`].
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("Observable::set on property {} failed: {err}", self.id());
        }
    }

    /// Fallible form of [`set`](Self::set). Returns `Ok(true)` when the value
    /// changed and `Ok(false)` when it was already equal.
    ///
    /// # Errors
    ///
    /// - [`ReactiveError::Listener`] when a listener anywhere in the cascade
    ///   fails. Values written before the failure stay written.
    /// - [`ReactiveError::CascadeDepthExceeded`] when called from listeners
    ///   nested deeper than the configured limit.
    /// - [`ReactiveError::ReadOnlyTarget`] when this property is driven by a
    ///   one-way binding and the policy is `Reject`.
    pub fn try_set(&self, value: T) -> Result<bool, ReactiveError> {
        self.shared.write(value)
    }

    /// Modify the value via a closure operating on a copy. The change is
    /// published like [`set`](Self::set).
    ///
    /// # Panics
    ///
    /// Same conditions as [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        if let Err(err) = self.try_update(f) {
            panic!("Observable::update on property {} failed: {err}", self.id());
        }
    }

    /// Fallible form of [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// Same as [`try_set`](Self::try_set).
    pub fn try_update(&self, f: impl FnOnce(&mut T)) -> Result<bool, ReactiveError> {
        let mut next = self.get();
        f(&mut next);
        self.try_set(next)
    }

    /// Subscribe to value changes. The callback receives the new value.
    ///
    /// Returns a [`Subscription`] guard. Dropping the guard unsubscribes the
    /// callback.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.subscribe_listener(ChangeFn(move |new: &T, _old: &T| callback(new)))
    }

    /// Subscribe with a callback receiving both the new and previous value.
    pub fn subscribe_change(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        self.subscribe_listener(ChangeFn(callback))
    }

    /// Subscribe with a fallible callback. Its errors surface from
    /// [`try_set`](Self::try_set) of whichever write started the cascade.
    pub fn try_subscribe(
        &self,
        callback: impl Fn(&T, &T) -> Result<(), BoxError> + 'static,
    ) -> Subscription {
        self.subscribe_listener(TryChangeFn(callback))
    }

    /// Subscribe a [`Listener`] implementation.
    pub fn subscribe_listener(&self, listener: impl Listener<T> + 'static) -> Subscription {
        let id = self.shared.listeners.subscribe(Box::new(listener));
        let host: Weak<dyn SubscriptionHost> = Rc::downgrade(&self.shared) as Weak<dyn SubscriptionHost>;
        Subscription { id, host }
    }

    /// Remove a listener by id. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.remove_listener(id)
    }

    /// Current version number. Increments by 1 on each value-changing write.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.shared.version.get()
    }

    /// Number of registered listeners (binding links are not counted).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Number of active bindings with this property as an endpoint.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.shared.active_bindings()
    }

    /// Whether an active one-way binding drives this property.
    #[must_use]
    pub fn is_driven(&self) -> bool {
        self.shared.driven_by.get() > 0
    }

    /// Create a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakObservable<T> {
        WeakObservable {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Non-owning handle to an [`Observable`].
pub struct WeakObservable<T> {
    shared: Weak<Shared<T>>,
}

impl<T> Clone for WeakObservable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for WeakObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObservable")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl<T> WeakObservable<T> {
    /// Upgrade to an owning handle if the cell is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Observable<T>> {
        self.shared.upgrade().map(|shared| Observable { shared })
    }

    /// Whether the cell is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

/// Type-erased access to a listener registry, for [`Subscription`].
trait SubscriptionHost {
    fn remove(&self, id: SubscriptionId) -> bool;
    fn holds(&self, id: SubscriptionId) -> bool;
}

impl<T> SubscriptionHost for Shared<T> {
    fn remove(&self, id: SubscriptionId) -> bool {
        self.remove_listener(id)
    }

    fn holds(&self, id: SubscriptionId) -> bool {
        self.listeners.contains(id)
    }
}

/// RAII guard for a subscriber callback.
///
/// Dropping the `Subscription` removes the callback from its property. If
/// this happens during a notification pass, the callback is not invoked
/// again in that pass.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    id: SubscriptionId,
    host: Weak<dyn SubscriptionHost>,
}

impl Subscription {
    /// Handle of the registered callback.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the callback is still registered on a live property.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.host
            .upgrade()
            .is_some_and(|host| host.holds(self.id))
    }

    /// Remove the callback now. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(host) = self.host.upgrade() {
            host.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
