#![forbid(unsafe_code)]

//! Managed links that keep [`Observable`] values synchronized.
//!
//! A [`Binding`] connects properties so that a write to one is pushed into
//! the others by the propagation engine. It owns its link registrations and
//! removes them when dropped; it never owns the properties themselves.
//!
//! # Usage
//!
//! ```
//! use ftui_reactive::{Observable, bind_bidirectional, bind_to};
//!
//! let volume = Observable::new(3);
//! let slider = Observable::new(7);
//!
//! // Right-hand side wins at bind time.
//! let _sync = bind_bidirectional(&volume, &slider).unwrap();
//! assert_eq!(volume.get(), 7);
//!
//! volume.set(10);
//! assert_eq!(slider.get(), 10);
//!
//! // One-way: the label follows the volume.
//! let label = Observable::new(0);
//! let follow = bind_to(&label, &volume).unwrap();
//! slider.set(2);
//! assert_eq!(label.get(), 2);
//!
//! drop(follow);
//! slider.set(5);
//! assert_eq!(label.get(), 2);
//! ```
//!
//! # Invariants
//!
//! 1. After any single write settles, every active binding's endpoints agree.
//! 2. A failed bind leaves no links, dependents or driver marks behind.
//! 3. Unbinding (explicitly, on drop, or because an endpoint was dropped)
//!    removes registrations only; it never writes a property.
//! 4. `unbind` is idempotent and safe to call from inside a callback that the
//!    binding itself triggered.
//!
//! # One-way Targets
//!
//! The target of [`bind_to`] may still be written directly. Under the default
//! [`TargetWritePolicy::Overwrite`](crate::TargetWritePolicy::Overwrite) the
//! write is accepted and replaced by the next change of the source; `Warn`
//! logs it and `Reject` refuses it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::ReactiveError;
use crate::observable::{LinkFn, Observable, PropertyId, Shared, WeakObservable};
use crate::propagation;
use crate::registry::SubscriptionId;

/// Direction of a [`Binding`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// The target follows the source.
    OneWay,
    /// Both endpoints follow each other.
    Bidirectional,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EndpointRole {
    Source,
    Target,
    Peer,
}

/// Type-erased view of a property, as seen by the bindings referencing it.
trait Endpoint {
    fn remove_link(&self, id: SubscriptionId) -> bool;
    fn release_driver(&self);
    fn add_dependent(&self, core: &Rc<BindingCore>);
    fn forget_dependent(&self, core: &BindingCore);
}

impl<T> Endpoint for Shared<T> {
    fn remove_link(&self, id: SubscriptionId) -> bool {
        Shared::remove_link(self, id)
    }

    fn release_driver(&self) {
        Shared::release_driver(self);
    }

    fn add_dependent(&self, core: &Rc<BindingCore>) {
        Shared::add_dependent(self, core);
    }

    fn forget_dependent(&self, core: &BindingCore) {
        Shared::forget_dependent(self, core);
    }
}

struct EndpointSlot {
    property: PropertyId,
    role: EndpointRole,
    host: Weak<dyn Endpoint>,
    link: Option<SubscriptionId>,
}

impl EndpointSlot {
    fn new<T: Clone + PartialEq + 'static>(
        property: &Observable<T>,
        role: EndpointRole,
        link: Option<SubscriptionId>,
    ) -> Self {
        let host: Weak<dyn Endpoint> = Rc::downgrade(&property.shared) as Weak<dyn Endpoint>;
        Self {
            property: property.id(),
            role,
            host,
            link,
        }
    }
}

type ResyncFn = dyn Fn() -> Result<(), ReactiveError>;

/// Shared state of a binding. Properties reference it weakly so that dropping
/// a property can detach every binding that mentions it.
pub(crate) struct BindingCore {
    kind: BindingKind,
    endpoints: Vec<EndpointSlot>,
    active: Cell<bool>,
    resync: Box<ResyncFn>,
}

impl BindingCore {
    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    fn property_ids(&self) -> Vec<PropertyId> {
        self.endpoints.iter().map(|slot| slot.property).collect()
    }

    /// Remove every registration held by this binding. Returns `false` when
    /// it was already detached.
    fn detach(&self) -> bool {
        if !self.active.replace(false) {
            return false;
        }
        for slot in &self.endpoints {
            // A dropped endpoint has already cleared its own registries.
            let Some(host) = slot.host.upgrade() else {
                continue;
            };
            if let Some(link) = slot.link {
                host.remove_link(link);
            }
            if slot.role == EndpointRole::Target {
                host.release_driver();
            }
            host.forget_dependent(self);
        }
        true
    }

    /// Called by a property that is being destroyed.
    pub(crate) fn invalidate(&self, dropped: PropertyId) {
        if self.detach() {
            tracing::debug!(
                kind = ?self.kind,
                property = %dropped,
                "binding invalidated by dropped endpoint"
            );
        }
    }
}

/// Owned handle to an active link between properties.
///
/// The link stays active while the handle is alive. Dropping it (or calling
/// [`unbind`](Self::unbind)) detaches the link on every exit path.
#[must_use = "dropping a Binding detaches it"]
pub struct Binding {
    core: Rc<BindingCore>,
}

impl Binding {
    fn attach(kind: BindingKind, endpoints: Vec<EndpointSlot>, resync: Box<ResyncFn>) -> Self {
        let core = Rc::new(BindingCore {
            kind,
            endpoints,
            active: Cell::new(true),
            resync,
        });
        for slot in &core.endpoints {
            if let Some(host) = slot.host.upgrade() {
                host.add_dependent(&core);
            }
        }
        tracing::debug!(kind = ?kind, endpoints = ?core.property_ids(), "binding attached");
        Self { core }
    }

    /// Direction of the binding.
    #[must_use]
    pub fn kind(&self) -> BindingKind {
        self.core.kind
    }

    /// Whether the binding still propagates.
    ///
    /// Becomes `false` after [`unbind`](Self::unbind) or when any endpoint
    /// property is dropped.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// Ids of the bound properties: `[source, target]` for one-way bindings,
    /// `[a, b]` for bidirectional ones, `[source]` for sink bindings.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UseAfterDetach`] once the binding is detached.
    pub fn endpoints(&self) -> Result<Vec<PropertyId>, ReactiveError> {
        if !self.core.is_active() {
            return Err(ReactiveError::UseAfterDetach);
        }
        Ok(self.core.property_ids())
    }

    /// Push the driving value again: source into target for one-way
    /// bindings, right operand into left operand for bidirectional ones.
    ///
    /// Useful after a direct write to a one-way target.
    ///
    /// # Errors
    ///
    /// - [`ReactiveError::UseAfterDetach`] once the binding is detached.
    /// - Any error of the triggered cascade.
    pub fn resync(&self) -> Result<(), ReactiveError> {
        if !self.core.is_active() {
            return Err(ReactiveError::UseAfterDetach);
        }
        (self.core.resync)()
    }

    /// Detach the binding. Returns `true` if this call detached it.
    pub fn unbind(&self) -> bool {
        let detached = self.core.detach();
        if detached {
            tracing::debug!(kind = ?self.core.kind, endpoints = ?self.core.property_ids(), "binding detached");
        }
        detached
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.core.kind)
            .field("active", &self.core.is_active())
            .field("endpoints", &self.core.property_ids())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Link construction
// ---------------------------------------------------------------------------

/// Link pushing `map(value)` into `target`, guarded by the in-flight marker.
fn forward<S, T>(target: WeakObservable<T>, map: impl Fn(&S) -> T + 'static) -> Box<LinkFn<S>>
where
    S: 'static,
    T: Clone + PartialEq + 'static,
{
    Box::new(move |value: &S| {
        let Some(target) = target.upgrade() else {
            return Ok(());
        };
        if !propagation::mark_in_flight(target.id()) {
            return Ok(());
        }
        target.shared.apply(map(value)).map(drop)
    })
}

/// Make `target` follow `source`.
///
/// `target` immediately takes the current value of `source` and tracks it
/// until the returned [`Binding`] is dropped.
///
/// # Errors
///
/// - [`ReactiveError::SelfBinding`] when both handles refer to one property.
/// - Any error of the initial synchronization cascade; no binding is created.
pub fn bind_to<T: Clone + PartialEq + 'static>(
    target: &Observable<T>,
    source: &Observable<T>,
) -> Result<Binding, ReactiveError> {
    bind_to_mapped(target, source, T::clone)
}

/// Make `target` follow `map(source)`.
///
/// This is also the typed way to bind properties of different value types.
///
/// # Errors
///
/// Same as [`bind_to`].
pub fn bind_to_mapped<S, T>(
    target: &Observable<T>,
    source: &Observable<S>,
    map: impl Fn(&S) -> T + 'static,
) -> Result<Binding, ReactiveError>
where
    S: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
{
    if target.id() == source.id() {
        return Err(ReactiveError::SelfBinding(target.id()));
    }
    let map = Rc::new(map);
    let initial = source.with(|value| map(value));
    target.shared.write_from_binding(initial)?;

    let link_map = Rc::clone(&map);
    let link = source
        .shared
        .add_link(forward(target.downgrade(), move |value: &S| link_map(value)));
    target.shared.acquire_driver();

    let weak_source = source.downgrade();
    let weak_target = target.downgrade();
    let resync = move || {
        let (Some(source), Some(target)) = (weak_source.upgrade(), weak_target.upgrade()) else {
            return Err(ReactiveError::UseAfterDetach);
        };
        let value = source.with(|value| map(value));
        target.shared.write_from_binding(value).map(drop)
    };

    Ok(Binding::attach(
        BindingKind::OneWay,
        vec![
            EndpointSlot::new(source, EndpointRole::Source, Some(link)),
            EndpointSlot::new(target, EndpointRole::Target, None),
        ],
        Box::new(resync),
    ))
}

/// Keep `a` and `b` synchronized in both directions.
///
/// Both take `b`'s current value (the right operand wins at bind time).
///
/// # Errors
///
/// - [`ReactiveError::SelfBinding`] when both handles refer to one property.
/// - Any error of the initial synchronization cascade; no binding is created.
pub fn bind_bidirectional<T: Clone + PartialEq + 'static>(
    a: &Observable<T>,
    b: &Observable<T>,
) -> Result<Binding, ReactiveError> {
    if a.id() == b.id() {
        return Err(ReactiveError::SelfBinding(a.id()));
    }
    a.shared.write_from_binding(b.get())?;

    let a_to_b = a.shared.add_link(forward(b.downgrade(), T::clone));
    let b_to_a = b.shared.add_link(forward(a.downgrade(), T::clone));

    let weak_a = a.downgrade();
    let weak_b = b.downgrade();
    let resync = move || {
        let (Some(a), Some(b)) = (weak_a.upgrade(), weak_b.upgrade()) else {
            return Err(ReactiveError::UseAfterDetach);
        };
        a.shared.write_from_binding(b.get()).map(drop)
    };

    Ok(Binding::attach(
        BindingKind::Bidirectional,
        vec![
            EndpointSlot::new(a, EndpointRole::Peer, Some(a_to_b)),
            EndpointSlot::new(b, EndpointRole::Peer, Some(b_to_a)),
        ],
        Box::new(resync),
    ))
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// A plain, non-observable destination for a one-way binding.
pub trait Sink<T> {
    /// Store the latest source value.
    fn accept(&self, value: &T);
}

impl<T: Copy> Sink<T> for Rc<Cell<T>> {
    fn accept(&self, value: &T) {
        self.set(*value);
    }
}

impl<T: Clone> Sink<T> for Rc<RefCell<T>> {
    fn accept(&self, value: &T) {
        self.borrow_mut().clone_from(value);
    }
}

/// Make a plain shared cell follow `source`.
///
/// The sink receives the current value immediately and every change after
/// that. Sinks are not properties: they have no listeners and take no part in
/// cycle detection.
pub fn bind_sink<T, K>(sink: K, source: &Observable<T>) -> Binding
where
    T: Clone + PartialEq + 'static,
    K: Sink<T> + 'static,
{
    let sink = Rc::new(sink);
    source.with(|value| sink.accept(value));

    let link_sink = Rc::clone(&sink);
    let link = source.shared.add_link(Box::new(move |value: &T| {
        link_sink.accept(value);
        Ok(())
    }));

    let weak_source = source.downgrade();
    let resync = move || {
        let source = weak_source.upgrade().ok_or(ReactiveError::UseAfterDetach)?;
        source.with(|value| sink.accept(value));
        Ok(())
    };

    Binding::attach(
        BindingKind::OneWay,
        vec![EndpointSlot::new(source, EndpointRole::Source, Some(link))],
        Box::new(resync),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
