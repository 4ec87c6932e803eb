#![forbid(unsafe_code)]

//! Observable properties and managed bindings for FrankenTUI.
//!
//! This crate provides the change-propagation core used to wire widget state
//! together:
//!
//! - [`Observable`]: A shared, version-tracked value cell with change
//!   notification via listeners.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`Binding`]: RAII handle for a one-way ([`bind_to`]) or bidirectional
//!   ([`bind_bidirectional`]) link between properties.
//! - [`BindingScope`]: Owner of the bindings and subscriptions of one logical
//!   scope, released together.
//! - [`PropertySet`]: Name-addressable, type-erased properties that can be
//!   bound at runtime with type checking.
//!
//! # Architecture
//!
//! `Observable<T>` uses `Rc` with interior mutability for single-threaded
//! shared ownership. Each property keeps two ordered [`Registry`] lists:
//! binding links, which push a new value into linked properties, and
//! listeners. Bindings and subscriptions hold the property weakly, so the
//! lifetime of a property is decided by its owners alone.
//!
//! Every external `set` opens a cascade frame in [`propagation`]. Links mark
//! the properties they write as in flight; a property already in flight is
//! skipped, which terminates cycles (`A ↔ B`, `A → B → C → A`) after each
//! property was written once.
//!
//! # Invariants
//!
//! 1. After a write settles, every property transitively bound to the written
//!    one holds an equal value.
//! 2. A cascade writes and notifies each property at most once.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no propagation, no notifications).
//! 4. Links run before listeners, each in attachment order.
//! 5. Dropping a [`Binding`] or [`Subscription`] detaches it before the next
//!    notification, even when dropped from inside a callback.
//! 6. Dropping a property detaches every binding that references it.
//!
//! # Threading
//!
//! Handles are `!Send`: properties, bindings and the propagation state are
//! confined to the thread that created them.

pub mod binding;
pub mod config;
pub mod error;
pub mod observable;
pub mod propagation;
pub mod property_set;
pub mod registry;
pub mod scope;

pub use binding::{Binding, BindingKind, Sink, bind_bidirectional, bind_sink, bind_to, bind_to_mapped};
pub use config::{ConfigOverride, ReactiveConfig, TargetWritePolicy};
pub use error::{BoxError, ReactiveError};
pub use observable::{Listener, Observable, PropertyId, Subscription, WeakObservable};
pub use property_set::{AnyObservable, PropertySet, bind_bidirectional_dyn, bind_to_dyn};
pub use registry::{Registry, SubscriptionId};
pub use scope::BindingScope;
