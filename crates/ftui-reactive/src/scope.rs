#![forbid(unsafe_code)]

//! Lifetime scoping for bindings and subscriptions.

use std::fmt;

use crate::binding::{self, Binding};
use crate::error::ReactiveError;
use crate::observable::{Observable, Subscription};

enum Held {
    Binding(Binding),
    Subscription(Subscription),
}

/// Collects bindings and subscriptions for a logical scope (e.g., a widget).
///
/// When the scope is dropped, everything it holds is released, cleanly
/// disconnecting the reactive wiring of that scope. The properties themselves
/// are untouched.
///
/// # Usage
///
/// ```
/// use ftui_reactive::{BindingScope, Observable};
///
/// let model = Observable::new(1);
/// let view = Observable::new(0);
/// {
///     let mut scope = BindingScope::new();
///     scope.bind_to(&view, &model).unwrap();
///     model.set(2);
///     assert_eq!(view.get(), 2);
/// }
/// model.set(3);
/// assert_eq!(view.get(), 2);
/// ```
///
/// # Invariants
///
/// 1. Entries are released in reverse registration order on drop and `clear`.
/// 2. After drop, no callbacks from this scope will fire.
/// 3. `clear()` releases everything immediately; the scope stays reusable.
/// 4. Nested scopes are independent owners.
#[derive(Default)]
pub struct BindingScope {
    held: Vec<Held>,
}

impl BindingScope {
    /// Create an empty binding scope.
    #[must_use]
    pub fn new() -> Self {
        Self { held: Vec::new() }
    }

    /// Keep `target` following `source` for the lifetime of the scope.
    ///
    /// # Errors
    ///
    /// Same as [`binding::bind_to`]; nothing is added on error.
    pub fn bind_to<T: Clone + PartialEq + 'static>(
        &mut self,
        target: &Observable<T>,
        source: &Observable<T>,
    ) -> Result<&mut Self, ReactiveError> {
        let binding = binding::bind_to(target, source)?;
        Ok(self.hold_binding(binding))
    }

    /// Keep `a` and `b` synchronized for the lifetime of the scope.
    ///
    /// # Errors
    ///
    /// Same as [`binding::bind_bidirectional`]; nothing is added on error.
    pub fn bind_bidirectional<T: Clone + PartialEq + 'static>(
        &mut self,
        a: &Observable<T>,
        b: &Observable<T>,
    ) -> Result<&mut Self, ReactiveError> {
        let binding = binding::bind_bidirectional(a, b)?;
        Ok(self.hold_binding(binding))
    }

    /// Subscribe to an observable within this scope.
    ///
    /// Returns a reference to the scope for chaining.
    pub fn subscribe<T: Clone + PartialEq + 'static>(
        &mut self,
        source: &Observable<T>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        self.hold(source.subscribe(callback))
    }

    /// Take ownership of an existing binding.
    pub fn hold_binding(&mut self, binding: Binding) -> &mut Self {
        self.held.push(Held::Binding(binding));
        self
    }

    /// Take ownership of an existing subscription.
    pub fn hold(&mut self, subscription: Subscription) -> &mut Self {
        self.held.push(Held::Subscription(subscription));
        self
    }

    /// Number of bindings and subscriptions held.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.held.len()
    }

    /// Whether the scope holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Release everything immediately (scope becomes empty but reusable).
    pub fn clear(&mut self) {
        while let Some(entry) = self.held.pop() {
            drop(entry);
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self
            .held
            .iter()
            .filter(|entry| matches!(entry, Held::Binding(_)))
            .count();
        let active = self
            .held
            .iter()
            .filter(|entry| match entry {
                Held::Binding(binding) => binding.is_active(),
                Held::Subscription(subscription) => subscription.is_active(),
            })
            .count();
        f.debug_struct("BindingScope")
            .field("bindings", &bindings)
            .field("subscriptions", &(self.held.len() - bindings))
            .field("active", &active)
            .finish()
    }
}
