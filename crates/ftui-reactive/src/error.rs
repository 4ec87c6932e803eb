#![forbid(unsafe_code)]

//! Error type shared by every fallible reactive operation.
//!
//! # Failure Modes
//!
//! | Error | Raised by | State afterwards |
//! |-------|-----------|------------------|
//! | `SelfBinding` | `bind_to` / `bind_bidirectional` | No binding created |
//! | `TypeMismatch` | Type-erased binds, `PropertySet::get` | No binding created |
//! | `UseAfterDetach` | `Binding::resync` / `Binding::endpoints` | Unchanged |
//! | `Listener` | `try_set` when a listener fails | Value written, pass aborted |
//! | `CascadeDepthExceeded` | Nested `try_set` from listeners | Value unchanged |
//! | `ReadOnlyTarget` | `try_set` on a one-way target (`Reject` policy) | Value unchanged |
//! | `UnknownProperty` | `PropertySet` lookups | Unchanged |

use crate::observable::PropertyId;

/// Boxed error returned by fallible listeners.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors from property and binding operations.
#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// A binding was requested between a property and itself.
    #[error("cannot bind property {0} to itself")]
    SelfBinding(PropertyId),

    /// Two type-erased properties hold different value types.
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The binding was unbound, or one of its endpoints was dropped.
    #[error("binding used after it was detached")]
    UseAfterDetach,

    /// A listener returned an error while being notified.
    #[error("listener on property {property} failed")]
    Listener {
        property: PropertyId,
        #[source]
        source: BoxError,
    },

    /// Listener-driven writes nested deeper than the configured limit.
    #[error("cascade depth limit of {limit} exceeded")]
    CascadeDepthExceeded { limit: usize },

    /// Direct write to a one-way binding target under the `Reject` policy.
    #[error("property {0} is driven by a one-way binding")]
    ReadOnlyTarget(PropertyId),

    /// A `PropertySet` lookup found no property with this name.
    #[error("no property named `{0}`")]
    UnknownProperty(String),
}

impl ReactiveError {
    /// Walk the source chain and return the innermost `ReactiveError`.
    ///
    /// Listener errors wrap whatever the listener returned; when a listener
    /// forwards a nested `try_set` failure, this recovers the original cause.
    #[must_use]
    pub fn root_cause(&self) -> &ReactiveError {
        let mut current = self;
        while let ReactiveError::Listener { source, .. } = current {
            match source.downcast_ref::<ReactiveError>() {
                Some(inner) => current = inner,
                None => break,
            }
        }
        current
    }
}
