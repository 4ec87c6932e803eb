#![forbid(unsafe_code)]

//! Type-erased, name-addressable properties.
//!
//! A widget exposes its observable fields through a [`PropertySet`] so that
//! configuration code can look them up and wire them together by name
//! without knowing their value types at compile time. Type agreement is
//! checked when the binding is made and reported as
//! [`ReactiveError::TypeMismatch`].
//!
//! # Usage
//!
//! ```
//! use ftui_reactive::{Observable, ReactiveError, property_set};
//!
//! let width = Observable::new(80u16);
//! let min_width = Observable::new(0u16);
//! let title = Observable::new(String::from("main"));
//!
//! let props = property_set! {
//!     "width" => width,
//!     "min_width" => min_width,
//!     "title" => title,
//! };
//!
//! let _link = props.bind_to("min_width", "width").unwrap();
//! assert_eq!(min_width.get(), 80);
//!
//! let err = props.bind_to("title", "width").unwrap_err();
//! assert!(matches!(err, ReactiveError::TypeMismatch { .. }));
//! ```

use std::any::{Any, type_name};
use std::fmt;

use crate::binding::{self, Binding};
use crate::error::ReactiveError;
use crate::observable::{Observable, PropertyId};

/// Object-safe view of an [`Observable`] of any value type.
pub trait AnyObservable {
    /// Identity of the underlying cell.
    fn id(&self) -> PropertyId;
    /// `std::any::type_name` of the value type.
    fn value_type_name(&self) -> &'static str;
    /// Current version of the cell.
    fn version(&self) -> u64;
    /// Number of registered listeners.
    fn subscriber_count(&self) -> usize;
    /// Downcasting support; the concrete type is `Observable<T>`.
    fn as_any(&self) -> &dyn Any;
    /// Clone the handle (not the value) into a new box.
    fn clone_boxed(&self) -> Box<dyn AnyObservable>;
    /// One-way bind with `self` as the target.
    fn bind_to_erased(&self, source: &dyn AnyObservable) -> Result<Binding, ReactiveError>;
    /// Bidirectional bind with `self` as the left operand.
    fn bind_bidirectional_erased(&self, other: &dyn AnyObservable)
    -> Result<Binding, ReactiveError>;
}

fn downcast<T: 'static>(property: &dyn AnyObservable) -> Result<&Observable<T>, ReactiveError> {
    property
        .as_any()
        .downcast_ref::<Observable<T>>()
        .ok_or_else(|| ReactiveError::TypeMismatch {
            expected: type_name::<T>(),
            found: property.value_type_name(),
        })
}

impl<T: Clone + PartialEq + 'static> AnyObservable for Observable<T> {
    fn id(&self) -> PropertyId {
        Observable::id(self)
    }

    fn value_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn version(&self) -> u64 {
        Observable::version(self)
    }

    fn subscriber_count(&self) -> usize {
        Observable::subscriber_count(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn AnyObservable> {
        Box::new(self.clone())
    }

    fn bind_to_erased(&self, source: &dyn AnyObservable) -> Result<Binding, ReactiveError> {
        binding::bind_to(self, downcast::<T>(source)?)
    }

    fn bind_bidirectional_erased(
        &self,
        other: &dyn AnyObservable,
    ) -> Result<Binding, ReactiveError> {
        binding::bind_bidirectional(self, downcast::<T>(other)?)
    }
}

impl fmt::Debug for dyn AnyObservable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyObservable")
            .field("id", &self.id())
            .field("type", &self.value_type_name())
            .finish()
    }
}

/// Make `target` follow `source`, checking value types at runtime.
///
/// # Errors
///
/// - [`ReactiveError::SelfBinding`] when both refer to one property.
/// - [`ReactiveError::TypeMismatch`] when the value types differ.
/// - Any error of the initial synchronization cascade.
pub fn bind_to_dyn(
    target: &dyn AnyObservable,
    source: &dyn AnyObservable,
) -> Result<Binding, ReactiveError> {
    if target.id() == source.id() {
        return Err(ReactiveError::SelfBinding(target.id()));
    }
    target.bind_to_erased(source)
}

/// Keep `a` and `b` synchronized, checking value types at runtime.
///
/// # Errors
///
/// Same as [`bind_to_dyn`].
pub fn bind_bidirectional_dyn(
    a: &dyn AnyObservable,
    b: &dyn AnyObservable,
) -> Result<Binding, ReactiveError> {
    if a.id() == b.id() {
        return Err(ReactiveError::SelfBinding(a.id()));
    }
    a.bind_bidirectional_erased(b)
}

/// Named collection of type-erased properties, in insertion order.
///
/// The set holds strong handles: its properties stay alive at least as long
/// as the set.
#[derive(Default)]
pub struct PropertySet {
    entries: Vec<(String, Box<dyn AnyObservable>)>,
}

impl PropertySet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register `property` under `name`, replacing (and returning) any
    /// property previously registered under that name.
    pub fn insert<T: Clone + PartialEq + 'static>(
        &mut self,
        name: impl Into<String>,
        property: &Observable<T>,
    ) -> Option<Box<dyn AnyObservable>> {
        self.insert_dyn(name, Box::new(property.clone()))
    }

    /// Register an already type-erased property.
    pub fn insert_dyn(
        &mut self,
        name: impl Into<String>,
        property: Box<dyn AnyObservable>,
    ) -> Option<Box<dyn AnyObservable>> {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, property)),
            None => {
                self.entries.push((name, property));
                None
            }
        }
    }

    /// Remove a property by name.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn AnyObservable>> {
        let pos = self.entries.iter().position(|(existing, _)| existing == name)?;
        Some(self.entries.remove(pos).1)
    }

    /// Whether a property is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    /// Number of registered properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Look up a property without fixing its value type.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnknownProperty`] when nothing is registered under
    /// `name`.
    pub fn get_dyn(&self, name: &str) -> Result<&dyn AnyObservable, ReactiveError> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, property)| property.as_ref())
            .ok_or_else(|| ReactiveError::UnknownProperty(name.to_owned()))
    }

    /// Look up a property and recover its typed handle.
    ///
    /// # Errors
    ///
    /// - [`ReactiveError::UnknownProperty`] for unregistered names.
    /// - [`ReactiveError::TypeMismatch`] when the value type is not `T`.
    pub fn get<T: Clone + PartialEq + 'static>(
        &self,
        name: &str,
    ) -> Result<Observable<T>, ReactiveError> {
        downcast::<T>(self.get_dyn(name)?).cloned()
    }

    /// One-way bind between two named properties of this set.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnknownProperty`], or anything [`bind_to_dyn`]
    /// returns.
    pub fn bind_to(&self, target: &str, source: &str) -> Result<Binding, ReactiveError> {
        bind_to_dyn(self.get_dyn(target)?, self.get_dyn(source)?)
    }

    /// Bidirectional bind between two named properties of this set.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::UnknownProperty`], or anything
    /// [`bind_bidirectional_dyn`] returns.
    pub fn bind_bidirectional(&self, a: &str, b: &str) -> Result<Binding, ReactiveError> {
        bind_bidirectional_dyn(self.get_dyn(a)?, self.get_dyn(b)?)
    }
}

impl Clone for PropertySet {
    fn clone(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(name, property)| (name.clone(), property.clone_boxed()))
                .collect(),
        }
    }
}

impl fmt::Debug for PropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, property)| (name, property)))
            .finish()
    }
}

/// Build a [`PropertySet`] from `name => observable` pairs.
///
/// # Examples
///
/// ```
/// use ftui_reactive::{Observable, property_set};
///
/// let volume = Observable::new(3);
/// let props = property_set! { "volume" => volume };
/// assert_eq!(props.get::<i32>("volume").unwrap().get(), 3);
/// ```
#[macro_export]
macro_rules! property_set {
    ($($name:expr => $property:expr),* $(,)?) => {{
        let mut set = $crate::PropertySet::new();
        $( set.insert($name, &$property); )*
        set
    }};
}
