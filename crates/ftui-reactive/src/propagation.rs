#![forbid(unsafe_code)]

//! Cascade frames and the in-flight cycle guard.
//!
//! Every external write opens a *cascade frame* holding the set of property
//! ids written so far in that cascade. Binding links consult the top frame
//! before writing into a linked property: a property already in flight is
//! skipped, which breaks `A → B → A` feedback loops even when values never
//! settle (for example, through lossy mapped bindings).
//!
//! # State Machine
//!
//! ```text
//! Idle ──set()──▶ Propagating{in_flight} ──cascade done──▶ Idle
//!                       │
//!                       └─ listener calls set() ──▶ new frame pushed on top
//! ```
//!
//! Only the top frame is consulted, so a listener that deliberately writes a
//! property again starts a fresh cascade instead of being silently dropped.
//! Runaway listener recursion is bounded by
//! [`ReactiveConfig::max_cascade_depth`].
//!
//! # Invariants
//!
//! 1. A property is written at most once per cascade frame through bindings.
//! 2. Frames are popped by [`CascadeGuard`] on every exit path, including
//!    errors and unwinding, so the guard can never stay "stuck".
//! 3. The frame stack is empty whenever no `set` is executing.

use std::cell::RefCell;

use crate::config::ReactiveConfig;
use crate::error::ReactiveError;
use crate::observable::PropertyId;

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

struct Frame {
    in_flight: Vec<PropertyId>,
}

/// Scoped ownership of one cascade frame.
///
/// Dropping the guard pops its frame (and any frame above it).
#[must_use = "dropping the guard ends the cascade"]
pub(crate) struct CascadeGuard {
    depth: usize,
    #[cfg(feature = "tracing")]
    _span: tracing::span::EnteredSpan,
}

/// Open a new cascade frame for an external write to `origin`.
pub(crate) fn enter_cascade(origin: PropertyId) -> Result<CascadeGuard, ReactiveError> {
    let limit = ReactiveConfig::current().max_cascade_depth.max(1);
    let depth = FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        if frames.len() >= limit {
            return Err(ReactiveError::CascadeDepthExceeded { limit });
        }
        frames.push(Frame {
            in_flight: vec![origin],
        });
        Ok(frames.len())
    })?;
    tracing::trace!(property = %origin, depth, "cascade entered");
    Ok(CascadeGuard {
        depth,
        #[cfg(feature = "tracing")]
        _span: tracing::debug_span!("cascade", property = %origin, depth).entered(),
    })
}

/// Mark `id` as in flight in the current frame.
///
/// Returns `false` when `id` was already written in this frame, in which case
/// the caller must not propagate into it.
pub(crate) fn mark_in_flight(id: PropertyId) -> bool {
    let marked = FRAMES.with(|frames| match frames.borrow_mut().last_mut() {
        Some(frame) if frame.in_flight.contains(&id) => false,
        Some(frame) => {
            frame.in_flight.push(id);
            true
        }
        None => true,
    });
    if !marked {
        tracing::trace!(property = %id, "cycle suppressed");
    }
    marked
}

impl Drop for CascadeGuard {
    fn drop(&mut self) {
        let _ = FRAMES.try_with(|frames| {
            frames.borrow_mut().truncate(self.depth - 1);
        });
    }
}

/// Number of cascade frames currently open on this thread.
///
/// Zero outside of any `set`; one inside listeners of a plain external write.
#[must_use]
pub fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// Whether `id` has been written in the innermost open cascade frame.
#[must_use]
pub fn is_in_flight(id: PropertyId) -> bool {
    FRAMES.with(|frames| {
        frames
            .borrow()
            .last()
            .is_some_and(|frame| frame.in_flight.contains(&id))
    })
}
