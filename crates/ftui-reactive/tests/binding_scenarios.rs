//! End-to-end binding scenarios.
//!
//! These tests exercise whole binding graphs through the public API:
//!
//! 1. Bind-time synchronization and the "right operand wins" rule.
//! 2. Exactly-once notification across cycles.
//! 3. Dropping bindings and properties, or rewriting values, mid-cascade.
//! 4. Error and panic paths leave the propagation engine idle.
//! 5. Configured depth limits and target-write policies.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use ftui_reactive::{
    Binding, BindingScope, Observable, ReactiveConfig, ReactiveError, Subscription,
    TargetWritePolicy, bind_bidirectional, bind_sink, bind_to, propagation,
};

// ── Helpers ─────────────────────────────────────────────────────────────

fn hits<T: Clone + PartialEq + 'static>(obs: &Observable<T>) -> (Rc<Cell<u32>>, Subscription) {
    let count = Rc::new(Cell::new(0u32));
    let c = Rc::clone(&count);
    let sub = obs.subscribe(move |_| c.set(c.get() + 1));
    (count, sub)
}

fn log_values(obs: &Observable<i32>, name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Subscription {
    let log = Rc::clone(log);
    obs.subscribe(move |v| log.borrow_mut().push(format!("{name}: {v}")))
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Bind-time synchronization
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn bidirectional_basic_scenario() {
    let a = Observable::new(1);
    let b = Observable::new(2);
    let (a_hits, _sa) = hits(&a);
    let (b_hits, _sb) = hits(&b);

    let _binding = bind_bidirectional(&a, &b).unwrap();
    assert_eq!((a.get(), b.get()), (2, 2));
    assert_eq!((a_hits.get(), b_hits.get()), (1, 0), "only a changed at bind time");

    a.set(10);
    assert_eq!(b.get(), 10);
    assert_eq!((a_hits.get(), b_hits.get()), (2, 1));

    b.set(10);
    assert_eq!((a_hits.get(), b_hits.get()), (2, 1), "equal write notifies nobody");
}

#[test]
fn one_way_with_source_change_and_target_write() {
    let source = Observable::new(3);
    let target = Observable::new(0);
    let _binding = bind_to(&target, &source).unwrap();

    source.set(4);
    assert_eq!(target.get(), 4);

    target.set(8);
    assert_eq!(source.get(), 4);
    source.set(5);
    assert_eq!(target.get(), 5);
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Cycles
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn three_cycle_notifies_each_exactly_once() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let c = Observable::new(0);
    let _ab = bind_bidirectional(&a, &b).unwrap();
    let _bc = bind_bidirectional(&b, &c).unwrap();
    let _ca = bind_bidirectional(&c, &a).unwrap();

    let (a_hits, _sa) = hits(&a);
    let (b_hits, _sb) = hits(&b);
    let (c_hits, _sc) = hits(&c);

    a.set(5);
    assert_eq!((a.get(), b.get(), c.get()), (5, 5, 5));
    assert_eq!((a_hits.get(), b_hits.get(), c_hits.get()), (1, 1, 1));

    c.set(6);
    assert_eq!((a.get(), b.get(), c.get()), (6, 6, 6));
    assert_eq!((a_hits.get(), b_hits.get(), c_hits.get()), (2, 2, 2));
    assert_eq!(propagation::depth(), 0);
}

#[test]
fn two_binding_chain_notifies_each_exactly_once() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let c = Observable::new(0);
    let _ab = bind_bidirectional(&a, &b).unwrap();
    let _bc = bind_bidirectional(&b, &c).unwrap();
    let (b_hits, _sb) = hits(&b);
    let (c_hits, _sc) = hits(&c);

    a.set(4);
    assert_eq!((b.get(), c.get()), (4, 4));
    assert_eq!((b_hits.get(), c_hits.get()), (1, 1));

    for value in [5, 6, 5, 6, 7] {
        c.set(value);
        assert_eq!(a.get(), value);
        a.set(value + 100);
        assert_eq!(c.get(), value + 100);
    }
    assert_eq!(propagation::depth(), 0);
}

#[test]
fn destroyed_binding_stops_propagation() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let binding = bind_to(&b, &a).unwrap();
    a.set(1);
    assert_eq!(b.get(), 1);

    drop(binding);
    a.set(5);
    assert_eq!(b.get(), 1);
    assert!(!b.is_driven());
}

#[test]
fn one_way_ring_terminates() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let c = Observable::new(0);
    let _ab = bind_to(&b, &a).unwrap();
    let _bc = bind_to(&c, &b).unwrap();
    let _ca = bind_to(&a, &c).unwrap();

    let (a_hits, _sa) = hits(&a);
    b.set(9);
    assert_eq!((a.get(), b.get(), c.get()), (9, 9, 9));
    assert_eq!(a_hits.get(), 1);
}

#[test]
fn listeners_run_after_links() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let seen_in_listener = Rc::new(Cell::new(-1));
    let s = Rc::clone(&seen_in_listener);
    let b_handle = b.clone();
    let _sub = a.subscribe(move |_| s.set(b_handle.get()));

    let _binding = bind_bidirectional(&b, &a).unwrap();
    a.set(3);
    assert_eq!(seen_in_listener.get(), 3, "b is already updated when a's listeners run");
}

#[test]
fn chained_bindings_replay() {
    let a = Observable::new(11);
    let b = Observable::new(1212);
    let c = Observable::new(555);
    let d = Observable::new(3);
    let e = Observable::new(3);
    let wat = Rc::new(Cell::new(10));

    let log = Rc::new(RefCell::new(Vec::new()));
    let _subs = [
        log_values(&a, "a", &log),
        log_values(&b, "b", &log),
        log_values(&c, "c", &log),
        log_values(&d, "d", &log),
        log_values(&e, "e", &log),
    ];

    let _w = bind_sink(Rc::clone(&wat), &a);
    assert_eq!(wat.get(), 11);

    let _binding = bind_bidirectional(&a, &b).unwrap();
    let _binding2 = bind_bidirectional(&c, &d).unwrap();
    assert_eq!((a.get(), b.get(), c.get(), d.get()), (1212, 1212, 3, 3));
    {
        let _binding1 = bind_bidirectional(&b, &c).unwrap();
        let _binding3 = bind_to(&e, &a).unwrap();
        assert_eq!((a.get(), b.get(), c.get(), d.get(), e.get()), (3, 3, 3, 3, 3));

        e.set(1000);
        assert_eq!(a.get(), 3);

        a.set(10);
        assert_eq!((a.get(), b.get(), c.get(), d.get(), e.get()), (10, 10, 10, 10, 10));

        d.set(500);
        assert_eq!((a.get(), b.get(), c.get(), d.get(), e.get()), (500, 500, 500, 500, 500));
    }

    a.set(11);
    assert_eq!((a.get(), b.get()), (11, 11));
    assert_eq!((c.get(), d.get(), e.get()), (500, 500, 500));

    b.set(100);
    assert_eq!((a.get(), b.get(), c.get(), d.get(), e.get()), (100, 100, 500, 500, 500));
    assert_eq!(wat.get(), 100);

    let log = log.borrow();
    let d_entries: Vec<_> = log.iter().filter(|line| line.starts_with("d:")).collect();
    assert_eq!(d_entries, vec!["d: 10", "d: 500"]);
    assert_eq!(log.iter().filter(|line| *line == "a: 500").count(), 1);
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Detaching and rewriting mid-cascade
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn binding_dropped_by_listener_during_cascade() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let holder: Rc<RefCell<Option<Binding>>> =
        Rc::new(RefCell::new(Some(bind_bidirectional(&a, &b).unwrap())));

    let h = Rc::clone(&holder);
    let _sub = a.subscribe(move |_| {
        if let Some(binding) = h.borrow_mut().take() {
            assert!(binding.unbind());
        }
    });

    a.set(1);
    assert_eq!(b.get(), 1, "the running cascade completes");
    a.set(2);
    assert_eq!(b.get(), 1);
    assert_eq!(a.binding_count(), 0);
}

#[test]
fn property_dropped_by_listener_during_cascade() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let c_slot = Rc::new(RefCell::new(Some(Observable::new(0))));
    let c_weak = c_slot.borrow().as_ref().map(Observable::downgrade).unwrap();

    let _ab = bind_bidirectional(&a, &b).unwrap();
    let bc = {
        let c = c_slot.borrow();
        bind_bidirectional(&b, c.as_ref().unwrap()).unwrap()
    };

    let slot = Rc::clone(&c_slot);
    let _sub = b.subscribe(move |_| {
        slot.borrow_mut().take();
    });

    a.set(1);
    assert!(!c_weak.is_alive());
    assert!(!bc.is_active());
    assert!(matches!(bc.resync(), Err(ReactiveError::UseAfterDetach)));
    assert_eq!(b.binding_count(), 1);

    a.set(2);
    assert_eq!(b.get(), 2);
}

#[test]
fn scope_dropped_from_listener() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let c = Observable::new(0);
    let scope = Rc::new(RefCell::new(Some(BindingScope::new())));
    if let Some(scope) = scope.borrow_mut().as_mut() {
        scope.bind_bidirectional(&a, &b).unwrap();
        scope.bind_to(&c, &b).unwrap();
    }

    let s = Rc::clone(&scope);
    let _sub = c.subscribe(move |v| {
        if *v == 7 {
            s.borrow_mut().take();
        }
    });

    a.set(7);
    assert_eq!((b.get(), c.get()), (7, 7));
    assert!(!c.is_driven());

    a.set(8);
    assert_eq!((b.get(), c.get()), (7, 7));
}

#[test]
fn listener_rewrite_mid_cascade_keeps_endpoints_in_sync() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let c = Observable::new(0);
    let _ab = bind_bidirectional(&a, &b).unwrap();
    let _ac = bind_bidirectional(&a, &c).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let _la = log_values(&a, "a", &log);
    let _lc = log_values(&c, "c", &log);

    let a_weak = a.downgrade();
    let _sub = b.subscribe(move |v| {
        if *v == 1 {
            if let Some(a) = a_weak.upgrade() {
                a.set(2);
            }
        }
    });

    a.set(1);
    assert_eq!((a.get(), b.get(), c.get()), (2, 2, 2));
    assert_eq!(*log.borrow(), vec!["c: 2", "a: 2"], "nobody sees the superseded value");
    assert_eq!(propagation::depth(), 0);

    c.set(3);
    assert_eq!((a.get(), b.get(), c.get()), (3, 3, 3));
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Error paths
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn listener_error_leaves_engine_idle() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let _binding = bind_bidirectional(&a, &b).unwrap();
    let _sub = b.try_subscribe(|new, _| {
        if *new == 13 {
            Err("unlucky".into())
        } else {
            Ok(())
        }
    });

    let err = a.try_set(13).unwrap_err();
    assert!(matches!(err, ReactiveError::Listener { property, .. } if property == b.id()));
    assert_eq!(b.get(), 13);
    assert_eq!(propagation::depth(), 0);

    a.set(14);
    assert_eq!(b.get(), 14, "cascades keep working after a failure");
}

#[test]
fn listener_panic_leaves_engine_idle() {
    let a = Observable::new(0);
    let b = Observable::new(0);
    let _binding = bind_bidirectional(&a, &b).unwrap();
    let _sub = b.subscribe(|v| {
        if *v == 99 {
            panic!("listener exploded");
        }
    });

    let result = catch_unwind(AssertUnwindSafe(|| a.set(99)));
    assert!(result.is_err());
    assert_eq!(propagation::depth(), 0);

    b.set(1);
    assert_eq!(a.get(), 1);
    a.set(2);
    assert_eq!(b.get(), 2);
}

#[test]
fn self_binding_is_rejected_everywhere() {
    let a = Observable::new(0);
    assert!(matches!(bind_to(&a, &a), Err(ReactiveError::SelfBinding(_))));
    assert!(matches!(bind_bidirectional(&a, &a.clone()), Err(ReactiveError::SelfBinding(_))));
    assert_eq!(a.binding_count(), 0);
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Configuration
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn runaway_listener_chain_hits_depth_limit() {
    let _config = ReactiveConfig::default()
        .with_max_cascade_depth(3)
        .push_override();

    let props: Vec<Observable<i32>> = (0..5).map(|_| Observable::new(0)).collect();
    let mut subs = Vec::new();
    for pair in props.windows(2) {
        let next = pair[1].clone();
        subs.push(pair[0].try_subscribe(move |v, _| Ok(next.try_set(*v).map(drop)?)));
    }

    let err = props[0].try_set(1).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ReactiveError::CascadeDepthExceeded { limit: 3 }
    ));
    let values: Vec<i32> = props.iter().map(Observable::get).collect();
    assert_eq!(values, vec![1, 1, 1, 0, 0]);
    assert_eq!(propagation::depth(), 0);
}

#[test]
fn bindings_do_not_consume_depth() {
    let _config = ReactiveConfig::default()
        .with_max_cascade_depth(1)
        .push_override();

    let props: Vec<Observable<u8>> = (0..32).map(|_| Observable::new(0)).collect();
    let _bindings: Vec<Binding> = props
        .windows(2)
        .map(|pair| bind_bidirectional(&pair[0], &pair[1]).unwrap())
        .collect();

    props[0].set(7);
    assert!(props.iter().all(|p| p.get() == 7));
}

#[test]
fn reject_policy_protects_targets() {
    let _config = ReactiveConfig::default()
        .with_target_writes(TargetWritePolicy::Reject)
        .push_override();

    let source = Observable::new(1);
    let target = Observable::new(0);
    let binding = bind_to(&target, &source).unwrap();

    assert!(matches!(target.try_set(2), Err(ReactiveError::ReadOnlyTarget(_))));
    assert_eq!(target.get(), 1);

    binding.unbind();
    assert!(target.try_set(2).unwrap());
}
