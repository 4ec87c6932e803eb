#![no_main]

use arbitrary::Arbitrary;
use ftui_reactive::{
    Binding, BindingKind, Observable, ReactiveError, bind_bidirectional, bind_to, propagation,
};
use libfuzzer_sys::fuzz_target;

const SLOTS: usize = 8;

#[derive(Arbitrary, Debug)]
enum Op {
    BindBoth(u8, u8),
    BindOneWay { target: u8, source: u8 },
    Unbind(u8),
    Resync(u8),
    Set(u8, u8),
    DropProperty(u8),
    Recreate(u8, u8),
}

struct Graph {
    props: Vec<Option<Observable<u8>>>,
    bindings: Vec<(usize, usize, Binding)>,
}

impl Graph {
    fn slot(index: u8) -> usize {
        usize::from(index) % SLOTS
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::BindBoth(a, b) => {
                self.bind(Self::slot(a), Self::slot(b), BindingKind::Bidirectional);
            }
            Op::BindOneWay { target, source } => {
                self.bind(Self::slot(target), Self::slot(source), BindingKind::OneWay);
            }
            Op::Unbind(k) => {
                if !self.bindings.is_empty() {
                    let (_, _, binding) = self.bindings.remove(usize::from(k) % self.bindings.len());
                    binding.unbind();
                    assert!(!binding.is_active());
                }
            }
            Op::Resync(k) => {
                if self.bindings.is_empty() {
                    return;
                }
                let (left, right, binding) = &self.bindings[usize::from(k) % self.bindings.len()];
                match binding.resync() {
                    Ok(()) => {
                        let (Some(left), Some(right)) = (&self.props[*left], &self.props[*right]) else {
                            panic!("resync succeeded on a binding with a dropped endpoint");
                        };
                        assert_eq!(left.get(), right.get());
                    }
                    Err(ReactiveError::UseAfterDetach) => assert!(!binding.is_active()),
                    Err(other) => panic!("unexpected resync error: {other}"),
                }
            }
            Op::Set(i, v) => {
                if let Some(prop) = &self.props[Self::slot(i)] {
                    prop.set(v);
                    assert_eq!(prop.get(), v);
                }
            }
            Op::DropProperty(i) => {
                let slot = Self::slot(i);
                self.props[slot] = None;
                self.bindings.retain(|(left, right, binding)| {
                    if *left == slot || *right == slot {
                        assert!(!binding.is_active(), "dropping an endpoint detaches the binding");
                        false
                    } else {
                        true
                    }
                });
            }
            Op::Recreate(i, v) => {
                let slot = &mut self.props[Self::slot(i)];
                if slot.is_none() {
                    *slot = Some(Observable::new(v));
                }
            }
        }
    }

    fn bind(&mut self, left: usize, right: usize, kind: BindingKind) {
        let (Some(l), Some(r)) = (&self.props[left], &self.props[right]) else {
            return;
        };
        let result = match kind {
            BindingKind::Bidirectional => bind_bidirectional(l, r),
            BindingKind::OneWay => bind_to(l, r),
        };
        match result {
            Ok(binding) => {
                assert_eq!(l.get(), r.get());
                self.bindings.push((left, right, binding));
            }
            Err(ReactiveError::SelfBinding(_)) => assert_eq!(left, right),
            Err(other) => panic!("unexpected bind error: {other}"),
        }
    }

    fn check(&self) {
        assert_eq!(propagation::depth(), 0);
        for (left, right, binding) in &self.bindings {
            let (Some(l), Some(r)) = (&self.props[*left], &self.props[*right]) else {
                panic!("binding kept after its endpoint was dropped");
            };
            assert!(binding.is_active());
            if binding.kind() == BindingKind::Bidirectional {
                assert_eq!(l.get(), r.get());
            }
        }
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let mut graph = Graph {
        props: (0..SLOTS as u8).map(|i| Some(Observable::new(i))).collect(),
        bindings: Vec::new(),
    };
    for op in ops.iter().take(256) {
        graph.apply(op);
        graph.check();
    }
});
