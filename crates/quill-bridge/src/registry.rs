//! Process-wide registry of live VM instances
//!
//! Native callback entry points receive only a small integer, not a
//! closure; this registry is how they recover the owning bridge context.
//! One coarse lock guards registration from concurrent host threads
//! opening instances simultaneously.
//!
//! Growth policy: the registry grows by appending. Slot reuse is attempted
//! only past a size threshold, and only by scanning for empty slots — if
//! none is found it keeps appending. This trades memory for correctness
//! under churn: an index is never handed out while any embedded value
//! might still encode its previous occupant below the threshold.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use quill_sdk::StateIndex;

use crate::state::{Vm, VmState};

/// Past this many slots, registration scans for a reusable empty slot
/// before appending.
const REUSE_THRESHOLD: usize = 500;

// Slot 0 is reserved and never occupied, so a zero index can never name a
// live instance.
static STATES: Lazy<Mutex<Vec<Option<Arc<VmState>>>>> =
    Lazy::new(|| Mutex::new(vec![None]));

/// Register a newly opened instance, returning its index.
pub(crate) fn register(state: Arc<VmState>) -> StateIndex {
    let mut states = STATES.lock();

    if states.len() > REUSE_THRESHOLD {
        for idx in 1..states.len() {
            if states[idx].is_none() {
                states[idx] = Some(state);
                return StateIndex(idx);
            }
        }
    }

    states.push(Some(state));
    StateIndex(states.len() - 1)
}

/// Recover the instance for a callback index.
///
/// Panics if the index is out of bounds or the slot is empty: a callback
/// fired for a destroyed instance is a correctness bug, not a recoverable
/// condition.
pub(crate) fn lookup(index: StateIndex) -> Vm {
    let states = STATES.lock();

    let slot = states
        .get(index.0)
        .unwrap_or_else(|| panic!("state index {} is out of range", index.0));

    match slot {
        Some(state) => Vm::from_state(state.clone()),
        None => panic!("state index {} does not name a live instance", index.0),
    }
}

/// Free an instance's slot at close.
pub(crate) fn remove(index: StateIndex) {
    let mut states = STATES.lock();
    if index.0 > 0 && index.0 < states.len() {
        states[index.0] = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Vm;
    use crate::stub::StubEngine;
    use std::panic::AssertUnwindSafe;

    #[test]
    fn test_register_lookup_roundtrip() {
        let vm = Vm::open(Box::new(StubEngine::new()));
        let index = vm.index();
        assert!(index.0 > 0);

        let found = lookup(index);
        assert_eq!(found.index(), index);

        vm.close();
    }

    #[test]
    fn test_lookup_after_remove_panics() {
        let vm = Vm::open(Box::new(StubEngine::new()));
        let index = vm.index();
        vm.close();

        // Indices below the reuse threshold are never reassigned, so the
        // slot stays empty and the lookup must fail fatally.
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = lookup(index);
        }));
        assert!(outcome.is_err());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_lookup_out_of_range_panics() {
        let _ = lookup(StateIndex(usize::MAX));
    }

    #[test]
    fn test_concurrent_registration_yields_distinct_indices() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    let vm = Vm::open(Box::new(StubEngine::new()));
                    let index = vm.index();
                    vm.close();
                    index
                })
            })
            .collect();

        let mut indices: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), 8);
    }
}
