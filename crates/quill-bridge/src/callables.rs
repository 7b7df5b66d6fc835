//! Callable registry — indexed host callables reachable from embedded code
//!
//! Embedded procs and methods cannot hold a host closure; the only payload
//! they carry is a small integer. This registry maps those integers back to
//! host callables. Registration is append-only for the life of the VM:
//! embedded objects may retain an index indefinitely, so slots are never
//! compacted or reused.

use std::sync::Arc;

use quill_sdk::{EmbeddedValue, EngineResult, HostFn, StateIndex};

use crate::state::Vm;

/// The bridge's canonical fixed-signature callable: receives the owning
/// instance and the call's receiver, reads arguments through the instance's
/// current call frame (see the argument scanner).
pub type NativeFn =
    Arc<dyn Fn(&Vm, EmbeddedValue) -> EngineResult<EmbeddedValue> + Send + Sync>;

/// A registered host callable, in one of the two supported calling
/// conventions.
#[derive(Clone)]
pub enum Callable {
    /// Fixed native signature
    Native(NativeFn),
    /// Arbitrary host function with registration-time signature metadata;
    /// dispatched through per-parameter conversion
    Reflective(HostFn),
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Native(_) => write!(f, "Callable::Native"),
            Callable::Reflective(hf) => write!(f, "Callable::Reflective({:?})", hf.signature()),
        }
    }
}

/// Reference to a registered callable.
///
/// The embedded side stores only `index`; the host-facing reference also
/// records the owning instance so cross-instance misuse is rejected
/// instead of silently dispatching into another instance's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallableRef {
    /// Registry index of the owning VM instance
    pub owner: StateIndex,
    /// Index into that instance's callable table
    pub index: u32,
}

/// Outcome of resolving an index that did not yield a usable callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// Index out of range: stale or cross-instance reference. Fatal —
    /// a bridge-internal bug, surfaced as a runtime-error-class exception.
    NotFound(u32),
    /// Index valid but the stored callable does not support the requested
    /// convention. User-triggerable, surfaced as a type error.
    WrongConvention(u32),
}

/// Append-only callable table. Callers hold the per-VM lock.
#[derive(Default)]
pub struct CallableRegistry {
    entries: Vec<Callable>,
}

impl CallableRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable, returning its stable index.
    pub fn register(&mut self, callable: Callable) -> u32 {
        let index = self.entries.len() as u32;
        self.entries.push(callable);
        index
    }

    /// Resolve an index to its callable.
    pub fn resolve(&self, index: u32) -> Result<Callable, ResolveError> {
        self.entries
            .get(index as usize)
            .cloned()
            .ok_or(ResolveError::NotFound(index))
    }

    /// Resolve an index, requiring the reflective convention.
    pub fn resolve_reflective(&self, index: u32) -> Result<HostFn, ResolveError> {
        match self.resolve(index)? {
            Callable::Reflective(hf) => Ok(hf),
            Callable::Native(_) => Err(ResolveError::WrongConvention(index)),
        }
    }

    /// Number of registered callables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no callables are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_sdk::HostValue;

    fn native_returning(v: i64) -> Callable {
        Callable::Native(Arc::new(move |_vm, _self| Ok(EmbeddedValue::Int(v))))
    }

    #[test]
    fn test_register_is_append_only() {
        let mut reg = CallableRegistry::new();
        let a = reg.register(native_returning(1));
        let b = reg.register(native_returning(2));
        let c = reg.register(Callable::Reflective(HostFn::wrap(|| HostValue::Nil)));

        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_resolve_not_found() {
        let reg = CallableRegistry::new();
        assert_eq!(reg.resolve(0).unwrap_err(), ResolveError::NotFound(0));
        assert_eq!(reg.resolve(99).unwrap_err(), ResolveError::NotFound(99));
    }

    #[test]
    fn test_resolve_wrong_convention() {
        let mut reg = CallableRegistry::new();
        let idx = reg.register(native_returning(1));
        assert_eq!(
            reg.resolve_reflective(idx).unwrap_err(),
            ResolveError::WrongConvention(idx)
        );
    }

    #[test]
    fn test_resolve_returns_registered_callable() {
        let mut reg = CallableRegistry::new();
        let hf = HostFn::wrap(|a: i64| a + 1);
        let idx = reg.register(Callable::Reflective(hf.clone()));

        let resolved = reg.resolve_reflective(idx).unwrap();
        assert_eq!(
            resolved.call(&[HostValue::Int(1)]).unwrap(),
            vec![HostValue::Int(2)]
        );
    }
}
