//! Object hook table — pins host values referenced from the embedded heap
//!
//! The embedded collector cannot see host allocations and the host
//! collector cannot see embedded roots, so every host value wrapped into an
//! embedded data object is pinned here under the wrapper's heap address.
//! The entry lives exactly as long as the wrapper: it is inserted when the
//! wrapper is created and removed when the engine's finalization hook fires
//! for the wrapper's address.
//!
//! If the engine skips the finalization notification the entry leaks for
//! the life of the VM. That is accepted degradation, not a crash.

use rustc_hash::FxHashMap;

use quill_sdk::HostRef;

/// Key into the hook table: the embedded heap address of the wrapping
/// object. Used strictly as an identity token, never dereferenced.
pub type HookKey = usize;

/// Per-instance pinning table. Callers hold the per-VM lock; the table
/// itself is plain storage.
#[derive(Default)]
pub struct HookTable {
    entries: FxHashMap<HookKey, HostRef>,
}

impl HookTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a host value under an embedded address. Overwrites silently if
    /// the key already exists (re-wrap case).
    pub fn pin(&mut self, key: HookKey, value: HostRef) {
        self.entries.insert(key, value);
    }

    /// Look up the pinned value for an address.
    pub fn get(&self, key: HookKey) -> Option<HostRef> {
        self.entries.get(&key).cloned()
    }

    /// Release the value pinned under an address. A missing key is a no-op
    /// so replayed finalization notifications are harmless.
    pub fn unpin(&mut self, key: HookKey) {
        self.entries.remove(&key);
    }

    /// Number of live pins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no pins are live
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
