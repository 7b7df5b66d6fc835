//! Engine trait — abstract embedded VM operations
//!
//! Defines the interface the embedded engine implements. The bridge programs
//! against this trait only; parser, bytecode compiler, interpreter loop and
//! the embedded collector live behind it and are never observed directly.
//!
//! Native callback entry points cannot capture closures, so the engine is
//! handed a `DispatchTable` of plain function pointers at open time. Every
//! table entry receives the small-integer `StateIndex` of the owning bridge
//! instance and recovers the full context through the process-wide state
//! registry.

use crate::value::{EmbeddedValue, SymId};

/// Index of a bridge instance in the process-wide state registry.
///
/// Assigned at VM open, freed at close. This is the only piece of bridge
/// context a native callback receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateIndex(pub usize);

/// Opaque handle to an engine-side class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassRef(pub usize);

/// Declared argument shape of a bound method, in engine terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    /// Number of required leading arguments
    pub required: u32,
    /// Number of optional trailing arguments
    pub optional: u32,
    /// Accepts any number of trailing arguments
    pub rest: bool,
}

impl ArgSpec {
    /// No arguments
    pub const fn none() -> Self {
        ArgSpec {
            required: 0,
            optional: 0,
            rest: false,
        }
    }

    /// Exactly `n` required arguments
    pub const fn req(n: u32) -> Self {
        ArgSpec {
            required: n,
            optional: 0,
            rest: false,
        }
    }

    /// `req` required plus `opt` optional arguments
    pub const fn arg(req: u32, opt: u32) -> Self {
        ArgSpec {
            required: req,
            optional: opt,
            rest: false,
        }
    }

    /// Any number of arguments
    pub const fn any() -> Self {
        ArgSpec {
            required: 0,
            optional: 0,
            rest: true,
        }
    }
}

/// Method registration payload: the callable-registry index the method
/// dispatches to, plus its declared argument shape.
///
/// The index is the *only* state the engine stores for the method; it is
/// echoed back verbatim through `DispatchTable::call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    /// Callable-registry index within the owning bridge instance
    pub callable: u32,
    /// Declared argument shape
    pub aspec: ArgSpec,
}

/// An exception crossing the host/embedded boundary.
///
/// Carried by class name rather than by engine handle so it can be built on
/// either side of the boundary without engine cooperation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{class_name}: {message}")]
pub struct EngineException {
    /// Embedded exception class name (e.g. "TypeError")
    pub class_name: String,
    /// Exception message
    pub message: String,
}

impl EngineException {
    /// Build an exception with an explicit class name
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        EngineException {
            class_name: class_name.into(),
            message: message.into(),
        }
    }

    /// RuntimeError-class exception
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }

    /// TypeError-class exception
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// ArgumentError-class exception
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new("ArgumentError", message)
    }

    /// NameError-class exception
    pub fn name_error(message: impl Into<String>) -> Self {
        Self::new("NameError", message)
    }

    /// StandardError-class exception
    pub fn standard(message: impl Into<String>) -> Self {
        Self::new("StandardError", message)
    }
}

/// Result of an engine operation that may raise.
pub type EngineResult<T> = Result<T, EngineException>;

/// Fixed native entry points the engine dispatches through.
///
/// The engine stores only small integers (state index, callable index,
/// object addresses); the table functions recover the owning bridge
/// instance and route to registered host callables.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTable {
    /// Invoke callable `callable` of instance `state` with receiver,
    /// positional arguments and trailing block value (nil if absent).
    pub call: fn(
        state: StateIndex,
        callable: u32,
        receiver: EmbeddedValue,
        args: &[EmbeddedValue],
        block: EmbeddedValue,
    ) -> EngineResult<EmbeddedValue>,

    /// Notify instance `state` that the data object at `addr` has been
    /// reclaimed. Must be invoked before the embedded slot is reused.
    pub finalize: fn(state: StateIndex, addr: usize),

    /// Safe-point hook: instance `state` may service queued host work.
    pub service: fn(state: StateIndex),
}

/// Abstract embedded engine.
///
/// One `Engine` value backs exactly one VM instance. The `Send + Sync`
/// bounds let the instance handle be shared between host threads; actual
/// embedded execution is still single-threaded per instance, enforced by
/// the bridge's instance lock, so implementations may use plain interior
/// mutability without caring about concurrent interpretation.
pub trait Engine: Send + Sync {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Install the dispatch table and the owning instance's registry index.
    /// Called once, immediately after open.
    fn install_dispatch(&self, state: StateIndex, table: &'static DispatchTable);

    /// Release the engine. Called once, after all background work has been
    /// acknowledged. No callbacks may fire afterwards.
    fn close(&self);

    /// Run the embedded collector. Data-object reclamation triggers
    /// `DispatchTable::finalize` for every reclaimed wrapper.
    fn run_gc(&self);

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Parse and execute source text.
    fn eval(&self, source: &str) -> EngineResult<EmbeddedValue>;

    // ========================================================================
    // Value allocation
    // ========================================================================

    /// Intern a symbol name
    fn intern(&self, name: &str) -> SymId;

    /// Name of an interned symbol
    fn symbol_name(&self, sym: SymId) -> String;

    /// Allocate a byte string (byte-exact, not assumed valid UTF-8)
    fn new_string(&self, bytes: &[u8]) -> EmbeddedValue;

    /// Allocate an array
    fn new_array(&self, items: &[EmbeddedValue]) -> EmbeddedValue;

    /// Allocate a hash from key/value pairs (insertion order preserved)
    fn new_hash(&self, pairs: &[(EmbeddedValue, EmbeddedValue)]) -> EmbeddedValue;

    /// Allocate a proc whose entire captured environment is the given
    /// callable-registry index.
    fn new_proc(&self, callable: u32) -> EmbeddedValue;

    /// Allocate an opaque data object of the given class. The returned
    /// reference's address is the hook key for the pinned host value.
    fn new_data_object(&self, class: ClassRef) -> EmbeddedValue;

    /// Allocate an exception value
    fn new_exception(&self, exc: &EngineException) -> EmbeddedValue;

    /// Allocate an integer range: (start, end, end-exclusive)
    fn new_range(&self, start: i64, end: i64, exclusive: bool) -> EmbeddedValue;

    // ========================================================================
    // Value inspection
    // ========================================================================

    /// Bytes of a string value
    fn string_bytes(&self, value: EmbeddedValue) -> EngineResult<Vec<u8>>;

    /// Elements of an array value
    fn array_items(&self, value: EmbeddedValue) -> EngineResult<Vec<EmbeddedValue>>;

    /// Key/value pairs of a hash value, in insertion order
    fn hash_pairs(&self, value: EmbeddedValue)
        -> EngineResult<Vec<(EmbeddedValue, EmbeddedValue)>>;

    /// Callable-registry index captured by a proc, if the proc was created
    /// through `new_proc`
    fn proc_callable(&self, value: EmbeddedValue) -> Option<u32>;

    /// Bounds of a range value: (start, end, end-exclusive)
    fn range_bounds(&self, value: EmbeddedValue) -> EngineResult<(i64, i64, bool)>;

    /// Class name and message of an exception value
    fn exception_info(&self, value: EmbeddedValue) -> EngineResult<EngineException>;

    // ========================================================================
    // Object members ("instance variables")
    // ========================================================================

    /// Names of an object's members, in definition order
    fn member_names(&self, value: EmbeddedValue) -> Vec<String>;

    /// Read a member by name (nil if unset)
    fn member_get(&self, value: EmbeddedValue, name: &str) -> EngineResult<EmbeddedValue>;

    /// Write a member by name
    fn member_set(
        &self,
        value: EmbeddedValue,
        name: &str,
        member: EmbeddedValue,
    ) -> EngineResult<()>;

    // ========================================================================
    // Classes
    // ========================================================================

    /// The engine's base object class
    fn object_class(&self) -> ClassRef;

    /// Define (or reopen) a class under the root namespace
    fn define_class(&self, name: &str, superclass: Option<ClassRef>) -> ClassRef;

    /// Define (or reopen) a module under the root namespace
    fn define_module(&self, name: &str) -> ClassRef;

    /// Define a method dispatching to a registered callable
    fn define_method(&self, class: ClassRef, name: &str, spec: MethodSpec);

    /// Alias an existing method under a second name
    fn alias_method(&self, class: ClassRef, alias: &str, original: &str);

    /// Check whether a method is defined (including inherited ones)
    fn method_defined(&self, class: ClassRef, name: &str) -> bool;

    /// Mark a class so its instances use the opaque data representation
    /// instead of plain member storage.
    fn mark_data_class(&self, class: ClassRef);

    /// Class of a value
    fn class_of(&self, value: EmbeddedValue) -> ClassRef;

    /// Name of a class
    fn class_name(&self, class: ClassRef) -> String;

    /// Class handle as a value
    fn class_value(&self, class: ClassRef) -> EmbeddedValue;

    /// Root-namespace constant lookup
    fn const_get(&self, name: &str) -> Option<EmbeddedValue>;

    /// Class handle of a class-valued constant, if the value is a class
    fn value_class(&self, value: EmbeddedValue) -> Option<ClassRef>;

    /// True if the class descends from the engine's exception class
    fn exception_class_p(&self, class: ClassRef) -> bool;

    /// Allocate and initialize an instance (runs the class initializer)
    fn new_instance(
        &self,
        class: ClassRef,
        args: &[EmbeddedValue],
    ) -> EngineResult<EmbeddedValue>;

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Invoke a method by name with positional arguments and an optional
    /// trailing block value. Exceptions raised inside the engine are
    /// captured and returned, never left pending.
    fn call(
        &self,
        receiver: EmbeddedValue,
        method: &str,
        args: &[EmbeddedValue],
        block: Option<EmbeddedValue>,
    ) -> EngineResult<EmbeddedValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_spec_constructors() {
        assert_eq!(ArgSpec::none(), ArgSpec { required: 0, optional: 0, rest: false });
        assert_eq!(ArgSpec::req(2), ArgSpec { required: 2, optional: 0, rest: false });
        assert_eq!(ArgSpec::arg(1, 2), ArgSpec { required: 1, optional: 2, rest: false });
        assert!(ArgSpec::any().rest);
    }

    #[test]
    fn test_exception_display() {
        let exc = EngineException::type_error("array expected");
        assert_eq!(exc.class_name, "TypeError");
        assert_eq!(exc.to_string(), "TypeError: array expected");
    }

    #[test]
    fn test_exception_constructors() {
        assert_eq!(EngineException::runtime("x").class_name, "RuntimeError");
        assert_eq!(EngineException::argument("x").class_name, "ArgumentError");
        assert_eq!(EngineException::name_error("x").class_name, "NameError");
        assert_eq!(EngineException::standard("x").class_name, "StandardError");
    }
}
