//! Quill VM bridge
//!
//! Connects a Rust host to embedded Quill VM instances without either
//! runtime understanding the other's object graph:
//!
//! - **State registry** (`registry`): process-wide table of live instances,
//!   indexed by the small integers native callbacks receive.
//! - **Object hook table** (`hooks`): per-instance pinning of host values
//!   referenced only from the embedded heap.
//! - **Callable registry** (`callables`): append-only table letting a fixed
//!   set of trampolines (`dispatch`) reach an unbounded number of host
//!   callables.
//! - **Value marshaler** (`convert`): host values ⇄ embedded values.
//! - **Class binder** (`bind`): projects a host type's surface onto a
//!   dynamically created embedded class.
//! - **Argument scanner** (`args`): type-directed extraction of call
//!   arguments inside host callbacks.
//!
//! The embedded engine itself (parser, interpreter, collector) is consumed
//! through `quill_sdk::Engine`; `stub` provides the in-memory engine the
//! test suite runs against.
//!
//! # Example
//!
//! ```ignore
//! use quill_bridge::{ScanDest, StubEngine, TypeBinding, Vm};
//!
//! let vm = Vm::open(Box::new(StubEngine::new()));
//! vm.define_func("add", quill_sdk::HostFn::wrap(|a: i64, b: i64| a + b));
//! let sum = vm.eval("add(2, 3)").unwrap();
//! vm.close();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod args;
pub mod bind;
pub mod callables;
pub mod casing;
pub mod convert;
pub mod dispatch;
pub mod exception;
pub mod hooks;
pub mod registry;
pub mod state;
pub mod stub;

pub use args::ScanDest;
pub use bind::{handle, ConstructorFn, Handle, IntoConstructed, TypeBinding};
pub use callables::{Callable, CallableRef, CallableRegistry, NativeFn, ResolveError};
pub use casing::{camel_case, snake_case};
pub use exception::{FALLBACK_ERROR_CLASS, STANDARD_ERROR_CLASSES};
pub use hooks::{HookKey, HookTable};
pub use state::{BackgroundGuard, Job, Vm};
pub use stub::StubEngine;

// Re-export SDK types (canonical definitions live in quill-sdk)
pub use quill_sdk::{
    ArgSpec, BridgeError, BridgeResult, ByteBuf, ClassRef, DispatchTable, EmbeddedValue, Engine,
    EngineException, EngineResult, FromHostValue, HostError, HostFn, HostRef, HostValue,
    IntoHostFn, IntoHostResults, IntoHostValue, MethodSpec, ParamKind, Signature, StateIndex,
    SymId, ValueTag,
};
