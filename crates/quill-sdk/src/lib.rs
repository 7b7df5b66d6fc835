//! Quill SDK - Lightweight types for the Quill VM bridge
//!
//! This crate provides the minimal types needed to talk to the bridge
//! without depending on the full bridge crate: the embedded value
//! representation, the abstract `Engine` trait the embedded VM implements,
//! host-side dynamic values and callables, and the error taxonomy.
//!
//! # Example
//!
//! ```ignore
//! use quill_sdk::{HostFn, HostValue};
//!
//! // A host callable with its signature introspected at wrap time.
//! let add = HostFn::wrap(|a: i64, b: i64| a + b);
//! let out = add.call(&[HostValue::Int(2), HostValue::Int(3)]).unwrap();
//! assert_eq!(out, vec![HostValue::Int(5)]);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod engine;
pub mod error;
pub mod host;
pub mod value;

pub use engine::{
    ArgSpec, ClassRef, DispatchTable, Engine, EngineException, EngineResult, MethodSpec,
    StateIndex,
};
pub use error::{BridgeError, BridgeResult};
pub use host::{
    host_error, ByteBuf, FromHostValue, HostError, HostFn, HostRef, HostValue, IntoHostFn,
    IntoHostResults, IntoHostValue, ParamKind, Signature,
};
pub use value::{EmbeddedValue, HeapKind, ObjectRef, SymId, ValueTag};
