//! Value marshaler — host values ⇄ embedded values
//!
//! The forward direction (`to_embedded`) allocates through the engine;
//! callables route through the callable registry and opaque struct values
//! through the class bindings and hook table. The reverse direction
//! (`to_host`) mirrors each case; plain embedded objects surface as ordered
//! member-name/value pairs, data objects resolve to their pinned host
//! value.
//!
//! Round-trip contract: a wrapped struct comes back as the identical pinned
//! allocation (same `Arc`), primitives round-trip by value.

use quill_sdk::{
    BridgeError, BridgeResult, EmbeddedValue, Engine, EngineException, HostFn, HostValue,
    ParamKind, Signature, ValueTag,
};

use crate::bind;
use crate::callables::Callable;
use crate::state::Vm;

impl Vm {
    /// Convert a host value into an embedded value.
    pub fn to_embedded(&self, value: &HostValue) -> BridgeResult<EmbeddedValue> {
        let engine = self.engine();

        match value {
            HostValue::Nil => Ok(EmbeddedValue::Nil),
            HostValue::Bool(b) => Ok(EmbeddedValue::Bool(*b)),
            HostValue::Int(i) => Ok(EmbeddedValue::Int(*i)),
            // Narrowed to the embedded integer width.
            HostValue::Uint(u) => Ok(EmbeddedValue::Int(*u as i64)),
            HostValue::Float(f) => Ok(EmbeddedValue::Float(*f)),
            HostValue::Str(s) => Ok(engine.new_string(s.as_bytes())),
            HostValue::Bytes(b) => Ok(engine.new_string(b)),
            HostValue::Ptr(p) => Ok(EmbeddedValue::Cptr(*p)),
            HostValue::Symbol(name) => Ok(EmbeddedValue::Symbol(engine.intern(name))),
            HostValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.to_embedded(item)?);
                }
                Ok(engine.new_array(&out))
            }
            HostValue::Map(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((self.to_embedded(k)?, self.to_embedded(v)?));
                }
                Ok(engine.new_hash(&out))
            }
            HostValue::Range(start, end, exclusive) => {
                Ok(engine.new_range(*start, *end, *exclusive))
            }
            HostValue::Func(f) => {
                // The proc's entire captured environment is this one index.
                let r = self.register_func(f.clone());
                Ok(engine.new_proc(r.index))
            }
            HostValue::Opaque(r) => bind::data_value(self, r.clone()),
            HostValue::Error(message) => {
                Ok(engine.new_exception(&EngineException::runtime(message.clone())))
            }
            // Escape hatch: hand-constructed embedded values pass through.
            HostValue::Embedded(v) => Ok(*v),
        }
    }

    /// Convert an embedded value into a host value.
    pub fn to_host(&self, value: EmbeddedValue) -> BridgeResult<HostValue> {
        let engine = self.engine();

        match value.tag() {
            ValueTag::Nil | ValueTag::Undef => Ok(HostValue::Nil),
            ValueTag::Bool => Ok(HostValue::Bool(value.as_bool().unwrap_or(false))),
            ValueTag::Int => Ok(HostValue::Int(value.as_int().unwrap_or(0))),
            ValueTag::Float => Ok(HostValue::Float(value.as_float().unwrap_or(0.0))),
            ValueTag::Symbol => match value.as_symbol() {
                Some(sym) => Ok(HostValue::Symbol(engine.symbol_name(sym))),
                None => Ok(HostValue::Nil),
            },
            ValueTag::Cptr => {
                let addr = match value {
                    EmbeddedValue::Cptr(p) => p,
                    _ => 0,
                };
                Ok(HostValue::Ptr(addr))
            }
            ValueTag::String => {
                let bytes = engine.string_bytes(value)?;
                // Byte-exact: embedded strings are not assumed to be text.
                match String::from_utf8(bytes) {
                    Ok(s) => Ok(HostValue::Str(s)),
                    Err(e) => Ok(HostValue::Bytes(e.into_bytes())),
                }
            }
            ValueTag::Array => {
                let items = engine.array_items(value)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.to_host(item)?);
                }
                Ok(HostValue::Array(out))
            }
            ValueTag::Hash => self.hash_to_host(value),
            ValueTag::Object => {
                // A wrapped host receiver surfaces as the pinned value;
                // plain objects surface as ordered member pairs.
                if let Some(r) = self.hook_of(value) {
                    return Ok(HostValue::Opaque(r));
                }
                let mut pairs = Vec::new();
                for name in engine.member_names(value) {
                    let member = engine.member_get(value, &name)?;
                    pairs.push((HostValue::Str(name), self.to_host(member)?));
                }
                Ok(HostValue::Map(pairs))
            }
            ValueTag::Data => {
                // A stale key (entry released by the finalizer) must not
                // resurface the old pinned value.
                match self.hook_of(value) {
                    Some(r) => Ok(HostValue::Opaque(r)),
                    None => Ok(HostValue::Nil),
                }
            }
            ValueTag::Proc => Ok(self.proc_to_host(value)),
            ValueTag::Range => {
                let (start, end, exclusive) = engine.range_bounds(value)?;
                Ok(HostValue::Range(start, end, exclusive))
            }
            ValueTag::Exception => {
                let exc = engine.exception_info(value)?;
                Ok(HostValue::Error(exc.message))
            }
            // Opaque engine handles pass through unconverted.
            ValueTag::Class | ValueTag::Module | ValueTag::Fiber => {
                Ok(HostValue::Embedded(value))
            }
        }
    }

    fn hash_to_host(&self, value: EmbeddedValue) -> BridgeResult<HostValue> {
        let pairs = self.engine().hash_pairs(value)?;

        // A uniformly string- or symbol-keyed hash surfaces with plain
        // string keys; anything else keeps raw converted keys.
        let uniform = pairs.iter().all(|(k, _)| {
            matches!(k.tag(), ValueTag::String | ValueTag::Symbol)
        });

        let mut out = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            let key = if uniform {
                HostValue::Str(self.display_string(k))
            } else {
                self.to_host(k)?
            };
            out.push((key, self.to_host(v)?));
        }
        Ok(HostValue::Map(out))
    }

    fn proc_to_host(&self, value: EmbeddedValue) -> HostValue {
        // A proc created by the bridge resolves back to the exact callable
        // that was registered; foreign procs get a call-through wrapper.
        if let Some(index) = self.engine().proc_callable(value) {
            if let Ok(Callable::Reflective(f)) = self.resolve_local(index) {
                return HostValue::Func(f);
            }
        }

        let vm = self.clone();
        let sig = Signature {
            params: vec![ParamKind::Any],
            variadic: true,
            takes_receiver: false,
            optional_trailing: 0,
        };
        HostValue::Func(HostFn::from_raw(sig, move |args| {
            let mut call_args = Vec::with_capacity(args.len());
            for arg in args {
                call_args.push(
                    vm.to_embedded(arg)
                        .map_err(|e| quill_sdk::host_error(e.to_string()))?,
                );
            }
            let result = vm
                .call(value, "call", &call_args, None)
                .map_err(|e| quill_sdk::host_error(e.to_string()))?;
            let host = vm
                .to_host(result)
                .map_err(|e| quill_sdk::host_error(e.to_string()))?;
            Ok(vec![host])
        }))
    }

    /// Best-effort display string for a value, used by the argument
    /// scanner's string destinations and error messages.
    pub fn display_string(&self, value: EmbeddedValue) -> String {
        match value {
            EmbeddedValue::Nil => String::new(),
            EmbeddedValue::Undef => "undefined".to_string(),
            EmbeddedValue::Bool(b) => b.to_string(),
            EmbeddedValue::Int(i) => i.to_string(),
            EmbeddedValue::Float(f) => f.to_string(),
            EmbeddedValue::Symbol(s) => self.engine().symbol_name(s),
            EmbeddedValue::Cptr(p) => format!("{:#x}", p),
            EmbeddedValue::Ref(_) => match value.tag() {
                ValueTag::String => match self.engine().string_bytes(value) {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(_) => String::new(),
                },
                ValueTag::Exception => self
                    .engine()
                    .exception_info(value)
                    .map(|e| e.to_string())
                    .unwrap_or_default(),
                _ => format!("#<{}>", value.type_name()),
            },
        }
    }
}

/// Map a bridge error onto the embedded exception that should cross the
/// boundary for it.
pub(crate) fn exception_for_bridge_error(err: BridgeError) -> EngineException {
    match err {
        BridgeError::Exception(exc) => exc,
        BridgeError::TypeMismatch { .. } => EngineException::type_error(err.to_string()),
        BridgeError::Argument(msg) => EngineException::argument(msg),
        BridgeError::Construction(msg) => EngineException::argument(msg),
        // Unresolvable callables and closed instances are bridge-internal
        // failures: runtime-error class, never a default value.
        BridgeError::CallableNotFound(_)
        | BridgeError::WrongConvention(_)
        | BridgeError::Closed => EngineException::runtime(err.to_string()),
    }
}
