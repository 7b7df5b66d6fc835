//! Reflective class binder — projects a host type onto an embedded class
//!
//! Rust has no runtime type walker, so the host type's public surface is
//! described once through a `TypeBinding` builder; the binder then performs
//! the same projection a reflection-driven bridge would: exported method
//! names convert to snake_case (with `is_` → `?` and `_bang` → `!`
//! aliases), exported fields get a getter/setter pair, instances use the
//! opaque data representation, and the constructor supports both invocation
//! and adoption of an already-wrapped host value.
//!
//! The wrapped representation of a bound type `T` is `Handle<T>`
//! (`Arc<RwLock<T>>`): identity-preserving across the boundary, with
//! interior mutability for field setters and `&mut self` methods.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use quill_sdk::{
    ArgSpec, BridgeError, BridgeResult, ClassRef, EmbeddedValue, Engine, EngineException,
    EngineResult, FromHostValue, HostError, HostFn, HostRef, HostValue, IntoHostFn,
    IntoHostValue, ParamKind, Signature,
};

use crate::callables::NativeFn;
use crate::casing::snake_case;
use crate::dispatch;
use crate::exception;
use crate::state::{aspec_for, Vm};

/// The wrapped representation of a bound host type.
pub type Handle<T> = Arc<RwLock<T>>;

/// Wrap a plain value into the bound representation.
pub fn handle<T>(value: T) -> Handle<T> {
    Arc::new(RwLock::new(value))
}

/// A registered class binding: how runtime host values map back to the
/// embedded class created for their type.
pub(crate) struct BindingEntry {
    /// Exact pinned-payload type for concrete struct bindings
    pub type_id: Option<TypeId>,
    /// Capability predicate for interface-style bindings; first registered
    /// match wins
    pub matcher: Option<Arc<dyn Fn(&HostRef) -> bool + Send + Sync>>,
    /// The embedded class created for the binding
    pub class: ClassRef,
}

impl BindingEntry {
    pub fn matches(&self, value: &HostRef) -> bool {
        if self.type_id == Some((**value).type_id()) {
            return true;
        }
        match &self.matcher {
            Some(m) => m(value),
            None => false,
        }
    }
}

enum Ctor {
    /// Reflective constructor function; its single result is the wrapped
    /// host value
    Function(HostFn),
    /// Adoption-only: exactly one argument of the matching wrapped type
    AdoptOnly,
}

/// Builder describing a host type's public surface for binding.
pub struct TypeBinding<T: Any + Send + Sync> {
    class_name: String,
    constructor: Option<Ctor>,
    methods: Vec<(String, HostFn)>,
    fields: Vec<(String, HostFn, HostFn)>,
    matcher: Option<Arc<dyn Fn(&HostRef) -> bool + Send + Sync>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> TypeBinding<T> {
    /// Start a binding for `T` under the given embedded class name.
    pub fn new(class_name: &str) -> Self {
        TypeBinding {
            class_name: class_name.to_string(),
            constructor: None,
            methods: Vec::new(),
            fields: Vec::new(),
            matcher: None,
            _marker: PhantomData,
        }
    }

    /// Register the constructor function. Its return value — `T`,
    /// `Handle<T>`, or either wrapped in `Result` — becomes the pinned
    /// host value of the new instance.
    pub fn constructor<A, R, F>(mut self, f: F) -> Self
    where
        F: ConstructorFn<T, A, R>,
    {
        self.constructor = Some(Ctor::Function(f.into_ctor_fn()));
        self
    }

    /// Adoption-only constructor: instances can only be created from an
    /// already-wrapped host value of the same type.
    pub fn adopt_only(mut self) -> Self {
        self.constructor = Some(Ctor::AdoptOnly);
        self
    }

    /// Project an exported host method. `name` is the host's exported
    /// casing (e.g. `PublicMethod`); the embedded method name is its
    /// snake_case form. The closure's first parameter must be the
    /// receiver, `Handle<T>`.
    pub fn method<A, F>(mut self, name: &str, f: F) -> Self
    where
        F: IntoHostFn<A>,
    {
        self.methods
            .push((name.to_string(), f.into_host_fn().with_receiver()));
        self
    }

    /// Project a method from an explicit `HostFn` (variadic or otherwise
    /// untypable shapes).
    pub fn method_raw(mut self, name: &str, f: HostFn) -> Self {
        self.methods.push((name.to_string(), f.with_receiver()));
        self
    }

    /// Project an exported field as a getter/setter pair. `name` is the
    /// host's exported casing; the embedded accessors are `snake` and
    /// `snake=`.
    pub fn field<G, GR, S, SV>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&T) -> GR + Send + Sync + 'static,
        GR: IntoHostValue,
        S: Fn(&mut T, SV) + Send + Sync + 'static,
        SV: FromHostValue + 'static,
    {
        let getter = HostFn::from_raw(
            Signature {
                params: vec![ParamKind::Opaque],
                variadic: false,
                takes_receiver: true,
                optional_trailing: 0,
            },
            move |args| {
                let recv = receiver_handle::<T>(args)?;
                let guard = recv.read();
                Ok(vec![get(&guard).into_host()])
            },
        );

        let setter = HostFn::from_raw(
            Signature {
                params: vec![ParamKind::Opaque, SV::KIND],
                variadic: false,
                takes_receiver: true,
                optional_trailing: 0,
            },
            move |args| {
                let recv = receiver_handle::<T>(args)?;
                let raw = args.get(1).cloned().unwrap_or(HostValue::Nil);
                let value = SV::from_host(raw.clone())?;
                set(&mut recv.write(), value);
                // Assignment evaluates to the assigned value.
                Ok(vec![raw])
            },
        );

        self.fields.push((name.to_string(), getter, setter));
        self
    }

    /// Register a capability predicate: any pinned host value the
    /// predicate accepts marshals as an instance of this class. First
    /// registered match wins, so registration order is significant.
    pub fn also_matches(
        mut self,
        matcher: impl Fn(&HostRef) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.matcher = Some(Arc::new(matcher));
        self
    }
}

fn receiver_handle<T: Any + Send + Sync>(args: &[HostValue]) -> Result<Handle<T>, HostError> {
    <Handle<T> as FromHostValue>::from_host(args.first().cloned().unwrap_or(HostValue::Nil))
}

impl Vm {
    /// Bind a host type as an embedded class.
    ///
    /// Panics if the binding has no constructor: an unbindable shape is a
    /// programming error in the host code calling the bridge, not a
    /// runtime condition.
    pub fn bind_class<T: Any + Send + Sync>(&self, binding: TypeBinding<T>) -> ClassRef {
        let engine = self.engine();

        let ctor = binding.constructor.unwrap_or_else(|| {
            panic!(
                "binding for class {} has no constructor; use constructor() or adopt_only()",
                binding.class_name
            )
        });

        let class = engine.define_class(&binding.class_name, None);
        engine.mark_data_class(class);

        // Pinned payloads for T are always Handle<T> = Arc<RwLock<T>>.
        let type_id = TypeId::of::<RwLock<T>>();

        let ctor_aspec = match &ctor {
            Ctor::Function(f) => aspec_for(f.signature()),
            Ctor::AdoptOnly => ArgSpec::req(1),
        };
        let ctor_fn: NativeFn = Arc::new(move |vm: &Vm, receiver: EmbeddedValue| {
            construct(vm, receiver, &ctor, type_id)
        });
        self.define_native_method(class, "construct", ctor_fn, ctor_aspec);
        engine.alias_method(class, "initialize", "construct");

        for (host_name, f) in binding.methods {
            let snake = snake_case(&host_name);
            self.define_method_fn(class, &snake, f);

            if let Some(stem) = snake.strip_prefix("is_") {
                engine.alias_method(class, &format!("{}?", stem), &snake);
            }
            if let Some(stem) = snake.strip_suffix("_bang") {
                engine.alias_method(class, &format!("{}!", stem), &snake);
            }
        }

        for (host_name, getter, setter) in binding.fields {
            let snake = snake_case(&host_name);
            self.define_method_fn(class, &snake, getter);
            self.define_method_fn(class, &format!("{}=", snake), setter);
        }

        self.push_binding(BindingEntry {
            type_id: Some(type_id),
            matcher: binding.matcher,
            class,
        });

        class
    }
}

/// The bound constructor body: adoption of an already-wrapped value, or
/// reflective invocation of the constructor function.
fn construct(
    vm: &Vm,
    receiver: EmbeddedValue,
    ctor: &Ctor,
    type_id: TypeId,
) -> EngineResult<EmbeddedValue> {
    let args = vm.args();

    // Adoption path: a single argument that is itself a wrapped value of
    // the exact same host type is re-wrapped without re-running the
    // constructor.
    if args.len() == 1 {
        if let Some(existing) = vm.hook_of(args[0]) {
            if (*existing).type_id() == type_id {
                pin_under(vm, receiver, existing)?;
                return run_after_init(vm, receiver);
            }
        }
    }

    match ctor {
        Ctor::AdoptOnly => Err(EngineException::argument(
            "value is not of the registered host type",
        )),
        Ctor::Function(f) => {
            let host_args = dispatch::convert_args(vm, f.signature(), None, &args)
                .map_err(|e| EngineException::argument(e.message))?;

            let results = f.call(&host_args).map_err(|e| {
                let exc = exception::for_host_error(vm, e.as_ref());
                // Argument conversion failures at a construction site are
                // argument errors, not type errors.
                if exc.class_name == "TypeError" {
                    EngineException::argument(exc.message)
                } else {
                    exc
                }
            })?;

            let first = results.into_iter().next().ok_or_else(|| {
                EngineException::runtime("constructor returned no host value")
            })?;

            match first {
                HostValue::Opaque(r) => {
                    pin_under(vm, receiver, r)?;
                    run_after_init(vm, receiver)
                }
                _ => Err(EngineException::runtime(
                    "constructor did not return a wrapped host value",
                )),
            }
        }
    }
}

fn pin_under(vm: &Vm, receiver: EmbeddedValue, value: HostRef) -> EngineResult<()> {
    let addr = receiver.heap_addr().ok_or_else(|| {
        EngineException::type_error("constructed receiver is not a data object")
    })?;
    vm.pin(addr, value);
    Ok(())
}

/// Post-initialization hook: if the class defines `after_init` it is
/// invoked automatically, and its result replaces the constructed value
/// only when that result is itself an exception.
fn run_after_init(vm: &Vm, receiver: EmbeddedValue) -> EngineResult<EmbeddedValue> {
    let engine = vm.engine();
    let class = engine.class_of(receiver);

    if engine.method_defined(class, "after_init") {
        let ret = engine.call(receiver, "after_init", &[], None)?;
        if ret.is_exception() {
            return Ok(ret);
        }
    }

    Ok(receiver)
}

/// Wrap any host value as an opaque embedded data object: under the class
/// bound for its type when one matches, otherwise under the engine's base
/// object class.
pub(crate) fn data_value(vm: &Vm, value: HostRef) -> BridgeResult<EmbeddedValue> {
    let engine = vm.engine();

    match vm.binding_for(&value) {
        Some(class) => {
            let obj = engine.new_data_object(class);
            let addr = obj.heap_addr().ok_or_else(|| {
                BridgeError::Argument("engine returned a non-heap data object".to_string())
            })?;
            vm.pin(addr, value);
            if engine.method_defined(class, "after_init") {
                let _ = engine.call(obj, "after_init", &[], None);
            }
            Ok(obj)
        }
        None => {
            let obj = engine.new_data_object(engine.object_class());
            let addr = obj.heap_addr().ok_or_else(|| {
                BridgeError::Argument("engine returned a non-heap data object".to_string())
            })?;
            vm.pin(addr, value);
            Ok(obj)
        }
    }
}

// ============================================================================
// Constructor return shapes
// ============================================================================

/// Return shapes a constructor function may have: the plain value, the
/// wrapped handle, or either inside a `Result`.
pub trait IntoConstructed<T> {
    /// Convert into the wrapped representation.
    fn into_constructed(self) -> Result<Handle<T>, HostError>;
}

impl<T: Any + Send + Sync> IntoConstructed<T> for T {
    fn into_constructed(self) -> Result<Handle<T>, HostError> {
        Ok(handle(self))
    }
}

impl<T: Any + Send + Sync> IntoConstructed<T> for Handle<T> {
    fn into_constructed(self) -> Result<Handle<T>, HostError> {
        Ok(self)
    }
}

impl<T: Any + Send + Sync, E: Into<HostError>> IntoConstructed<T> for Result<T, E> {
    fn into_constructed(self) -> Result<Handle<T>, HostError> {
        self.map(handle).map_err(Into::into)
    }
}

impl<T: Any + Send + Sync, E: Into<HostError>> IntoConstructed<T> for Result<Handle<T>, E> {
    fn into_constructed(self) -> Result<Handle<T>, HostError> {
        self.map_err(Into::into)
    }
}

/// Wrap a typed constructor closure; the callable's single result is the
/// opaque wrapped value.
pub trait ConstructorFn<T, A, R> {
    /// Perform the wrap.
    fn into_ctor_fn(self) -> HostFn;
}

macro_rules! impl_ctor_fn {
    ($($param:ident),*) => {
        impl<T, Fun, Ret, $($param),*> ConstructorFn<T, ($($param,)*), Ret> for Fun
        where
            T: Any + Send + Sync,
            Fun: Fn($($param),*) -> Ret + Send + Sync + 'static,
            Ret: IntoConstructed<T>,
            $($param: FromHostValue + 'static,)*
        {
            #[allow(unused_variables, unused_mut, non_snake_case)]
            fn into_ctor_fn(self) -> HostFn {
                let optionals: &[bool] = &[$(<$param as FromHostValue>::OPTIONAL),*];
                let sig = Signature {
                    params: vec![$(<$param as FromHostValue>::KIND),*],
                    variadic: false,
                    takes_receiver: false,
                    optional_trailing: optionals.iter().rev().take_while(|o| **o).count(),
                };
                HostFn::from_raw(sig, move |args| {
                    let mut iter = args.iter();
                    $(
                        let $param = <$param as FromHostValue>::from_host(
                            iter.next().cloned().unwrap_or(HostValue::Nil),
                        )?;
                    )*
                    let wrapped = (self)($($param),*).into_constructed()?;
                    let pinned: HostRef = wrapped;
                    Ok(vec![HostValue::Opaque(pinned)])
                })
            }
        }
    };
}

impl_ctor_fn!();
impl_ctor_fn!(A1);
impl_ctor_fn!(A1, A2);
impl_ctor_fn!(A1, A2, A3);
impl_ctor_fn!(A1, A2, A3, A4);
impl_ctor_fn!(A1, A2, A3, A4, A5);
impl_ctor_fn!(A1, A2, A3, A4, A5, A6);

#[cfg(test)]
mod tests {
    use super::*;

    struct Point {
        x: i64,
    }

    #[test]
    fn test_ctor_fn_wraps_value() {
        let f = (|x: i64| Point { x }).into_ctor_fn();
        let out = f.call(&[HostValue::Int(3)]).unwrap();
        assert_eq!(out.len(), 1);
        let handle = out[0].downcast::<RwLock<Point>>().unwrap();
        assert_eq!(handle.read().x, 3);
    }

    #[test]
    fn test_ctor_fn_result_error() {
        let f = <_ as ConstructorFn<Point, (i64,), _>>::into_ctor_fn(
            |x: i64| -> Result<Point, HostError> {
                if x < 0 {
                    Err(quill_sdk::host_error("ArgumentError: negative"))
                } else {
                    Ok(Point { x })
                }
            },
        );

        assert!(f.call(&[HostValue::Int(1)]).is_ok());
        assert!(f.call(&[HostValue::Int(-1)]).is_err());
    }

    #[test]
    fn test_binding_entry_type_match() {
        let entry = BindingEntry {
            type_id: Some(TypeId::of::<RwLock<Point>>()),
            matcher: None,
            class: ClassRef(1),
        };
        let matching: HostRef = Arc::new(RwLock::new(Point { x: 1 }));
        let other: HostRef = Arc::new(5i64);
        assert!(entry.matches(&matching));
        assert!(!entry.matches(&other));
    }

    #[test]
    fn test_binding_entry_capability_match() {
        let entry = BindingEntry {
            type_id: None,
            matcher: Some(Arc::new(|r: &HostRef| r.is::<String>())),
            class: ClassRef(1),
        };
        let s: HostRef = Arc::new(String::from("x"));
        let i: HostRef = Arc::new(5i64);
        assert!(entry.matches(&s));
        assert!(!entry.matches(&i));
    }
}
