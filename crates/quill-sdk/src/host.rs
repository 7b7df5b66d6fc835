//! Host-side dynamic values and callables
//!
//! `HostValue` is the bridge's view of an arbitrary host value: the set of
//! kinds the marshaler knows how to move across the boundary. Opaque struct
//! values are carried as `Arc<dyn Any>` so identity survives a round trip
//! through the embedded heap.
//!
//! `HostFn` is a host callable with its signature captured at registration
//! time: parameter kinds, variadic flag and receiver-injection flag are
//! introspected once, when the closure is wrapped, so dispatch never repeats
//! the work per call.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::value::EmbeddedValue;

/// A pinned host value: the payload of an opaque embedded "data" object.
///
/// Identity (`Arc::ptr_eq`) is the round-trip contract: wrapping and
/// unwrapping yields the same allocation, never a copy.
pub type HostRef = Arc<dyn Any + Send + Sync>;

/// The host's standard error type, as seen by the bridge.
///
/// A callable's trailing `Err` is translated into an embedded exception; a
/// leading `"ClassName: "` prefix in its message selects the exception
/// class best-effort (see the bridge's exception module).
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

/// Build a `HostError` from a message.
pub fn host_error(message: impl Into<String>) -> HostError {
    Box::new(SimpleHostError(message.into()))
}

#[derive(Debug)]
struct SimpleHostError(String);

impl std::fmt::Display for SimpleHostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SimpleHostError {}

// ============================================================================
// HostValue
// ============================================================================

/// A dynamically typed host value, the marshaler's working currency.
#[derive(Clone)]
pub enum HostValue {
    /// Absence of a value; marshals to embedded nil
    Nil,
    /// Boolean
    Bool(bool),
    /// Signed integer (all narrower widths widen here)
    Int(i64),
    /// Unsigned integer wider than i64 can hold losslessly
    Uint(u64),
    /// Float (f32 widens here)
    Float(f64),
    /// Text string
    Str(String),
    /// Raw bytes (marshal byte-exact)
    Bytes(Vec<u8>),
    /// Address-sized opaque pointer value
    Ptr(usize),
    /// Symbol by name
    Symbol(String),
    /// Ordered sequence
    Array(Vec<HostValue>),
    /// Key/value pairs. Host maps have no fixed order; order here is
    /// whatever the source produced and is not preserved across the
    /// boundary in general.
    Map(Vec<(HostValue, HostValue)>),
    /// Inclusive-or-exclusive integer range: (start, end, end-exclusive)
    Range(i64, i64, bool),
    /// Host callable
    Func(HostFn),
    /// Opaque pinned host value
    Opaque(HostRef),
    /// An error surfaced as a value (embedded exceptions convert to this)
    Error(String),
    /// Escape hatch: a hand-constructed embedded value passed through
    /// unchanged by the marshaler
    Embedded(EmbeddedValue),
}

impl HostValue {
    /// Wrap an arbitrary host value as an opaque reference.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> HostValue {
        HostValue::Opaque(Arc::new(value))
    }

    /// Borrow the opaque payload downcast to `T`, if this is an opaque
    /// value of that type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            HostValue::Opaque(r) => r.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Check for `Nil`
    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    /// Host-side truthiness, matching the embedded convention: nil and
    /// false are falsy, everything else truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, HostValue::Nil | HostValue::Bool(false))
    }

    /// Kind name for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Uint(_) => "uint",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "string",
            HostValue::Bytes(_) => "bytes",
            HostValue::Ptr(_) => "pointer",
            HostValue::Symbol(_) => "symbol",
            HostValue::Array(_) => "array",
            HostValue::Map(_) => "map",
            HostValue::Range(..) => "range",
            HostValue::Func(_) => "function",
            HostValue::Opaque(_) => "opaque",
            HostValue::Error(_) => "error",
            HostValue::Embedded(_) => "embedded",
        }
    }
}

impl std::fmt::Debug for HostValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostValue::Nil => write!(f, "Nil"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Int(i) => write!(f, "Int({})", i),
            HostValue::Uint(u) => write!(f, "Uint({})", u),
            HostValue::Float(x) => write!(f, "Float({})", x),
            HostValue::Str(s) => write!(f, "Str({:?})", s),
            HostValue::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            HostValue::Ptr(p) => write!(f, "Ptr({:#x})", p),
            HostValue::Symbol(s) => write!(f, "Symbol(:{})", s),
            HostValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            HostValue::Map(pairs) => f.debug_tuple("Map").field(pairs).finish(),
            HostValue::Range(a, b, x) => write!(f, "Range({}, {}, excl={})", a, b, x),
            HostValue::Func(func) => write!(f, "Func({:?})", func.signature()),
            HostValue::Opaque(_) => write!(f, "Opaque(..)"),
            HostValue::Error(msg) => write!(f, "Error({:?})", msg),
            HostValue::Embedded(v) => write!(f, "Embedded({:?})", v),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        use HostValue::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Uint(a), Uint(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Ptr(a), Ptr(b)) => a == b,
            (Symbol(a), Symbol(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Range(a, b, c), Range(d, e, g)) => (a, b, c) == (d, e, g),
            // Identity comparison for reference kinds
            (Func(a), Func(b)) => Arc::ptr_eq(&a.func, &b.func),
            (Opaque(a), Opaque(b)) => Arc::ptr_eq(a, b),
            (Error(a), Error(b)) => a == b,
            (Embedded(a), Embedded(b)) => a == b,
            _ => false,
        }
    }
}

impl Default for HostValue {
    fn default() -> Self {
        HostValue::Nil
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for HostValue {
            fn from(v: $ty) -> Self {
                HostValue::Int(v as i64)
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for HostValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => HostValue::Int(i),
            Err(_) => HostValue::Uint(v),
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Float(v)
    }
}

impl From<f32> for HostValue {
    fn from(v: f32) -> Self {
        HostValue::Float(v as f64)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::Str(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        HostValue::Str(v)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(v: Vec<HostValue>) -> Self {
        HostValue::Array(v)
    }
}

// ============================================================================
// Signature
// ============================================================================

/// Conversion kind a parameter requires, cached at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Accepts any marshaled host value
    Any,
    /// Truthiness-converted boolean
    Bool,
    /// Signed integer
    Int,
    /// Unsigned integer
    Uint,
    /// Float
    Float,
    /// Text string
    Str,
    /// Raw bytes
    Bytes,
    /// Array of values
    Array,
    /// Key/value map
    Map,
    /// Callable
    Func,
    /// Opaque pinned host value (downcast at conversion time)
    Opaque,
    /// Raw embedded value, passed through without marshaling
    Value,
}

/// Introspected shape of a host callable, captured once when the callable
/// is wrapped so dispatch never repeats the work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Per-parameter conversion kinds, in order
    pub params: Vec<ParamKind>,
    /// Last parameter absorbs all trailing arguments
    pub variadic: bool,
    /// First parameter is the wrapped receiver of a method call
    pub takes_receiver: bool,
    /// Number of trailing parameters that tolerate absence (`Option`
    /// parameters); used to declare the optional-argument count when the
    /// callable is bound as an embedded method
    pub optional_trailing: usize,
}

impl Signature {
    /// Number of fixed parameters (excluding the variadic tail slot)
    pub fn fixed_params(&self) -> usize {
        if self.variadic {
            self.params.len().saturating_sub(1)
        } else {
            self.params.len()
        }
    }
}

// ============================================================================
// HostFn
// ============================================================================

type HostFnBody = dyn Fn(&[HostValue]) -> Result<Vec<HostValue>, HostError> + Send + Sync;

/// A host callable with cached signature metadata.
///
/// The body receives already-marshaled `HostValue` arguments (the dispatch
/// trampoline performs per-parameter conversion according to the cached
/// `Signature`) and returns zero or more result values. A trailing `Err`
/// is translated into an embedded exception by the trampoline, never
/// returned as a normal value.
#[derive(Clone)]
pub struct HostFn {
    sig: Arc<Signature>,
    func: Arc<HostFnBody>,
}

impl HostFn {
    /// Wrap a typed closure, introspecting its signature from the
    /// parameter types.
    pub fn wrap<A, F: IntoHostFn<A>>(f: F) -> HostFn {
        f.into_host_fn()
    }

    /// Build a callable from an explicit signature and a raw body. Used
    /// for variadic callables and other shapes the typed wrappers cannot
    /// express.
    pub fn from_raw(
        sig: Signature,
        func: impl Fn(&[HostValue]) -> Result<Vec<HostValue>, HostError> + Send + Sync + 'static,
    ) -> HostFn {
        HostFn {
            sig: Arc::new(sig),
            func: Arc::new(func),
        }
    }

    /// Mark the first parameter as the wrapped receiver of a method call.
    pub fn with_receiver(mut self) -> HostFn {
        let mut sig = (*self.sig).clone();
        sig.takes_receiver = true;
        self.sig = Arc::new(sig);
        self
    }

    /// Cached signature
    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// Invoke with already-converted arguments.
    pub fn call(&self, args: &[HostValue]) -> Result<Vec<HostValue>, HostError> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for HostFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFn").field("sig", &*self.sig).finish()
    }
}

// ============================================================================
// FromHostValue / IntoHostValue
// ============================================================================

/// Conversion from a marshaled host value into a concrete parameter type.
///
/// `KIND` is the registration-time introspection hook: it tells the
/// dispatch trampoline which marshaling path the parameter needs without
/// inspecting the closure at call time.
pub trait FromHostValue: Sized {
    /// Conversion kind cached in the callable's signature
    const KIND: ParamKind;

    /// Whether the parameter tolerates a missing argument (`Option` types)
    const OPTIONAL: bool = false;

    /// Convert, failing loudly on a kind mismatch.
    fn from_host(value: HostValue) -> Result<Self, HostError>;
}

/// Conversion from a concrete return type into a marshaled host value.
pub trait IntoHostValue {
    /// Convert into a host value.
    fn into_host(self) -> HostValue;
}

fn mismatch(expected: &str, got: &HostValue) -> HostError {
    host_error(format!(
        "TypeError: expected {}, got {}",
        expected,
        got.kind_name()
    ))
}

impl FromHostValue for HostValue {
    const KIND: ParamKind = ParamKind::Any;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        Ok(value)
    }
}

impl IntoHostValue for HostValue {
    fn into_host(self) -> HostValue {
        self
    }
}

impl FromHostValue for EmbeddedValue {
    const KIND: ParamKind = ParamKind::Value;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        match value {
            HostValue::Embedded(v) => Ok(v),
            other => Err(mismatch("embedded value", &other)),
        }
    }
}

impl IntoHostValue for EmbeddedValue {
    fn into_host(self) -> HostValue {
        HostValue::Embedded(self)
    }
}

impl FromHostValue for bool {
    const KIND: ParamKind = ParamKind::Bool;

    // Truthiness conversion: any value is acceptable here, matching the
    // embedded language's own boolean coercion.
    fn from_host(value: HostValue) -> Result<Self, HostError> {
        Ok(value.is_truthy())
    }
}

impl IntoHostValue for bool {
    fn into_host(self) -> HostValue {
        HostValue::Bool(self)
    }
}

macro_rules! impl_host_int {
    ($($ty:ty),*) => {
        $(
            impl FromHostValue for $ty {
                const KIND: ParamKind = ParamKind::Int;

                fn from_host(value: HostValue) -> Result<Self, HostError> {
                    let wide = match value {
                        HostValue::Int(i) => i,
                        HostValue::Uint(u) => u as i64,
                        HostValue::Float(f) => f as i64,
                        other => return Err(mismatch("integer", &other)),
                    };
                    Ok(wide as $ty)
                }
            }

            impl IntoHostValue for $ty {
                fn into_host(self) -> HostValue {
                    HostValue::from(self)
                }
            }
        )*
    };
}

impl_host_int!(i8, i16, i32, i64, u8, u16, u32);

impl FromHostValue for u64 {
    const KIND: ParamKind = ParamKind::Uint;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        match value {
            HostValue::Uint(u) => Ok(u),
            HostValue::Int(i) if i >= 0 => Ok(i as u64),
            other => Err(mismatch("unsigned integer", &other)),
        }
    }
}

impl IntoHostValue for u64 {
    fn into_host(self) -> HostValue {
        HostValue::from(self)
    }
}

impl FromHostValue for usize {
    const KIND: ParamKind = ParamKind::Uint;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        u64::from_host(value).map(|u| u as usize)
    }
}

impl IntoHostValue for usize {
    fn into_host(self) -> HostValue {
        HostValue::from(self as u64)
    }
}

macro_rules! impl_host_float {
    ($($ty:ty),*) => {
        $(
            impl FromHostValue for $ty {
                const KIND: ParamKind = ParamKind::Float;

                fn from_host(value: HostValue) -> Result<Self, HostError> {
                    match value {
                        HostValue::Float(f) => Ok(f as $ty),
                        HostValue::Int(i) => Ok(i as $ty),
                        HostValue::Uint(u) => Ok(u as $ty),
                        other => Err(mismatch("float", &other)),
                    }
                }
            }

            impl IntoHostValue for $ty {
                fn into_host(self) -> HostValue {
                    HostValue::Float(self as f64)
                }
            }
        )*
    };
}

impl_host_float!(f32, f64);

impl FromHostValue for String {
    const KIND: ParamKind = ParamKind::Str;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        match value {
            HostValue::Str(s) => Ok(s),
            HostValue::Symbol(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl IntoHostValue for String {
    fn into_host(self) -> HostValue {
        HostValue::Str(self)
    }
}

impl IntoHostValue for &str {
    fn into_host(self) -> HostValue {
        HostValue::Str(self.to_string())
    }
}

/// Byte-buffer wrapper, distinct from `Vec<u8>` at the trait level so byte
/// strings marshal byte-exact instead of as integer arrays.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ByteBuf(pub Vec<u8>);

impl FromHostValue for ByteBuf {
    const KIND: ParamKind = ParamKind::Bytes;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        match value {
            HostValue::Bytes(b) => Ok(ByteBuf(b)),
            HostValue::Str(s) => Ok(ByteBuf(s.into_bytes())),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl IntoHostValue for ByteBuf {
    fn into_host(self) -> HostValue {
        HostValue::Bytes(self.0)
    }
}

impl<T: FromHostValue> FromHostValue for Vec<T> {
    const KIND: ParamKind = ParamKind::Array;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        match value {
            HostValue::Array(items) => items.into_iter().map(T::from_host).collect(),
            other => Err(mismatch("array", &other)),
        }
    }
}

impl<T: IntoHostValue> IntoHostValue for Vec<T> {
    fn into_host(self) -> HostValue {
        HostValue::Array(self.into_iter().map(IntoHostValue::into_host).collect())
    }
}

impl<T: FromHostValue> FromHostValue for HashMap<String, T> {
    const KIND: ParamKind = ParamKind::Map;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        match value {
            HostValue::Map(pairs) => pairs
                .into_iter()
                .map(|(k, v)| Ok((String::from_host(k)?, T::from_host(v)?)))
                .collect(),
            other => Err(mismatch("map", &other)),
        }
    }
}

impl<T: IntoHostValue> IntoHostValue for HashMap<String, T> {
    fn into_host(self) -> HostValue {
        HostValue::Map(
            self.into_iter()
                .map(|(k, v)| (HostValue::Str(k), v.into_host()))
                .collect(),
        )
    }
}

impl<T: FromHostValue> FromHostValue for Option<T> {
    const KIND: ParamKind = T::KIND;
    const OPTIONAL: bool = true;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_host(value).map(Some)
        }
    }
}

impl<T: IntoHostValue> IntoHostValue for Option<T> {
    fn into_host(self) -> HostValue {
        match self {
            Some(v) => v.into_host(),
            None => HostValue::Nil,
        }
    }
}

impl FromHostValue for HostFn {
    const KIND: ParamKind = ParamKind::Func;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        match value {
            HostValue::Func(f) => Ok(f),
            other => Err(mismatch("function", &other)),
        }
    }
}

impl IntoHostValue for HostFn {
    fn into_host(self) -> HostValue {
        HostValue::Func(self)
    }
}

impl<T: Any + Send + Sync> FromHostValue for Arc<T> {
    const KIND: ParamKind = ParamKind::Opaque;

    fn from_host(value: HostValue) -> Result<Self, HostError> {
        match value {
            HostValue::Opaque(r) => r
                .downcast::<T>()
                .map_err(|_| host_error("TypeError: wrapped value is of a different host type")),
            other => Err(mismatch("wrapped host value", &other)),
        }
    }
}

impl<T: Any + Send + Sync> IntoHostValue for Arc<T> {
    fn into_host(self) -> HostValue {
        HostValue::Opaque(self)
    }
}

// ============================================================================
// IntoHostResults
// ============================================================================

/// Conversion of a callable's return into zero or more host values.
///
/// A trailing `Result` is folded here: `Ok` yields the inner results, `Err`
/// propagates as the host error that the trampoline translates into an
/// embedded exception.
pub trait IntoHostResults {
    /// Convert into the result vector, or a host error.
    fn into_results(self) -> Result<Vec<HostValue>, HostError>;
}

impl IntoHostResults for () {
    fn into_results(self) -> Result<Vec<HostValue>, HostError> {
        Ok(Vec::new())
    }
}

macro_rules! impl_single_result {
    ($($ty:ty),*) => {
        $(impl IntoHostResults for $ty {
            fn into_results(self) -> Result<Vec<HostValue>, HostError> {
                Ok(vec![self.into_host()])
            }
        })*
    };
}

impl_single_result!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, String, &str, ByteBuf,
    HostValue, EmbeddedValue, HostFn
);

impl<T: IntoHostValue> IntoHostResults for Vec<T> {
    fn into_results(self) -> Result<Vec<HostValue>, HostError> {
        Ok(vec![self.into_host()])
    }
}

impl<T: IntoHostValue> IntoHostResults for HashMap<String, T> {
    fn into_results(self) -> Result<Vec<HostValue>, HostError> {
        Ok(vec![self.into_host()])
    }
}

impl<T: IntoHostValue> IntoHostResults for Option<T> {
    fn into_results(self) -> Result<Vec<HostValue>, HostError> {
        Ok(vec![self.into_host()])
    }
}

impl<T: Any + Send + Sync> IntoHostResults for Arc<T> {
    fn into_results(self) -> Result<Vec<HostValue>, HostError> {
        Ok(vec![self.into_host()])
    }
}

impl<A: IntoHostValue, B: IntoHostValue> IntoHostResults for (A, B) {
    fn into_results(self) -> Result<Vec<HostValue>, HostError> {
        Ok(vec![self.0.into_host(), self.1.into_host()])
    }
}

impl<A: IntoHostValue, B: IntoHostValue, C: IntoHostValue> IntoHostResults for (A, B, C) {
    fn into_results(self) -> Result<Vec<HostValue>, HostError> {
        Ok(vec![self.0.into_host(), self.1.into_host(), self.2.into_host()])
    }
}

impl<T: IntoHostResults, E: Into<HostError>> IntoHostResults for Result<T, E> {
    fn into_results(self) -> Result<Vec<HostValue>, HostError> {
        match self {
            Ok(v) => v.into_results(),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// IntoHostFn
// ============================================================================

/// Wrap a typed closure as a `HostFn`, introspecting parameter kinds from
/// the closure's type at wrap time.
pub trait IntoHostFn<A> {
    /// Perform the wrap.
    fn into_host_fn(self) -> HostFn;
}

macro_rules! impl_into_host_fn {
    ($($param:ident),*) => {
        impl<Fun, Ret, $($param),*> IntoHostFn<($($param,)*)> for Fun
        where
            Fun: Fn($($param),*) -> Ret + Send + Sync + 'static,
            Ret: IntoHostResults,
            $($param: FromHostValue + 'static,)*
        {
            #[allow(unused_variables, unused_mut, non_snake_case)]
            fn into_host_fn(self) -> HostFn {
                let optionals: &[bool] = &[$(<$param as FromHostValue>::OPTIONAL),*];
                let sig = Signature {
                    params: vec![$(<$param as FromHostValue>::KIND),*],
                    variadic: false,
                    takes_receiver: false,
                    optional_trailing: optionals.iter().rev().take_while(|o| **o).count(),
                };
                let func = move |args: &[HostValue]| -> Result<Vec<HostValue>, HostError> {
                    let mut iter = args.iter();
                    $(
                        let $param = <$param as FromHostValue>::from_host(
                            iter.next().cloned().unwrap_or(HostValue::Nil),
                        )?;
                    )*
                    (self)($($param),*).into_results()
                };
                HostFn::from_raw(sig, func)
            }
        }
    };
}

impl_into_host_fn!();
impl_into_host_fn!(A1);
impl_into_host_fn!(A1, A2);
impl_into_host_fn!(A1, A2, A3);
impl_into_host_fn!(A1, A2, A3, A4);
impl_into_host_fn!(A1, A2, A3, A4, A5);
impl_into_host_fn!(A1, A2, A3, A4, A5, A6);
impl_into_host_fn!(A1, A2, A3, A4, A5, A6, A7);
impl_into_host_fn!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_value_equality() {
        assert_eq!(HostValue::Int(1), HostValue::Int(1));
        assert_ne!(HostValue::Int(1), HostValue::Float(1.0));
        assert_eq!(HostValue::Str("a".into()), HostValue::from("a"));
    }

    #[test]
    fn test_opaque_identity() {
        let a = HostValue::opaque(vec![1, 2, 3]);
        let b = a.clone();
        assert_eq!(a, b);
        let c = HostValue::opaque(vec![1, 2, 3]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_opaque_downcast() {
        let v = HostValue::opaque(42i64);
        assert_eq!(*v.downcast::<i64>().unwrap(), 42);
        assert!(v.downcast::<String>().is_none());
    }

    #[test]
    fn test_wrap_introspects_signature() {
        let f = HostFn::wrap(|a: i64, b: String| format!("{}{}", a, b));
        assert_eq!(f.signature().params, vec![ParamKind::Int, ParamKind::Str]);
        assert!(!f.signature().variadic);
        assert!(!f.signature().takes_receiver);
    }

    #[test]
    fn test_wrap_call() {
        let f = HostFn::wrap(|a: i64, b: i64| a + b);
        let out = f.call(&[HostValue::Int(2), HostValue::Int(3)]).unwrap();
        assert_eq!(out, vec![HostValue::Int(5)]);
    }

    #[test]
    fn test_wrap_result_error() {
        let f = HostFn::wrap(|a: i64| -> Result<i64, HostError> {
            if a < 0 {
                Err(host_error("negative input"))
            } else {
                Ok(a * 2)
            }
        });
        assert_eq!(
            f.call(&[HostValue::Int(4)]).unwrap(),
            vec![HostValue::Int(8)]
        );
        let err = f.call(&[HostValue::Int(-1)]).unwrap_err();
        assert_eq!(err.to_string(), "negative input");
    }

    #[test]
    fn test_wrap_multi_results() {
        let f = HostFn::wrap(|a: i64| (a, a + 1));
        let out = f.call(&[HostValue::Int(1)]).unwrap();
        assert_eq!(out, vec![HostValue::Int(1), HostValue::Int(2)]);
    }

    #[test]
    fn test_param_mismatch_fails_loudly() {
        let f = HostFn::wrap(|a: Vec<i64>| a.len() as i64);
        let err = f.call(&[HostValue::Int(5)]).unwrap_err();
        assert!(err.to_string().contains("expected array"));
    }

    #[test]
    fn test_bool_param_truthiness() {
        let f = HostFn::wrap(|a: bool| a);
        assert_eq!(
            f.call(&[HostValue::Int(0)]).unwrap(),
            vec![HostValue::Bool(true)]
        );
        assert_eq!(
            f.call(&[HostValue::Nil]).unwrap(),
            vec![HostValue::Bool(false)]
        );
    }

    #[test]
    fn test_with_receiver() {
        let f = HostFn::wrap(|_recv: Arc<i64>| ()).with_receiver();
        assert!(f.signature().takes_receiver);
        assert_eq!(f.signature().params, vec![ParamKind::Opaque]);
    }

    #[test]
    fn test_missing_args_fill_nil() {
        let f = HostFn::wrap(|a: Option<i64>| a.unwrap_or(-1));
        assert_eq!(f.call(&[]).unwrap(), vec![HostValue::Int(-1)]);
    }
}
