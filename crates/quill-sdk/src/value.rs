//! EmbeddedValue — tagged representation of a value owned by the embedded VM
//!
//! The bridge never interprets heap payloads itself: a heap value is carried
//! as an opaque `(kind, address)` pair handed out by the engine, and the
//! address is only ever used as a map key (see the object hook table in the
//! bridge crate). Immediate kinds carry their payload inline and need no GC
//! participation on either side.

/// Interned symbol identifier handed out by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(pub u32);

/// Heap value kinds. Lifetime of these values is governed entirely by the
/// embedded engine's collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// Byte string (not assumed to be valid UTF-8)
    String,
    /// Ordered array
    Array,
    /// Insertion-ordered hash
    Hash,
    /// Plain object with named members
    Object,
    /// Class
    Class,
    /// Module
    Module,
    /// Proc / block
    Proc,
    /// Range
    Range,
    /// Exception
    Exception,
    /// Fiber
    Fiber,
    /// Opaque "data" object carrying a pinned host value
    Data,
}

/// Reference to an engine-owned heap value.
///
/// `addr` is the embedded heap address of the object. The bridge treats it
/// strictly as an identity token; it is never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// Heap kind tag reported by the engine
    pub kind: HeapKind,
    /// Embedded heap address, used only as a key
    pub addr: usize,
}

/// Flattened type tag covering immediate and heap kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    /// nil
    Nil,
    /// undefined (internal placeholder, distinct from nil)
    Undef,
    /// true / false
    Bool,
    /// integer
    Int,
    /// float
    Float,
    /// interned symbol
    Symbol,
    /// opaque C-style pointer value
    Cptr,
    /// byte string
    String,
    /// array
    Array,
    /// hash
    Hash,
    /// plain object
    Object,
    /// class
    Class,
    /// module
    Module,
    /// proc
    Proc,
    /// range
    Range,
    /// exception
    Exception,
    /// fiber
    Fiber,
    /// opaque data object
    Data,
}

/// A value produced by or destined for the embedded VM.
///
/// Immediate kinds (`Nil`, `Undef`, `Bool`, `Int`, `Float`, `Symbol`,
/// `Cptr`) are self-contained. `Ref` values point into the embedded heap
/// and are valid only while the engine keeps the referenced object alive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmbeddedValue {
    /// nil
    Nil,
    /// undefined placeholder
    Undef,
    /// boolean
    Bool(bool),
    /// integer (embedded integer width is 64-bit)
    Int(i64),
    /// float
    Float(f64),
    /// interned symbol
    Symbol(SymId),
    /// opaque pointer-sized value
    Cptr(usize),
    /// engine-owned heap value
    Ref(ObjectRef),
}

impl EmbeddedValue {
    /// Flattened type tag of this value.
    pub fn tag(&self) -> ValueTag {
        match self {
            EmbeddedValue::Nil => ValueTag::Nil,
            EmbeddedValue::Undef => ValueTag::Undef,
            EmbeddedValue::Bool(_) => ValueTag::Bool,
            EmbeddedValue::Int(_) => ValueTag::Int,
            EmbeddedValue::Float(_) => ValueTag::Float,
            EmbeddedValue::Symbol(_) => ValueTag::Symbol,
            EmbeddedValue::Cptr(_) => ValueTag::Cptr,
            EmbeddedValue::Ref(r) => match r.kind {
                HeapKind::String => ValueTag::String,
                HeapKind::Array => ValueTag::Array,
                HeapKind::Hash => ValueTag::Hash,
                HeapKind::Object => ValueTag::Object,
                HeapKind::Class => ValueTag::Class,
                HeapKind::Module => ValueTag::Module,
                HeapKind::Proc => ValueTag::Proc,
                HeapKind::Range => ValueTag::Range,
                HeapKind::Exception => ValueTag::Exception,
                HeapKind::Fiber => ValueTag::Fiber,
                HeapKind::Data => ValueTag::Data,
            },
        }
    }

    /// True for values that require no GC participation.
    pub fn is_immediate(&self) -> bool {
        !matches!(self, EmbeddedValue::Ref(_))
    }

    /// Check for nil
    pub fn is_nil(&self) -> bool {
        matches!(self, EmbeddedValue::Nil)
    }

    /// Check for the undefined placeholder
    pub fn is_undef(&self) -> bool {
        matches!(self, EmbeddedValue::Undef)
    }

    /// Embedded truthiness: nil and false are falsy, everything else truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, EmbeddedValue::Nil | EmbeddedValue::Bool(false))
    }

    /// Check for an array reference
    pub fn is_array(&self) -> bool {
        self.tag() == ValueTag::Array
    }

    /// Check for a hash reference
    pub fn is_hash(&self) -> bool {
        self.tag() == ValueTag::Hash
    }

    /// Check for a string reference
    pub fn is_string(&self) -> bool {
        self.tag() == ValueTag::String
    }

    /// Check for a proc reference
    pub fn is_proc(&self) -> bool {
        self.tag() == ValueTag::Proc
    }

    /// Check for an opaque data reference
    pub fn is_data(&self) -> bool {
        self.tag() == ValueTag::Data
    }

    /// Check for an exception reference
    pub fn is_exception(&self) -> bool {
        self.tag() == ValueTag::Exception
    }

    /// Extract a bool, if this value is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EmbeddedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an integer, if this value is one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            EmbeddedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a float; integers widen
    pub fn as_float(&self) -> Option<f64> {
        match self {
            EmbeddedValue::Float(f) => Some(*f),
            EmbeddedValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Extract a symbol id, if this value is one
    pub fn as_symbol(&self) -> Option<SymId> {
        match self {
            EmbeddedValue::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    /// Heap address for `Ref` values, used as a hook key
    pub fn heap_addr(&self) -> Option<usize> {
        match self {
            EmbeddedValue::Ref(r) => Some(r.addr),
            _ => None,
        }
    }

    /// Human-readable type name, for error messages
    pub fn type_name(&self) -> &'static str {
        match self.tag() {
            ValueTag::Nil => "nil",
            ValueTag::Undef => "undef",
            ValueTag::Bool => "bool",
            ValueTag::Int => "integer",
            ValueTag::Float => "float",
            ValueTag::Symbol => "symbol",
            ValueTag::Cptr => "cptr",
            ValueTag::String => "string",
            ValueTag::Array => "array",
            ValueTag::Hash => "hash",
            ValueTag::Object => "object",
            ValueTag::Class => "class",
            ValueTag::Module => "module",
            ValueTag::Proc => "proc",
            ValueTag::Range => "range",
            ValueTag::Exception => "exception",
            ValueTag::Fiber => "fiber",
            ValueTag::Data => "data",
        }
    }
}

impl Default for EmbeddedValue {
    fn default() -> Self {
        EmbeddedValue::Nil
    }
}

impl From<bool> for EmbeddedValue {
    fn from(b: bool) -> Self {
        EmbeddedValue::Bool(b)
    }
}

impl From<i64> for EmbeddedValue {
    fn from(i: i64) -> Self {
        EmbeddedValue::Int(i)
    }
}

impl From<f64> for EmbeddedValue {
    fn from(f: f64) -> Self {
        EmbeddedValue::Float(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediates() {
        assert!(EmbeddedValue::Nil.is_immediate());
        assert!(EmbeddedValue::Bool(true).is_immediate());
        assert!(EmbeddedValue::Int(42).is_immediate());
        assert!(EmbeddedValue::Float(1.5).is_immediate());
        assert!(EmbeddedValue::Symbol(SymId(3)).is_immediate());
        assert!(EmbeddedValue::Cptr(0xdead).is_immediate());
    }

    #[test]
    fn test_heap_refs() {
        let v = EmbeddedValue::Ref(ObjectRef {
            kind: HeapKind::Array,
            addr: 7,
        });
        assert!(!v.is_immediate());
        assert!(v.is_array());
        assert_eq!(v.tag(), ValueTag::Array);
        assert_eq!(v.heap_addr(), Some(7));
    }

    #[test]
    fn test_truthiness() {
        assert!(!EmbeddedValue::Nil.is_truthy());
        assert!(!EmbeddedValue::Bool(false).is_truthy());
        assert!(EmbeddedValue::Bool(true).is_truthy());
        assert!(EmbeddedValue::Int(0).is_truthy());
        assert!(EmbeddedValue::Float(0.0).is_truthy());
    }

    #[test]
    fn test_extractors() {
        assert_eq!(EmbeddedValue::Int(42).as_int(), Some(42));
        assert_eq!(EmbeddedValue::Int(42).as_float(), Some(42.0));
        assert_eq!(EmbeddedValue::Float(2.5).as_float(), Some(2.5));
        assert_eq!(EmbeddedValue::Float(2.5).as_int(), None);
        assert_eq!(EmbeddedValue::Bool(true).as_bool(), Some(true));
        assert_eq!(EmbeddedValue::Nil.as_int(), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(EmbeddedValue::Nil.type_name(), "nil");
        let data = EmbeddedValue::Ref(ObjectRef {
            kind: HeapKind::Data,
            addr: 1,
        });
        assert_eq!(data.type_name(), "data");
    }
}
