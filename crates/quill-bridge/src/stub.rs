//! In-memory stub engine
//!
//! A minimal `Engine` implementation backing the test suite: an object
//! heap, a class table with method dispatch through the installed dispatch
//! table, data objects with finalization notifications, and a deliberately
//! tiny eval surface (literals, `raise`, and calls to globally defined
//! functions). It is test tooling, not an interpreter — parsing and
//! bytecode live behind the real engine, out of scope here.
//!
//! The stub has no tracing collector: reclamation is driven explicitly by
//! `release`, which fires the finalization trampoline for data objects the
//! way a real collector would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use quill_sdk::{
    ClassRef, DispatchTable, EmbeddedValue, Engine, EngineException, EngineResult, HeapKind,
    MethodSpec, ObjectRef, StateIndex, SymId,
};

const OBJECT_CLASS: usize = 0;
const STANDARD_ERROR_CLASS: usize = 1;

#[derive(Debug, Clone)]
enum HeapObject {
    Str(Vec<u8>),
    Array(Vec<EmbeddedValue>),
    Hash(Vec<(EmbeddedValue, EmbeddedValue)>),
    Object {
        class: usize,
        members: Vec<(String, EmbeddedValue)>,
    },
    Proc {
        callable: u32,
    },
    Data {
        class: usize,
    },
    Exception {
        class_name: String,
        message: String,
    },
    Range {
        start: i64,
        end: i64,
        exclusive: bool,
    },
}

impl HeapObject {
    fn kind(&self) -> HeapKind {
        match self {
            HeapObject::Str(_) => HeapKind::String,
            HeapObject::Array(_) => HeapKind::Array,
            HeapObject::Hash(_) => HeapKind::Hash,
            HeapObject::Object { .. } => HeapKind::Object,
            HeapObject::Proc { .. } => HeapKind::Proc,
            HeapObject::Data { .. } => HeapKind::Data,
            HeapObject::Exception { .. } => HeapKind::Exception,
            HeapObject::Range { .. } => HeapKind::Range,
        }
    }
}

#[derive(Debug, Clone)]
struct ClassDef {
    name: String,
    superclass: Option<usize>,
    methods: FxHashMap<String, MethodSpec>,
    data_class: bool,
}

struct Core {
    heap: Mutex<Vec<Option<HeapObject>>>,
    classes: Mutex<Vec<ClassDef>>,
    symbols: Mutex<Vec<String>>,
    dispatch: Mutex<Option<(StateIndex, &'static DispatchTable)>>,
    closed: AtomicBool,
}

/// In-memory engine for tests. Clones share the same instance, so a test
/// can keep a handle after moving the engine into the bridge.
#[derive(Clone)]
pub struct StubEngine {
    core: Arc<Core>,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngine {
    /// Create an engine with the standard class set predefined.
    pub fn new() -> Self {
        let mut classes = vec![
            ClassDef {
                name: "Object".to_string(),
                superclass: None,
                methods: FxHashMap::default(),
                data_class: false,
            },
            ClassDef {
                name: "StandardError".to_string(),
                superclass: Some(OBJECT_CLASS),
                methods: FxHashMap::default(),
                data_class: false,
            },
        ];

        for name in [
            "RuntimeError",
            "TypeError",
            "ArgumentError",
            "IndexError",
            "RangeError",
            "NameError",
            "NoMethodError",
            "ScriptError",
            "NotImplementedError",
            "KeyError",
        ] {
            classes.push(ClassDef {
                name: name.to_string(),
                superclass: Some(STANDARD_ERROR_CLASS),
                methods: FxHashMap::default(),
                data_class: false,
            });
        }

        StubEngine {
            core: Arc::new(Core {
                heap: Mutex::new(Vec::new()),
                classes: Mutex::new(classes),
                symbols: Mutex::new(Vec::new()),
                dispatch: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// True once `close` has been called (test support).
    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }

    /// Reclaim a heap object, firing the finalization trampoline for data
    /// objects exactly the way a collector would before reusing the slot.
    pub fn release(&self, value: EmbeddedValue) {
        let Some(addr) = value.heap_addr() else { return };
        let Some(idx) = addr.checked_sub(1) else { return };

        let was_data = {
            let mut heap = self.core.heap.lock();
            match heap.get_mut(idx) {
                Some(slot) if slot.is_some() => {
                    let was_data = matches!(slot, Some(HeapObject::Data { .. }));
                    *slot = None;
                    was_data
                }
                _ => return,
            }
        };

        if was_data {
            let dispatch = *self.core.dispatch.lock();
            if let Some((state, table)) = dispatch {
                (table.finalize)(state, addr);
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn alloc(&self, obj: HeapObject) -> EmbeddedValue {
        let kind = obj.kind();
        let mut heap = self.core.heap.lock();
        heap.push(Some(obj));
        EmbeddedValue::Ref(ObjectRef {
            kind,
            addr: heap.len(),
        })
    }

    fn fetch(&self, value: EmbeddedValue) -> Option<HeapObject> {
        let r = match value {
            EmbeddedValue::Ref(r) => r,
            _ => return None,
        };
        // Class and module references encode a class-table index, not a
        // heap address.
        if matches!(r.kind, HeapKind::Class | HeapKind::Module) {
            return None;
        }
        let idx = r.addr.checked_sub(1)?;
        self.core.heap.lock().get(idx)?.clone()
    }

    fn class_index_by_name(&self, name: &str) -> Option<usize> {
        self.core
            .classes
            .lock()
            .iter()
            .position(|c| c.name == name)
    }

    fn find_method(&self, mut class: usize, name: &str) -> Option<MethodSpec> {
        let classes = self.core.classes.lock();
        loop {
            let def = classes.get(class)?;
            if let Some(spec) = def.methods.get(name) {
                return Some(*spec);
            }
            class = def.superclass?;
        }
    }

    fn dispatch_pair(&self) -> EngineResult<(StateIndex, &'static DispatchTable)> {
        let pair = *self.core.dispatch.lock();
        pair.ok_or_else(|| EngineException::runtime("dispatch table not installed"))
    }

    fn parse_literal(&self, token: &str) -> EngineResult<EmbeddedValue> {
        let token = token.trim();
        match token {
            "nil" => return Ok(EmbeddedValue::Nil),
            "true" => return Ok(EmbeddedValue::Bool(true)),
            "false" => return Ok(EmbeddedValue::Bool(false)),
            _ => {}
        }
        if let Ok(i) = token.parse::<i64>() {
            return Ok(EmbeddedValue::Int(i));
        }
        if let Ok(f) = token.parse::<f64>() {
            return Ok(EmbeddedValue::Float(f));
        }
        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            return Ok(self.new_string(token[1..token.len() - 1].as_bytes()));
        }
        Err(EngineException::new(
            "ScriptError",
            format!("unsupported literal: {}", token),
        ))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '?' || c == '!' || c == '=')
}

impl Engine for StubEngine {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn install_dispatch(&self, state: StateIndex, table: &'static DispatchTable) {
        *self.core.dispatch.lock() = Some((state, table));
    }

    fn close(&self) {
        self.core.closed.store(true, Ordering::Release);
    }

    fn run_gc(&self) {
        // No tracing collector in the stub; `release` drives reclamation.
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    fn eval(&self, source: &str) -> EngineResult<EmbeddedValue> {
        if self.is_closed() {
            return Err(EngineException::runtime("engine is closed"));
        }

        // Safe point: service queued host work before running. Copy the
        // pair out so the lock is not held across reentrant callbacks.
        let dispatch = *self.core.dispatch.lock();
        if let Some((state, table)) = dispatch {
            (table.service)(state);
        }

        let src = source.trim();
        if src.is_empty() {
            return Ok(EmbeddedValue::Nil);
        }

        if let Some(rest) = src.strip_prefix("raise ") {
            let rest = rest.trim();
            return match rest.split_once(',') {
                Some((class_name, msg)) => {
                    let message = self.parse_literal(msg)?;
                    Err(EngineException::new(
                        class_name.trim().to_string(),
                        self.literal_string(message),
                    ))
                }
                None => {
                    let message = self.parse_literal(rest)?;
                    Err(EngineException::runtime(self.literal_string(message)))
                }
            };
        }

        if let Some(open) = src.find('(') {
            let name = &src[..open];
            let inner = src
                .strip_suffix(')')
                .ok_or_else(|| EngineException::new("ScriptError", "missing closing paren"))?;
            let inner = &inner[open + 1..];
            let mut args = Vec::new();
            if !inner.trim().is_empty() {
                for part in inner.split(',') {
                    args.push(self.parse_literal(part)?);
                }
            }
            if !is_identifier(name) {
                return Err(EngineException::new(
                    "ScriptError",
                    format!("unsupported expression: {}", src),
                ));
            }
            return self.call(EmbeddedValue::Nil, name, &args, None);
        }

        if let Ok(lit) = self.parse_literal(src) {
            return Ok(lit);
        }

        if is_identifier(src) {
            return self.call(EmbeddedValue::Nil, src, &[], None);
        }

        Err(EngineException::new(
            "ScriptError",
            format!("unsupported expression: {}", src),
        ))
    }

    // ========================================================================
    // Value allocation
    // ========================================================================

    fn intern(&self, name: &str) -> SymId {
        let mut symbols = self.core.symbols.lock();
        if let Some(idx) = symbols.iter().position(|s| s == name) {
            return SymId(idx as u32);
        }
        symbols.push(name.to_string());
        SymId((symbols.len() - 1) as u32)
    }

    fn symbol_name(&self, sym: SymId) -> String {
        self.core
            .symbols
            .lock()
            .get(sym.0 as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn new_string(&self, bytes: &[u8]) -> EmbeddedValue {
        self.alloc(HeapObject::Str(bytes.to_vec()))
    }

    fn new_array(&self, items: &[EmbeddedValue]) -> EmbeddedValue {
        self.alloc(HeapObject::Array(items.to_vec()))
    }

    fn new_hash(&self, pairs: &[(EmbeddedValue, EmbeddedValue)]) -> EmbeddedValue {
        self.alloc(HeapObject::Hash(pairs.to_vec()))
    }

    fn new_proc(&self, callable: u32) -> EmbeddedValue {
        self.alloc(HeapObject::Proc { callable })
    }

    fn new_data_object(&self, class: ClassRef) -> EmbeddedValue {
        self.alloc(HeapObject::Data { class: class.0 })
    }

    fn new_exception(&self, exc: &EngineException) -> EmbeddedValue {
        self.alloc(HeapObject::Exception {
            class_name: exc.class_name.clone(),
            message: exc.message.clone(),
        })
    }

    fn new_range(&self, start: i64, end: i64, exclusive: bool) -> EmbeddedValue {
        self.alloc(HeapObject::Range {
            start,
            end,
            exclusive,
        })
    }

    // ========================================================================
    // Value inspection
    // ========================================================================

    fn string_bytes(&self, value: EmbeddedValue) -> EngineResult<Vec<u8>> {
        match self.fetch(value) {
            Some(HeapObject::Str(bytes)) => Ok(bytes),
            _ => Err(EngineException::type_error("string expected")),
        }
    }

    fn array_items(&self, value: EmbeddedValue) -> EngineResult<Vec<EmbeddedValue>> {
        match self.fetch(value) {
            Some(HeapObject::Array(items)) => Ok(items),
            _ => Err(EngineException::type_error("array expected")),
        }
    }

    fn hash_pairs(
        &self,
        value: EmbeddedValue,
    ) -> EngineResult<Vec<(EmbeddedValue, EmbeddedValue)>> {
        match self.fetch(value) {
            Some(HeapObject::Hash(pairs)) => Ok(pairs),
            _ => Err(EngineException::type_error("hash expected")),
        }
    }

    fn proc_callable(&self, value: EmbeddedValue) -> Option<u32> {
        match self.fetch(value) {
            Some(HeapObject::Proc { callable }) => Some(callable),
            _ => None,
        }
    }

    fn range_bounds(&self, value: EmbeddedValue) -> EngineResult<(i64, i64, bool)> {
        match self.fetch(value) {
            Some(HeapObject::Range {
                start,
                end,
                exclusive,
            }) => Ok((start, end, exclusive)),
            _ => Err(EngineException::type_error("range expected")),
        }
    }

    fn exception_info(&self, value: EmbeddedValue) -> EngineResult<EngineException> {
        match self.fetch(value) {
            Some(HeapObject::Exception {
                class_name,
                message,
            }) => Ok(EngineException::new(class_name, message)),
            _ => Err(EngineException::type_error("exception expected")),
        }
    }

    // ========================================================================
    // Object members
    // ========================================================================

    fn member_names(&self, value: EmbeddedValue) -> Vec<String> {
        match self.fetch(value) {
            Some(HeapObject::Object { members, .. }) => {
                members.into_iter().map(|(name, _)| name).collect()
            }
            _ => Vec::new(),
        }
    }

    fn member_get(&self, value: EmbeddedValue, name: &str) -> EngineResult<EmbeddedValue> {
        match self.fetch(value) {
            Some(HeapObject::Object { members, .. }) => Ok(members
                .into_iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v)
                .unwrap_or(EmbeddedValue::Nil)),
            _ => Err(EngineException::type_error("object expected")),
        }
    }

    fn member_set(
        &self,
        value: EmbeddedValue,
        name: &str,
        member: EmbeddedValue,
    ) -> EngineResult<()> {
        let addr = value
            .heap_addr()
            .ok_or_else(|| EngineException::type_error("object expected"))?;
        let mut heap = self.core.heap.lock();
        match heap.get_mut(addr - 1) {
            Some(Some(HeapObject::Object { members, .. })) => {
                match members.iter_mut().find(|(n, _)| n == name) {
                    Some(slot) => slot.1 = member,
                    None => members.push((name.to_string(), member)),
                }
                Ok(())
            }
            _ => Err(EngineException::type_error("object expected")),
        }
    }

    // ========================================================================
    // Classes
    // ========================================================================

    fn object_class(&self) -> ClassRef {
        ClassRef(OBJECT_CLASS)
    }

    fn define_class(&self, name: &str, superclass: Option<ClassRef>) -> ClassRef {
        if let Some(existing) = self.class_index_by_name(name) {
            return ClassRef(existing);
        }
        let mut classes = self.core.classes.lock();
        classes.push(ClassDef {
            name: name.to_string(),
            superclass: Some(superclass.map(|c| c.0).unwrap_or(OBJECT_CLASS)),
            methods: FxHashMap::default(),
            data_class: false,
        });
        ClassRef(classes.len() - 1)
    }

    fn define_module(&self, name: &str) -> ClassRef {
        // Modules are namespaces; the stub backs them with the same table
        // entries as classes.
        self.define_class(name, None)
    }

    fn define_method(&self, class: ClassRef, name: &str, spec: MethodSpec) {
        let mut classes = self.core.classes.lock();
        if let Some(def) = classes.get_mut(class.0) {
            def.methods.insert(name.to_string(), spec);
        }
    }

    fn alias_method(&self, class: ClassRef, alias: &str, original: &str) {
        if let Some(spec) = self.find_method(class.0, original) {
            self.define_method(class, alias, spec);
        }
    }

    fn method_defined(&self, class: ClassRef, name: &str) -> bool {
        self.find_method(class.0, name).is_some()
    }

    fn mark_data_class(&self, class: ClassRef) {
        let mut classes = self.core.classes.lock();
        if let Some(def) = classes.get_mut(class.0) {
            def.data_class = true;
        }
    }

    fn class_of(&self, value: EmbeddedValue) -> ClassRef {
        match self.fetch(value) {
            Some(HeapObject::Object { class, .. }) | Some(HeapObject::Data { class }) => {
                ClassRef(class)
            }
            Some(HeapObject::Exception { class_name, .. }) => ClassRef(
                self.class_index_by_name(&class_name)
                    .unwrap_or(STANDARD_ERROR_CLASS),
            ),
            _ => ClassRef(OBJECT_CLASS),
        }
    }

    fn class_name(&self, class: ClassRef) -> String {
        self.core
            .classes
            .lock()
            .get(class.0)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn class_value(&self, class: ClassRef) -> EmbeddedValue {
        EmbeddedValue::Ref(ObjectRef {
            kind: HeapKind::Class,
            addr: class.0,
        })
    }

    fn const_get(&self, name: &str) -> Option<EmbeddedValue> {
        self.class_index_by_name(name)
            .map(|idx| self.class_value(ClassRef(idx)))
    }

    fn value_class(&self, value: EmbeddedValue) -> Option<ClassRef> {
        match value {
            EmbeddedValue::Ref(ObjectRef {
                kind: HeapKind::Class,
                addr,
            }) => Some(ClassRef(addr)),
            _ => None,
        }
    }

    fn exception_class_p(&self, class: ClassRef) -> bool {
        let classes = self.core.classes.lock();
        let mut current = Some(class.0);
        while let Some(idx) = current {
            match classes.get(idx) {
                Some(def) if idx == STANDARD_ERROR_CLASS => {
                    debug_assert_eq!(def.name, "StandardError");
                    return true;
                }
                Some(def) => current = def.superclass,
                None => return false,
            }
        }
        false
    }

    fn new_instance(
        &self,
        class: ClassRef,
        args: &[EmbeddedValue],
    ) -> EngineResult<EmbeddedValue> {
        let data_class = self
            .core
            .classes
            .lock()
            .get(class.0)
            .map(|c| c.data_class)
            .unwrap_or(false);

        let value = if data_class {
            self.alloc(HeapObject::Data { class: class.0 })
        } else {
            self.alloc(HeapObject::Object {
                class: class.0,
                members: Vec::new(),
            })
        };

        if self.method_defined(class, "initialize") {
            let ret = self.call(value, "initialize", args, None)?;
            // Post-initialization composition: an exception result replaces
            // the constructed object.
            if ret.is_exception() {
                return Ok(ret);
            }
        }

        Ok(value)
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    fn call(
        &self,
        receiver: EmbeddedValue,
        method: &str,
        args: &[EmbeddedValue],
        block: Option<EmbeddedValue>,
    ) -> EngineResult<EmbeddedValue> {
        // Built-in exception accessor.
        if method == "message" {
            if let Some(HeapObject::Exception { message, .. }) = self.fetch(receiver) {
                return Ok(self.new_string(message.as_bytes()));
            }
        }

        // Built-in proc invocation.
        if method == "call" {
            if let Some(HeapObject::Proc { callable }) = self.fetch(receiver) {
                let (state, table) = self.dispatch_pair()?;
                return (table.call)(
                    state,
                    callable,
                    receiver,
                    args,
                    block.unwrap_or(EmbeddedValue::Nil),
                );
            }
        }

        let class = self.class_of(receiver);
        let spec = self.find_method(class.0, method).ok_or_else(|| {
            EngineException::new(
                "NoMethodError",
                format!(
                    "undefined method '{}' for {}",
                    method,
                    self.class_name(class)
                ),
            )
        })?;

        if !spec.aspec.rest {
            let required = spec.aspec.required as usize;
            let max = required + spec.aspec.optional as usize;
            if args.len() < required || args.len() > max {
                return Err(EngineException::argument(format!(
                    "wrong number of arguments (given {}, expected {})",
                    args.len(),
                    required
                )));
            }
        }

        let (state, table) = self.dispatch_pair()?;
        (table.call)(
            state,
            spec.callable,
            receiver,
            args,
            block.unwrap_or(EmbeddedValue::Nil),
        )
    }
}

impl StubEngine {
    fn literal_string(&self, value: EmbeddedValue) -> String {
        match self.fetch(value) {
            Some(HeapObject::Str(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            _ => match value {
                EmbeddedValue::Int(i) => i.to_string(),
                EmbeddedValue::Float(f) => f.to_string(),
                EmbeddedValue::Bool(b) => b.to_string(),
                _ => String::new(),
            },
        }
    }
}
