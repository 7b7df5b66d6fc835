//! VM instance handle and lifecycle
//!
//! A `Vm` is a cheaply clonable handle to one embedded VM instance. The
//! instance owns the engine, the per-VM lock guarding the hook table,
//! callable registry and call-frame stack, a feature cache, and the
//! shutdown machinery.
//!
//! Each instance is logically single-threaded for embedded execution: only
//! one host thread runs embedded code at a time. Other host threads may
//! schedule work onto the instance through `submit`, which blocks until the
//! owning thread services the queue at a safe point or the instance begins
//! shutting down (in which case the submission is abandoned without error).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::select;
use crossbeam::sync::WaitGroup;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, ReentrantMutex};

use quill_sdk::{
    ArgSpec, BridgeError, BridgeResult, ClassRef, EmbeddedValue, Engine, HostFn, HostRef,
    HostValue, MethodSpec, Signature, StateIndex, SymId,
};

use crate::bind::BindingEntry;
use crate::callables::{Callable, CallableRef, CallableRegistry, NativeFn, ResolveError};
use crate::dispatch;
use crate::hooks::{HookKey, HookTable};
use crate::registry;

/// Work scheduled onto an instance's interpreter thread.
pub type Job = Box<dyn FnOnce(&Vm) + Send + 'static>;

/// One embedded-to-host call in flight: the raw argument vector and
/// trailing block captured at the boundary for the argument scanner.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub receiver: EmbeddedValue,
    pub args: Vec<EmbeddedValue>,
    pub block: EmbeddedValue,
}

/// State guarded by the per-VM lock.
///
/// The hook table and callable registry share one lock with the frame
/// stack: all three must stay consistent with whatever thread is currently
/// inside the interpreter, and embedded callbacks reenter host code too
/// unpredictably for lock-free fast paths.
pub(crate) struct VmInner {
    pub hooks: HookTable,
    pub callables: CallableRegistry,
    pub bindings: Vec<BindingEntry>,
    pub frames: Vec<Frame>,
}

/// One live VM instance.
pub(crate) struct VmState {
    index: OnceCell<StateIndex>,
    engine: Box<dyn Engine>,
    inner: Mutex<VmInner>,
    // Serializes embedded execution across host threads. Reentrant: a
    // host callable invoked from inside the interpreter runs on the same
    // thread and may evaluate or call again.
    exec: ReentrantMutex<()>,
    features: DashMap<String, HostValue>,
    jobs_tx: Sender<Job>,
    jobs_rx: Receiver<Job>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    wait: Mutex<Option<WaitGroup>>,
    closed: AtomicBool,
}

/// Handle to a VM instance.
///
/// Clones share the same instance. The instance is released only by an
/// explicit `close`; dropping the last handle without closing leaks the
/// registry slot for the life of the process.
#[derive(Clone)]
pub struct Vm {
    state: Arc<VmState>,
}

/// Keeps the instance's shutdown waiting until dropped.
///
/// Host-side background work tied to an instance holds one of these;
/// `close` blocks until every guard has been dropped before releasing the
/// engine, because native callbacks may still be pending from that work.
pub struct BackgroundGuard {
    _wg: WaitGroup,
}

impl Vm {
    /// Open a new VM instance over the given engine.
    ///
    /// Registers the instance in the process-wide state registry and
    /// installs the dispatch table so engine callbacks can find their way
    /// back.
    pub fn open(engine: Box<dyn Engine>) -> Vm {
        // Rendezvous queue: submission blocks until serviced or shutdown.
        let (jobs_tx, jobs_rx) = bounded(0);
        let (shutdown_tx, shutdown_rx) = bounded(0);

        let state = Arc::new(VmState {
            index: OnceCell::new(),
            engine,
            inner: Mutex::new(VmInner {
                hooks: HookTable::new(),
                callables: CallableRegistry::new(),
                bindings: Vec::new(),
                frames: Vec::new(),
            }),
            exec: ReentrantMutex::new(()),
            features: DashMap::new(),
            jobs_tx,
            jobs_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            wait: Mutex::new(Some(WaitGroup::new())),
            closed: AtomicBool::new(false),
        });

        let index = registry::register(state.clone());
        state
            .index
            .set(index)
            .expect("instance registered more than once");
        state.engine.install_dispatch(index, dispatch::table());

        Vm { state }
    }

    pub(crate) fn from_state(state: Arc<VmState>) -> Vm {
        Vm { state }
    }

    /// Registry index of this instance.
    pub fn index(&self) -> StateIndex {
        *self
            .state
            .index
            .get()
            .expect("instance used before registration")
    }

    /// The underlying engine.
    pub fn engine(&self) -> &dyn Engine {
        &*self.state.engine
    }

    /// True once `close` has begun.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Close the instance.
    ///
    /// Irreversible. Ordering matters: the shutdown signal is closed first
    /// (pending and future submissions become no-ops), then close waits
    /// for all host-side background work registered against the instance
    /// to acknowledge completion, and only then releases the engine and
    /// frees the registry slot.
    pub fn close(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Dropping the sender closes the shutdown channel.
        drop(self.state.shutdown_tx.lock().take());

        if let Some(wg) = self.state.wait.lock().take() {
            wg.wait();
        }

        self.state.engine.close();
        registry::remove(self.index());
    }

    /// Register host-side background work against this instance. `close`
    /// blocks until the returned guard is dropped. Returns `None` once
    /// shutdown has begun.
    pub fn background_guard(&self) -> Option<BackgroundGuard> {
        if self.is_closed() {
            return None;
        }
        self.state
            .wait
            .lock()
            .as_ref()
            .map(|wg| BackgroundGuard { _wg: wg.clone() })
    }

    /// Run the embedded collector. Reclaimed wrappers release their hook
    /// entries through the finalization trampoline.
    pub fn run_gc(&self) {
        self.state.engine.run_gc();
    }

    // ========================================================================
    // Evaluation and invocation
    // ========================================================================

    /// Evaluate source text, returning the raw embedded result.
    ///
    /// Queued host work is serviced before and after execution.
    pub fn eval(&self, source: &str) -> BridgeResult<EmbeddedValue> {
        if self.is_closed() {
            return Err(BridgeError::Closed);
        }
        let _exec = self.state.exec.lock();
        self.service_pending();
        let result = self.state.engine.eval(source).map_err(BridgeError::from);
        self.service_pending();
        result
    }

    /// Evaluate source text and marshal the result to a host value.
    pub fn eval_to_host(&self, source: &str) -> BridgeResult<HostValue> {
        let value = self.eval(source)?;
        self.to_host(value)
    }

    /// Invoke a method on an embedded value. Engine exceptions are
    /// captured at this boundary and surfaced as a single error value.
    pub fn call(
        &self,
        receiver: EmbeddedValue,
        method: &str,
        args: &[EmbeddedValue],
        block: Option<EmbeddedValue>,
    ) -> BridgeResult<EmbeddedValue> {
        if self.is_closed() {
            return Err(BridgeError::Closed);
        }
        let _exec = self.state.exec.lock();
        self.state
            .engine
            .call(receiver, method, args, block)
            .map_err(BridgeError::from)
    }

    /// Intern a symbol name.
    pub fn intern(&self, name: &str) -> SymId {
        self.state.engine.intern(name)
    }

    // ========================================================================
    // Submission queue
    // ========================================================================

    /// Schedule work onto the instance's interpreter thread.
    ///
    /// Blocks the submitting thread until the work is accepted at a
    /// service point. If the instance begins shutting down first, the
    /// submission is abandoned without error.
    pub fn submit(&self, job: Job) {
        if self.is_closed() {
            return;
        }
        select! {
            send(self.state.jobs_tx, job) -> _ => {}
            recv(self.state.shutdown_rx) -> _ => {}
        }
    }

    /// Closure-accepting convenience over `submit`.
    pub fn submit_fn(&self, f: impl FnOnce(&Vm) + Send + 'static) {
        self.submit(Box::new(f));
    }

    /// Service the submission queue. Called by the owning thread at safe
    /// points; also invoked around every `eval`.
    pub fn service_pending(&self) {
        while let Ok(job) = self.state.jobs_rx.try_recv() {
            job(self);
        }
    }

    // ========================================================================
    // Feature cache
    // ========================================================================

    /// Record a loaded feature/module under a name.
    pub fn feature_set(&self, name: &str, value: HostValue) {
        self.state.features.insert(name.to_string(), value);
    }

    /// Look up a loaded feature/module.
    pub fn feature_get(&self, name: &str) -> Option<HostValue> {
        self.state.features.get(name).map(|v| v.clone())
    }

    // ========================================================================
    // Hook table (per-VM lock)
    // ========================================================================

    /// Pin a host value under an embedded heap address.
    pub(crate) fn pin(&self, key: HookKey, value: HostRef) {
        self.state.inner.lock().hooks.pin(key, value);
    }

    /// Release the pin for an address.
    pub(crate) fn unpin(&self, key: HookKey) {
        self.state.inner.lock().hooks.unpin(key);
    }

    /// Pinned host value for an address, if any.
    pub(crate) fn pinned(&self, key: HookKey) -> Option<HostRef> {
        self.state.inner.lock().hooks.get(key)
    }

    /// Pinned host value backing an embedded wrapper, if the value is a
    /// heap reference with a live hook entry.
    pub fn hook_of(&self, value: EmbeddedValue) -> Option<HostRef> {
        value.heap_addr().and_then(|addr| self.pinned(addr))
    }

    /// Number of live hook entries (observability and tests).
    pub fn pinned_count(&self) -> usize {
        self.state.inner.lock().hooks.len()
    }

    // ========================================================================
    // Callable registry (per-VM lock)
    // ========================================================================

    /// Register a callable under the next free index.
    pub fn register_callable(&self, callable: Callable) -> CallableRef {
        let index = self.state.inner.lock().callables.register(callable);
        CallableRef {
            owner: self.index(),
            index,
        }
    }

    /// Register a reflective host function.
    pub fn register_func(&self, f: HostFn) -> CallableRef {
        self.register_callable(Callable::Reflective(f))
    }

    /// Register a fixed-signature native callable.
    pub fn register_native(&self, f: NativeFn) -> CallableRef {
        self.register_callable(Callable::Native(f))
    }

    /// Resolve a callable reference.
    ///
    /// A reference created under another instance is rejected here rather
    /// than dispatching into whatever occupies that index locally.
    pub fn resolve_callable(&self, r: CallableRef) -> BridgeResult<Callable> {
        if r.owner != self.index() {
            return Err(BridgeError::CallableNotFound(r.index));
        }
        self.resolve_local(r.index)
    }

    pub(crate) fn resolve_local(&self, index: u32) -> BridgeResult<Callable> {
        self.state
            .inner
            .lock()
            .callables
            .resolve(index)
            .map_err(|e| match e {
                ResolveError::NotFound(i) => BridgeError::CallableNotFound(i),
                ResolveError::WrongConvention(i) => BridgeError::WrongConvention(i),
            })
    }

    /// Number of registered callables (observability and tests).
    pub fn callable_count(&self) -> usize {
        self.state.inner.lock().callables.len()
    }

    // ========================================================================
    // Class bindings (per-VM lock)
    // ========================================================================

    pub(crate) fn push_binding(&self, entry: BindingEntry) {
        self.state.inner.lock().bindings.push(entry);
    }

    /// First registered binding whose type or capability predicate matches
    /// the runtime value. Registration order is significant.
    pub(crate) fn binding_for(&self, value: &HostRef) -> Option<ClassRef> {
        let inner = self.state.inner.lock();
        inner
            .bindings
            .iter()
            .find(|b| b.matches(value))
            .map(|b| b.class)
    }

    // ========================================================================
    // Method definition
    // ========================================================================

    /// Define a global function, callable from embedded code without a
    /// receiver.
    pub fn define_func(&self, name: &str, f: HostFn) {
        let class = self.state.engine.object_class();
        self.define_method_fn(class, name, f);
    }

    /// Define a reflective method on a class.
    pub fn define_method_fn(&self, class: ClassRef, name: &str, f: HostFn) {
        let aspec = aspec_for(f.signature());
        let r = self.register_func(f);
        self.state.engine.define_method(
            class,
            name,
            MethodSpec {
                callable: r.index,
                aspec,
            },
        );
    }

    /// Define a fixed-signature native method on a class.
    pub fn define_native_method(
        &self,
        class: ClassRef,
        name: &str,
        f: NativeFn,
        aspec: ArgSpec,
    ) {
        let r = self.register_native(f);
        self.state.engine.define_method(
            class,
            name,
            MethodSpec {
                callable: r.index,
                aspec,
            },
        );
    }

    /// Define (or reopen) a class under the root namespace.
    pub fn define_class(&self, name: &str) -> ClassRef {
        self.state.engine.define_class(name, None)
    }

    /// Define (or reopen) a module under the root namespace. Module
    /// functions are attached with `define_method_fn`.
    pub fn define_module(&self, name: &str) -> ClassRef {
        self.state.engine.define_module(name)
    }

    // ========================================================================
    // Call frames
    // ========================================================================

    pub(crate) fn push_frame(&self, frame: Frame) {
        self.state.inner.lock().frames.push(frame);
    }

    pub(crate) fn pop_frame(&self) {
        self.state.inner.lock().frames.pop();
    }

    pub(crate) fn current_frame(&self) -> Option<Frame> {
        self.state.inner.lock().frames.last().cloned()
    }

    /// Raw argument vector of the current embedded-to-host call.
    pub fn args(&self) -> Vec<EmbeddedValue> {
        self.current_frame().map(|f| f.args).unwrap_or_default()
    }

    /// Number of arguments supplied by the embedded call site.
    pub fn arg_count(&self) -> usize {
        self.current_frame().map(|f| f.args.len()).unwrap_or(0)
    }

    /// First argument of the current call, or nil.
    pub fn first_arg(&self) -> EmbeddedValue {
        self.current_frame()
            .and_then(|f| f.args.first().copied())
            .unwrap_or(EmbeddedValue::Nil)
    }

    /// Trailing block argument of the current call, or nil.
    pub fn block_arg(&self) -> EmbeddedValue {
        self.current_frame()
            .map(|f| f.block)
            .unwrap_or(EmbeddedValue::Nil)
    }

    /// Receiver of the current call, or nil.
    pub fn current_receiver(&self) -> EmbeddedValue {
        self.current_frame()
            .map(|f| f.receiver)
            .unwrap_or(EmbeddedValue::Nil)
    }
}

/// Declared argument shape for a reflective callable, derived from its
/// cached signature. The receiver slot, when present, is injected by the
/// trampoline and not counted.
pub(crate) fn aspec_for(sig: &Signature) -> ArgSpec {
    let receiver = usize::from(sig.takes_receiver);
    let fixed = sig.fixed_params().saturating_sub(receiver);
    let optional = sig.optional_trailing.min(fixed);

    if sig.variadic {
        ArgSpec {
            required: (fixed - optional) as u32,
            optional: optional as u32,
            rest: true,
        }
    } else {
        ArgSpec::arg((fixed - optional) as u32, optional as u32)
    }
}
