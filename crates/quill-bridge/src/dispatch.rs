//! Dispatch trampolines — the fixed native entry points
//!
//! The engine can only store small integers, so every embedded-to-host
//! transfer funnels through this table: a state index recovers the owning
//! instance from the process-wide registry, a callable index recovers the
//! host callable from the instance's table, and dispatch proceeds from
//! there.
//!
//! This is also the error recovery boundary: panics are caught here and
//! converted to runtime-error exceptions, host errors are translated to
//! embedded exceptions, and nothing unwinds across in native form.

use std::panic::{self, AssertUnwindSafe};

use quill_sdk::{
    DispatchTable, EmbeddedValue, Engine, EngineException, EngineResult, HostFn, HostRef,
    HostValue, ParamKind, Signature, StateIndex, ValueTag,
};

use crate::callables::Callable;
use crate::convert::exception_for_bridge_error;
use crate::exception;
use crate::registry;
use crate::state::{Frame, Vm};

static DISPATCH: DispatchTable = DispatchTable {
    call: call_entry,
    finalize: finalize_entry,
    service: service_entry,
};

/// The process-wide dispatch table installed into every engine.
pub(crate) fn table() -> &'static DispatchTable {
    &DISPATCH
}

/// Entry point for embedded calls into host callables.
fn call_entry(
    state: StateIndex,
    callable: u32,
    receiver: EmbeddedValue,
    args: &[EmbeddedValue],
    block: EmbeddedValue,
) -> EngineResult<EmbeddedValue> {
    let vm = registry::lookup(state);

    vm.push_frame(Frame {
        receiver,
        args: args.to_vec(),
        block,
    });

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        dispatch_callable(&vm, callable, receiver, args)
    }));

    vm.pop_frame();

    match outcome {
        Ok(result) => result,
        Err(payload) => Err(EngineException::runtime(panic_message(&*payload))),
    }
}

/// Entry point for data-object finalization notifications.
fn finalize_entry(state: StateIndex, addr: usize) {
    // A panic here would unwind into the engine's collector; swallow it.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        registry::lookup(state).unpin(addr);
    }));
    if outcome.is_err() {
        #[cfg(debug_assertions)]
        eprintln!("warning: finalize notification for state {} failed", state.0);
    }
}

/// Entry point for engine safe points: service queued host work.
fn service_entry(state: StateIndex) {
    registry::lookup(state).service_pending();
}

fn dispatch_callable(
    vm: &Vm,
    callable: u32,
    receiver: EmbeddedValue,
    args: &[EmbeddedValue],
) -> EngineResult<EmbeddedValue> {
    let resolved = vm
        .resolve_local(callable)
        .map_err(exception_for_bridge_error)?;

    match resolved {
        Callable::Native(f) => f(vm, receiver),
        Callable::Reflective(f) => call_reflective(vm, &f, receiver, args),
    }
}

/// Reflective dispatch: receiver injection, arity validation, per-argument
/// conversion, invocation, result conversion.
fn call_reflective(
    vm: &Vm,
    f: &HostFn,
    receiver: EmbeddedValue,
    args: &[EmbeddedValue],
) -> EngineResult<EmbeddedValue> {
    let sig = f.signature();

    // A method call on a wrapped host receiver implicitly prepends the
    // receiver to the argument list.
    let injected = match receiver.tag() {
        ValueTag::Data | ValueTag::Object => vm.hook_of(receiver),
        _ => None,
    };

    let supplied = args.len() + usize::from(injected.is_some());
    let min_required = sig
        .fixed_params()
        .saturating_sub(sig.optional_trailing);
    if supplied < min_required {
        return Err(EngineException::runtime(format!(
            "expected {} parameters, supplied {}",
            min_required, supplied
        )));
    }

    let host_args = convert_args(vm, sig, injected, args)?;

    let results = f
        .call(&host_args)
        .map_err(|e| exception::for_host_error(vm, e.as_ref()))?;

    results_to_embedded(vm, results)
}

/// Convert an embedded argument vector into host arguments according to a
/// cached signature, optionally prepending a wrapped receiver.
pub(crate) fn convert_args(
    vm: &Vm,
    sig: &Signature,
    receiver: Option<HostRef>,
    args: &[EmbeddedValue],
) -> EngineResult<Vec<HostValue>> {
    let shift = usize::from(receiver.is_some());
    let mut out = Vec::with_capacity(args.len() + shift);

    if let Some(r) = receiver {
        out.push(HostValue::Opaque(r));
    }

    for (i, &arg) in args.iter().enumerate() {
        let slot = i + shift;
        let kind = match sig.params.get(slot) {
            Some(kind) => *kind,
            // Past the declared parameters: variadic tails convert
            // generically, non-variadic extras are dropped.
            None if sig.variadic => ParamKind::Any,
            None => continue,
        };

        let converted = match kind {
            ParamKind::Value => HostValue::Embedded(arg),
            _ => vm.to_host(arg).map_err(exception_for_bridge_error)?,
        };
        out.push(converted);
    }

    Ok(out)
}

/// Fold host results back into one embedded value: zero results yield nil,
/// one yields itself, several yield an array.
fn results_to_embedded(vm: &Vm, results: Vec<HostValue>) -> EngineResult<EmbeddedValue> {
    match results.len() {
        0 => Ok(EmbeddedValue::Nil),
        1 => vm
            .to_embedded(&results[0])
            .map_err(exception_for_bridge_error),
        _ => {
            let mut converted = Vec::with_capacity(results.len());
            for r in &results {
                let value = vm.to_embedded(r).map_err(exception_for_bridge_error)?;
                converted.push(value);
            }
            Ok(vm.engine().new_array(&converted))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("host callable panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("host callable panicked: {}", s)
    } else {
        "host callable panicked".to_string()
    }
}
