//! Instance lifecycle, submission queue and argument scanner tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use quill_bridge::{
    ArgSpec, BridgeError, EmbeddedValue, Engine, HostFn, HostValue, NativeFn, ScanDest,
    StubEngine, Vm,
};
use quill_sdk::EngineException;

fn open() -> (StubEngine, Vm) {
    let stub = StubEngine::new();
    let vm = Vm::open(Box::new(stub.clone()));
    (stub, vm)
}

// ============================================================================
// Evaluation boundary
// ============================================================================

#[test]
fn test_eval_returns_values_and_calls_host_functions() {
    let (_stub, vm) = open();

    assert_eq!(vm.eval("42").unwrap(), EmbeddedValue::Int(42));
    assert_eq!(vm.eval("nil").unwrap(), EmbeddedValue::Nil);

    vm.define_func("add", HostFn::wrap(|a: i64, b: i64| a + b));
    assert_eq!(vm.eval("add(2, 3)").unwrap(), EmbeddedValue::Int(5));
    assert_eq!(
        vm.eval_to_host("add(2, 3)").unwrap(),
        HostValue::Int(5)
    );

    vm.close();
}

#[test]
fn test_engine_exception_is_captured_not_left_pending() {
    let (_stub, vm) = open();

    match vm.eval("raise KeyError, \"gone\"").unwrap_err() {
        BridgeError::Exception(exc) => {
            assert_eq!(exc.class_name, "KeyError");
            assert_eq!(exc.message, "gone");
        }
        other => panic!("expected exception, got {:?}", other),
    }

    // The instance stays usable after a captured exception.
    assert_eq!(vm.eval("1").unwrap(), EmbeddedValue::Int(1));

    vm.close();
}

#[test]
fn test_eval_after_close_fails() {
    let (_stub, vm) = open();
    vm.close();
    assert!(matches!(vm.eval("1"), Err(BridgeError::Closed)));
}

#[test]
fn test_close_is_idempotent() {
    let (stub, vm) = open();
    vm.close();
    vm.close();
    assert!(stub.is_closed());
}

// ============================================================================
// Submission queue and shutdown ordering
// ============================================================================

#[test]
fn test_submission_runs_at_service_point() {
    let (_stub, vm) = open();

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = ran.clone();
    let submitter = {
        let vm = vm.clone();
        thread::spawn(move || {
            vm.submit_fn(move |_vm| {
                ran_clone.store(true, Ordering::Release);
            });
        })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while !ran.load(Ordering::Acquire) {
        assert!(Instant::now() < deadline, "submission never serviced");
        vm.service_pending();
        thread::sleep(Duration::from_millis(1));
    }

    submitter.join().unwrap();
    vm.close();
}

#[test]
fn test_submission_abandoned_on_shutdown() {
    let (_stub, vm) = open();

    let submitter = {
        let vm = vm.clone();
        thread::spawn(move || {
            // Nobody services this; it must unblock when shutdown begins
            // and return without error.
            vm.submit_fn(|_vm| {});
        })
    };

    thread::sleep(Duration::from_millis(20));
    vm.close();
    submitter.join().unwrap();

    // Submissions after close are immediate no-ops.
    vm.submit_fn(|_vm| panic!("must not run"));
}

#[test]
fn test_close_waits_for_background_acknowledgement() {
    let (stub, vm) = open();

    let guard = vm.background_guard().unwrap();
    let holder = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        drop(guard);
    });

    let start = Instant::now();
    vm.close();
    assert!(start.elapsed() >= Duration::from_millis(45));
    assert!(stub.is_closed());

    holder.join().unwrap();
    assert!(vm.background_guard().is_none());
}

// ============================================================================
// Argument scanner
// ============================================================================

/// Install a probe method whose body scans its arguments and records the
/// outcome for the test to inspect.
#[allow(clippy::type_complexity)]
fn install_scan_probe(
    vm: &Vm,
    out: Arc<Mutex<Option<(usize, String, i64, EmbeddedValue)>>>,
) {
    let probe: NativeFn = Arc::new(move |vm, _self| {
        let mut text = String::from("default");
        let mut number: i64 = -1;
        let (argc, block) = vm
            .scan_args(&mut [ScanDest::Str(&mut text), ScanDest::I64(&mut number)])
            .map_err(|e| EngineException::type_error(e.to_string()))?;
        *out.lock().unwrap() = Some((argc, text, number, block));
        Ok(EmbeddedValue::Nil)
    });
    vm.define_native_method(vm.engine().object_class(), "scan_probe", probe, ArgSpec::any());
}

#[test]
fn test_scan_nil_skips_preseeded_string() {
    let (_stub, vm) = open();
    let out = Arc::new(Mutex::new(None));
    install_scan_probe(&vm, out.clone());

    vm.call(
        EmbeddedValue::Nil,
        "scan_probe",
        &[EmbeddedValue::Nil, EmbeddedValue::Int(3)],
        None,
    )
    .unwrap();

    let (argc, text, number, block) = out.lock().unwrap().take().unwrap();
    assert_eq!(argc, 2);
    assert_eq!(text, "default");
    assert_eq!(number, 3);
    assert!(block.is_nil());

    vm.close();
}

#[test]
fn test_scan_count_is_independent_of_destinations() {
    let (_stub, vm) = open();
    let out = Arc::new(Mutex::new(None));
    install_scan_probe(&vm, out.clone());

    // Three arguments, two destinations: the count reports what the call
    // site supplied, not how many slots were scanned.
    vm.call(
        EmbeddedValue::Nil,
        "scan_probe",
        &[
            EmbeddedValue::Nil,
            EmbeddedValue::Int(7),
            EmbeddedValue::Int(9),
        ],
        None,
    )
    .unwrap();

    let (argc, text, number, _block) = out.lock().unwrap().take().unwrap();
    assert_eq!(argc, 3);
    assert_eq!(text, "default");
    assert_eq!(number, 7);

    vm.close();
}

#[test]
fn test_scan_structural_mismatch_fails_loudly() {
    let (_stub, vm) = open();

    let failed: NativeFn = Arc::new(move |vm, _self| {
        let mut arr = EmbeddedValue::Nil;
        vm.scan_args(&mut [ScanDest::Array(&mut arr)])
            .map_err(|e| EngineException::type_error(e.to_string()))?;
        Ok(arr)
    });
    vm.define_native_method(vm.engine().object_class(), "wants_array", failed, ArgSpec::any());

    match vm
        .call(EmbeddedValue::Nil, "wants_array", &[EmbeddedValue::Int(1)], None)
        .unwrap_err()
    {
        BridgeError::Exception(exc) => {
            assert_eq!(exc.class_name, "TypeError");
            assert!(exc.message.contains("array"));
        }
        other => panic!("expected exception, got {:?}", other),
    }

    vm.close();
}

#[test]
fn test_scan_reports_trailing_block() {
    let (_stub, vm) = open();
    let out = Arc::new(Mutex::new(None));
    install_scan_probe(&vm, out.clone());

    let block = vm
        .to_embedded(&HostValue::Func(HostFn::wrap(|| 0i64)))
        .unwrap();
    vm.call(
        EmbeddedValue::Nil,
        "scan_probe",
        &[EmbeddedValue::Int(1)],
        Some(block),
    )
    .unwrap();

    let (argc, _text, _number, seen_block) = out.lock().unwrap().take().unwrap();
    assert_eq!(argc, 1);
    assert_eq!(seen_block, block);

    vm.close();
}

// ============================================================================
// Feature cache
// ============================================================================

#[test]
fn test_feature_cache() {
    let (_stub, vm) = open();

    assert!(vm.feature_get("json").is_none());
    vm.feature_set("json", HostValue::Bool(true));
    assert_eq!(vm.feature_get("json"), Some(HostValue::Bool(true)));

    vm.close();
}
