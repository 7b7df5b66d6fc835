//! Marshaler round-trip tests against the stub engine.

use quill_bridge::{EmbeddedValue, HostFn, HostValue, StubEngine, Vm};

fn open() -> (StubEngine, Vm) {
    let stub = StubEngine::new();
    let vm = Vm::open(Box::new(stub.clone()));
    (stub, vm)
}

fn roundtrip(vm: &Vm, value: HostValue) -> HostValue {
    let embedded = vm.to_embedded(&value).unwrap();
    vm.to_host(embedded).unwrap()
}

// ============================================================================
// Primitive round trips
// ============================================================================

#[test]
fn test_primitives_round_trip_by_value() {
    let (_stub, vm) = open();

    let cases = vec![
        HostValue::Nil,
        HostValue::Bool(true),
        HostValue::Bool(false),
        HostValue::Int(0),
        HostValue::Int(-42),
        HostValue::Int(i64::MAX),
        HostValue::Float(3.25),
        HostValue::Str("hello".to_string()),
        HostValue::Str(String::new()),
        HostValue::Symbol("word".to_string()),
        HostValue::Ptr(0xdead_beef),
        HostValue::Range(1, 10, false),
        HostValue::Range(0, 5, true),
    ];

    for case in cases {
        assert_eq!(roundtrip(&vm, case.clone()), case, "case {:?}", case);
    }

    vm.close();
}

#[test]
fn test_bytes_round_trip_byte_exact() {
    let (_stub, vm) = open();

    // Not valid UTF-8: must come back as bytes, not mangled text.
    let case = HostValue::Bytes(vec![0xff, 0x00, 0x80]);
    assert_eq!(roundtrip(&vm, case.clone()), case);

    vm.close();
}

#[test]
fn test_aggregates_round_trip() {
    let (_stub, vm) = open();

    let array = HostValue::Array(vec![
        HostValue::Int(1),
        HostValue::Str("two".to_string()),
        HostValue::Array(vec![HostValue::Bool(true)]),
    ]);
    assert_eq!(roundtrip(&vm, array.clone()), array);

    let map = HostValue::Map(vec![
        (HostValue::Str("a".to_string()), HostValue::Int(1)),
        (HostValue::Str("b".to_string()), HostValue::Int(2)),
    ]);
    assert_eq!(roundtrip(&vm, map.clone()), map);

    vm.close();
}

#[test]
fn test_mixed_key_hash_keeps_raw_keys() {
    let (_stub, vm) = open();

    let map = HostValue::Map(vec![
        (HostValue::Int(1), HostValue::Str("one".to_string())),
        (HostValue::Str("two".to_string()), HostValue::Int(2)),
    ]);
    assert_eq!(roundtrip(&vm, map.clone()), map);

    vm.close();
}

// ============================================================================
// Identity round trips
// ============================================================================

struct Payload {
    #[allow(dead_code)]
    marker: u64,
}

#[test]
fn test_wrapped_struct_round_trips_by_identity() {
    let (_stub, vm) = open();

    let original = HostValue::opaque(Payload { marker: 7 });
    let embedded = vm.to_embedded(&original).unwrap();
    assert!(embedded.is_data());

    let back = vm.to_host(embedded).unwrap();
    // Identity, not a copy: HostValue equality on opaque values is Arc
    // pointer equality.
    assert_eq!(back, original);

    // A second wrap of a different allocation is a different identity.
    let other = HostValue::opaque(Payload { marker: 7 });
    assert_ne!(back, other);

    vm.close();
}

#[test]
fn test_function_round_trips_to_same_callable() {
    let (_stub, vm) = open();

    let f = HostValue::Func(HostFn::wrap(|a: i64| a + 1));
    let embedded = vm.to_embedded(&f).unwrap();
    assert!(embedded.is_proc());

    let back = vm.to_host(embedded).unwrap();
    assert_eq!(back, f);

    vm.close();
}

#[test]
fn test_marshaled_function_callable_from_embedded_side() {
    let (_stub, vm) = open();

    let f = HostValue::Func(HostFn::wrap(|a: i64, b: i64| a * b));
    let proc_value = vm.to_embedded(&f).unwrap();

    let result = vm
        .call(
            proc_value,
            "call",
            &[EmbeddedValue::Int(6), EmbeddedValue::Int(7)],
            None,
        )
        .unwrap();
    assert_eq!(result, EmbeddedValue::Int(42));

    vm.close();
}

// ============================================================================
// Finalization and stale keys
// ============================================================================

#[test]
fn test_finalization_releases_hook_entry() {
    let (stub, vm) = open();

    let wrapped = HostValue::opaque(Payload { marker: 1 });
    let embedded = vm.to_embedded(&wrapped).unwrap();
    assert_eq!(vm.pinned_count(), 1);

    stub.release(embedded);
    assert_eq!(vm.pinned_count(), 0);

    // A value embedding the now-stale key must not resurface the old
    // pinned host value.
    assert_eq!(vm.to_host(embedded).unwrap(), HostValue::Nil);

    vm.close();
}

#[test]
fn test_rewrap_overwrites_pin() {
    let (_stub, vm) = open();

    let first = HostValue::opaque(Payload { marker: 1 });
    let embedded = vm.to_embedded(&first).unwrap();
    assert_eq!(vm.pinned_count(), 1);

    // Wrapping a second value is a fresh object with its own pin.
    let second = HostValue::opaque(Payload { marker: 2 });
    let embedded2 = vm.to_embedded(&second).unwrap();
    assert_eq!(vm.pinned_count(), 2);
    assert_ne!(embedded.heap_addr(), embedded2.heap_addr());

    vm.close();
}

// ============================================================================
// Error values and escape hatch
// ============================================================================

#[test]
fn test_error_value_round_trip() {
    let (_stub, vm) = open();

    let err = HostValue::Error("it broke".to_string());
    let embedded = vm.to_embedded(&err).unwrap();
    assert!(embedded.is_exception());
    assert_eq!(vm.to_host(embedded).unwrap(), err);

    vm.close();
}

#[test]
fn test_embedded_escape_hatch_passes_through() {
    let (_stub, vm) = open();

    let raw = EmbeddedValue::Int(99);
    let value = HostValue::Embedded(raw);
    assert_eq!(vm.to_embedded(&value).unwrap(), raw);

    vm.close();
}
