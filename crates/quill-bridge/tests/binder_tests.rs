//! Reflective class binder tests: projection, aliasing, accessors,
//! adoption, post-initialization hooks, capability matching.

use std::sync::Arc;

use quill_bridge::{
    ArgSpec, BridgeError, EmbeddedValue, Engine, Handle, HostValue, NativeFn, StubEngine,
    TypeBinding, Vm,
};
use quill_sdk::EngineException;

struct Counter {
    public_value: i64,
}

fn bind_counter(vm: &Vm) -> quill_sdk::ClassRef {
    vm.bind_class(
        TypeBinding::<Counter>::new("Counter")
            .constructor(|v: i64| Counter { public_value: v })
            .method("PublicMethod", |h: Handle<Counter>| {
                h.read().public_value * 2
            })
            .method("IsZero", |h: Handle<Counter>| h.read().public_value == 0)
            .method("ResetBang", |h: Handle<Counter>| {
                h.write().public_value = 0;
            })
            .field(
                "PublicValue",
                |c: &Counter| c.public_value,
                |c: &mut Counter, v: i64| c.public_value = v,
            ),
    )
}

fn open() -> (StubEngine, Vm) {
    let stub = StubEngine::new();
    let vm = Vm::open(Box::new(stub.clone()));
    (stub, vm)
}

// ============================================================================
// Surface projection
// ============================================================================

#[test]
fn test_methods_project_to_snake_case() {
    let (_stub, vm) = open();
    let class = bind_counter(&vm);

    let obj = vm
        .engine()
        .new_instance(class, &[EmbeddedValue::Int(7)])
        .unwrap();

    let doubled = vm.call(obj, "public_method", &[], None).unwrap();
    assert_eq!(doubled, EmbeddedValue::Int(14));

    vm.close();
}

#[test]
fn test_fields_project_to_accessor_pair() {
    let (_stub, vm) = open();
    let class = bind_counter(&vm);

    let obj = vm
        .engine()
        .new_instance(class, &[EmbeddedValue::Int(7)])
        .unwrap();

    assert_eq!(
        vm.call(obj, "public_value", &[], None).unwrap(),
        EmbeddedValue::Int(7)
    );

    // Assignment evaluates to the assigned value and mutates the host
    // struct through the pinned handle.
    assert_eq!(
        vm.call(obj, "public_value=", &[EmbeddedValue::Int(5)], None)
            .unwrap(),
        EmbeddedValue::Int(5)
    );
    assert_eq!(
        vm.call(obj, "public_value", &[], None).unwrap(),
        EmbeddedValue::Int(5)
    );

    vm.close();
}

#[test]
fn test_predicate_and_bang_aliases() {
    let (_stub, vm) = open();
    let class = bind_counter(&vm);

    let obj = vm
        .engine()
        .new_instance(class, &[EmbeddedValue::Int(3)])
        .unwrap();

    assert_eq!(
        vm.call(obj, "zero?", &[], None).unwrap(),
        EmbeddedValue::Bool(false)
    );
    vm.call(obj, "reset!", &[], None).unwrap();
    assert_eq!(
        vm.call(obj, "zero?", &[], None).unwrap(),
        EmbeddedValue::Bool(true)
    );

    // The unaliased snake_case names still exist.
    assert_eq!(
        vm.call(obj, "is_zero", &[], None).unwrap(),
        EmbeddedValue::Bool(true)
    );
    vm.call(obj, "reset_bang", &[], None).unwrap();

    vm.close();
}

// ============================================================================
// Construction paths
// ============================================================================

#[test]
fn test_adoption_rewraps_existing_value() {
    let (_stub, vm) = open();
    let class = bind_counter(&vm);

    let first = vm
        .engine()
        .new_instance(class, &[EmbeddedValue::Int(9)])
        .unwrap();
    let adopted = vm.engine().new_instance(class, &[first]).unwrap();

    // Same pinned allocation, not a re-run of the constructor.
    let a = vm.hook_of(first).unwrap();
    let b = vm.hook_of(adopted).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    // Mutation through one wrapper is visible through the other.
    vm.call(adopted, "public_value=", &[EmbeddedValue::Int(1)], None)
        .unwrap();
    assert_eq!(
        vm.call(first, "public_value", &[], None).unwrap(),
        EmbeddedValue::Int(1)
    );

    vm.close();
}

#[test]
fn test_constructor_type_mismatch_is_argument_error() {
    let (_stub, vm) = open();
    let class = bind_counter(&vm);

    let text = vm.to_embedded(&HostValue::from("seven")).unwrap();
    match vm.engine().new_instance(class, &[text]) {
        Err(exc) => assert_eq!(exc.class_name, "ArgumentError"),
        Ok(_) => panic!("expected construction failure"),
    }

    vm.close();
}

#[test]
fn test_adopt_only_rejects_foreign_values() {
    let (_stub, vm) = open();

    struct Fixed;
    let class = vm.bind_class(TypeBinding::<Fixed>::new("Fixed").adopt_only());

    match vm.engine().new_instance(class, &[EmbeddedValue::Int(1)]) {
        Err(exc) => assert_eq!(exc.class_name, "ArgumentError"),
        Ok(_) => panic!("expected adoption failure"),
    }

    vm.close();
}

#[test]
#[should_panic(expected = "no constructor")]
fn test_binding_without_constructor_aborts() {
    let (_stub, vm) = open();
    struct Bare;
    let _ = vm.bind_class(TypeBinding::<Bare>::new("Bare"));
}

// ============================================================================
// Post-initialization hook
// ============================================================================

#[test]
fn test_after_init_result_kept_only_when_exception() {
    let (_stub, vm) = open();
    let class = bind_counter(&vm);

    // A benign after_init: constructed object is returned unchanged.
    let benign: NativeFn = Arc::new(|_vm, _self| Ok(EmbeddedValue::Int(123)));
    vm.define_native_method(class, "after_init", benign, ArgSpec::none());

    let obj = vm
        .engine()
        .new_instance(class, &[EmbeddedValue::Int(1)])
        .unwrap();
    assert!(obj.is_data());

    vm.close();
}

#[test]
fn test_after_init_exception_replaces_constructed_value() {
    let (_stub, vm) = open();
    let class = bind_counter(&vm);

    let veto: NativeFn = Arc::new(|vm, _self| {
        Ok(vm
            .engine()
            .new_exception(&EngineException::runtime("vetoed")))
    });
    vm.define_native_method(class, "after_init", veto, ArgSpec::none());

    let result = vm
        .engine()
        .new_instance(class, &[EmbeddedValue::Int(1)])
        .unwrap();
    assert!(result.is_exception());

    vm.close();
}

// ============================================================================
// Binding-directed marshaling
// ============================================================================

#[test]
fn test_marshaled_struct_uses_bound_class() {
    let (_stub, vm) = open();
    let class = bind_counter(&vm);

    let wrapped = HostValue::Opaque(quill_bridge::handle(Counter { public_value: 4 }));
    let embedded = vm.to_embedded(&wrapped).unwrap();

    assert_eq!(vm.engine().class_of(embedded), class);
    // Bound methods work on values marshaled this way too.
    assert_eq!(
        vm.call(embedded, "public_method", &[], None).unwrap(),
        EmbeddedValue::Int(8)
    );

    vm.close();
}

#[test]
fn test_unbound_struct_wraps_under_object_class() {
    let (_stub, vm) = open();

    struct Stray;
    let embedded = vm.to_embedded(&HostValue::opaque(Stray)).unwrap();
    assert!(embedded.is_data());
    assert_eq!(vm.engine().class_of(embedded), vm.engine().object_class());

    vm.close();
}

#[test]
fn test_capability_binding_matches_first_registered() {
    let (_stub, vm) = open();

    // Interface-style binding: anything carrying a String payload.
    struct Label;
    let class = vm.bind_class(
        TypeBinding::<Label>::new("Label")
            .adopt_only()
            .also_matches(|r| r.is::<String>()),
    );

    let embedded = vm
        .to_embedded(&HostValue::opaque(String::from("tagged")))
        .unwrap();
    assert_eq!(vm.engine().class_of(embedded), class);

    vm.close();
}

// ============================================================================
// Scanner interplay (bound native methods read the call frame)
// ============================================================================

#[test]
fn test_cross_instance_wrapped_receiver_not_visible() {
    let (_stub, vm_a) = open();
    let (_stub_b, vm_b) = open();
    let class_a = bind_counter(&vm_a);

    let obj_a = vm_a
        .engine()
        .new_instance(class_a, &[EmbeddedValue::Int(2)])
        .unwrap();

    // The other instance has no hook entry for this wrapper; its tables
    // never see A's pins.
    assert!(vm_b.hook_of(obj_a).is_none());
    assert!(matches!(
        vm_b.to_host(obj_a),
        Ok(HostValue::Nil) | Err(BridgeError::Exception(_))
    ));

    vm_a.close();
    vm_b.close();
}
