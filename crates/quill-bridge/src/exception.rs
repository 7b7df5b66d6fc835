//! Host error → embedded exception translation
//!
//! A host callable's trailing error is translated exactly one level: its
//! message becomes the embedded exception's message, and a leading
//! `"ClassName: "` prefix selects the exception class — first against the
//! standard class set, then as a best-effort constant lookup in the
//! instance's root namespace. A prefix that does not name an exception
//! class falls back to the standard error class.

use quill_sdk::{Engine, EngineException};

use crate::state::Vm;

/// Exception classes every engine is expected to predefine.
pub const STANDARD_ERROR_CLASSES: &[&str] = &[
    "StandardError",
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
];

/// Fallback class when no prefix matches.
pub const FALLBACK_ERROR_CLASS: &str = "StandardError";

/// Translate a host error into the embedded exception to raise for it.
pub fn for_host_error(vm: &Vm, err: &(dyn std::error::Error + 'static)) -> EngineException {
    let message = err.to_string();

    if let Some((prefix, rest)) = message.split_once(": ") {
        if let Some(class_name) = resolve_class(vm, prefix) {
            return EngineException::new(class_name, rest.to_string());
        }
    }

    EngineException::new(FALLBACK_ERROR_CLASS, message)
}

/// Resolve a message prefix to a defined exception class name.
fn resolve_class(vm: &Vm, prefix: &str) -> Option<String> {
    if !looks_like_class_name(prefix) {
        return None;
    }

    if STANDARD_ERROR_CLASSES.contains(&prefix) {
        return Some(prefix.to_string());
    }

    // Best-effort constant lookup: the constant must exist, be a class,
    // and be an exception class.
    let engine = vm.engine();
    let constant = engine.const_get(prefix)?;
    let class = engine.value_class(constant)?;
    if engine.exception_class_p(class) {
        Some(prefix.to_string())
    } else {
        None
    }
}

/// Class names are non-empty, start uppercase and contain no whitespace.
fn looks_like_class_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_uppercase() => {}
        _ => return false,
    }
    !s.contains(char::is_whitespace)
}
