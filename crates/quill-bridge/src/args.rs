//! Argument scanner — type-directed extraction of embedded call arguments
//!
//! Used inside host callbacks: each destination is a typed slot, filled
//! from the embedded argument at its position. A missing argument leaves
//! the destination's pre-seeded value untouched. The scanner always reports
//! how many arguments the call site actually supplied, and the trailing
//! block value, independent of how many destinations were scanned.
//!
//! Nil policy (one rule per destination class, documented here and on the
//! variants):
//! - scalar and aggregate destinations (integers, floats, strings, byte
//!   buffers, vectors, maps, symbols): nil is skipped, the pre-seeded
//!   default survives;
//! - value-like destinations (`Value`, `OptStr`, `Proc`): nil is stored,
//!   since these can represent absence;
//! - `Bool`: nil converts to `false` through embedded truthiness.

use std::collections::HashMap;

use quill_sdk::{BridgeError, BridgeResult, EmbeddedValue, Engine, HostValue, SymId, ValueTag};

use crate::state::Vm;

/// A typed destination slot for one scanned argument.
pub enum ScanDest<'a> {
    /// Truthiness-converted boolean; nil stores `false`
    Bool(&'a mut bool),
    /// Signed 32-bit integer; nil skips
    I32(&'a mut i32),
    /// Signed 64-bit integer; nil skips
    I64(&'a mut i64),
    /// Unsigned 32-bit integer; nil skips
    U32(&'a mut u32),
    /// Unsigned 64-bit integer; nil skips
    U64(&'a mut u64),
    /// 32-bit float; nil skips
    F32(&'a mut f32),
    /// 64-bit float; nil skips
    F64(&'a mut f64),
    /// Display string of the argument; nil skips
    Str(&'a mut String),
    /// Optional string; nil stores `None`
    OptStr(&'a mut Option<String>),
    /// Byte buffer from an embedded string; nil skips
    Bytes(&'a mut Vec<u8>),
    /// Integer vector from an embedded array; nil skips
    IntVec(&'a mut Vec<i64>),
    /// String vector from an embedded array; nil skips
    StrVec(&'a mut Vec<String>),
    /// String-keyed map from an embedded hash; nil skips
    StrMap(&'a mut HashMap<String, HostValue>),
    /// Raw embedded value; nil is stored as-is
    Value(&'a mut EmbeddedValue),
    /// Symbol; nil skips
    Sym(&'a mut SymId),
    /// Must be an embedded array (loud failure otherwise, including nil)
    Array(&'a mut EmbeddedValue),
    /// Must be an embedded hash (loud failure otherwise, including nil)
    Hash(&'a mut EmbeddedValue),
    /// Proc value; nil stores nil, a non-proc fails loudly
    Proc(&'a mut EmbeddedValue),
}

impl Vm {
    /// Scan the current call's arguments into typed destinations.
    ///
    /// Returns the number of arguments the embedded call site supplied and
    /// the trailing block value (nil if none was passed).
    pub fn scan_args(
        &self,
        dests: &mut [ScanDest<'_>],
    ) -> BridgeResult<(usize, EmbeddedValue)> {
        let args = self.args();
        let block = self.block_arg();
        let argc = args.len();

        for (i, dest) in dests.iter_mut().enumerate() {
            // No argument at this position: the caller's pre-seeded
            // default stands.
            let Some(&arg) = args.get(i) else { continue };
            self.scan_one(arg, dest)?;
        }

        Ok((argc, block))
    }

    fn scan_one(&self, arg: EmbeddedValue, dest: &mut ScanDest<'_>) -> BridgeResult<()> {
        match dest {
            ScanDest::Bool(d) => {
                **d = arg.is_truthy();
            }
            ScanDest::I32(d) => {
                if let Some(i) = self.int_arg(arg)? {
                    **d = i as i32;
                }
            }
            ScanDest::I64(d) => {
                if let Some(i) = self.int_arg(arg)? {
                    **d = i;
                }
            }
            ScanDest::U32(d) => {
                if let Some(i) = self.int_arg(arg)? {
                    **d = i as u32;
                }
            }
            ScanDest::U64(d) => {
                if let Some(i) = self.int_arg(arg)? {
                    **d = i as u64;
                }
            }
            ScanDest::F32(d) => {
                if let Some(f) = self.float_arg(arg)? {
                    **d = f as f32;
                }
            }
            ScanDest::F64(d) => {
                if let Some(f) = self.float_arg(arg)? {
                    **d = f;
                }
            }
            ScanDest::Str(d) => {
                if !arg.is_nil() {
                    **d = self.string_arg(arg)?;
                }
            }
            ScanDest::OptStr(d) => {
                **d = if arg.is_nil() {
                    None
                } else {
                    Some(self.string_arg(arg)?)
                };
            }
            ScanDest::Bytes(d) => {
                if !arg.is_nil() {
                    if arg.tag() != ValueTag::String {
                        return Err(BridgeError::mismatch("string", arg.type_name()));
                    }
                    **d = self.engine().string_bytes(arg)?;
                }
            }
            ScanDest::IntVec(d) => {
                if !arg.is_nil() {
                    let items = self.array_arg(arg)?;
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.int_arg(item)?.ok_or_else(|| {
                            BridgeError::mismatch("integer", item.type_name())
                        })?);
                    }
                    **d = out;
                }
            }
            ScanDest::StrVec(d) => {
                if !arg.is_nil() {
                    let items = self.array_arg(arg)?;
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.string_arg(item)?);
                    }
                    **d = out;
                }
            }
            ScanDest::StrMap(d) => {
                if !arg.is_nil() {
                    if arg.tag() != ValueTag::Hash {
                        return Err(BridgeError::mismatch("hash", arg.type_name()));
                    }
                    let mut out = HashMap::new();
                    for (k, v) in self.engine().hash_pairs(arg)? {
                        out.insert(self.display_string(k), self.to_host(v)?);
                    }
                    **d = out;
                }
            }
            ScanDest::Value(d) => {
                **d = arg;
            }
            ScanDest::Sym(d) => {
                if !arg.is_nil() {
                    **d = arg
                        .as_symbol()
                        .ok_or_else(|| BridgeError::mismatch("symbol", arg.type_name()))?;
                }
            }
            ScanDest::Array(d) => {
                if !arg.is_array() {
                    return Err(BridgeError::mismatch("array", arg.type_name()));
                }
                **d = arg;
            }
            ScanDest::Hash(d) => {
                if !arg.is_hash() {
                    return Err(BridgeError::mismatch("hash", arg.type_name()));
                }
                **d = arg;
            }
            ScanDest::Proc(d) => {
                if arg.is_nil() {
                    **d = EmbeddedValue::Nil;
                } else if arg.is_proc() {
                    **d = arg;
                } else {
                    return Err(BridgeError::mismatch("proc", arg.type_name()));
                }
            }
        }
        Ok(())
    }

    /// Integer of an argument; `None` means nil (skip).
    fn int_arg(&self, arg: EmbeddedValue) -> BridgeResult<Option<i64>> {
        match arg {
            EmbeddedValue::Nil => Ok(None),
            EmbeddedValue::Int(i) => Ok(Some(i)),
            EmbeddedValue::Float(f) => Ok(Some(f as i64)),
            EmbeddedValue::Bool(b) => Ok(Some(i64::from(b))),
            other => Err(BridgeError::mismatch("integer", other.type_name())),
        }
    }

    /// Float of an argument; `None` means nil (skip).
    fn float_arg(&self, arg: EmbeddedValue) -> BridgeResult<Option<f64>> {
        match arg {
            EmbeddedValue::Nil => Ok(None),
            EmbeddedValue::Float(f) => Ok(Some(f)),
            EmbeddedValue::Int(i) => Ok(Some(i as f64)),
            other => Err(BridgeError::mismatch("float", other.type_name())),
        }
    }

    fn string_arg(&self, arg: EmbeddedValue) -> BridgeResult<String> {
        match arg.tag() {
            ValueTag::String
            | ValueTag::Symbol
            | ValueTag::Int
            | ValueTag::Float
            | ValueTag::Bool => Ok(self.display_string(arg)),
            _ => Err(BridgeError::mismatch("string", arg.type_name())),
        }
    }

    fn array_arg(&self, arg: EmbeddedValue) -> BridgeResult<Vec<EmbeddedValue>> {
        if !arg.is_array() {
            return Err(BridgeError::mismatch("array", arg.type_name()));
        }
        Ok(self.engine().array_items(arg)?)
    }
}
