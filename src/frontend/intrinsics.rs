use cranelift_codegen::ir::{types, AbiParam, Signature, Type};

/// Runtime functions backing `write` and `read`. They are imported symbols,
/// resolved by the JIT or linked from the C runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    WriteI32,
    WriteF64,
    WriteChar,
    WriteBool,
    WriteStr,
    ReadI32,
    ReadF64,
    ReadChar,
}

impl Hook {
    pub const ALL: [Hook; 8] = [
        Hook::WriteI32,
        Hook::WriteF64,
        Hook::WriteChar,
        Hook::WriteBool,
        Hook::WriteStr,
        Hook::ReadI32,
        Hook::ReadF64,
        Hook::ReadChar,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Hook::WriteI32 => "cinder_write_i32",
            Hook::WriteF64 => "cinder_write_f64",
            Hook::WriteChar => "cinder_write_char",
            Hook::WriteBool => "cinder_write_bool",
            Hook::WriteStr => "cinder_write_str",
            Hook::ReadI32 => "cinder_read_i32",
            Hook::ReadF64 => "cinder_read_f64",
            Hook::ReadChar => "cinder_read_char",
        }
    }

    /// Fills `sig` with the hook's parameters and results.
    /// Chars and bools cross the boundary widened to `i32`.
    pub fn signature(self, mut sig: Signature, ptr: Type) -> Signature {
        match self {
            Hook::WriteI32 | Hook::WriteChar | Hook::WriteBool => {
                sig.params.push(AbiParam::new(types::I32))
            }
            Hook::WriteF64 => sig.params.push(AbiParam::new(types::F64)),
            Hook::WriteStr => sig.params.push(AbiParam::new(ptr)),
            Hook::ReadI32 | Hook::ReadChar => sig.returns.push(AbiParam::new(types::I32)),
            Hook::ReadF64 => sig.returns.push(AbiParam::new(types::F64)),
        }
        sig
    }
}
