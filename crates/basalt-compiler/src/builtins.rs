//! The table of built-in functions known to the compiler.
//!
//! Each descriptor carries the signature checked at call sites and the
//! opcode sequence the call lowers to. Built-ins render with a `!` suffix in
//! diagnostics.

use basalt_bytecode::Instr;

use crate::types::Type;

pub const PANIC: &str = "panic";
pub const CHECK_PERMISSION: &str = "checkPermission";

/// A built-in function descriptor.
#[derive(Debug)]
pub struct BuiltinFunc {
    pub name: &'static str,
    pub arg_types: &'static [Type],
    pub rtypes: &'static [Type],
    /// Whether the built-in may only appear in stateful code.
    pub requires_stateful: bool,
    /// Variadic built-ins have their argument count pushed before the call.
    pub is_variadic: bool,
    /// Whether a call satisfies the return-path rule: every control path of
    /// a value-returning function must end in `return` or `panic!`.
    pub terminates_control_flow: bool,
    pub instrs: &'static [Instr],
}

static BUILTINS: &[BuiltinFunc] = &[
    BuiltinFunc {
        name: PANIC,
        arg_types: &[],
        rtypes: &[],
        requires_stateful: false,
        is_variadic: false,
        terminates_control_flow: true,
        instrs: &[Instr::Panic],
    },
    BuiltinFunc {
        name: CHECK_PERMISSION,
        arg_types: &[Type::Bool],
        rtypes: &[],
        requires_stateful: true,
        is_variadic: false,
        terminates_control_flow: false,
        instrs: &[Instr::CheckPermission],
    },
    BuiltinFunc {
        name: "transferAlphFromSelf",
        arg_types: &[Type::Address, Type::U256],
        rtypes: &[],
        requires_stateful: true,
        is_variadic: false,
        terminates_control_flow: false,
        instrs: &[Instr::TransferAlphFromSelf],
    },
    BuiltinFunc {
        name: "transferTokenFromSelf",
        arg_types: &[Type::Address, Type::ByteVec, Type::U256],
        rtypes: &[],
        requires_stateful: true,
        is_variadic: false,
        terminates_control_flow: false,
        instrs: &[Instr::TransferTokenFromSelf],
    },
    BuiltinFunc {
        name: "transferAlphToSelf",
        arg_types: &[Type::Address, Type::U256],
        rtypes: &[],
        requires_stateful: true,
        is_variadic: false,
        terminates_control_flow: false,
        instrs: &[Instr::TransferAlphToSelf],
    },
    BuiltinFunc {
        name: "transferTokenToSelf",
        arg_types: &[Type::Address, Type::ByteVec, Type::U256],
        rtypes: &[],
        requires_stateful: true,
        is_variadic: false,
        terminates_control_flow: false,
        instrs: &[Instr::TransferTokenToSelf],
    },
    BuiltinFunc {
        name: "destroySelf",
        arg_types: &[Type::Address],
        rtypes: &[],
        requires_stateful: true,
        is_variadic: false,
        terminates_control_flow: false,
        instrs: &[Instr::DestroySelf],
    },
    BuiltinFunc {
        name: "selfAddress",
        arg_types: &[],
        rtypes: &[Type::Address],
        requires_stateful: true,
        is_variadic: false,
        terminates_control_flow: false,
        instrs: &[Instr::SelfAddress],
    },
];

pub fn lookup(name: &str) -> Option<&'static BuiltinFunc> {
    BUILTINS.iter().find(|b| b.name == name)
}
