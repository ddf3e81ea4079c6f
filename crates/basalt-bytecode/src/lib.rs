#![forbid(unsafe_code)]

//! The VM-facing data model of the Basalt compiler: instruction set, runtime
//! values, and the three output container shapes.
//!
//! The compiler is a pure producer of these types; the VM is the consumer.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod val;
pub mod verify;

pub use val::{Address, I256, U256, Val};
pub use verify::{VerifyError, verify_method, verify_methods};

/// A single VM opcode.
///
/// Branch offsets are relative: a branch at index `i` with offset `k`
/// transfers control to index `i + k + 1`. Forward branch offsets emitted by
/// the compiler fit in a single unsigned byte; back edges fit in a single
/// signed byte. The `i16` payload accommodates both.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Instr {
    // Constants.
    U256Const0,
    U256Const1,
    U256Const2,
    U256Const3,
    U256Const4,
    U256Const5,
    U256Const(U256),
    I256Const(I256),
    BoolConst(bool),
    BytesConst(Vec<u8>),
    AddressConst(Address),

    // Locals and fields.
    LoadLocal(u8),
    StoreLocal(u8),
    /// Pops a `U256` slot index and pushes that local.
    LoadLocalByIndex,
    /// Pops a `U256` slot index, then a value, and stores the value.
    StoreLocalByIndex,
    LoadField(u8),
    StoreField(u8),
    LoadImmField(u8),
    /// Pops a `U256` slot index and pushes that mutable field.
    LoadFieldByIndex,
    /// Pops a `U256` slot index, then a value, and stores the value.
    StoreFieldByIndex,

    // Stack manipulation.
    Dup,
    Pop,

    // Control flow.
    Jump(i16),
    IfTrue(i16),
    IfFalse(i16),
    CallLocal(u8),
    CallExternal(u8),
    Return,
    Panic,

    // U256 arithmetic and comparison.
    U256Add,
    U256Sub,
    U256Mul,
    U256Div,
    U256Mod,
    U256Eq,
    U256Neq,
    U256Lt,
    U256Le,
    U256Gt,
    U256Ge,

    // I256 arithmetic and comparison.
    I256Add,
    I256Sub,
    I256Mul,
    I256Div,
    I256Mod,
    I256Eq,
    I256Neq,
    I256Lt,
    I256Le,
    I256Gt,
    I256Ge,

    // Booleans.
    BoolNot,
    BoolAnd,
    BoolOr,
    BoolEq,
    BoolNeq,

    // Byte-vector and address equality.
    ByteVecEq,
    ByteVecNeq,
    AddressEq,
    AddressNeq,

    // Asset handling.
    ApproveAlph,
    ApproveToken,
    TransferAlphFromSelf,
    TransferTokenFromSelf,
    TransferAlphToSelf,
    TransferTokenToSelf,
    DestroySelf,
    SelfAddress,
    CheckPermission,

    // Event logs, indexed by event argument count.
    Log0,
    Log1,
    Log2,
    Log3,
    Log4,
    Log5,
}

impl Instr {
    /// The `(pops, pushes)` stack effect, when it is signature-independent.
    ///
    /// `CallLocal`, `CallExternal` and `Return` depend on the method
    /// signature and return `None`.
    pub fn stack_io(&self) -> Option<(usize, usize)> {
        use Instr::*;
        let io = match self {
            U256Const0 | U256Const1 | U256Const2 | U256Const3 | U256Const4 | U256Const5
            | U256Const(_) | I256Const(_) | BoolConst(_) | BytesConst(_) | AddressConst(_) => {
                (0, 1)
            }
            LoadLocal(_) | LoadField(_) | LoadImmField(_) => (0, 1),
            StoreLocal(_) | StoreField(_) => (1, 0),
            LoadLocalByIndex | LoadFieldByIndex => (1, 1),
            StoreLocalByIndex | StoreFieldByIndex => (2, 0),
            Dup => (1, 2),
            Pop => (1, 0),
            Jump(_) | Panic => (0, 0),
            IfTrue(_) | IfFalse(_) => (1, 0),
            CallLocal(_) | CallExternal(_) | Return => return None,
            U256Add | U256Sub | U256Mul | U256Div | U256Mod | U256Eq | U256Neq | U256Lt
            | U256Le | U256Gt | U256Ge => (2, 1),
            I256Add | I256Sub | I256Mul | I256Div | I256Mod | I256Eq | I256Neq | I256Lt
            | I256Le | I256Gt | I256Ge => (2, 1),
            BoolNot => (1, 1),
            BoolAnd | BoolOr | BoolEq | BoolNeq => (2, 1),
            ByteVecEq | ByteVecNeq | AddressEq | AddressNeq => (2, 1),
            ApproveAlph => (2, 0),
            ApproveToken => (3, 0),
            TransferAlphFromSelf | TransferAlphToSelf => (2, 0),
            TransferTokenFromSelf | TransferTokenToSelf => (3, 0),
            DestroySelf => (1, 0),
            SelfAddress => (0, 1),
            CheckPermission => (1, 0),
            Log0 => (1, 0),
            Log1 => (2, 0),
            Log2 => (3, 0),
            Log3 => (4, 0),
            Log4 => (5, 0),
            Log5 => (6, 0),
        };
        Some(io)
    }

    /// The `Log{n}` opcode for an event with `n` argument cells.
    pub fn log(arg_count: usize) -> Option<Instr> {
        match arg_count {
            0 => Some(Instr::Log0),
            1 => Some(Instr::Log1),
            2 => Some(Instr::Log2),
            3 => Some(Instr::Log3),
            4 => Some(Instr::Log4),
            5 => Some(Instr::Log5),
            _ => None,
        }
    }
}

/// One compiled function. Lengths are in flattened stack cells.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Method {
    pub is_public: bool,
    pub use_preapproved_assets: bool,
    pub use_assets_in_contract: bool,
    pub args_length: usize,
    pub locals_length: usize,
    pub return_length: usize,
    pub instrs: Vec<Instr>,
}

/// The compiled form of an asset script: stateless, no fields.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatelessScript {
    pub methods: Vec<Method>,
}

/// The compiled form of a transaction script.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatefulScript {
    methods: Vec<Method>,
}

impl StatefulScript {
    /// The first method is the entry point and must be public; the rest are
    /// internal helpers and must be private.
    pub fn from_methods(methods: Vec<Method>) -> Result<StatefulScript, String> {
        match methods.first() {
            None => return Err("expect at least one method for tx script".to_string()),
            Some(entry) if !entry.is_public => {
                return Err(
                    "invalid methods for tx script: expect the first method public".to_string(),
                );
            }
            Some(_) => {}
        }
        if methods.iter().skip(1).any(|m| m.is_public) {
            return Err(
                "invalid methods for tx script: expect the non-entry methods private".to_string(),
            );
        }
        Ok(StatefulScript { methods })
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }
}

/// The compiled form of a deployable contract.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatefulContract {
    /// Flattened cell count of the contract's field layout.
    pub field_length: usize,
    pub methods: Vec<Method>,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn void_method(is_public: bool) -> Method {
        Method {
            is_public,
            use_preapproved_assets: false,
            use_assets_in_contract: false,
            args_length: 0,
            locals_length: 0,
            return_length: 0,
            instrs: vec![Instr::Return],
        }
    }

    #[test]
    fn stateful_script_requires_public_entry() {
        assert!(StatefulScript::from_methods(vec![void_method(true)]).is_ok());
        assert!(
            StatefulScript::from_methods(vec![void_method(true), void_method(false)]).is_ok()
        );
        let err = StatefulScript::from_methods(vec![void_method(false)]).unwrap_err();
        assert!(err.contains("expect the first method public"));
        let err =
            StatefulScript::from_methods(vec![void_method(true), void_method(true)]).unwrap_err();
        assert!(err.contains("private"));
    }

    #[test]
    fn log_opcodes_cover_at_most_five_args() {
        assert_eq!(Instr::log(0), Some(Instr::Log0));
        assert_eq!(Instr::log(5), Some(Instr::Log5));
        assert_eq!(Instr::log(6), None);
    }
}
