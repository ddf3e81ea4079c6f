//! The type language of the contract surface syntax.

use core::fmt;

use basalt_bytecode::Val;

use crate::ast::TypeId;
use crate::error::{CompilerError, Result};

/// A surface-language type.
///
/// Contract types carry the type id only; the contract's kind and
/// capabilities live in the per-compilation registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    I256,
    U256,
    ByteVec,
    Address,
    FixedSizeArray { elem: Box<Type>, size: usize },
    Contract(TypeId),
}

impl Type {
    pub fn from_val(val: &Val) -> Type {
        match val {
            Val::Bool(_) => Type::Bool,
            Val::I256(_) => Type::I256,
            Val::U256(_) => Type::U256,
            Val::ByteVec(_) => Type::ByteVec,
            Val::Address(_) => Type::Address,
        }
    }

    pub fn array(elem: Type, size: usize) -> Type {
        Type::FixedSizeArray {
            elem: Box::new(elem),
            size,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::FixedSizeArray { .. })
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I256 | Type::U256)
    }

    /// The number of scalar stack cells this type occupies after array
    /// lowering. Primitives and contract handles count as 1.
    pub fn flattened_len(&self) -> usize {
        match self {
            Type::FixedSizeArray { elem, size } => size * elem.flattened_len(),
            _ => 1,
        }
    }

    /// Peels `depth` array layers, the element type reached by that many
    /// index applications.
    pub fn index_inner_type(&self, depth: usize) -> Result<&Type> {
        let mut tpe = self;
        for _ in 0..depth {
            match tpe {
                Type::FixedSizeArray { elem, .. } => tpe = elem,
                _ => {
                    return Err(CompilerError::new(format!(
                        "expect array type, have {tpe}"
                    )));
                }
            }
        }
        Ok(tpe)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "Bool"),
            Type::I256 => write!(f, "I256"),
            Type::U256 => write!(f, "U256"),
            Type::ByteVec => write!(f, "ByteVec"),
            Type::Address => write!(f, "Address"),
            Type::FixedSizeArray { elem, size } => write!(f, "[{elem}; {size}]"),
            Type::Contract(id) => write!(f, "{id}"),
        }
    }
}

/// Total flattened cell count of a type sequence.
pub fn flattened_types_len(types: &[Type]) -> usize {
    types.iter().map(Type::flattened_len).sum()
}

/// Renders a type sequence for error messages, e.g. `[U256, Bool]`.
pub fn format_types(types: &[Type]) -> String {
    let inner = types
        .iter()
        .map(Type::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{inner}]")
}

/// The kind of a top-level declaration, with its capability flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContractKind {
    Contract,
    AbstractContract,
    Interface,
    TxScript,
    AssetScript,
}

impl ContractKind {
    /// Whether instances of this declaration can exist on-chain.
    pub fn is_instantiable(self) -> bool {
        matches!(self, ContractKind::Contract)
    }

    /// Whether other declarations may list this one as a parent.
    pub fn is_inheritable(self) -> bool {
        matches!(self, ContractKind::AbstractContract | ContractKind::Interface)
    }

    /// Whether code of this kind may touch contract state: external calls,
    /// contract conversions, events.
    pub fn is_stateful(self) -> bool {
        !matches!(self, ContractKind::AssetScript)
    }

    /// Whether a contract handle of this type is a valid conversion target.
    pub fn is_conversion_target(self) -> bool {
        matches!(
            self,
            ContractKind::Contract | ContractKind::AbstractContract | ContractKind::Interface
        )
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContractKind::Contract => "Contract",
            ContractKind::AbstractContract => "Abstract Contract",
            ContractKind::Interface => "Interface",
            ContractKind::TxScript => "TxScript",
            ContractKind::AssetScript => "AssetScript",
        };
        write!(f, "{name}")
    }
}
