#![forbid(unsafe_code)]

//! Basalt: a blockchain platform whose contracts are written in a typed
//! surface language and compiled to stack-based VM bytecode.
//!
//! This crate is the workspace facade. The compiler pipeline lives in
//! [`basalt_compiler`]; the instruction set and output containers the VM
//! consumes live in [`basalt_bytecode`].

pub use basalt_bytecode as bytecode;
pub use basalt_compiler as compiler;

pub use basalt_compiler::error::CompilerError;
pub use basalt_compiler::{
    CompiledAssetScript, CompiledContract, CompiledTxScript, CompilerConfig, compile_asset_script,
    compile_contract, compile_tx_script,
};
