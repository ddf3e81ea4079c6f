#![forbid(unsafe_code)]

//! The Basalt contract compiler.
//!
//! Takes a parsed [`ast::MultiContract`], a [`CompilerConfig`], and the
//! index of the declaration to compile, and produces one of the three
//! bytecode container shapes plus an ordered vector of warnings. The
//! textual parser and the executing VM are external collaborators.
//!
//! Compilation is a pure synchronous function: no I/O, no timers, no shared
//! state between invocations.

pub mod ast;
pub mod builtins;
mod codegen;
pub mod error;
mod inherit;
mod permission;
mod sema;
pub mod state;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use basalt_bytecode::{StatefulContract, StatefulScript, StatelessScript};

use crate::ast::{Contract, MultiContract, TopDecl, TypeId};
use crate::error::{CompilerError, Result};
use crate::inherit::ExtendedMultiContract;
use crate::state::{CompilerState, ContractInfo, ContractRegistry, FuncInfo};
use crate::types::ContractKind;

pub use crate::state::CompilerConfig;

/// A compiled asset script and the warnings gathered along the way.
#[derive(Clone, Debug)]
pub struct CompiledAssetScript {
    pub script: StatelessScript,
    pub warnings: Vec<String>,
}

/// A compiled transaction script and its warnings.
#[derive(Clone, Debug)]
pub struct CompiledTxScript {
    pub script: StatefulScript,
    pub warnings: Vec<String>,
}

/// A compiled contract and its warnings.
#[derive(Clone, Debug)]
pub struct CompiledContract {
    pub contract: StatefulContract,
    pub warnings: Vec<String>,
}

/// Compiles the `AssetScript` at `index`.
pub fn compile_asset_script(
    multi: &MultiContract,
    index: usize,
    config: &CompilerConfig,
) -> Result<CompiledAssetScript> {
    let extended = inherit::extend_multi_contract(multi)?;
    let decl = declaration_at(&extended, index)?;
    let TopDecl::AssetScript(_) = decl else {
        return Err(CompilerError::new(format!(
            "Invalid contract index {index}: expect an asset script, have a {}",
            decl.kind()
        )));
    };
    let registry = Arc::new(build_registry(&extended.multi)?);
    let mut state = make_state(decl, config, registry)?;
    sema::check_top_decl(&mut state, decl)?;
    let methods = gen_methods(&mut state, decl)?;
    Ok(CompiledAssetScript {
        script: StatelessScript { methods },
        warnings: state.warnings().to_vec(),
    })
}

/// Compiles the `TxScript` at `index`.
pub fn compile_tx_script(
    multi: &MultiContract,
    index: usize,
    config: &CompilerConfig,
) -> Result<CompiledTxScript> {
    let extended = inherit::extend_multi_contract(multi)?;
    let decl = declaration_at(&extended, index)?;
    let TopDecl::TxScript(_) = decl else {
        return Err(CompilerError::new(format!(
            "Invalid contract index {index}: expect a tx script, have a {}",
            decl.kind()
        )));
    };
    let registry = Arc::new(build_registry(&extended.multi)?);
    let mut contract_states = check_contract_states(&extended, config, registry.clone(), None)?;
    gen_all_contracts(&extended, &mut contract_states, None)?;

    let mut state = make_state(decl, config, registry)?;
    sema::check_top_decl(&mut state, decl)?;
    let methods = gen_methods(&mut state, decl)?;
    let script = StatefulScript::from_methods(methods).map_err(CompilerError::new)?;

    let warnings = run_external_call_analysis(&extended, &contract_states, &state)?;
    for warning in warnings {
        state.warn(warning);
    }
    Ok(CompiledTxScript {
        script,
        warnings: state.warnings().to_vec(),
    })
}

/// Compiles the (non-abstract) `Contract` at `index`.
pub fn compile_contract(
    multi: &MultiContract,
    index: usize,
    config: &CompilerConfig,
) -> Result<CompiledContract> {
    let extended = inherit::extend_multi_contract(multi)?;
    let decl = declaration_at(&extended, index)?;
    let TopDecl::Contract(target) = decl else {
        return Err(CompilerError::new(format!(
            "Invalid contract index {index}: expect a contract, have a {}",
            decl.kind()
        )));
    };
    if target.is_abstract {
        return Err(CompilerError::new(format!(
            "Invalid contract index {index}: contract {} is abstract",
            target.id
        )));
    }
    let registry = Arc::new(build_registry(&extended.multi)?);

    // Every contract gets its own state, and the emission pass runs for
    // all of them: the external-call permission analysis needs their call
    // graphs populated, not just the target's.
    let mut states = check_contract_states(&extended, config, registry, Some(index))?;

    let target_state = states.get_mut(&target.id).expect("target state");
    let methods = gen_methods(target_state, decl)?;
    target_state.check_unused_fields();
    gen_all_contracts(&extended, &mut states, Some(&target.id))?;

    let interface_funcs = extended
        .interface_func_counts
        .get(&target.id)
        .copied()
        .unwrap_or(0);
    permission::check_interface_permissions(
        target,
        states.get(&target.id).expect("target state"),
        interface_funcs,
    )?;
    let warnings =
        run_external_call_analysis(&extended, &states, states.get(&target.id).expect("state"))?;

    let target_state = states.get_mut(&target.id).expect("target state");
    for warning in warnings {
        target_state.warn(warning);
    }
    Ok(CompiledContract {
        contract: StatefulContract {
            field_length: target_state.field_length(),
            methods,
        },
        warnings: target_state.warnings().to_vec(),
    })
}

fn declaration_at<'a>(extended: &'a ExtendedMultiContract, index: usize) -> Result<&'a TopDecl> {
    extended
        .multi
        .get(index)
        .ok_or_else(|| CompilerError::new(format!("Invalid contract index {index}")))
}

fn func_table(decl: &TopDecl) -> Result<Vec<FuncInfo>> {
    let funcs = decl.funcs();
    let mut table = Vec::with_capacity(funcs.len());
    for (position, func) in funcs.iter().enumerate() {
        if funcs[..position].iter().any(|f| f.id == func.id) {
            return Err(CompilerError::new(format!(
                "These functions are defined multiple times: {}",
                func.name()
            )));
        }
        let index = u8::try_from(position).map_err(|_| {
            CompilerError::new(format!("too many functions in {}", decl.id()))
        })?;
        table.push(FuncInfo::from_def(func, index));
    }
    Ok(table)
}

fn build_registry(multi: &MultiContract) -> Result<ContractRegistry> {
    let mut registry = ContractRegistry::default();
    for decl in &multi.decls {
        // Scripts are not referable types.
        if matches!(decl.kind(), ContractKind::AssetScript | ContractKind::TxScript) {
            continue;
        }
        let fields = decl
            .as_contract()
            .map(|c| c.fields.clone())
            .unwrap_or_default();
        registry.insert(
            decl.id().clone(),
            ContractInfo {
                kind: decl.kind(),
                fields,
                funcs: func_table(decl)?,
            },
        )?;
    }
    Ok(registry)
}

fn make_state(
    decl: &TopDecl,
    config: &CompilerConfig,
    registry: Arc<ContractRegistry>,
) -> Result<CompilerState> {
    Ok(CompilerState::new(
        decl.id().clone(),
        decl.kind(),
        *config,
        registry,
        func_table(decl)?,
    ))
}

/// Checks every contract declaration, the one at `priority` (the compile
/// target) first so its diagnostics surface before its neighbours'.
fn check_contract_states(
    extended: &ExtendedMultiContract,
    config: &CompilerConfig,
    registry: Arc<ContractRegistry>,
    priority: Option<usize>,
) -> Result<BTreeMap<TypeId, CompilerState>> {
    let mut states = BTreeMap::new();
    let decls = &extended.multi.decls;
    let order = priority
        .into_iter()
        .chain((0..decls.len()).filter(|i| Some(*i) != priority));
    for position in order {
        let decl = &decls[position];
        let TopDecl::Contract(contract) = decl else {
            continue;
        };
        let mut state = make_state(decl, config, registry.clone())?;
        sema::check_top_decl(&mut state, decl)?;
        states.insert(contract.id.clone(), state);
    }
    Ok(states)
}

fn gen_methods(
    state: &mut CompilerState,
    decl: &TopDecl,
) -> Result<Vec<basalt_bytecode::Method>> {
    let mut methods = Vec::with_capacity(decl.funcs().len());
    for func in decl.funcs() {
        methods.push(codegen::gen_function(state, func)?);
    }
    Ok(methods)
}

/// Runs the emission pass over every contract except `skip` (the compile
/// target, already generated), discarding the code: this is what populates
/// their call graphs for the permission analysis.
fn gen_all_contracts(
    extended: &ExtendedMultiContract,
    states: &mut BTreeMap<TypeId, CompilerState>,
    skip: Option<&TypeId>,
) -> Result<()> {
    for decl in &extended.multi.decls {
        let TopDecl::Contract(contract) = decl else {
            continue;
        };
        if Some(&contract.id) == skip {
            continue;
        }
        let Some(state) = states.get_mut(&contract.id) else {
            continue;
        };
        for func in &contract.funcs {
            if func.is_abstract() {
                continue;
            }
            codegen::gen_function(state, func)?;
        }
    }
    Ok(())
}

fn run_external_call_analysis(
    extended: &ExtendedMultiContract,
    contract_states: &BTreeMap<TypeId, CompilerState>,
    caller_state: &CompilerState,
) -> Result<Vec<String>> {
    let mut contracts: BTreeMap<TypeId, (&Contract, &CompilerState)> = BTreeMap::new();
    let mut interfaces: BTreeSet<TypeId> = BTreeSet::new();
    for decl in &extended.multi.decls {
        match decl {
            TopDecl::Contract(contract) => {
                if let Some(state) = contract_states.get(&contract.id) {
                    contracts.insert(contract.id.clone(), (contract, state));
                }
            }
            TopDecl::Interface(interface) => {
                interfaces.insert(interface.id.clone());
            }
            _ => {}
        }
    }
    permission::external_call_warnings(caller_state.external_calls(), &contracts, &interfaces)
}
