//! Static permission-check analysis.
//!
//! A function counts as directly checked when its `usePermissionCheck` flag
//! is off, or its body calls `checkPermission!` directly. Checks propagate
//! backward through the internal call graph, but only through private
//! callees: callers of a public function cannot be presumed covered by it.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{Contract, FuncDef, FuncId, Statement, TypeId};
use crate::builtins;
use crate::error::{CompilerError, Result};
use crate::state::CompilerState;

/// The fixed-point permission table for one contract: function name →
/// reaches-a-check.
pub fn build_permission_table(
    contract: &Contract,
    state: &CompilerState,
) -> BTreeMap<String, bool> {
    let mut table: BTreeMap<String, bool> = contract
        .funcs
        .iter()
        .map(|f| (f.id.name.clone(), false))
        .collect();
    let is_public: BTreeMap<&str, bool> = contract
        .funcs
        .iter()
        .map(|f| (f.id.name.as_str(), f.is_public))
        .collect();

    let mut callers_of: BTreeMap<&FuncId, Vec<&FuncId>> = BTreeMap::new();
    for (caller, callees) in state.internal_calls() {
        for callee in callees {
            callers_of.entry(callee).or_default().push(caller);
        }
    }

    for func in &contract.funcs {
        if has_direct_permission_check(func) {
            mark(&func.id, &is_public, &callers_of, &mut table);
        }
    }
    table
}

fn mark(
    func: &FuncId,
    is_public: &BTreeMap<&str, bool>,
    callers_of: &BTreeMap<&FuncId, Vec<&FuncId>>,
    table: &mut BTreeMap<String, bool>,
) {
    match table.get_mut(func.name.as_str()) {
        Some(checked) if !*checked => *checked = true,
        _ => return,
    }
    // Propagation continues through private functions only.
    if is_public.get(func.name.as_str()).copied().unwrap_or(true) {
        return;
    }
    if let Some(callers) = callers_of.get(func) {
        for caller in callers.clone() {
            mark(caller, is_public, callers_of, table);
        }
    }
}

fn has_direct_permission_check(func: &FuncDef) -> bool {
    if !func.use_permission_check {
        return true;
    }
    func.body
        .as_ref()
        .is_some_and(|body| statements_call_check_permission(body))
}

fn statements_call_check_permission(stmts: &[Statement]) -> bool {
    stmts.iter().any(statement_calls_check_permission)
}

fn statement_calls_check_permission(stmt: &Statement) -> bool {
    match stmt {
        Statement::FuncCall { id, .. } => {
            id.is_builtin && id.name == builtins::CHECK_PERMISSION
        }
        Statement::IfElse {
            then_branch,
            else_branch,
            ..
        } => {
            statements_call_check_permission(then_branch)
                || statements_call_check_permission(else_branch)
        }
        Statement::While { body, .. } => statements_call_check_permission(body),
        Statement::ForLoop {
            init,
            update,
            body,
            ..
        } => {
            statement_calls_check_permission(init)
                || statement_calls_check_permission(update)
                || statements_call_check_permission(body)
        }
        Statement::Loop { body, .. } => statement_calls_check_permission(body),
        _ => false,
    }
}

/// The interface-implementing rule: the first `interface_func_count`
/// functions that demand a permission check must reach one.
pub fn check_interface_permissions(
    contract: &Contract,
    state: &CompilerState,
    interface_func_count: usize,
) -> Result<()> {
    let table = build_permission_table(contract, state);
    for func in contract.funcs.iter().take(interface_func_count) {
        if func.use_permission_check && !table.get(&func.id.name).copied().unwrap_or(false) {
            return Err(CompilerError::new(format!(
                "No permission check for function: {}.{}",
                contract.id, func.id.name
            )));
        }
    }
    Ok(())
}

/// The external-call rule: every direct external callee of the target must
/// reach a check, or a warning is produced. Interface callees count as
/// always checked. Only direct callees are analysed; transitive external
/// chains are out of scope.
pub fn external_call_warnings(
    external_calls: &BTreeMap<FuncId, BTreeSet<(TypeId, FuncId)>>,
    contracts: &BTreeMap<TypeId, (&Contract, &CompilerState)>,
    interfaces: &BTreeSet<TypeId>,
) -> Result<Vec<String>> {
    let mut tables: BTreeMap<&TypeId, BTreeMap<String, bool>> = BTreeMap::new();
    let mut warnings = Vec::new();
    for callees in external_calls.values() {
        for (callee_type, callee_func) in callees {
            if interfaces.contains(callee_type) {
                continue;
            }
            let (contract, state) = contracts.get(callee_type).ok_or_else(|| {
                CompilerError::new(format!("Contract {callee_type} does not exist"))
            })?;
            let table = tables
                .entry(callee_type)
                .or_insert_with(|| build_permission_table(contract, state));
            if !table.get(&callee_func.name).copied().unwrap_or(false) {
                warnings.push(format!(
                    "No permission check for function: {callee_type}.{}, please use \
                     checkPermission!(..) in the function or its private callees",
                    callee_func.name
                ));
            }
        }
    }
    Ok(warnings)
}
