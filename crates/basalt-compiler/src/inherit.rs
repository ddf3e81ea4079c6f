//! Inheritance resolution for a `MultiContract`.
//!
//! Parents are merged ancestor-first: interface functions (stable-sorted by
//! ancestor count, fewest first), then parent-contract functions, then the
//! declaration's own. Implementations replace inherited abstract
//! declarations in place, so interface method indices are preserved.

use std::collections::BTreeMap;

use crate::ast::{
    Contract, ContractInterface, FuncDef, Inheritance, MultiContract, TopDecl, TypeId,
};
use crate::error::{CompilerError, Result};
use crate::types::ContractKind;

/// The result of inheritance expansion.
pub struct ExtendedMultiContract {
    pub multi: MultiContract,
    /// Per contract: how many leading functions were inherited from
    /// interfaces. Drives the permission analyser's interface rule.
    pub interface_func_counts: BTreeMap<TypeId, usize>,
}

/// Expands every contract and interface with its inherited members.
pub fn extend_multi_contract(multi: &MultiContract) -> Result<ExtendedMultiContract> {
    let mut by_id: BTreeMap<&TypeId, &TopDecl> = BTreeMap::new();
    for decl in &multi.decls {
        if by_id.insert(decl.id(), decl).is_some() {
            return Err(CompilerError::new(format!(
                "These contracts are defined multiple times: {}",
                decl.id()
            )));
        }
    }

    let mut ancestor_cache: BTreeMap<TypeId, Vec<TypeId>> = BTreeMap::new();
    for decl in &multi.decls {
        match decl {
            TopDecl::Contract(_) | TopDecl::Interface(_) => {
                collect_ancestors(decl.id(), &by_id, &mut Vec::new(), &mut ancestor_cache)?;
            }
            _ => {}
        }
    }

    let mut decls = Vec::with_capacity(multi.decls.len());
    let mut interface_func_counts = BTreeMap::new();
    for decl in &multi.decls {
        let expanded = match decl {
            TopDecl::Contract(contract) => {
                let (expanded, interface_funcs) =
                    expand_contract(contract, &by_id, &ancestor_cache)?;
                interface_func_counts.insert(contract.id.clone(), interface_funcs);
                TopDecl::Contract(expanded)
            }
            TopDecl::Interface(interface) => {
                TopDecl::Interface(expand_interface(interface, &by_id, &ancestor_cache)?)
            }
            other => other.clone(),
        };
        decls.push(expanded);
    }

    Ok(ExtendedMultiContract {
        multi: MultiContract::new(decls),
        interface_func_counts,
    })
}

fn direct_parents(decl: &TopDecl) -> Vec<&TypeId> {
    match decl {
        TopDecl::Contract(contract) => {
            contract.inheritances.iter().map(Inheritance::parent).collect()
        }
        TopDecl::Interface(interface) => {
            interface.inheritances.iter().map(|i| &i.parent).collect()
        }
        _ => Vec::new(),
    }
}

/// Depth-first ancestor collection, deduplicated in first-visit order. The
/// traversal path doubles as the cycle detector.
fn collect_ancestors(
    id: &TypeId,
    by_id: &BTreeMap<&TypeId, &TopDecl>,
    path: &mut Vec<TypeId>,
    cache: &mut BTreeMap<TypeId, Vec<TypeId>>,
) -> Result<Vec<TypeId>> {
    if let Some(ancestors) = cache.get(id) {
        return Ok(ancestors.clone());
    }
    if path.contains(id) {
        return Err(CompilerError::new(format!(
            "Cyclic inheritance detected for contract {id}"
        )));
    }
    let decl = by_id
        .get(id)
        .ok_or_else(|| CompilerError::new(format!("Contract {id} does not exist")))?;
    check_inheritance_kinds(decl, by_id)?;

    path.push(id.clone());
    let mut ancestors: Vec<TypeId> = Vec::new();
    for parent in direct_parents(decl) {
        if !ancestors.contains(parent) {
            ancestors.push(parent.clone());
        }
        for ancestor in collect_ancestors(parent, by_id, path, cache)? {
            if !ancestors.contains(&ancestor) {
                ancestors.push(ancestor);
            }
        }
    }
    path.pop();
    cache.insert(id.clone(), ancestors.clone());
    Ok(ancestors)
}

fn check_inheritance_kinds(decl: &TopDecl, by_id: &BTreeMap<&TypeId, &TopDecl>) -> Result<()> {
    match decl {
        TopDecl::Contract(contract) => {
            for inheritance in &contract.inheritances {
                let parent_id = inheritance.parent();
                let parent = by_id.get(parent_id).ok_or_else(|| {
                    CompilerError::new(format!("Contract {parent_id} does not exist"))
                })?;
                if !parent.kind().is_inheritable() {
                    return Err(CompilerError::new(format!(
                        "{} {parent_id} can not be inherited",
                        parent.kind()
                    )));
                }
                match inheritance {
                    Inheritance::Contract(inh) => {
                        if parent.kind() != ContractKind::AbstractContract {
                            return Err(CompilerError::new(format!(
                                "Contract {} can only extend abstract contracts, {parent_id} is a {}",
                                contract.id,
                                parent.kind()
                            )));
                        }
                        check_inherited_fields(contract, parent.as_contract().expect("abstract"), &inh.fields)?;
                    }
                    Inheritance::Interface(_) => {
                        if parent.kind() != ContractKind::Interface {
                            return Err(CompilerError::new(format!(
                                "Contract {} can only implement interfaces, {parent_id} is a {}",
                                contract.id,
                                parent.kind()
                            )));
                        }
                    }
                }
            }
        }
        TopDecl::Interface(interface) => {
            for inheritance in &interface.inheritances {
                let parent_id = &inheritance.parent;
                let parent = by_id.get(parent_id).ok_or_else(|| {
                    CompilerError::new(format!("Contract {parent_id} does not exist"))
                })?;
                if parent.kind() != ContractKind::Interface {
                    return Err(CompilerError::new(format!(
                        "Interface {} can only inherit from interfaces, {parent_id} is a {}",
                        interface.id,
                        parent.kind()
                    )));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// The idents a child forwards must name child fields matching the parent's
/// field layout in type, mutability, and order.
fn check_inherited_fields(child: &Contract, parent: &Contract, idents: &[crate::ast::Ident]) -> Result<()> {
    let mismatch = || {
        CompilerError::new(format!(
            "Invalid contract inheritance fields for contract {}, parent {}",
            child.id, parent.id
        ))
    };
    if idents.len() != parent.fields.len() {
        return Err(mismatch());
    }
    for (ident, parent_field) in idents.iter().zip(&parent.fields) {
        let child_field = child
            .fields
            .iter()
            .find(|f| f.ident == *ident)
            .ok_or_else(mismatch)?;
        if child_field.tpe != parent_field.tpe || child_field.is_mutable != parent_field.is_mutable
        {
            return Err(mismatch());
        }
    }
    Ok(())
}

/// Interface ancestors in merge order: stable-sorted by ancestor count,
/// fewest first.
fn sorted_interface_ancestors<'a>(
    ancestors: &[TypeId],
    by_id: &BTreeMap<&TypeId, &'a TopDecl>,
    cache: &BTreeMap<TypeId, Vec<TypeId>>,
) -> Vec<&'a ContractInterface> {
    let mut interfaces: Vec<&TypeId> = ancestors
        .iter()
        .filter(|id| by_id.get(id).and_then(|d| d.as_interface()).is_some())
        .collect();
    interfaces.sort_by_key(|id| cache.get(*id).map_or(0, Vec::len));
    interfaces
        .iter()
        .map(|id| by_id[*id].as_interface().expect("interface ancestor"))
        .collect()
}

fn contract_ancestors<'a>(
    ancestors: &[TypeId],
    by_id: &BTreeMap<&TypeId, &'a TopDecl>,
) -> Vec<&'a Contract> {
    ancestors
        .iter()
        .filter_map(|id| by_id.get(id).and_then(|d| d.as_contract()))
        .collect()
}

fn expand_contract(
    contract: &Contract,
    by_id: &BTreeMap<&TypeId, &TopDecl>,
    cache: &BTreeMap<TypeId, Vec<TypeId>>,
) -> Result<(Contract, usize)> {
    let ancestors = cache.get(&contract.id).cloned().unwrap_or_default();
    let interfaces = sorted_interface_ancestors(&ancestors, by_id, cache);
    let parents = contract_ancestors(&ancestors, by_id);

    let mut funcs: Vec<FuncDef> = Vec::new();
    let mut interface_funcs = 0;
    for interface in &interfaces {
        interface_funcs += interface.funcs.len();
        funcs.extend(interface.funcs.iter().cloned());
    }
    for parent in &parents {
        funcs.extend(parent.funcs.iter().cloned());
    }
    funcs.extend(contract.funcs.iter().cloned());
    let funcs = merge_funcs(funcs)?;

    if !contract.is_abstract {
        let unimplemented: Vec<&str> = funcs
            .iter()
            .filter(|f| f.is_abstract())
            .map(FuncDef::name)
            .collect();
        if !unimplemented.is_empty() {
            return Err(CompilerError::new(format!(
                "Contract {} has unimplemented methods: {}",
                contract.id,
                unimplemented.join(", ")
            )));
        }
    }

    let mut events = Vec::new();
    for interface in &interfaces {
        events.extend(interface.events.iter().cloned());
    }
    for parent in &parents {
        events.extend(parent.events.iter().cloned());
    }
    events.extend(contract.events.iter().cloned());

    let mut constants = Vec::new();
    let mut enums = Vec::new();
    for parent in &parents {
        constants.extend(parent.constants.iter().cloned());
        enums.extend(parent.enums.iter().cloned());
    }
    constants.extend(contract.constants.iter().cloned());
    enums.extend(contract.enums.iter().cloned());

    let expanded = Contract {
        is_abstract: contract.is_abstract,
        id: contract.id.clone(),
        template_vars: contract.template_vars.clone(),
        fields: contract.fields.clone(),
        funcs,
        events,
        constants,
        enums,
        inheritances: contract.inheritances.clone(),
    };
    Ok((expanded, interface_funcs))
}

fn expand_interface(
    interface: &ContractInterface,
    by_id: &BTreeMap<&TypeId, &TopDecl>,
    cache: &BTreeMap<TypeId, Vec<TypeId>>,
) -> Result<ContractInterface> {
    let implemented: Vec<&str> = interface
        .funcs
        .iter()
        .filter(|f| !f.is_abstract())
        .map(FuncDef::name)
        .collect();
    if !implemented.is_empty() {
        return Err(CompilerError::new(format!(
            "Interface {} has implemented methods: {}",
            interface.id,
            implemented.join(", ")
        )));
    }

    let ancestors = cache.get(&interface.id).cloned().unwrap_or_default();
    let parents = sorted_interface_ancestors(&ancestors, by_id, cache);

    let mut funcs: Vec<FuncDef> = Vec::new();
    let mut events = Vec::new();
    for parent in &parents {
        funcs.extend(parent.funcs.iter().cloned());
        events.extend(parent.events.iter().cloned());
    }
    funcs.extend(interface.funcs.iter().cloned());
    events.extend(interface.events.iter().cloned());
    let funcs = merge_funcs(funcs)?;

    Ok(ContractInterface {
        id: interface.id.clone(),
        funcs,
        events,
        inheritances: interface.inheritances.clone(),
    })
}

/// Merges abstract declarations with implementations by name. The
/// implementation lands at the abstract declaration's position; duplicate
/// abstracts or duplicate implementations are errors.
fn merge_funcs(funcs: Vec<FuncDef>) -> Result<Vec<FuncDef>> {
    let mut merged: Vec<FuncDef> = Vec::with_capacity(funcs.len());
    for func in funcs {
        let Some(position) = merged.iter().position(|f| f.id == func.id) else {
            merged.push(func);
            continue;
        };
        let existing = &merged[position];
        if existing.is_abstract() == func.is_abstract() {
            return Err(CompilerError::new(format!(
                "These functions are defined multiple times: {}",
                func.name()
            )));
        }
        if !existing.has_same_signature(&func) {
            return Err(CompilerError::new(format!(
                "Function {} is implemented with wrong signature",
                func.name()
            )));
        }
        if existing.is_abstract() {
            merged[position] = func;
        }
    }
    Ok(merged)
}
