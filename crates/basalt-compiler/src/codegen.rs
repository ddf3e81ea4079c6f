//! The emission pass: bottom-up instruction generation over a checked tree.
//!
//! The stack contract: each sub-expression leaves its flattened-length cells
//! on the stack in declaration order. Stores consume cells top-down, so
//! multi-target stores run in reverse target order.

use basalt_bytecode::{Instr, Method, U256, Val};

use crate::ast::{
    ApproveAssets, AssignmentTarget, BinaryOperator, Expr, ExprKind, FuncDef, FuncId, Statement,
    TypeId, UnaryOperator, VarDeclTarget,
};
use crate::builtins;
use crate::error::{CompilerError, Result};
use crate::sema::{expr_types, loop_iteration_values};
use crate::state::{ArrayRef, ArrayRefKind, CompilerState};
use crate::types::{Type, flattened_types_len};

/// The maximum single-branch length: branch offsets are encoded in one byte.
const MAX_BRANCH_LEN: usize = 0xff;

/// Generates the method for one (non-abstract) function definition.
pub fn gen_function(state: &mut CompilerState, func: &FuncDef) -> Result<Method> {
    let body = func
        .body
        .as_ref()
        .ok_or_else(|| CompilerError::new(format!("Function {} has no body", func.id)))?;
    state.enter_function_gen(&func.id);
    let mut instrs = gen_statements(state, body)?;
    if func.rtypes.is_empty() && instrs.last() != Some(&Instr::Return) {
        instrs.push(Instr::Return);
    }
    // Usage is tracked by the load/store emission above, which unlike the
    // checking pass never short-circuits through the type cache.
    state.check_unused_local_vars(&func.id);
    let method = Method {
        is_public: func.is_public,
        use_preapproved_assets: func.use_preapproved_assets,
        use_assets_in_contract: func.use_assets_in_contract,
        args_length: flattened_types_len(
            &func.args.iter().map(|a| a.tpe.clone()).collect::<Vec<_>>(),
        ),
        locals_length: state.local_count(),
        return_length: flattened_types_len(&func.rtypes),
        instrs,
    };
    state.exit_function_gen();
    Ok(method)
}

fn gen_statements(state: &mut CompilerState, stmts: &[Statement]) -> Result<Vec<Instr>> {
    let mut instrs = Vec::new();
    for stmt in stmts {
        instrs.extend(gen_statement(state, stmt)?);
    }
    Ok(instrs)
}

fn gen_statement(state: &mut CompilerState, stmt: &Statement) -> Result<Vec<Instr>> {
    match stmt {
        Statement::VarDef { targets, value } => {
            let types = expr_types(state, value)?;
            let mut instrs = gen_expr(state, value)?;
            for (target, tpe) in targets.iter().zip(&types).rev() {
                match target {
                    VarDeclTarget::Named { ident, .. } => {
                        instrs.extend(state.gen_store_code(ident.as_str())?);
                    }
                    VarDeclTarget::Anonymous => {
                        instrs.extend(std::iter::repeat_n(Instr::Pop, tpe.flattened_len()));
                    }
                }
            }
            Ok(instrs)
        }
        Statement::Assign { targets, rhs } => {
            let mut instrs = gen_expr(state, rhs)?;
            for target in targets.iter().rev() {
                match target {
                    AssignmentTarget::Var(ident) => {
                        instrs.extend(state.gen_store_code(ident.as_str())?);
                    }
                    AssignmentTarget::ArrayElement { ident, indexes } => {
                        instrs.extend(gen_array_element_store(state, ident.as_str(), indexes)?);
                    }
                }
            }
            Ok(instrs)
        }
        Statement::FuncCall {
            id,
            approve_assets,
            args,
        } => gen_call(state, id, approve_assets, args, true),
        Statement::ContractCall {
            obj,
            id,
            approve_assets,
            args,
        } => gen_contract_call(state, obj, id, approve_assets, args, true),
        Statement::IfElse {
            condition,
            then_branch,
            else_branch,
        } => {
            let then_code = gen_statements(state, then_branch)?;
            let else_code = gen_statements(state, else_branch)?;
            gen_if_else(state, condition, then_code, else_code)
        }
        Statement::While { condition, body } => {
            let body_code = gen_statements(state, body)?;
            gen_while(state, condition, body_code)
        }
        Statement::ForLoop {
            init,
            condition,
            update,
            body,
        } => {
            state.enter_subscope();
            let mut instrs = gen_statement(state, init)?;
            // Generation order mirrors the checking pass so numbered
            // sub-scopes resolve identically; the update code is spliced
            // after the body.
            let update_code = gen_statement(state, update)?;
            let mut body_code = gen_statements(state, body)?;
            body_code.extend(update_code);
            instrs.extend(gen_while(state, condition, body_code)?);
            state.exit_subscope();
            Ok(instrs)
        }
        Statement::Loop {
            from,
            to,
            step,
            body,
        } => {
            let values = loop_iteration_values(from, to, step, state.config.loop_unrolling_limit)?;
            let mut instrs = Vec::new();
            for value in &values {
                instrs.extend(gen_statement(state, &body.substitute_placeholder(value))?);
            }
            Ok(instrs)
        }
        Statement::Return(exprs) => {
            let mut instrs = Vec::new();
            for expr in exprs {
                instrs.extend(gen_expr(state, expr)?);
            }
            instrs.push(Instr::Return);
            Ok(instrs)
        }
        Statement::EmitEvent { id, args } => {
            let index = state.event_index(id)?;
            let mut instrs = vec![Val::U256(U256::from(index)).to_const_instr()];
            let mut arg_cells = 0;
            for arg in args {
                arg_cells += flattened_types_len(&expr_types(state, arg)?);
                instrs.extend(gen_expr(state, arg)?);
            }
            let log = Instr::log(arg_cells).ok_or_else(|| {
                CompilerError::new(format!("Max 5 fields allowed for event {id}"))
            })?;
            instrs.push(log);
            Ok(instrs)
        }
    }
}

/// Whether an instruction sequence ends by leaving the method.
fn terminates(instrs: &[Instr]) -> bool {
    matches!(instrs.last(), Some(Instr::Return | Instr::Panic))
}

fn if_else_offset(len: usize) -> Result<i16> {
    if len > MAX_BRANCH_LEN {
        return Err(CompilerError::new("too many instrs for if-else branches"));
    }
    Ok(len as i16)
}

fn while_offset(len: usize) -> Result<i16> {
    if len > MAX_BRANCH_LEN {
        return Err(CompilerError::new("too many instrs for while loop"));
    }
    Ok(len as i16)
}

/// Emits the condition followed by a branch skipping `offset` instructions.
///
/// A `!e` condition inverts into `IfTrue` instead of emitting `BoolNot`.
fn gen_condition(state: &mut CompilerState, condition: &Expr, offset: i16) -> Result<Vec<Instr>> {
    if let ExprKind::UnaryOp {
        op: UnaryOperator::Not,
        expr,
    } = condition.kind()
    {
        let mut instrs = gen_expr(state, expr)?;
        instrs.push(Instr::IfTrue(offset));
        Ok(instrs)
    } else {
        let mut instrs = gen_expr(state, condition)?;
        instrs.push(Instr::IfFalse(offset));
        Ok(instrs)
    }
}

/// Offsets are computed back-to-front: the else branch is emitted first, so
/// the then branch knows how much code its trailing jump must skip.
fn gen_if_else(
    state: &mut CompilerState,
    condition: &Expr,
    then_code: Vec<Instr>,
    else_code: Vec<Instr>,
) -> Result<Vec<Instr>> {
    let mut then_block = then_code;
    if !else_code.is_empty() && !terminates(&then_block) {
        then_block.push(Instr::Jump(if_else_offset(else_code.len())?));
    }
    let mut instrs = gen_condition(state, condition, if_else_offset(then_block.len())?)?;
    instrs.extend(then_block);
    instrs.extend(else_code);
    Ok(instrs)
}

fn gen_while(
    state: &mut CompilerState,
    condition: &Expr,
    body_code: Vec<Instr>,
) -> Result<Vec<Instr>> {
    let skip = while_offset(body_code.len() + 1)?;
    let mut instrs = gen_condition(state, condition, skip)?;
    let total = instrs.len() + body_code.len() + 1;
    while_offset(total)?;
    instrs.extend(body_code);
    instrs.push(Instr::Jump(-(total as i16)));
    Ok(instrs)
}

pub fn gen_expr(state: &mut CompilerState, expr: &Expr) -> Result<Vec<Instr>> {
    match expr.kind() {
        ExprKind::Const(v) => Ok(vec![v.to_const_instr()]),
        ExprKind::Placeholder => Err(CompilerError::new(
            "Placeholder is only allowed inside a loop body",
        )),
        ExprKind::CreateArray(elems) => {
            let mut instrs = Vec::new();
            for elem in elems {
                instrs.extend(gen_expr(state, elem)?);
            }
            Ok(instrs)
        }
        ExprKind::ArrayRepeat { elem, len } => {
            // The element is emitted once per cell run; see DESIGN.md.
            let mut instrs = Vec::new();
            for _ in 0..*len {
                instrs.extend(gen_expr(state, elem)?);
            }
            Ok(instrs)
        }
        ExprKind::ArrayElement { array, indexes } => {
            gen_array_element_load(state, array, indexes)
        }
        ExprKind::Variable(ident) => state.gen_load_code(ident.as_str()),
        ExprKind::EnumField { enum_id, field } => {
            state.gen_load_code(&format!("{enum_id}.{field}"))
        }
        ExprKind::UnaryOp { op, expr } => {
            let mut instrs = gen_expr(state, expr)?;
            match op {
                UnaryOperator::Not => instrs.push(Instr::BoolNot),
            }
            Ok(instrs)
        }
        ExprKind::BinaryOp { op, left, right } => {
            let operand_type = expr_types(state, left)?;
            let mut instrs = gen_expr(state, left)?;
            instrs.extend(gen_expr(state, right)?);
            instrs.push(binary_op_instr(*op, &operand_type)?);
            Ok(instrs)
        }
        ExprKind::ContractConv { address, .. } => {
            // A contract handle is its 32-byte id; no conversion opcode.
            gen_expr(state, address)
        }
        ExprKind::Call {
            id,
            approve_assets,
            args,
        } => gen_call(state, id, approve_assets, args, false),
        ExprKind::ContractCall {
            obj,
            id,
            approve_assets,
            args,
        } => gen_contract_call(state, obj, id, approve_assets, args, false),
        ExprKind::Paren(inner) => gen_expr(state, inner),
        ExprKind::IfElse {
            condition,
            then_expr,
            else_expr,
        } => {
            let else_code = gen_expr(state, else_expr)?;
            let mut then_block = gen_expr(state, then_expr)?;
            then_block.push(Instr::Jump(if_else_offset(else_code.len())?));
            let mut instrs =
                gen_condition(state, condition, if_else_offset(then_block.len())?)?;
            instrs.extend(then_block);
            instrs.extend(else_code);
            Ok(instrs)
        }
    }
}

fn binary_op_instr(op: BinaryOperator, operand_types: &[Type]) -> Result<Instr> {
    use BinaryOperator::*;
    let tpe = match operand_types {
        [tpe] => tpe,
        _ => return Err(CompilerError::new("Expect a single value for operator")),
    };
    let instr = match (op, tpe) {
        (Add, Type::U256) => Instr::U256Add,
        (Sub, Type::U256) => Instr::U256Sub,
        (Mul, Type::U256) => Instr::U256Mul,
        (Div, Type::U256) => Instr::U256Div,
        (Mod, Type::U256) => Instr::U256Mod,
        (Eq, Type::U256) => Instr::U256Eq,
        (Neq, Type::U256) => Instr::U256Neq,
        (Lt, Type::U256) => Instr::U256Lt,
        (Le, Type::U256) => Instr::U256Le,
        (Gt, Type::U256) => Instr::U256Gt,
        (Ge, Type::U256) => Instr::U256Ge,
        (Add, Type::I256) => Instr::I256Add,
        (Sub, Type::I256) => Instr::I256Sub,
        (Mul, Type::I256) => Instr::I256Mul,
        (Div, Type::I256) => Instr::I256Div,
        (Mod, Type::I256) => Instr::I256Mod,
        (Eq, Type::I256) => Instr::I256Eq,
        (Neq, Type::I256) => Instr::I256Neq,
        (Lt, Type::I256) => Instr::I256Lt,
        (Le, Type::I256) => Instr::I256Le,
        (Gt, Type::I256) => Instr::I256Gt,
        (Ge, Type::I256) => Instr::I256Ge,
        (And, Type::Bool) => Instr::BoolAnd,
        (Or, Type::Bool) => Instr::BoolOr,
        (Eq, Type::Bool) => Instr::BoolEq,
        (Neq, Type::Bool) => Instr::BoolNeq,
        (Eq, Type::ByteVec) => Instr::ByteVecEq,
        (Neq, Type::ByteVec) => Instr::ByteVecNeq,
        (Eq, Type::Address) => Instr::AddressEq,
        (Neq, Type::Address) => Instr::AddressNeq,
        _ => {
            return Err(CompilerError::new(format!(
                "Invalid param types [{tpe}, {tpe}] for operator {op}"
            )));
        }
    };
    Ok(instr)
}

fn gen_approve_assets(state: &mut CompilerState, approvals: &[ApproveAssets]) -> Result<Vec<Instr>> {
    let mut instrs = Vec::new();
    for approval in approvals {
        if let Some(amount) = &approval.alph_amount {
            instrs.extend(gen_expr(state, &approval.address)?);
            instrs.extend(gen_expr(state, amount)?);
            instrs.push(Instr::ApproveAlph);
        }
        for (token, amount) in &approval.tokens {
            instrs.extend(gen_expr(state, &approval.address)?);
            instrs.extend(gen_expr(state, token)?);
            instrs.extend(gen_expr(state, amount)?);
            instrs.push(Instr::ApproveToken);
        }
    }
    Ok(instrs)
}

fn gen_call(
    state: &mut CompilerState,
    id: &FuncId,
    approve_assets: &[ApproveAssets],
    args: &[Expr],
    is_statement: bool,
) -> Result<Vec<Instr>> {
    let mut instrs = gen_approve_assets(state, approve_assets)?;
    let mut arg_cells = 0;
    for arg in args {
        arg_cells += flattened_types_len(&expr_types(state, arg)?);
        instrs.extend(gen_expr(state, arg)?);
    }
    let return_cells;
    if id.is_builtin {
        let builtin = builtins::lookup(&id.name).ok_or_else(|| {
            CompilerError::new(format!("Built-in function {id} does not exist"))
        })?;
        if builtin.is_variadic {
            instrs.push(Val::U256(U256::from(arg_cells)).to_const_instr());
        }
        instrs.extend(builtin.instrs.iter().cloned());
        return_cells = flattened_types_len(builtin.rtypes);
    } else {
        let func = state.get_func(id)?;
        state.add_internal_call(id.clone());
        instrs.push(Instr::CallLocal(func.index));
        return_cells = flattened_types_len(&func.rtypes);
    }
    if is_statement {
        instrs.extend(std::iter::repeat_n(Instr::Pop, return_cells));
    }
    Ok(instrs)
}

fn gen_contract_call(
    state: &mut CompilerState,
    obj: &Expr,
    id: &FuncId,
    approve_assets: &[ApproveAssets],
    args: &[Expr],
    is_statement: bool,
) -> Result<Vec<Instr>> {
    let contract_id = contract_type_of(state, obj, id)?;
    let func = state.registry().get(&contract_id)?.func(id).cloned().ok_or_else(|| {
        CompilerError::new(format!("Function {contract_id}.{id} does not exist"))
    })?;

    let mut instrs = gen_approve_assets(state, approve_assets)?;
    let mut arg_cells = 0;
    for arg in args {
        arg_cells += flattened_types_len(&expr_types(state, arg)?);
        instrs.extend(gen_expr(state, arg)?);
    }
    let return_cells = flattened_types_len(&func.rtypes);
    state.add_external_call(contract_id, id.clone());
    instrs.push(Val::U256(U256::from(arg_cells)).to_const_instr());
    instrs.push(Val::U256(U256::from(return_cells)).to_const_instr());
    instrs.extend(gen_expr(state, obj)?);
    instrs.push(Instr::CallExternal(func.index));
    if is_statement {
        instrs.extend(std::iter::repeat_n(Instr::Pop, return_cells));
    }
    Ok(instrs)
}

fn contract_type_of(state: &mut CompilerState, obj: &Expr, id: &FuncId) -> Result<TypeId> {
    match expr_types(state, obj)?.as_slice() {
        [Type::Contract(contract_id)] => Ok(contract_id.clone()),
        _ => Err(CompilerError::new(format!(
            "Expect contract for {id} of {obj}"
        ))),
    }
}

// ---- array addressing ----

/// One dynamic index: the code computing it and the stride it scales by.
struct DynTerm {
    code: Vec<Instr>,
    stride: usize,
}

/// The flat offset of an index path: folded constant part plus dynamic
/// terms. Constant indices are range-checked as they fold.
struct FlatOffset {
    constant: usize,
    dynamic: Vec<DynTerm>,
    selected: Type,
}

fn flatten_indexes(
    state: &mut CompilerState,
    array_type: &Type,
    indexes: &[Expr],
) -> Result<FlatOffset> {
    let mut constant = 0usize;
    let mut dynamic = Vec::new();
    let mut current = array_type.clone();
    for index in indexes {
        let (elem, size) = match &current {
            Type::FixedSizeArray { elem, size } => ((**elem).clone(), *size),
            _ => {
                return Err(CompilerError::new(format!(
                    "expect array type, have {current}"
                )));
            }
        };
        let stride = elem.flattened_len();
        if let ExprKind::Const(Val::U256(v)) = index.kind() {
            let v = v
                .to_usize()
                .filter(|v| *v < size)
                .ok_or_else(|| CompilerError::new(format!("Invalid array index {v}")))?;
            constant += v * stride;
        } else {
            let index_types = expr_types(state, index)?;
            if index_types != [Type::U256] {
                return Err(CompilerError::new(format!(
                    "Invalid array index type: {}",
                    crate::types::format_types(&index_types)
                )));
            }
            dynamic.push(DynTerm {
                code: gen_expr(state, index)?,
                stride,
            });
        }
        current = elem;
    }
    Ok(FlatOffset {
        constant,
        dynamic,
        selected: current,
    })
}

/// Emits the runtime `U256` offset `constant + Σ index_i * stride_i`.
fn gen_dynamic_offset(constant: usize, dynamic: Vec<DynTerm>) -> Vec<Instr> {
    let mut instrs = Vec::new();
    let mut terms = 0;
    for term in dynamic {
        instrs.extend(term.code);
        if term.stride != 1 {
            instrs.push(Val::U256(U256::from(term.stride)).to_const_instr());
            instrs.push(Instr::U256Mul);
        }
        terms += 1;
        if terms > 1 {
            instrs.push(Instr::U256Add);
        }
    }
    if constant != 0 {
        instrs.push(Val::U256(U256::from(constant)).to_const_instr());
        instrs.push(Instr::U256Add);
    }
    instrs
}

/// Resolves the array ref an expression addresses, materialising a
/// temporary local run when the expression is not a plain variable.
fn resolve_array_ref(
    state: &mut CompilerState,
    array: &Expr,
) -> Result<(ArrayRef, Vec<Instr>)> {
    if let ExprKind::Variable(ident) = array.kind() {
        return Ok((state.get_array_ref(ident.as_str())?, Vec::new()));
    }
    let types = expr_types(state, array)?;
    let tpe = match types.as_slice() {
        [tpe @ Type::FixedSizeArray { .. }] => tpe.clone(),
        _ => {
            return Err(CompilerError::new(format!(
                "expect array type, have {}",
                crate::types::format_types(&types)
            )));
        }
    };
    let mut instrs = gen_expr(state, array)?;
    let array_ref = state.create_array_ref(tpe)?;
    let ArrayRefKind::Local { base } = array_ref.kind else {
        unreachable!("temporaries are always local");
    };
    let cells = array_ref.tpe.flattened_len();
    for cell in (0..cells).rev() {
        instrs.push(Instr::StoreLocal(base + cell as u8));
    }
    Ok((array_ref, instrs))
}

fn gen_array_element_load(
    state: &mut CompilerState,
    array: &Expr,
    indexes: &[Expr],
) -> Result<Vec<Instr>> {
    let (array_ref, mut instrs) = resolve_array_ref(state, array)?;
    let offset = flatten_indexes(state, &array_ref.tpe, indexes)?;
    let cells = offset.selected.flattened_len();
    let base = array_ref.kind;

    if offset.dynamic.is_empty() {
        for cell in 0..cells {
            instrs.push(load_cell(base, offset.constant + cell)?);
        }
        return Ok(instrs);
    }

    let by_index = load_by_index(base)?;
    let offset_code = gen_dynamic_offset(offset.constant, offset.dynamic);
    if cells == 1 {
        instrs.extend(offset_code);
        instrs.extend(add_base(base));
        instrs.push(by_index);
    } else {
        // A dynamically addressed sub-array: stash the offset, then load each
        // cell at offset + k.
        let temp = state.add_generated_local(Type::U256)?;
        instrs.extend(offset_code);
        instrs.push(Instr::StoreLocal(temp));
        for cell in 0..cells {
            instrs.push(Instr::LoadLocal(temp));
            if cell != 0 {
                instrs.push(Val::U256(U256::from(cell)).to_const_instr());
                instrs.push(Instr::U256Add);
            }
            instrs.extend(add_base(base));
            instrs.push(by_index.clone());
        }
    }
    Ok(instrs)
}

fn gen_array_element_store(
    state: &mut CompilerState,
    ident: &str,
    indexes: &[Expr],
) -> Result<Vec<Instr>> {
    let array_ref = state.get_array_ref(ident)?;
    let offset = flatten_indexes(state, &array_ref.tpe, indexes)?;
    let cells = offset.selected.flattened_len();
    let base = array_ref.kind;

    let mut instrs = Vec::new();
    if offset.dynamic.is_empty() {
        for cell in (0..cells).rev() {
            instrs.push(store_cell(base, offset.constant + cell, ident)?);
        }
        return Ok(instrs);
    }

    let by_index = store_by_index(base, ident)?;
    let offset_code = gen_dynamic_offset(offset.constant, offset.dynamic);
    if cells == 1 {
        instrs.extend(offset_code);
        instrs.extend(add_base(base));
        instrs.push(by_index);
    } else {
        let temp = state.add_generated_local(Type::U256)?;
        instrs.extend(offset_code);
        instrs.push(Instr::StoreLocal(temp));
        for cell in (0..cells).rev() {
            instrs.push(Instr::LoadLocal(temp));
            if cell != 0 {
                instrs.push(Val::U256(U256::from(cell)).to_const_instr());
                instrs.push(Instr::U256Add);
            }
            instrs.extend(add_base(base));
            instrs.push(by_index.clone());
        }
    }
    Ok(instrs)
}

fn cell_index(base: u8, offset: usize) -> Result<u8> {
    let index = usize::from(base) + offset;
    u8::try_from(index)
        .map_err(|_| CompilerError::new(format!("array cell index {index} out of range")))
}

fn load_cell(base: ArrayRefKind, offset: usize) -> Result<Instr> {
    match base {
        ArrayRefKind::Local { base } => Ok(Instr::LoadLocal(cell_index(base, offset)?)),
        ArrayRefKind::Field { base } => Ok(Instr::LoadField(cell_index(base, offset)?)),
        ArrayRefKind::Template { base } => Ok(Instr::LoadImmField(cell_index(base, offset)?)),
    }
}

fn store_cell(base: ArrayRefKind, offset: usize, ident: &str) -> Result<Instr> {
    match base {
        ArrayRefKind::Local { base } => Ok(Instr::StoreLocal(cell_index(base, offset)?)),
        ArrayRefKind::Field { base } => Ok(Instr::StoreField(cell_index(base, offset)?)),
        ArrayRefKind::Template { .. } => Err(CompilerError::new(format!(
            "Assign to immutable variable: {ident}"
        ))),
    }
}

/// The constant-add folding the ref's base slot into a runtime offset.
fn add_base(base: ArrayRefKind) -> Vec<Instr> {
    let base = match base {
        ArrayRefKind::Local { base } => base,
        ArrayRefKind::Field { base } => base,
        ArrayRefKind::Template { base } => base,
    };
    if base == 0 {
        Vec::new()
    } else {
        vec![
            Val::U256(U256::from(usize::from(base))).to_const_instr(),
            Instr::U256Add,
        ]
    }
}

fn load_by_index(base: ArrayRefKind) -> Result<Instr> {
    match base {
        ArrayRefKind::Local { .. } => Ok(Instr::LoadLocalByIndex),
        ArrayRefKind::Field { .. } => Ok(Instr::LoadFieldByIndex),
        ArrayRefKind::Template { .. } => Err(CompilerError::new(
            "Invalid dynamic array index on template variable",
        )),
    }
}

fn store_by_index(base: ArrayRefKind, ident: &str) -> Result<Instr> {
    match base {
        ArrayRefKind::Local { .. } => Ok(Instr::StoreLocalByIndex),
        ArrayRefKind::Field { .. } => Ok(Instr::StoreFieldByIndex),
        ArrayRefKind::Template { .. } => Err(CompilerError::new(format!(
            "Assign to immutable variable: {ident}"
        ))),
    }
}
