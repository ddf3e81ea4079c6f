//! The checking pass: declaration registration, expression typing with
//! memoisation, statement checking, and usage warnings.
//!
//! Runs before code generation; the emission pass reuses the slot layout and
//! memoised types this pass leaves in the state and on the tree.

use basalt_bytecode::{U256, Val};
use num_bigint::{BigInt, BigUint};
use num_traits::{Signed, ToPrimitive, Zero};

use crate::ast::{
    Annotation, ApproveAssets, Argument, Expr, ExprKind, FuncDef, FuncId, Statement, TopDecl,
    UnaryOperator, VarDeclTarget,
};
use crate::builtins;
use crate::error::{CompilerError, Result};
use crate::state::CompilerState;
use crate::types::{Type, format_types};

const ANNOTATION_USING: &str = "using";
const ANNOTATION_FIELDS: &[&str] = &["preapprovedAssets", "assetsInContract", "permissionCheck"];

/// Checks one top-level declaration, registering its symbols in `state`.
pub fn check_top_decl(state: &mut CompilerState, decl: &TopDecl) -> Result<()> {
    match decl {
        TopDecl::AssetScript(script) => {
            register_template_vars(state, &script.template_vars)?;
            check_funcs(state, &script.funcs)?;
        }
        TopDecl::TxScript(script) => {
            register_template_vars(state, &script.template_vars)?;
            check_funcs(state, &script.funcs)?;
        }
        TopDecl::Contract(contract) => {
            register_template_vars(state, &contract.template_vars)?;
            for field in &contract.fields {
                check_type_defined(state, &field.tpe)?;
                state.add_field_variable(
                    &field.ident,
                    field.tpe.clone(),
                    field.is_mutable,
                    field.is_unused,
                )?;
            }
            for constant in &contract.constants {
                state.add_constant_variable(constant.ident.as_str(), &constant.value)?;
            }
            for enum_def in &contract.enums {
                for field in &enum_def.fields {
                    let name = format!("{}.{}", enum_def.id, field.ident);
                    state.add_constant_variable(&name, &field.value)?;
                }
            }
            for event in &contract.events {
                state.add_event_def(event)?;
            }
            check_funcs(state, &contract.funcs)?;
        }
        TopDecl::Interface(_) => {}
    }
    Ok(())
}

fn register_template_vars(state: &mut CompilerState, template_vars: &[Argument]) -> Result<()> {
    for var in template_vars {
        check_type_defined(state, &var.tpe)?;
        state.add_template_variable(&var.ident, var.tpe.clone())?;
    }
    Ok(())
}

fn check_funcs(state: &mut CompilerState, funcs: &[FuncDef]) -> Result<()> {
    for func in funcs {
        check_annotations(&func.annotations)?;
        check_function(state, func)?;
    }
    Ok(())
}

fn check_annotations(annotations: &[Annotation]) -> Result<()> {
    for annotation in annotations {
        if annotation.id.as_str() != ANNOTATION_USING {
            return Err(CompilerError::new(format!(
                "Invalid annotation id: {}",
                annotation.id
            )));
        }
        for field in &annotation.fields {
            if !ANNOTATION_FIELDS.contains(&field.ident.as_str()) {
                return Err(CompilerError::new(format!(
                    "Invalid annotation field: {}",
                    field.ident
                )));
            }
        }
    }
    Ok(())
}

fn check_function(state: &mut CompilerState, func: &FuncDef) -> Result<()> {
    for tpe in &func.rtypes {
        check_type_defined(state, tpe)?;
    }
    let Some(body) = &func.body else {
        // Abstract functions have nothing to check beyond their signature.
        for arg in &func.args {
            check_type_defined(state, &arg.tpe)?;
        }
        return Ok(());
    };

    state.enter_function_check(&func.id);
    for arg in &func.args {
        check_type_defined(state, &arg.tpe)?;
        state.add_local_variable(&arg.ident, arg.tpe.clone(), arg.is_mutable, arg.is_unused)?;
    }
    check_statements(state, body)?;
    if !func.rtypes.is_empty() && !statements_terminate(body) {
        return Err(CompilerError::new(format!(
            "Expect return statement for function {}",
            func.id
        )));
    }
    state.exit_function_check(&func.id);
    Ok(())
}

fn check_type_defined(state: &CompilerState, tpe: &Type) -> Result<()> {
    match tpe {
        Type::FixedSizeArray { elem, .. } => check_type_defined(state, elem),
        Type::Contract(id) => state.registry().get(id).map(|_| ()),
        _ => Ok(()),
    }
}

/// Whether every control path through `stmts` ends in `return` or a call to
/// a terminating built-in.
pub fn statements_terminate(stmts: &[Statement]) -> bool {
    match stmts.last() {
        None => false,
        Some(Statement::Return(_)) => true,
        Some(Statement::FuncCall { id, .. }) => {
            id.is_builtin
                && builtins::lookup(&id.name).is_some_and(|b| b.terminates_control_flow)
        }
        Some(Statement::IfElse {
            then_branch,
            else_branch,
            ..
        }) => statements_terminate(then_branch) && statements_terminate(else_branch),
        Some(_) => false,
    }
}

pub fn check_statements(state: &mut CompilerState, stmts: &[Statement]) -> Result<()> {
    for stmt in stmts {
        check_statement(state, stmt)?;
    }
    Ok(())
}

fn check_statement(state: &mut CompilerState, stmt: &Statement) -> Result<()> {
    match stmt {
        Statement::VarDef { targets, value } => {
            let types = expr_types(state, value)?;
            if types.len() != targets.len() {
                return Err(CompilerError::new(format!(
                    "Invalid variable declaration, expect {} values, have {}",
                    targets.len(),
                    types.len()
                )));
            }
            for (target, tpe) in targets.iter().zip(types) {
                match target {
                    VarDeclTarget::Named {
                        is_mutable,
                        is_unused,
                        ident,
                    } => {
                        state.add_local_variable(ident, tpe, *is_mutable, *is_unused)?;
                    }
                    VarDeclTarget::Anonymous => {}
                }
            }
            Ok(())
        }
        Statement::Assign { targets, rhs } => {
            let rhs_types = expr_types(state, rhs)?;
            // Targets are checked in store order (reverse), matching the
            // order the emission pass consumes stack cells.
            let mut target_types = vec![Type::Bool; targets.len()];
            for (position, target) in targets.iter().enumerate().rev() {
                target_types[position] = check_assignment_target(state, target)?;
            }
            if rhs_types != target_types {
                return Err(CompilerError::new(format!(
                    "Assign {} to {}",
                    format_types(&rhs_types),
                    format_types(&target_types)
                )));
            }
            Ok(())
        }
        Statement::FuncCall {
            id,
            approve_assets,
            args,
        } => type_call(state, id, approve_assets, args).map(|_| ()),
        Statement::ContractCall {
            obj,
            id,
            approve_assets,
            args,
        } => type_contract_call(state, obj, id, approve_assets, args).map(|_| ()),
        Statement::IfElse {
            condition,
            then_branch,
            else_branch,
        } => {
            check_condition(state, condition)?;
            check_statements(state, then_branch)?;
            check_statements(state, else_branch)
        }
        Statement::While { condition, body } => {
            check_condition(state, condition)?;
            check_statements(state, body)
        }
        Statement::ForLoop {
            init,
            condition,
            update,
            body,
        } => {
            state.enter_subscope();
            check_statement(state, init)?;
            check_condition(state, condition)?;
            check_statement(state, update)?;
            check_statements(state, body)?;
            state.exit_subscope();
            Ok(())
        }
        Statement::Loop {
            from,
            to,
            step,
            body,
        } => {
            check_loop_body_shape(body)?;
            let values = loop_iteration_values(from, to, step, state.config.loop_unrolling_limit)?;
            if let Some(first) = values.first() {
                check_statement(state, &body.substitute_placeholder(first))?;
            }
            Ok(())
        }
        Statement::Return(exprs) => {
            let func = state
                .current_func()
                .cloned()
                .expect("return outside function");
            let expect = state.get_func(&func)?.rtypes;
            let mut have = Vec::new();
            for expr in exprs {
                have.extend(expr_types(state, expr)?);
            }
            if have != expect {
                return Err(CompilerError::new(format!(
                    "Invalid return types, expect {}, have {}",
                    format_types(&expect),
                    format_types(&have)
                )));
            }
            Ok(())
        }
        Statement::EmitEvent { id, args } => {
            if !state.kind.is_stateful() {
                return Err(CompilerError::new(format!(
                    "Event emission is not allowed in stateless scripts: {id}"
                )));
            }
            let field_types: Vec<Type> = state
                .event_def(id)?
                .fields
                .iter()
                .map(|f| f.tpe.clone())
                .collect();
            let mut have = Vec::new();
            for arg in args {
                have.extend(expr_types(state, arg)?);
            }
            if have != field_types {
                return Err(CompilerError::new(format!(
                    "Invalid args type for event {id}, expect {}, have {}",
                    format_types(&field_types),
                    format_types(&have)
                )));
            }
            Ok(())
        }
    }
}

fn check_condition(state: &mut CompilerState, condition: &Expr) -> Result<()> {
    let types = expr_types(state, condition)?;
    if types != [Type::Bool] {
        return Err(CompilerError::new(format!(
            "Invalid type of condition expr: {}",
            format_types(&types)
        )));
    }
    Ok(())
}

/// Resolves an assignment target to its type, enforcing mutability.
fn check_assignment_target(
    state: &mut CompilerState,
    target: &crate::ast::AssignmentTarget,
) -> Result<Type> {
    use crate::ast::AssignmentTarget;
    match target {
        AssignmentTarget::Var(ident) => {
            let info = state.get_variable(ident.as_str())?;
            if !info.is_mutable {
                return Err(CompilerError::new(format!(
                    "Assign to immutable variable: {ident}"
                )));
            }
            Ok(info.tpe)
        }
        AssignmentTarget::ArrayElement { ident, indexes } => {
            let info = state.get_variable(ident.as_str())?;
            if !info.is_mutable {
                return Err(CompilerError::new(format!(
                    "Assign to immutable variable: {ident}"
                )));
            }
            check_array_indexes(state, &info.tpe, indexes)
        }
    }
}

/// Checks an index path against an array type, returning the selected
/// element (or sub-array) type. Constant indices are range-checked here.
pub fn check_array_indexes(
    state: &mut CompilerState,
    array_type: &Type,
    indexes: &[Expr],
) -> Result<Type> {
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
        let index_types = expr_types(state, index)?;
        if index_types != [Type::U256] {
            return Err(CompilerError::new(format!(
                "Invalid array index type: {}",
                format_types(&index_types)
            )));
        }
        if let ExprKind::Const(Val::U256(v)) = index.kind() {
            if v.to_usize().is_none_or(|v| v >= size) {
                return Err(CompilerError::new(format!("Invalid array index {v}")));
            }
        }
        current = elem;
    }
    Ok(current)
}

/// Types an expression, memoising the result on the node.
pub fn expr_types(state: &mut CompilerState, expr: &Expr) -> Result<Vec<Type>> {
    if let Some(types) = expr.cached_type() {
        return Ok(types.to_vec());
    }
    let types = compute_expr_types(state, expr)?;
    Ok(expr.memoise_type(types).to_vec())
}

fn single_type(state: &mut CompilerState, expr: &Expr) -> Result<Type> {
    let types = expr_types(state, expr)?;
    match <[Type; 1]>::try_from(types) {
        Ok([tpe]) => Ok(tpe),
        Err(types) => Err(CompilerError::new(format!(
            "Expect a single value, have {}",
            format_types(&types)
        ))),
    }
}

fn compute_expr_types(state: &mut CompilerState, expr: &Expr) -> Result<Vec<Type>> {
    match expr.kind() {
        ExprKind::Const(v) => Ok(vec![Type::from_val(v)]),
        ExprKind::Placeholder => Err(CompilerError::new(
            "Placeholder is only allowed inside a loop body",
        )),
        ExprKind::CreateArray(elems) => {
            if elems.is_empty() {
                return Err(CompilerError::new("Array literal should not be empty"));
            }
            let elem_type = single_type(state, &elems[0])?;
            for elem in &elems[1..] {
                if single_type(state, elem)? != elem_type {
                    return Err(CompilerError::new("Array elements should have same type"));
                }
            }
            Ok(vec![Type::array(elem_type, elems.len())])
        }
        ExprKind::ArrayRepeat { elem, len } => {
            if *len == 0 {
                return Err(CompilerError::new("Array size should be positive"));
            }
            let elem_type = single_type(state, elem)?;
            Ok(vec![Type::array(elem_type, *len)])
        }
        ExprKind::ArrayElement { array, indexes } => {
            let array_type = single_type(state, array)?;
            let selected = check_array_indexes(state, &array_type, indexes)?;
            Ok(vec![selected])
        }
        ExprKind::Variable(ident) => Ok(vec![state.get_variable(ident.as_str())?.tpe]),
        ExprKind::EnumField { enum_id, field } => {
            let name = format!("{enum_id}.{field}");
            Ok(vec![state.get_variable(&name)?.tpe])
        }
        ExprKind::UnaryOp { op, expr } => {
            let tpe = single_type(state, expr)?;
            match op {
                UnaryOperator::Not if tpe == Type::Bool => Ok(vec![Type::Bool]),
                UnaryOperator::Not => Err(CompilerError::new(format!(
                    "Invalid param types [{tpe}] for operator {op}"
                ))),
            }
        }
        ExprKind::BinaryOp { op, left, right } => {
            let left_type = single_type(state, left)?;
            let right_type = single_type(state, right)?;
            let invalid = || {
                CompilerError::new(format!(
                    "Invalid param types [{left_type}, {right_type}] for operator {op}"
                ))
            };
            if op.is_arithmetic() {
                if left_type == right_type && left_type.is_integer() {
                    Ok(vec![left_type])
                } else {
                    Err(invalid())
                }
            } else if op.is_comparison() {
                if left_type == right_type && left_type.is_integer() {
                    Ok(vec![Type::Bool])
                } else {
                    Err(invalid())
                }
            } else if op.is_equality() {
                let comparable = matches!(
                    left_type,
                    Type::Bool | Type::I256 | Type::U256 | Type::ByteVec | Type::Address
                );
                if left_type == right_type && comparable {
                    Ok(vec![Type::Bool])
                } else {
                    Err(invalid())
                }
            } else {
                // Boolean connectives.
                if left_type == Type::Bool && right_type == Type::Bool {
                    Ok(vec![Type::Bool])
                } else {
                    Err(invalid())
                }
            }
        }
        ExprKind::ContractConv {
            contract_type,
            address,
        } => {
            if !state.kind.is_stateful() {
                return Err(CompilerError::new(format!(
                    "Contract conversion is not allowed in stateless scripts: {contract_type}"
                )));
            }
            let kind = state.registry().get(contract_type)?.kind;
            if !kind.is_conversion_target() {
                return Err(CompilerError::new(format!(
                    "Expect contract type for conversion, {contract_type} is a {kind}"
                )));
            }
            let address_types = expr_types(state, address)?;
            if address_types != [Type::ByteVec] {
                return Err(CompilerError::new(format!(
                    "Expect ByteVec for contract conversion, have {}",
                    format_types(&address_types)
                )));
            }
            Ok(vec![Type::Contract(contract_type.clone())])
        }
        ExprKind::Call {
            id,
            approve_assets,
            args,
        } => type_call(state, id, approve_assets, args),
        ExprKind::ContractCall {
            obj,
            id,
            approve_assets,
            args,
        } => type_contract_call(state, obj, id, approve_assets, args),
        ExprKind::Paren(inner) => expr_types(state, inner),
        ExprKind::IfElse {
            condition,
            then_expr,
            else_expr,
        } => {
            check_condition(state, condition)?;
            let then_types = expr_types(state, then_expr)?;
            let else_types = expr_types(state, else_expr)?;
            if then_types != else_types {
                return Err(CompilerError::new(format!(
                    "Invalid types of if-else expression branches, expect {}, have {}",
                    format_types(&then_types),
                    format_types(&else_types)
                )));
            }
            Ok(then_types)
        }
    }
}

fn check_approve_assets(state: &mut CompilerState, approvals: &[ApproveAssets]) -> Result<()> {
    for approval in approvals {
        let address_types = expr_types(state, &approval.address)?;
        if address_types != [Type::Address] {
            return Err(CompilerError::new(format!(
                "Invalid address type for approve assets: {}",
                format_types(&address_types)
            )));
        }
        if let Some(amount) = &approval.alph_amount {
            let amount_types = expr_types(state, amount)?;
            if amount_types != [Type::U256] {
                return Err(CompilerError::new(format!(
                    "Invalid amount type for approve assets: {}",
                    format_types(&amount_types)
                )));
            }
        }
        for (token, amount) in &approval.tokens {
            let token_types = expr_types(state, token)?;
            if token_types != [Type::ByteVec] {
                return Err(CompilerError::new(format!(
                    "Invalid token id type for approve assets: {}",
                    format_types(&token_types)
                )));
            }
            let amount_types = expr_types(state, amount)?;
            if amount_types != [Type::U256] {
                return Err(CompilerError::new(format!(
                    "Invalid amount type for approve assets: {}",
                    format_types(&amount_types)
                )));
            }
        }
    }
    Ok(())
}

fn check_call_args(
    state: &mut CompilerState,
    id: &FuncId,
    args: &[Expr],
    expect: &[Type],
) -> Result<()> {
    let mut have = Vec::new();
    for arg in args {
        have.extend(expr_types(state, arg)?);
    }
    if have != expect {
        return Err(CompilerError::new(format!(
            "Invalid args type for function {id}, expect {}, have {}",
            format_types(expect),
            format_types(&have)
        )));
    }
    Ok(())
}

/// Types an internal or built-in call.
///
/// Call graphs are recorded by the emission pass, which is never memoised.
pub fn type_call(
    state: &mut CompilerState,
    id: &FuncId,
    approve_assets: &[ApproveAssets],
    args: &[Expr],
) -> Result<Vec<Type>> {
    check_approve_assets(state, approve_assets)?;
    if id.is_builtin {
        let Some(builtin) = builtins::lookup(&id.name) else {
            return Err(CompilerError::new(format!(
                "Built-in function {id} does not exist"
            )));
        };
        if builtin.requires_stateful && !state.kind.is_stateful() {
            return Err(CompilerError::new(format!(
                "Built-in function {id} is not allowed in stateless scripts"
            )));
        }
        check_call_args(state, id, args, builtin.arg_types)?;
        Ok(builtin.rtypes.to_vec())
    } else {
        let func = state.get_func(id)?;
        check_call_args(state, id, args, &func.arg_types)?;
        Ok(func.rtypes)
    }
}

/// Types an external call.
pub fn type_contract_call(
    state: &mut CompilerState,
    obj: &Expr,
    id: &FuncId,
    approve_assets: &[ApproveAssets],
    args: &[Expr],
) -> Result<Vec<Type>> {
    if !state.kind.is_stateful() {
        return Err(CompilerError::new(format!(
            "External call {id} is not allowed in stateless scripts"
        )));
    }
    check_approve_assets(state, approve_assets)?;
    let obj_types = expr_types(state, obj)?;
    let contract_id = match <[Type; 1]>::try_from(obj_types) {
        Ok([Type::Contract(contract_id)]) => contract_id,
        _ => {
            return Err(CompilerError::new(format!(
                "Expect contract for {id} of {obj}"
            )));
        }
    };
    let func = {
        let info = state.registry().get(&contract_id)?;
        info.func(id)
            .ok_or_else(|| {
                CompilerError::new(format!("Function {contract_id}.{id} does not exist"))
            })?
            .clone()
    };
    if !func.is_public {
        return Err(CompilerError::new(format!(
            "Function {contract_id}.{id} is private"
        )));
    }
    check_call_args(state, id, args, &func.arg_types)?;
    Ok(func.rtypes)
}

fn check_loop_body_shape(body: &Statement) -> Result<()> {
    let mut stack: Vec<&Statement> = vec![body];
    while let Some(stmt) = stack.pop() {
        match stmt {
            Statement::VarDef { .. } => {
                return Err(CompilerError::new(
                    "Variable declaration is not allowed in loop body",
                ));
            }
            Statement::Return(_) => {
                return Err(CompilerError::new("Return is not allowed in loop body"));
            }
            Statement::IfElse {
                then_branch,
                else_branch,
                ..
            } => {
                stack.extend(then_branch.iter());
                stack.extend(else_branch.iter());
            }
            Statement::While { body, .. } => stack.extend(body.iter()),
            Statement::ForLoop {
                init,
                update,
                body,
                ..
            } => {
                stack.push(init.as_ref());
                stack.push(update.as_ref());
                stack.extend(body.iter());
            }
            Statement::Loop { body, .. } => stack.push(body.as_ref()),
            _ => {}
        }
    }
    Ok(())
}

/// The iteration values of `loop(from, to, step, _)`: `from + k * step` for
/// `k` in `0..⌈(to − from) / step⌉`, bounded by the unrolling limit.
pub fn loop_iteration_values(
    from: &Val,
    to: &Val,
    step: &Val,
    limit: usize,
) -> Result<Vec<Val>> {
    let (from_int, to_int, step_int, unsigned) = match (from, to, step) {
        (Val::U256(f), Val::U256(t), Val::U256(s)) => (
            BigInt::from(f.inner().clone()),
            BigInt::from(t.inner().clone()),
            BigInt::from(s.inner().clone()),
            true,
        ),
        (Val::I256(f), Val::I256(t), Val::I256(s)) => {
            (f.inner().clone(), t.inner().clone(), s.inner().clone(), false)
        }
        _ => {
            return Err(CompilerError::new(
                "Invalid loop range, expect constant integer literals of one type",
            ));
        }
    };
    if step_int.is_zero() {
        return Err(CompilerError::new("loop step cannot be zero"));
    }

    let diff = if step_int.is_positive() {
        &to_int - &from_int
    } else {
        &from_int - &to_int
    };
    let magnitude = step_int.abs();
    let count = if diff.is_positive() {
        (&diff + &magnitude - 1) / &magnitude
    } else {
        BigInt::zero()
    };
    let count = count.to_usize().filter(|c| *c <= limit);
    let Some(count) = count else {
        return Err(CompilerError::new("loop range too large"));
    };

    let mut values = Vec::with_capacity(count);
    let mut current = from_int;
    for _ in 0..count {
        let val = if unsigned {
            let unsigned_value = BigUint::try_from(current.clone())
                .ok()
                .and_then(U256::new)
                .ok_or_else(|| {
                    CompilerError::new(format!("Invalid loop iteration value {current}"))
                })?;
            Val::U256(unsigned_value)
        } else {
            let signed_value = basalt_bytecode::I256::new(current.clone()).ok_or_else(|| {
                CompilerError::new(format!("Invalid loop iteration value {current}"))
            })?;
            Val::I256(signed_value)
        };
        values.push(val);
        current += &step_int;
    }
    Ok(values)
}
