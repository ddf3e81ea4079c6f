//! Shared test helpers: AST construction and a minimal stack interpreter.
//!
//! The textual parser is an external collaborator, so tests build trees
//! through these constructors. The interpreter executes the stateless
//! instruction subset (constants, locals, stack ops, operators, branches,
//! local calls) so behavioural tests can observe results instead of
//! comparing instruction listings.

#![allow(dead_code)]

use basalt::bytecode::{I256, Instr, Method, U256, Val};
use basalt::compiler::ast::{
    Argument, AssetScript, AssignmentTarget, BinaryOperator, Contract, Expr, ExprKind, FuncDef,
    FuncId, Ident, MultiContract, Statement, TopDecl, TxScript, TypeId, UnaryOperator,
    VarDeclTarget,
};
use basalt::compiler::types::Type;

// ---- expression builders ----

pub fn u256(value: u64) -> Expr {
    Expr::new(ExprKind::Const(Val::U256(U256::from(value))))
}

pub fn i256(value: i64) -> Expr {
    Expr::new(ExprKind::Const(Val::I256(I256::from(value))))
}

pub fn boolean(value: bool) -> Expr {
    Expr::new(ExprKind::Const(Val::Bool(value)))
}

pub fn u256_val(value: u64) -> Val {
    Val::U256(U256::from(value))
}

pub fn var(name: &str) -> Expr {
    Expr::new(ExprKind::Variable(Ident::new(name)))
}

pub fn placeholder() -> Expr {
    Expr::new(ExprKind::Placeholder)
}

pub fn binop(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::new(ExprKind::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binop(BinaryOperator::Add, left, right)
}

pub fn sub(left: Expr, right: Expr) -> Expr {
    binop(BinaryOperator::Sub, left, right)
}

pub fn lt(left: Expr, right: Expr) -> Expr {
    binop(BinaryOperator::Lt, left, right)
}

pub fn not(expr: Expr) -> Expr {
    Expr::new(ExprKind::UnaryOp {
        op: UnaryOperator::Not,
        expr: Box::new(expr),
    })
}

pub fn array_lit(elems: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::CreateArray(elems))
}

pub fn array_index(array: Expr, indexes: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::ArrayElement {
        array: Box::new(array),
        indexes,
    })
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call {
        id: FuncId::new(name),
        approve_assets: Vec::new(),
        args,
    })
}

pub fn contract_conv(contract_type: &str, address: Expr) -> Expr {
    Expr::new(ExprKind::ContractConv {
        contract_type: TypeId::new(contract_type),
        address: Box::new(address),
    })
}

pub fn contract_call(obj: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::ContractCall {
        obj: Box::new(obj),
        id: FuncId::new(name),
        approve_assets: Vec::new(),
        args,
    })
}

// ---- statement builders ----

pub fn let_def(name: &str, is_mutable: bool, value: Expr) -> Statement {
    Statement::VarDef {
        targets: vec![named_target(name, is_mutable)],
        value,
    }
}

pub fn let_multi(targets: Vec<VarDeclTarget>, value: Expr) -> Statement {
    Statement::VarDef { targets, value }
}

pub fn named_target(name: &str, is_mutable: bool) -> VarDeclTarget {
    VarDeclTarget::Named {
        is_mutable,
        is_unused: false,
        ident: Ident::new(name),
    }
}

pub fn assign(name: &str, rhs: Expr) -> Statement {
    Statement::Assign {
        targets: vec![AssignmentTarget::Var(Ident::new(name))],
        rhs,
    }
}

pub fn assign_multi(names: &[&str], rhs: Expr) -> Statement {
    Statement::Assign {
        targets: names
            .iter()
            .map(|n| AssignmentTarget::Var(Ident::new(*n)))
            .collect(),
        rhs,
    }
}

pub fn assign_element(name: &str, indexes: Vec<Expr>, rhs: Expr) -> Statement {
    Statement::Assign {
        targets: vec![AssignmentTarget::ArrayElement {
            ident: Ident::new(name),
            indexes,
        }],
        rhs,
    }
}

pub fn ret(exprs: Vec<Expr>) -> Statement {
    Statement::Return(exprs)
}

pub fn call_stmt(name: &str, args: Vec<Expr>) -> Statement {
    Statement::FuncCall {
        id: FuncId::new(name),
        approve_assets: Vec::new(),
        args,
    }
}

pub fn builtin_stmt(name: &str, args: Vec<Expr>) -> Statement {
    Statement::FuncCall {
        id: FuncId::builtin(name),
        approve_assets: Vec::new(),
        args,
    }
}

pub fn contract_call_stmt(obj: Expr, name: &str, args: Vec<Expr>) -> Statement {
    Statement::ContractCall {
        obj,
        id: FuncId::new(name),
        approve_assets: Vec::new(),
        args,
    }
}

pub fn if_else(
    condition: Expr,
    then_branch: Vec<Statement>,
    else_branch: Vec<Statement>,
) -> Statement {
    Statement::IfElse {
        condition,
        then_branch,
        else_branch,
    }
}

pub fn while_loop(condition: Expr, body: Vec<Statement>) -> Statement {
    Statement::While { condition, body }
}

pub fn unrolled_loop(from: u64, to: u64, step: u64, body: Statement) -> Statement {
    Statement::Loop {
        from: u256_val(from),
        to: u256_val(to),
        step: u256_val(step),
        body: Box::new(body),
    }
}

// ---- declaration builders ----

pub fn arg(name: &str, tpe: Type) -> Argument {
    Argument {
        ident: Ident::new(name),
        tpe,
        is_mutable: false,
        is_unused: false,
    }
}

pub fn mut_arg(name: &str, tpe: Type) -> Argument {
    Argument {
        ident: Ident::new(name),
        tpe,
        is_mutable: true,
        is_unused: false,
    }
}

pub fn func(
    name: &str,
    is_public: bool,
    args: Vec<Argument>,
    rtypes: Vec<Type>,
    body: Vec<Statement>,
) -> FuncDef {
    FuncDef {
        annotations: Vec::new(),
        id: FuncId::new(name),
        is_public,
        use_preapproved_assets: false,
        use_assets_in_contract: false,
        use_permission_check: true,
        args,
        rtypes,
        body: Some(body),
    }
}

pub fn unchecked_func(
    name: &str,
    is_public: bool,
    args: Vec<Argument>,
    rtypes: Vec<Type>,
    body: Vec<Statement>,
) -> FuncDef {
    FuncDef {
        use_permission_check: false,
        ..func(name, is_public, args, rtypes, body)
    }
}

pub fn abstract_func(name: &str, is_public: bool, args: Vec<Argument>, rtypes: Vec<Type>) -> FuncDef {
    FuncDef {
        body: None,
        ..func(name, is_public, args, rtypes, Vec::new())
    }
}

pub fn unchecked_abstract_func(
    name: &str,
    is_public: bool,
    args: Vec<Argument>,
    rtypes: Vec<Type>,
) -> FuncDef {
    FuncDef {
        body: None,
        use_permission_check: false,
        ..func(name, is_public, args, rtypes, Vec::new())
    }
}

pub fn asset_script(name: &str, funcs: Vec<FuncDef>) -> TopDecl {
    TopDecl::AssetScript(AssetScript {
        id: TypeId::new(name),
        template_vars: Vec::new(),
        funcs,
    })
}

pub fn tx_script(name: &str, funcs: Vec<FuncDef>) -> TopDecl {
    TopDecl::TxScript(TxScript {
        id: TypeId::new(name),
        template_vars: Vec::new(),
        funcs,
    })
}

pub fn contract(name: &str, fields: Vec<Argument>, funcs: Vec<FuncDef>) -> TopDecl {
    TopDecl::Contract(Contract {
        is_abstract: false,
        id: TypeId::new(name),
        template_vars: Vec::new(),
        fields,
        funcs,
        events: Vec::new(),
        constants: Vec::new(),
        enums: Vec::new(),
        inheritances: Vec::new(),
    })
}

pub fn single(decl: TopDecl) -> MultiContract {
    MultiContract::new(vec![decl])
}

// ---- a minimal stack interpreter for stateless methods ----

/// Executes `methods[index]` with `args` as the leading locals.
pub fn run_method(methods: &[Method], index: usize, args: Vec<Val>) -> Result<Vec<Val>, String> {
    let method = methods.get(index).ok_or("no such method")?;
    if args.len() != method.args_length {
        return Err(format!(
            "expected {} args, got {}",
            method.args_length,
            args.len()
        ));
    }
    let mut locals = args;
    locals.resize(method.locals_length, Val::Bool(false));
    let mut stack: Vec<Val> = Vec::new();

    let mut pc = 0usize;
    while pc < method.instrs.len() {
        let mut next = pc + 1;
        match &method.instrs[pc] {
            Instr::U256Const0 => stack.push(u256_val(0)),
            Instr::U256Const1 => stack.push(u256_val(1)),
            Instr::U256Const2 => stack.push(u256_val(2)),
            Instr::U256Const3 => stack.push(u256_val(3)),
            Instr::U256Const4 => stack.push(u256_val(4)),
            Instr::U256Const5 => stack.push(u256_val(5)),
            Instr::U256Const(v) => stack.push(Val::U256(v.clone())),
            Instr::I256Const(v) => stack.push(Val::I256(v.clone())),
            Instr::BoolConst(b) => stack.push(Val::Bool(*b)),
            Instr::BytesConst(bytes) => stack.push(Val::ByteVec(bytes.clone())),
            Instr::AddressConst(address) => stack.push(Val::Address(*address)),
            Instr::LoadLocal(slot) => {
                let val = locals
                    .get(usize::from(*slot))
                    .cloned()
                    .ok_or("local out of range")?;
                stack.push(val);
            }
            Instr::StoreLocal(slot) => {
                let val = stack.pop().ok_or("stack underflow")?;
                let slot = usize::from(*slot);
                if slot >= locals.len() {
                    return Err("local out of range".into());
                }
                locals[slot] = val;
            }
            Instr::LoadLocalByIndex => {
                let slot = pop_u256_usize(&mut stack)?;
                let val = locals.get(slot).cloned().ok_or("local out of range")?;
                stack.push(val);
            }
            Instr::StoreLocalByIndex => {
                let slot = pop_u256_usize(&mut stack)?;
                let val = stack.pop().ok_or("stack underflow")?;
                if slot >= locals.len() {
                    return Err("local out of range".into());
                }
                locals[slot] = val;
            }
            Instr::Dup => {
                let top = stack.last().cloned().ok_or("stack underflow")?;
                stack.push(top);
            }
            Instr::Pop => {
                stack.pop().ok_or("stack underflow")?;
            }
            Instr::Jump(offset) => next = branch_target(pc, *offset)?,
            Instr::IfTrue(offset) => {
                if pop_bool(&mut stack)? {
                    next = branch_target(pc, *offset)?;
                }
            }
            Instr::IfFalse(offset) => {
                if !pop_bool(&mut stack)? {
                    next = branch_target(pc, *offset)?;
                }
            }
            Instr::CallLocal(target) => {
                let callee = methods.get(usize::from(*target)).ok_or("bad call target")?;
                let at = stack
                    .len()
                    .checked_sub(callee.args_length)
                    .ok_or("stack underflow")?;
                let call_args = stack.split_off(at);
                let returns = run_method(methods, usize::from(*target), call_args)?;
                stack.extend(returns);
            }
            Instr::Return => {
                let at = stack
                    .len()
                    .checked_sub(method.return_length)
                    .ok_or("stack underflow")?;
                return Ok(stack.split_off(at));
            }
            Instr::Panic => return Err("panic".into()),
            operator => apply_operator(operator, &mut stack)?,
        }
        pc = next;
    }
    if method.return_length == 0 {
        Ok(Vec::new())
    } else {
        Err("fell off method end".into())
    }
}

fn branch_target(pc: usize, offset: i16) -> Result<usize, String> {
    usize::try_from(pc as i64 + i64::from(offset) + 1).map_err(|_| "bad branch target".to_string())
}

fn pop_bool(stack: &mut Vec<Val>) -> Result<bool, String> {
    match stack.pop() {
        Some(Val::Bool(b)) => Ok(b),
        _ => Err("expected bool".into()),
    }
}

fn pop_u256(stack: &mut Vec<Val>) -> Result<U256, String> {
    match stack.pop() {
        Some(Val::U256(v)) => Ok(v),
        _ => Err("expected U256".into()),
    }
}

fn pop_u256_usize(stack: &mut Vec<Val>) -> Result<usize, String> {
    pop_u256(stack)?
        .to_usize()
        .ok_or_else(|| "index too large".to_string())
}

fn pop_i256(stack: &mut Vec<Val>) -> Result<I256, String> {
    match stack.pop() {
        Some(Val::I256(v)) => Ok(v),
        _ => Err("expected I256".into()),
    }
}

fn apply_operator(instr: &Instr, stack: &mut Vec<Val>) -> Result<(), String> {
    use Instr::*;
    match instr {
        U256Add | U256Sub | U256Mul | U256Div | U256Mod => {
            let rhs = pop_u256(stack)?;
            let lhs = pop_u256(stack)?;
            let result = match instr {
                U256Add => lhs.checked_add(&rhs),
                U256Sub => lhs.checked_sub(&rhs),
                U256Mul => lhs.checked_mul(&rhs),
                U256Div => lhs.checked_div(&rhs),
                _ => lhs.checked_rem(&rhs),
            }
            .ok_or("U256 arithmetic error")?;
            stack.push(Val::U256(result));
        }
        U256Eq | U256Neq | U256Lt | U256Le | U256Gt | U256Ge => {
            let rhs = pop_u256(stack)?;
            let lhs = pop_u256(stack)?;
            let result = match instr {
                U256Eq => lhs == rhs,
                U256Neq => lhs != rhs,
                U256Lt => lhs < rhs,
                U256Le => lhs <= rhs,
                U256Gt => lhs > rhs,
                _ => lhs >= rhs,
            };
            stack.push(Val::Bool(result));
        }
        I256Add | I256Sub | I256Mul | I256Div | I256Mod => {
            let rhs = pop_i256(stack)?;
            let lhs = pop_i256(stack)?;
            let result = match instr {
                I256Add => lhs.checked_add(&rhs),
                I256Sub => lhs.checked_sub(&rhs),
                I256Mul => lhs.checked_mul(&rhs),
                I256Div => lhs.checked_div(&rhs),
                _ => lhs.checked_rem(&rhs),
            }
            .ok_or("I256 arithmetic error")?;
            stack.push(Val::I256(result));
        }
        I256Eq | I256Neq | I256Lt | I256Le | I256Gt | I256Ge => {
            let rhs = pop_i256(stack)?;
            let lhs = pop_i256(stack)?;
            let result = match instr {
                I256Eq => lhs == rhs,
                I256Neq => lhs != rhs,
                I256Lt => lhs < rhs,
                I256Le => lhs <= rhs,
                I256Gt => lhs > rhs,
                _ => lhs >= rhs,
            };
            stack.push(Val::Bool(result));
        }
        BoolNot => {
            let value = pop_bool(stack)?;
            stack.push(Val::Bool(!value));
        }
        BoolAnd | BoolOr | BoolEq | BoolNeq => {
            let rhs = pop_bool(stack)?;
            let lhs = pop_bool(stack)?;
            let result = match instr {
                BoolAnd => lhs && rhs,
                BoolOr => lhs || rhs,
                BoolEq => lhs == rhs,
                _ => lhs != rhs,
            };
            stack.push(Val::Bool(result));
        }
        ByteVecEq | ByteVecNeq | AddressEq | AddressNeq => {
            let rhs = stack.pop().ok_or("stack underflow")?;
            let lhs = stack.pop().ok_or("stack underflow")?;
            let eq = lhs == rhs;
            let result = match instr {
                ByteVecEq | AddressEq => eq,
                _ => !eq,
            };
            stack.push(Val::Bool(result));
        }
        other => return Err(format!("unsupported instruction {other:?}")),
    }
    Ok(())
}
