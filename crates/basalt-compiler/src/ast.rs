//! The abstract syntax tree handed to the compiler by the parser.
//!
//! Nodes are immutable once constructed, except for the memoised type slot
//! on every expression, which is written at most once on first typing.

use std::cell::OnceCell;
use core::fmt;

use basalt_bytecode::Val;

use crate::types::{ContractKind, Type};

/// A value-level name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(pub String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Ident {
        Ident(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A type-level name: contracts, interfaces, events, enums.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub String);

impl TypeId {
    pub fn new(name: impl Into<String>) -> TypeId {
        TypeId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A function name. Built-ins live in their own namespace and render with a
/// `!` suffix.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncId {
    pub name: String,
    pub is_builtin: bool,
}

impl FuncId {
    pub fn new(name: impl Into<String>) -> FuncId {
        FuncId {
            name: name.into(),
            is_builtin: false,
        }
    }

    pub fn builtin(name: impl Into<String>) -> FuncId {
        FuncId {
            name: name.into(),
            is_builtin: true,
        }
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_builtin {
            write!(f, "{}!", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// A formal argument of a function, or a contract field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Argument {
    pub ident: Ident,
    pub tpe: Type,
    pub is_mutable: bool,
    pub is_unused: bool,
}

/// A declared field of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventField {
    pub ident: Ident,
    pub tpe: Type,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationField {
    pub ident: Ident,
    pub value: Val,
}

/// A `@id(field = value, ...)` annotation on a function definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub id: Ident,
    pub fields: Vec<AnnotationField>,
}

/// Per-address asset approval attached to a call:
/// `{address -> alph, token: amount, ...}`.
#[derive(Clone, Debug, PartialEq)]
pub struct ApproveAssets {
    pub address: Expr,
    pub alph_amount: Option<Expr>,
    /// `(token id, amount)` pairs.
    pub tokens: Vec<(Expr, Expr)>,
}

/// An expression node with its memoised type vector.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    kind: ExprKind,
    ty: OnceCell<Vec<Type>>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Expr {
        Expr {
            kind,
            ty: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// The memoised type vector, if this node has been typed.
    pub fn cached_type(&self) -> Option<&[Type]> {
        self.ty.get().map(Vec::as_slice)
    }

    /// Fills the memo slot on first call; later calls keep the first value.
    pub(crate) fn memoise_type(&self, types: Vec<Type>) -> &[Type] {
        self.ty.get_or_init(|| types)
    }

    /// Rebuilds this expression with every `?` replaced by `val`.
    ///
    /// The copy gets fresh (empty) type slots.
    pub fn substitute_placeholder(&self, val: &Val) -> Expr {
        let kind = match &self.kind {
            ExprKind::Placeholder => ExprKind::Const(val.clone()),
            ExprKind::Const(v) => ExprKind::Const(v.clone()),
            ExprKind::CreateArray(elems) => ExprKind::CreateArray(
                elems.iter().map(|e| e.substitute_placeholder(val)).collect(),
            ),
            ExprKind::ArrayRepeat { elem, len } => ExprKind::ArrayRepeat {
                elem: Box::new(elem.substitute_placeholder(val)),
                len: *len,
            },
            ExprKind::ArrayElement { array, indexes } => ExprKind::ArrayElement {
                array: Box::new(array.substitute_placeholder(val)),
                indexes: indexes.iter().map(|e| e.substitute_placeholder(val)).collect(),
            },
            ExprKind::Variable(ident) => ExprKind::Variable(ident.clone()),
            ExprKind::EnumField { enum_id, field } => ExprKind::EnumField {
                enum_id: enum_id.clone(),
                field: field.clone(),
            },
            ExprKind::UnaryOp { op, expr } => ExprKind::UnaryOp {
                op: *op,
                expr: Box::new(expr.substitute_placeholder(val)),
            },
            ExprKind::BinaryOp { op, left, right } => ExprKind::BinaryOp {
                op: *op,
                left: Box::new(left.substitute_placeholder(val)),
                right: Box::new(right.substitute_placeholder(val)),
            },
            ExprKind::ContractConv {
                contract_type,
                address,
            } => ExprKind::ContractConv {
                contract_type: contract_type.clone(),
                address: Box::new(address.substitute_placeholder(val)),
            },
            ExprKind::Call {
                id,
                approve_assets,
                args,
            } => ExprKind::Call {
                id: id.clone(),
                approve_assets: substitute_approvals(approve_assets, val),
                args: args.iter().map(|e| e.substitute_placeholder(val)).collect(),
            },
            ExprKind::ContractCall {
                obj,
                id,
                approve_assets,
                args,
            } => ExprKind::ContractCall {
                obj: Box::new(obj.substitute_placeholder(val)),
                id: id.clone(),
                approve_assets: substitute_approvals(approve_assets, val),
                args: args.iter().map(|e| e.substitute_placeholder(val)).collect(),
            },
            ExprKind::Paren(inner) => ExprKind::Paren(Box::new(inner.substitute_placeholder(val))),
            ExprKind::IfElse {
                condition,
                then_expr,
                else_expr,
            } => ExprKind::IfElse {
                condition: Box::new(condition.substitute_placeholder(val)),
                then_expr: Box::new(then_expr.substitute_placeholder(val)),
                else_expr: Box::new(else_expr.substitute_placeholder(val)),
            },
        };
        Expr::new(kind)
    }
}

fn substitute_approvals(approvals: &[ApproveAssets], val: &Val) -> Vec<ApproveAssets> {
    approvals
        .iter()
        .map(|a| ApproveAssets {
            address: a.address.substitute_placeholder(val),
            alph_amount: a.alph_amount.as_ref().map(|e| e.substitute_placeholder(val)),
            tokens: a
                .tokens
                .iter()
                .map(|(t, amount)| {
                    (t.substitute_placeholder(val), amount.substitute_placeholder(val))
                })
                .collect(),
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// A literal constant.
    Const(Val),
    /// The `?` of an unrolled loop body; substituted away before typing.
    Placeholder,
    /// `[e1, e2, ...]`
    CreateArray(Vec<Expr>),
    /// `[e; n]`
    ArrayRepeat { elem: Box<Expr>, len: usize },
    /// `a[i1][i2]...`, possibly selecting a sub-array.
    ArrayElement {
        array: Box<Expr>,
        indexes: Vec<Expr>,
    },
    Variable(Ident),
    /// `EnumName.FieldName`
    EnumField { enum_id: TypeId, field: Ident },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `ContractType(addressExpr)`: byte-vector to contract handle.
    ContractConv {
        contract_type: TypeId,
        address: Box<Expr>,
    },
    /// A call to a function of the enclosing contract, or a built-in.
    Call {
        id: FuncId,
        approve_assets: Vec<ApproveAssets>,
        args: Vec<Expr>,
    },
    /// A call into another contract.
    ContractCall {
        obj: Box<Expr>,
        id: FuncId,
        approve_assets: Vec<ApproveAssets>,
        args: Vec<Expr>,
    },
    Paren(Box<Expr>),
    IfElse {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for ExprKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprKind::Const(v) => write!(f, "{v}"),
            ExprKind::Placeholder => write!(f, "?"),
            ExprKind::CreateArray(elems) => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            ExprKind::ArrayRepeat { elem, len } => write!(f, "[{elem}; {len}]"),
            ExprKind::ArrayElement { array, indexes } => {
                write!(f, "{array}")?;
                for index in indexes {
                    write!(f, "[{index}]")?;
                }
                Ok(())
            }
            ExprKind::Variable(ident) => write!(f, "{ident}"),
            ExprKind::EnumField { enum_id, field } => write!(f, "{enum_id}.{field}"),
            ExprKind::UnaryOp { op, expr } => write!(f, "{op}{expr}"),
            ExprKind::BinaryOp { op, left, right } => write!(f, "{left} {op} {right}"),
            ExprKind::ContractConv {
                contract_type,
                address,
            } => write!(f, "{contract_type}({address})"),
            ExprKind::Call { id, args, .. } => {
                write!(f, "{id}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            ExprKind::ContractCall { obj, id, .. } => write!(f, "{obj}.{id}(..)"),
            ExprKind::Paren(inner) => write!(f, "({inner})"),
            ExprKind::IfElse {
                condition,
                then_expr,
                else_expr,
            } => write!(f, "if {condition} {then_expr} else {else_expr}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Not => write!(f, "!"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Lt | BinaryOperator::Le | BinaryOperator::Gt | BinaryOperator::Ge
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOperator::Eq | BinaryOperator::Neq)
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::Neq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        };
        write!(f, "{s}")
    }
}

/// One binding position of a `let` definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VarDeclTarget {
    Named {
        is_mutable: bool,
        is_unused: bool,
        ident: Ident,
    },
    /// `_`: the value cells are dropped.
    Anonymous,
}

/// One target position of an assignment.
#[derive(Clone, Debug, PartialEq)]
pub enum AssignmentTarget {
    Var(Ident),
    ArrayElement { ident: Ident, indexes: Vec<Expr> },
}

impl AssignmentTarget {
    pub fn ident(&self) -> &Ident {
        match self {
            AssignmentTarget::Var(ident) => ident,
            AssignmentTarget::ArrayElement { ident, .. } => ident,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// `let (a, mut b, _) = expr`
    VarDef {
        targets: Vec<VarDeclTarget>,
        value: Expr,
    },
    /// `a, b[i] = expr`
    Assign {
        targets: Vec<AssignmentTarget>,
        rhs: Expr,
    },
    /// An internal or built-in call in statement position.
    FuncCall {
        id: FuncId,
        approve_assets: Vec<ApproveAssets>,
        args: Vec<Expr>,
    },
    /// An external call in statement position.
    ContractCall {
        obj: Expr,
        id: FuncId,
        approve_assets: Vec<ApproveAssets>,
        args: Vec<Expr>,
    },
    IfElse {
        condition: Expr,
        then_branch: Vec<Statement>,
        else_branch: Vec<Statement>,
    },
    While {
        condition: Expr,
        body: Vec<Statement>,
    },
    ForLoop {
        init: Box<Statement>,
        condition: Expr,
        update: Box<Statement>,
        body: Vec<Statement>,
    },
    /// `loop(from, to, step, body)`: unrolled at compile time, `?` in the
    /// body stands for the iteration value.
    Loop {
        from: Val,
        to: Val,
        step: Val,
        body: Box<Statement>,
    },
    Return(Vec<Expr>),
    /// `emit E(args)`
    EmitEvent { id: TypeId, args: Vec<Expr> },
}

impl Statement {
    /// Rebuilds this statement with every `?` replaced by `val`.
    pub fn substitute_placeholder(&self, val: &Val) -> Statement {
        match self {
            Statement::VarDef { targets, value } => Statement::VarDef {
                targets: targets.clone(),
                value: value.substitute_placeholder(val),
            },
            Statement::Assign { targets, rhs } => Statement::Assign {
                targets: targets
                    .iter()
                    .map(|t| match t {
                        AssignmentTarget::Var(ident) => AssignmentTarget::Var(ident.clone()),
                        AssignmentTarget::ArrayElement { ident, indexes } => {
                            AssignmentTarget::ArrayElement {
                                ident: ident.clone(),
                                indexes: indexes
                                    .iter()
                                    .map(|e| e.substitute_placeholder(val))
                                    .collect(),
                            }
                        }
                    })
                    .collect(),
                rhs: rhs.substitute_placeholder(val),
            },
            Statement::FuncCall {
                id,
                approve_assets,
                args,
            } => Statement::FuncCall {
                id: id.clone(),
                approve_assets: substitute_approvals(approve_assets, val),
                args: args.iter().map(|e| e.substitute_placeholder(val)).collect(),
            },
            Statement::ContractCall {
                obj,
                id,
                approve_assets,
                args,
            } => Statement::ContractCall {
                obj: obj.substitute_placeholder(val),
                id: id.clone(),
                approve_assets: substitute_approvals(approve_assets, val),
                args: args.iter().map(|e| e.substitute_placeholder(val)).collect(),
            },
            Statement::IfElse {
                condition,
                then_branch,
                else_branch,
            } => Statement::IfElse {
                condition: condition.substitute_placeholder(val),
                then_branch: substitute_statements(then_branch, val),
                else_branch: substitute_statements(else_branch, val),
            },
            Statement::While { condition, body } => Statement::While {
                condition: condition.substitute_placeholder(val),
                body: substitute_statements(body, val),
            },
            Statement::ForLoop {
                init,
                condition,
                update,
                body,
            } => Statement::ForLoop {
                init: Box::new(init.substitute_placeholder(val)),
                condition: condition.substitute_placeholder(val),
                update: Box::new(update.substitute_placeholder(val)),
                body: substitute_statements(body, val),
            },
            Statement::Loop {
                from,
                to,
                step,
                body,
            } => Statement::Loop {
                from: from.clone(),
                to: to.clone(),
                step: step.clone(),
                body: body.clone(),
            },
            Statement::Return(exprs) => Statement::Return(
                exprs.iter().map(|e| e.substitute_placeholder(val)).collect(),
            ),
            Statement::EmitEvent { id, args } => Statement::EmitEvent {
                id: id.clone(),
                args: args.iter().map(|e| e.substitute_placeholder(val)).collect(),
            },
        }
    }
}

fn substitute_statements(statements: &[Statement], val: &Val) -> Vec<Statement> {
    statements
        .iter()
        .map(|s| s.substitute_placeholder(val))
        .collect()
}

/// A function definition. `body: None` marks an abstract function.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncDef {
    pub annotations: Vec<Annotation>,
    pub id: FuncId,
    pub is_public: bool,
    pub use_preapproved_assets: bool,
    pub use_assets_in_contract: bool,
    pub use_permission_check: bool,
    pub args: Vec<Argument>,
    pub rtypes: Vec<Type>,
    pub body: Option<Vec<Statement>>,
}

impl FuncDef {
    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Signature equality modulo body: used when merging an implementation
    /// into an inherited abstract declaration.
    pub fn has_same_signature(&self, other: &FuncDef) -> bool {
        self.id == other.id
            && self.is_public == other.is_public
            && self.use_preapproved_assets == other.use_preapproved_assets
            && self.use_assets_in_contract == other.use_assets_in_contract
            && self.use_permission_check == other.use_permission_check
            && self.args == other.args
            && self.rtypes == other.rtypes
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventDef {
    pub id: TypeId,
    pub fields: Vec<EventField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstantVarDef {
    pub ident: Ident,
    pub value: Val,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumField {
    pub ident: Ident,
    pub value: Val,
}

/// An enum definition; fields are materialised as constants named
/// `EnumName.FieldName`.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumDef {
    pub id: TypeId,
    pub fields: Vec<EnumField>,
}

/// `Contract Child(...) extends Parent(fieldA, fieldB)`
#[derive(Clone, Debug, PartialEq)]
pub struct ContractInheritance {
    pub parent: TypeId,
    /// Child field idents forwarded to the parent, in parent field order.
    pub fields: Vec<Ident>,
}

/// `implements ParentInterface`
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceInheritance {
    pub parent: TypeId,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inheritance {
    Contract(ContractInheritance),
    Interface(InterfaceInheritance),
}

impl Inheritance {
    pub fn parent(&self) -> &TypeId {
        match self {
            Inheritance::Contract(inh) => &inh.parent,
            Inheritance::Interface(inh) => &inh.parent,
        }
    }
}

/// A stateless script: template variables and functions only.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetScript {
    pub id: TypeId,
    pub template_vars: Vec<Argument>,
    pub funcs: Vec<FuncDef>,
}

/// A stateful transaction script. No fields, constants, enums, events, or
/// inheritance.
#[derive(Clone, Debug, PartialEq)]
pub struct TxScript {
    pub id: TypeId,
    pub template_vars: Vec<Argument>,
    pub funcs: Vec<FuncDef>,
}

/// A deployable (or abstract) contract.
#[derive(Clone, Debug, PartialEq)]
pub struct Contract {
    pub is_abstract: bool,
    pub id: TypeId,
    pub template_vars: Vec<Argument>,
    pub fields: Vec<Argument>,
    pub funcs: Vec<FuncDef>,
    pub events: Vec<EventDef>,
    pub constants: Vec<ConstantVarDef>,
    pub enums: Vec<EnumDef>,
    pub inheritances: Vec<Inheritance>,
}

impl Contract {
    pub fn kind(&self) -> ContractKind {
        if self.is_abstract {
            ContractKind::AbstractContract
        } else {
            ContractKind::Contract
        }
    }
}

/// An interface: abstract functions and events only.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractInterface {
    pub id: TypeId,
    pub funcs: Vec<FuncDef>,
    pub events: Vec<EventDef>,
    pub inheritances: Vec<InterfaceInheritance>,
}

/// A top-level declaration of a compilation unit.
#[derive(Clone, Debug, PartialEq)]
pub enum TopDecl {
    AssetScript(AssetScript),
    TxScript(TxScript),
    Contract(Contract),
    Interface(ContractInterface),
}

impl TopDecl {
    pub fn id(&self) -> &TypeId {
        match self {
            TopDecl::AssetScript(s) => &s.id,
            TopDecl::TxScript(s) => &s.id,
            TopDecl::Contract(c) => &c.id,
            TopDecl::Interface(i) => &i.id,
        }
    }

    pub fn kind(&self) -> ContractKind {
        match self {
            TopDecl::AssetScript(_) => ContractKind::AssetScript,
            TopDecl::TxScript(_) => ContractKind::TxScript,
            TopDecl::Contract(c) => c.kind(),
            TopDecl::Interface(_) => ContractKind::Interface,
        }
    }

    pub fn funcs(&self) -> &[FuncDef] {
        match self {
            TopDecl::AssetScript(s) => &s.funcs,
            TopDecl::TxScript(s) => &s.funcs,
            TopDecl::Contract(c) => &c.funcs,
            TopDecl::Interface(i) => &i.funcs,
        }
    }

    pub fn as_contract(&self) -> Option<&Contract> {
        match self {
            TopDecl::Contract(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&ContractInterface> {
        match self {
            TopDecl::Interface(i) => Some(i),
            _ => None,
        }
    }
}

/// An ordered collection of top-level declarations compiled together.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiContract {
    pub decls: Vec<TopDecl>,
}

impl MultiContract {
    pub fn new(decls: Vec<TopDecl>) -> MultiContract {
        MultiContract { decls }
    }

    pub fn get(&self, index: usize) -> Option<&TopDecl> {
        self.decls.get(index)
    }
}
