//! Per-contract compilation state: symbol tables, slot allocation, call
//! graphs, events, and warnings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use basalt_bytecode::{Instr, Val};

use crate::ast::{Argument, EventDef, FuncDef, FuncId, Ident, TypeId};
use crate::error::{CompilerError, Result};
use crate::types::{ContractKind, Type};

/// Compiler configuration.
///
/// The loop-unrolling limit bounds the iteration count of `loop(..)`
/// statements; the default is effectively unbounded.
#[derive(Clone, Copy, Debug)]
pub struct CompilerConfig {
    pub loop_unrolling_limit: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            loop_unrolling_limit: usize::MAX,
        }
    }
}

/// Where a variable's cells live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VarKind {
    Local { index: u8 },
    Field { index: u8 },
    Template { index: u8 },
    /// Constants carry the instruction that loads them.
    Constant { instr: Instr },
}

#[derive(Clone, Debug)]
pub struct VarInfo {
    pub tpe: Type,
    pub is_mutable: bool,
    /// Declared as intentionally unused; suppresses the warning.
    pub is_unused: bool,
    /// Compiler-introduced temporary.
    pub is_generated: bool,
    pub is_used: bool,
    pub kind: VarKind,
}

/// A materialised run of contiguous cells an array expression lives in.
#[derive(Clone, Debug)]
pub struct ArrayRef {
    pub tpe: Type,
    pub is_mutable: bool,
    pub kind: ArrayRefKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayRefKind {
    Local { base: u8 },
    Field { base: u8 },
    Template { base: u8 },
}

/// One entry of a contract's method table.
#[derive(Clone, Debug)]
pub struct FuncInfo {
    pub id: FuncId,
    pub is_public: bool,
    pub use_preapproved_assets: bool,
    pub use_assets_in_contract: bool,
    pub use_permission_check: bool,
    pub arg_types: Vec<Type>,
    pub rtypes: Vec<Type>,
    pub index: u8,
}

impl FuncInfo {
    pub fn from_def(def: &FuncDef, index: u8) -> FuncInfo {
        FuncInfo {
            id: def.id.clone(),
            is_public: def.is_public,
            use_preapproved_assets: def.use_preapproved_assets,
            use_assets_in_contract: def.use_assets_in_contract,
            use_permission_check: def.use_permission_check,
            arg_types: def.args.iter().map(|a| a.tpe.clone()).collect(),
            rtypes: def.rtypes.clone(),
            index,
        }
    }
}

/// What the rest of a `MultiContract` knows about one declaration.
#[derive(Clone, Debug)]
pub struct ContractInfo {
    pub kind: ContractKind,
    pub fields: Vec<Argument>,
    pub funcs: Vec<FuncInfo>,
}

impl ContractInfo {
    pub fn func(&self, id: &FuncId) -> Option<&FuncInfo> {
        self.funcs.iter().find(|f| f.id == *id)
    }
}

/// Type-id indexed view of every declaration compiled together.
#[derive(Clone, Debug, Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<TypeId, ContractInfo>,
}

impl ContractRegistry {
    pub fn insert(&mut self, id: TypeId, info: ContractInfo) -> Result<()> {
        if self.contracts.insert(id.clone(), info).is_some() {
            return Err(CompilerError::new(format!(
                "These contracts are defined multiple times: {id}"
            )));
        }
        Ok(())
    }

    pub fn get(&self, id: &TypeId) -> Result<&ContractInfo> {
        self.contracts
            .get(id)
            .ok_or_else(|| CompilerError::new(format!("Contract {id} does not exist")))
    }
}

/// Per-contract compiler state. Created at the start of a contract's
/// compilation, mutated through both passes, discarded after its warnings
/// are harvested.
pub struct CompilerState {
    pub type_id: TypeId,
    pub kind: ContractKind,
    pub config: CompilerConfig,
    registry: Arc<ContractRegistry>,

    vars: BTreeMap<String, VarInfo>,
    var_decl_order: Vec<String>,
    scope_stack: Vec<String>,
    subscope_counter: u32,
    temp_counter: u32,

    next_local: u16,
    next_field: u16,
    next_template: u16,
    func_locals: BTreeMap<String, u16>,

    funcs: Vec<FuncInfo>,
    current_func: Option<FuncId>,

    internal_calls: BTreeMap<FuncId, BTreeSet<FuncId>>,
    external_calls: BTreeMap<FuncId, BTreeSet<(TypeId, FuncId)>>,

    events: Vec<EventDef>,
    warnings: Vec<String>,
}

impl CompilerState {
    pub fn new(
        type_id: TypeId,
        kind: ContractKind,
        config: CompilerConfig,
        registry: Arc<ContractRegistry>,
        funcs: Vec<FuncInfo>,
    ) -> CompilerState {
        CompilerState {
            type_id,
            kind,
            config,
            registry,
            vars: BTreeMap::new(),
            var_decl_order: Vec::new(),
            scope_stack: Vec::new(),
            subscope_counter: 0,
            temp_counter: 0,
            next_local: 0,
            next_field: 0,
            next_template: 0,
            func_locals: BTreeMap::new(),
            funcs,
            current_func: None,
            internal_calls: BTreeMap::new(),
            external_calls: BTreeMap::new(),
            events: Vec::new(),
            warnings: Vec::new(),
        }
    }

    // ---- scopes ----

    /// Enters `func` for the checking pass: a fresh local frame.
    pub fn enter_function_check(&mut self, func: &FuncId) {
        self.scope_stack = vec![func.name.clone()];
        self.subscope_counter = 0;
        self.temp_counter = 0;
        self.next_local = 0;
        self.current_func = Some(func.clone());
    }

    /// Leaves `func` after checking, recording its local frame size.
    pub fn exit_function_check(&mut self, func: &FuncId) {
        self.func_locals.insert(func.name.clone(), self.next_local);
        self.scope_stack.clear();
        self.current_func = None;
    }

    /// Re-enters `func` for the emission pass. Sub-scope numbering restarts
    /// so both passes resolve identical scoped names; generated temporaries
    /// are slotted after the checked locals.
    pub fn enter_function_gen(&mut self, func: &FuncId) {
        self.scope_stack = vec![func.name.clone()];
        self.subscope_counter = 0;
        self.temp_counter = 0;
        self.next_local = *self.func_locals.get(&func.name).unwrap_or(&0);
        self.current_func = Some(func.clone());
    }

    pub fn exit_function_gen(&mut self) {
        self.scope_stack.clear();
        self.current_func = None;
    }

    /// The current local frame size in cells.
    pub fn local_count(&self) -> usize {
        usize::from(self.next_local)
    }

    pub fn current_func(&self) -> Option<&FuncId> {
        self.current_func.as_ref()
    }

    /// Opens a numbered sub-scope (`for` init bindings live here).
    pub fn enter_subscope(&mut self) {
        let parent = self
            .scope_stack
            .last()
            .cloned()
            .unwrap_or_default();
        let scope = format!("{parent}#{}", self.subscope_counter);
        self.subscope_counter += 1;
        self.scope_stack.push(scope);
    }

    pub fn exit_subscope(&mut self) {
        self.scope_stack.pop();
    }

    fn scoped_name(&self, name: &str) -> String {
        match self.scope_stack.last() {
            Some(scope) => format!("{scope}.{name}"),
            None => name.to_string(),
        }
    }

    fn resolve_key(&self, name: &str) -> Option<String> {
        for scope in self.scope_stack.iter().rev() {
            let key = format!("{scope}.{name}");
            if self.vars.contains_key(&key) {
                return Some(key);
            }
        }
        if self.vars.contains_key(name) {
            return Some(name.to_string());
        }
        None
    }

    // ---- variables ----

    fn insert_var(&mut self, key: String, info: VarInfo) {
        self.var_decl_order.push(key.clone());
        self.vars.insert(key, info);
    }

    pub fn add_local_variable(
        &mut self,
        ident: &Ident,
        tpe: Type,
        is_mutable: bool,
        is_unused: bool,
    ) -> Result<()> {
        if self.resolve_key(ident.as_str()).is_some() {
            return Err(CompilerError::new(format!(
                "Local variables have the same name: {ident}"
            )));
        }
        let index = self.alloc_local(&tpe)?;
        let key = self.scoped_name(ident.as_str());
        self.insert_var(
            key,
            VarInfo {
                tpe,
                is_mutable,
                is_unused,
                is_generated: false,
                is_used: false,
                kind: VarKind::Local { index },
            },
        );
        Ok(())
    }

    /// Allocates a compiler-introduced local run and returns its base slot.
    pub fn add_generated_local(&mut self, tpe: Type) -> Result<u8> {
        let index = self.alloc_local(&tpe)?;
        let name = format!("_generated#{}", self.temp_counter);
        self.temp_counter += 1;
        let key = self.scoped_name(&name);
        self.insert_var(
            key,
            VarInfo {
                tpe,
                is_mutable: true,
                is_unused: true,
                is_generated: true,
                is_used: true,
                kind: VarKind::Local { index },
            },
        );
        Ok(index)
    }

    fn alloc_local(&mut self, tpe: &Type) -> Result<u8> {
        let cells = tpe.flattened_len();
        let end = usize::from(self.next_local) + cells;
        if end > usize::from(u8::MAX) + 1 || self.next_local > u16::from(u8::MAX) {
            return Err(CompilerError::new(format!(
                "too many local variables in function {}",
                self.current_func.as_ref().map_or("?", |f| f.name.as_str())
            )));
        }
        let index = self.next_local as u8;
        self.next_local = end as u16;
        Ok(index)
    }

    pub fn add_field_variable(
        &mut self,
        ident: &Ident,
        tpe: Type,
        is_mutable: bool,
        is_unused: bool,
    ) -> Result<()> {
        if self.vars.contains_key(ident.as_str()) {
            return Err(CompilerError::new(format!(
                "Global variables have the same name: {ident}"
            )));
        }
        let cells = tpe.flattened_len();
        let end = usize::from(self.next_field) + cells;
        if end > usize::from(u8::MAX) + 1 || self.next_field > u16::from(u8::MAX) {
            return Err(CompilerError::new(format!(
                "too many fields in contract {}",
                self.type_id
            )));
        }
        let index = self.next_field as u8;
        self.next_field = end as u16;
        self.insert_var(
            ident.as_str().to_string(),
            VarInfo {
                tpe,
                is_mutable,
                is_unused,
                is_generated: false,
                is_used: false,
                kind: VarKind::Field { index },
            },
        );
        Ok(())
    }

    pub fn add_template_variable(&mut self, ident: &Ident, tpe: Type) -> Result<()> {
        if self.vars.contains_key(ident.as_str()) {
            return Err(CompilerError::new(format!(
                "Global variables have the same name: {ident}"
            )));
        }
        let cells = tpe.flattened_len();
        let end = usize::from(self.next_template) + cells;
        if end > usize::from(u8::MAX) + 1 || self.next_template > u16::from(u8::MAX) {
            return Err(CompilerError::new(format!(
                "too many template variables in {}",
                self.type_id
            )));
        }
        let index = self.next_template as u8;
        self.next_template = end as u16;
        self.insert_var(
            ident.as_str().to_string(),
            VarInfo {
                tpe,
                is_mutable: false,
                is_unused: false,
                is_generated: false,
                is_used: false,
                kind: VarKind::Template { index },
            },
        );
        Ok(())
    }

    /// Registers a constant, or an enum field under its
    /// `EnumName.FieldName` key.
    pub fn add_constant_variable(&mut self, name: &str, value: &Val) -> Result<()> {
        if self.vars.contains_key(name) {
            return Err(CompilerError::new(format!(
                "Global variables have the same name: {name}"
            )));
        }
        self.insert_var(
            name.to_string(),
            VarInfo {
                tpe: Type::from_val(value),
                is_mutable: false,
                is_unused: false,
                is_generated: false,
                is_used: true,
                kind: VarKind::Constant {
                    instr: value.to_const_instr(),
                },
            },
        );
        Ok(())
    }

    /// Looks `name` up through the scope chain, marking it used.
    pub fn get_variable(&mut self, name: &str) -> Result<VarInfo> {
        let key = self
            .resolve_key(name)
            .ok_or_else(|| CompilerError::new(format!("Variable {name} does not exist")))?;
        let info = self.vars.get_mut(&key).expect("resolved key");
        info.is_used = true;
        Ok(info.clone())
    }

    /// The type of a variable, for §4.2's `get_type`.
    pub fn get_type(&mut self, name: &str) -> Result<Type> {
        Ok(self.get_variable(name)?.tpe)
    }

    // ---- array refs ----

    /// The array ref backing an array-typed variable.
    pub fn get_array_ref(&mut self, name: &str) -> Result<ArrayRef> {
        let info = self.get_variable(name)?;
        if !info.tpe.is_array() {
            return Err(CompilerError::new(format!(
                "expect array type for {name}, have {}",
                info.tpe
            )));
        }
        let kind = match info.kind {
            VarKind::Local { index } => ArrayRefKind::Local { base: index },
            VarKind::Field { index } => ArrayRefKind::Field { base: index },
            VarKind::Template { index } => ArrayRefKind::Template { base: index },
            VarKind::Constant { .. } => {
                return Err(CompilerError::new(format!(
                    "expect array type for {name}, have a constant"
                )));
            }
        };
        Ok(ArrayRef {
            tpe: info.tpe,
            is_mutable: info.is_mutable,
            kind,
        })
    }

    /// Materialises a fresh local run for an array-valued expression and
    /// returns its ref.
    pub fn create_array_ref(&mut self, tpe: Type) -> Result<ArrayRef> {
        let base = self.add_generated_local(tpe.clone())?;
        Ok(ArrayRef {
            tpe,
            is_mutable: true,
            kind: ArrayRefKind::Local { base },
        })
    }

    // ---- load/store for whole variables ----

    /// The load sequence for a variable: one instruction per flattened cell,
    /// in ascending cell order.
    pub fn gen_load_code(&mut self, name: &str) -> Result<Vec<Instr>> {
        let info = self.get_variable(name)?;
        let cells = info.tpe.flattened_len();
        let instrs = match &info.kind {
            VarKind::Constant { instr } => vec![instr.clone()],
            VarKind::Local { index } => {
                (0..cells).map(|k| Instr::LoadLocal(index + k as u8)).collect()
            }
            VarKind::Field { index } => {
                (0..cells).map(|k| Instr::LoadField(index + k as u8)).collect()
            }
            VarKind::Template { index } => {
                (0..cells).map(|k| Instr::LoadImmField(index + k as u8)).collect()
            }
        };
        Ok(instrs)
    }

    /// The store sequence for a variable: one instruction per flattened
    /// cell, in descending cell order (the last cell is on top of stack).
    pub fn gen_store_code(&mut self, name: &str) -> Result<Vec<Instr>> {
        let info = self.get_variable(name)?;
        let cells = info.tpe.flattened_len();
        let instrs = match &info.kind {
            VarKind::Local { index } => (0..cells)
                .rev()
                .map(|k| Instr::StoreLocal(index + k as u8))
                .collect(),
            VarKind::Field { index } => (0..cells)
                .rev()
                .map(|k| Instr::StoreField(index + k as u8))
                .collect(),
            VarKind::Template { .. } | VarKind::Constant { .. } => {
                return Err(CompilerError::new(format!(
                    "Assign to immutable variable: {name}"
                )));
            }
        };
        Ok(instrs)
    }

    // ---- functions and call graphs ----

    pub fn funcs(&self) -> &[FuncInfo] {
        &self.funcs
    }

    pub fn get_func(&self, id: &FuncId) -> Result<FuncInfo> {
        self.funcs
            .iter()
            .find(|f| f.id == *id)
            .cloned()
            .ok_or_else(|| CompilerError::new(format!("Function {id} does not exist")))
    }

    pub fn add_internal_call(&mut self, callee: FuncId) {
        if let Some(caller) = self.current_func.clone() {
            self.internal_calls.entry(caller).or_default().insert(callee);
        }
    }

    pub fn add_external_call(&mut self, contract: TypeId, callee: FuncId) {
        if let Some(caller) = self.current_func.clone() {
            self.external_calls
                .entry(caller)
                .or_default()
                .insert((contract, callee));
        }
    }

    pub fn internal_calls(&self) -> &BTreeMap<FuncId, BTreeSet<FuncId>> {
        &self.internal_calls
    }

    pub fn external_calls(&self) -> &BTreeMap<FuncId, BTreeSet<(TypeId, FuncId)>> {
        &self.external_calls
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    // ---- events ----

    pub fn add_event_def(&mut self, event: &EventDef) -> Result<()> {
        if self.events.iter().any(|e| e.id == event.id) {
            return Err(CompilerError::new(format!(
                "These events are defined multiple times: {}",
                event.id
            )));
        }
        if event.fields.iter().any(|f| f.tpe.is_array()) {
            return Err(CompilerError::new(format!(
                "Array type not supported for event {}",
                event.id
            )));
        }
        if event.fields.len() > 5 {
            return Err(CompilerError::new(format!(
                "Max 5 fields allowed for event {}",
                event.id
            )));
        }
        self.events.push(event.clone());
        Ok(())
    }

    /// An event's numeric index is its declaration position.
    pub fn event_index(&self, id: &TypeId) -> Result<usize> {
        self.events
            .iter()
            .position(|e| e.id == *id)
            .ok_or_else(|| CompilerError::new(format!("Event {id} does not exist")))
    }

    pub fn event_def(&self, id: &TypeId) -> Result<&EventDef> {
        self.events
            .iter()
            .find(|e| e.id == *id)
            .ok_or_else(|| CompilerError::new(format!("Event {id} does not exist")))
    }

    // ---- warnings ----

    /// Appends a warning, deduplicated on insertion.
    pub fn warn(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Warns about function-scope variables that were never referenced.
    pub fn check_unused_local_vars(&mut self, func: &FuncId) {
        let prefix_dot = format!("{}.", func.name);
        let prefix_sub = format!("{}#", func.name);
        let mut messages = Vec::new();
        for key in &self.var_decl_order {
            if !key.starts_with(&prefix_dot) && !key.starts_with(&prefix_sub) {
                continue;
            }
            let info = &self.vars[key];
            if info.is_used || info.is_unused || info.is_generated {
                continue;
            }
            let name = key.rsplit('.').next().unwrap_or(key);
            messages.push(format!(
                "Found unused variable in {}: {}.{}",
                self.type_id, func.name, name
            ));
        }
        for message in messages {
            self.warn(message);
        }
    }

    /// Warns about contract fields that were never referenced.
    pub fn check_unused_fields(&mut self) {
        let mut messages = Vec::new();
        for key in &self.var_decl_order {
            let info = &self.vars[key];
            if !matches!(info.kind, VarKind::Field { .. }) {
                continue;
            }
            if info.is_used || info.is_unused {
                continue;
            }
            messages.push(format!("Found unused field in {}: {key}", self.type_id));
        }
        for message in messages {
            self.warn(message);
        }
    }

    /// Flattened cell count of the contract's field layout.
    pub fn field_length(&self) -> usize {
        usize::from(self.next_field)
    }
}
