mod common;

use basalt::bytecode::{Instr, U256, verify_methods};
use basalt::compiler::ast::{
    ApproveAssets, Contract, EventDef, EventField, ConstantVarDef, EnumDef, EnumField, Expr,
    ExprKind, FuncId, Ident, MultiContract, Statement, TopDecl, TypeId,
};
use basalt::compiler::types::Type;
use basalt::{CompilerConfig, compile_asset_script, compile_contract};
use common::*;

fn compile_script_body(body: Vec<Statement>) -> basalt::CompiledAssetScript {
    let multi = single(asset_script(
        "Test",
        vec![func("main", true, vec![], vec![], body)],
    ));
    compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile")
}

#[test]
fn array_literal_lowers_to_flat_cells() {
    let compiled = compile_script_body(vec![
        let_def(
            "x",
            true,
            array_lit(vec![u256(1), u256(2), u256(3), u256(4)]),
        ),
        let_def("y", false, array_index(var("x"), vec![u256(0)])),
    ]);
    let method = &compiled.script.methods[0];
    assert_eq!(
        method.instrs,
        vec![
            Instr::U256Const1,
            Instr::U256Const2,
            Instr::U256Const3,
            Instr::U256Const4,
            Instr::StoreLocal(3),
            Instr::StoreLocal(2),
            Instr::StoreLocal(1),
            Instr::StoreLocal(0),
            Instr::LoadLocal(0),
            Instr::StoreLocal(4),
            Instr::Return,
        ]
    );
    assert_eq!(method.locals_length, 5);
    // `y` is never read afterwards.
    assert_eq!(
        compiled.warnings,
        vec!["Found unused variable in Test: main.y".to_string()]
    );
}

#[test]
fn array_repeat_emits_the_element_once_per_cell() {
    let compiled = compile_script_body(vec![let_def(
        "x",
        true,
        Expr::new(ExprKind::ArrayRepeat {
            elem: Box::new(u256(7)),
            len: 3,
        }),
    )]);
    let seven = Instr::U256Const(U256::from(7u64));
    assert_eq!(
        compiled.script.methods[0].instrs[..3],
        [seven.clone(), seven.clone(), seven]
    );
}

#[test]
fn multi_value_assignment_stores_in_reverse_target_order() {
    let multi = single(asset_script(
        "Test",
        vec![
            func(
                "main",
                true,
                vec![],
                vec![Type::U256, Type::U256],
                vec![
                    let_def("a", true, u256(0)),
                    let_def("b", true, u256(0)),
                    assign_multi(&["a", "b"], call("two", vec![])),
                    ret(vec![var("a"), var("b")]),
                ],
            ),
            func(
                "two",
                false,
                vec![],
                vec![Type::U256, Type::U256],
                vec![ret(vec![u256(1), u256(2)])],
            ),
        ],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    let main = &compiled.script.methods[0];
    assert_eq!(
        main.instrs[4..7],
        [Instr::CallLocal(1), Instr::StoreLocal(1), Instr::StoreLocal(0)]
    );
    let result = run_method(&compiled.script.methods, 0, vec![]).expect("run");
    assert_eq!(result, vec![u256_val(1), u256_val(2)]);
}

#[test]
fn anonymous_targets_pop_their_cells() {
    let multi = single(asset_script(
        "Test",
        vec![
            func(
                "main",
                true,
                vec![],
                vec![Type::U256],
                vec![
                    let_multi(
                        vec![named_target("a", false), basalt::compiler::ast::VarDeclTarget::Anonymous],
                        call("two", vec![]),
                    ),
                    ret(vec![var("a")]),
                ],
            ),
            func(
                "two",
                false,
                vec![],
                vec![Type::U256, Type::U256],
                vec![ret(vec![u256(1), u256(2)])],
            ),
        ],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    let main = &compiled.script.methods[0];
    assert_eq!(
        main.instrs[..3],
        [Instr::CallLocal(1), Instr::Pop, Instr::StoreLocal(0)]
    );
    let result = run_method(&compiled.script.methods, 0, vec![]).expect("run");
    assert_eq!(result, vec![u256_val(1)]);
}

#[test]
fn if_else_statement_branches_back_to_front() {
    let compiled = compile_script_body(vec![
        let_def("x", true, u256(0)),
        if_else(
            boolean(true),
            vec![assign("x", u256(1))],
            vec![assign("x", u256(2))],
        ),
    ]);
    assert_eq!(
        compiled.script.methods[0].instrs,
        vec![
            Instr::U256Const0,
            Instr::StoreLocal(0),
            Instr::BoolConst(true),
            Instr::IfFalse(3),
            Instr::U256Const1,
            Instr::StoreLocal(0),
            Instr::Jump(2),
            Instr::U256Const2,
            Instr::StoreLocal(0),
            Instr::Return,
        ]
    );
    verify_methods(&compiled.script.methods).expect("verify");
}

#[test]
fn returning_branches_skip_the_trailing_jump() {
    let multi = single(asset_script(
        "Test",
        vec![func(
            "pick",
            true,
            vec![arg("c", Type::Bool)],
            vec![Type::U256],
            vec![if_else(
                var("c"),
                vec![ret(vec![u256(1)])],
                vec![ret(vec![u256(2)])],
            )],
        )],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    let method = &compiled.script.methods[0];
    assert_eq!(
        method.instrs,
        vec![
            Instr::LoadLocal(0),
            Instr::IfFalse(2),
            Instr::U256Const1,
            Instr::Return,
            Instr::U256Const2,
            Instr::Return,
        ]
    );
    verify_methods(&compiled.script.methods).expect("verify");
    assert_eq!(
        run_method(&compiled.script.methods, 0, vec![basalt::bytecode::Val::Bool(false)]),
        Ok(vec![u256_val(2)])
    );
}

#[test]
fn while_loop_jumps_back_to_its_condition() {
    let multi = single(asset_script(
        "Test",
        vec![func(
            "main",
            true,
            vec![],
            vec![Type::U256],
            vec![
                let_def("i", true, u256(0)),
                while_loop(
                    lt(var("i"), u256(3)),
                    vec![assign("i", add(var("i"), u256(1)))],
                ),
                ret(vec![var("i")]),
            ],
        )],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    let method = &compiled.script.methods[0];
    assert_eq!(
        method.instrs,
        vec![
            Instr::U256Const0,
            Instr::StoreLocal(0),
            Instr::LoadLocal(0),
            Instr::U256Const3,
            Instr::U256Lt,
            Instr::IfFalse(5),
            Instr::LoadLocal(0),
            Instr::U256Const1,
            Instr::U256Add,
            Instr::StoreLocal(0),
            Instr::Jump(-9),
            Instr::LoadLocal(0),
            Instr::Return,
        ]
    );
    verify_methods(&compiled.script.methods).expect("verify");
    assert_eq!(run_method(&compiled.script.methods, 0, vec![]), Ok(vec![u256_val(3)]));
}

#[test]
fn negated_conditions_invert_into_if_true() {
    let compiled = compile_script_body(vec![
        let_def("x", true, u256(0)),
        while_loop(
            not(lt(u256(3), var("x"))),
            vec![assign("x", add(var("x"), u256(1)))],
        ),
    ]);
    let instrs = &compiled.script.methods[0].instrs;
    assert!(instrs.contains(&Instr::IfTrue(5)));
    assert!(!instrs.iter().any(|i| matches!(i, Instr::BoolNot)));
}

#[test]
fn for_loop_scopes_its_init_variable() {
    let multi = single(asset_script(
        "Test",
        vec![func(
            "main",
            true,
            vec![],
            vec![Type::U256],
            vec![
                let_def("s", true, u256(0)),
                Statement::ForLoop {
                    init: Box::new(let_def("i", true, u256(0))),
                    condition: lt(var("i"), u256(3)),
                    update: Box::new(assign("i", add(var("i"), u256(1)))),
                    body: vec![assign("s", add(var("s"), var("i")))],
                },
                ret(vec![var("s")]),
            ],
        )],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    verify_methods(&compiled.script.methods).expect("verify");
    assert_eq!(run_method(&compiled.script.methods, 0, vec![]), Ok(vec![u256_val(3)]));
}

#[test]
fn dynamic_array_index_loads_by_runtime_offset() {
    let multi = single(asset_script(
        "Test",
        vec![func(
            "pick",
            true,
            vec![
                arg("xs", Type::array(Type::U256, 3)),
                arg("i", Type::U256),
            ],
            vec![Type::U256],
            vec![ret(vec![array_index(var("xs"), vec![var("i")])])],
        )],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    let method = &compiled.script.methods[0];
    assert_eq!(
        method.instrs,
        vec![Instr::LoadLocal(3), Instr::LoadLocalByIndex, Instr::Return]
    );
    let args = vec![u256_val(10), u256_val(20), u256_val(30), u256_val(2)];
    assert_eq!(run_method(&compiled.script.methods, 0, args), Ok(vec![u256_val(30)]));
}

#[test]
fn nested_constant_indices_fold_to_a_flat_offset() {
    let compiled = compile_script_body(vec![
        let_def(
            "x",
            true,
            array_lit(vec![
                array_lit(vec![u256(1), u256(2)]),
                array_lit(vec![u256(3), u256(4)]),
            ]),
        ),
        let_def("y", false, array_index(var("x"), vec![u256(1), u256(0)])),
    ]);
    let instrs = &compiled.script.methods[0].instrs;
    // Cell (1, 0) of a 2x2 array is flat slot 2.
    assert_eq!(instrs[8..10], [Instr::LoadLocal(2), Instr::StoreLocal(4)]);
}

#[test]
fn sub_array_selection_loads_every_cell() {
    let compiled = compile_script_body(vec![
        let_def(
            "x",
            true,
            array_lit(vec![
                array_lit(vec![u256(1), u256(2)]),
                array_lit(vec![u256(3), u256(4)]),
            ]),
        ),
        let_def("row", false, array_index(var("x"), vec![u256(1)])),
    ]);
    let instrs = &compiled.script.methods[0].instrs;
    assert_eq!(
        instrs[8..12],
        [
            Instr::LoadLocal(2),
            Instr::LoadLocal(3),
            Instr::StoreLocal(5),
            Instr::StoreLocal(4),
        ]
    );
}

#[test]
fn if_else_expression_produces_a_value() {
    let multi = single(asset_script(
        "Test",
        vec![func(
            "pick",
            true,
            vec![arg("c", Type::Bool)],
            vec![Type::U256],
            vec![ret(vec![Expr::new(ExprKind::IfElse {
                condition: Box::new(var("c")),
                then_expr: Box::new(u256(1)),
                else_expr: Box::new(u256(2)),
            })])],
        )],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    let method = &compiled.script.methods[0];
    assert_eq!(
        method.instrs,
        vec![
            Instr::LoadLocal(0),
            Instr::IfFalse(2),
            Instr::U256Const1,
            Instr::Jump(1),
            Instr::U256Const2,
            Instr::Return,
        ]
    );
    assert_eq!(
        run_method(&compiled.script.methods, 0, vec![basalt::bytecode::Val::Bool(true)]),
        Ok(vec![u256_val(1)])
    );
}

#[test]
fn event_emission_pushes_index_then_fields() {
    let multi = single(TopDecl::Contract(Contract {
        is_abstract: false,
        id: TypeId::new("Market"),
        template_vars: vec![],
        fields: vec![],
        funcs: vec![func(
            "notify",
            true,
            vec![arg("amount", Type::U256)],
            vec![],
            vec![Statement::EmitEvent {
                id: TypeId::new("Traded"),
                args: vec![var("amount")],
            }],
        )],
        events: vec![
            EventDef {
                id: TypeId::new("Listed"),
                fields: vec![],
            },
            EventDef {
                id: TypeId::new("Traded"),
                fields: vec![EventField {
                    ident: Ident::new("amount"),
                    tpe: Type::U256,
                }],
            },
        ],
        constants: vec![],
        enums: vec![],
        inheritances: vec![],
    }));
    let compiled = compile_contract(&multi, 0, &CompilerConfig::default()).expect("compile");
    assert_eq!(
        compiled.contract.methods[0].instrs,
        vec![
            Instr::U256Const1,
            Instr::LoadLocal(0),
            Instr::Log1,
            Instr::Return,
        ]
    );
}

#[test]
fn constants_and_enum_fields_load_their_values() {
    let multi = single(TopDecl::Contract(Contract {
        is_abstract: false,
        id: TypeId::new("Shop"),
        template_vars: vec![],
        fields: vec![],
        funcs: vec![func(
            "price",
            true,
            vec![],
            vec![Type::U256],
            vec![ret(vec![add(
                var("BasePrice"),
                Expr::new(ExprKind::EnumField {
                    enum_id: TypeId::new("Tier"),
                    field: Ident::new("Gold"),
                }),
            )])],
        )],
        events: vec![],
        constants: vec![ConstantVarDef {
            ident: Ident::new("BasePrice"),
            value: u256_val(5),
        }],
        enums: vec![EnumDef {
            id: TypeId::new("Tier"),
            fields: vec![
                EnumField {
                    ident: Ident::new("Silver"),
                    value: u256_val(1),
                },
                EnumField {
                    ident: Ident::new("Gold"),
                    value: u256_val(2),
                },
            ],
        }],
        inheritances: vec![],
    }));
    let compiled = compile_contract(&multi, 0, &CompilerConfig::default()).expect("compile");
    assert_eq!(
        compiled.contract.methods[0].instrs,
        vec![
            Instr::U256Const5,
            Instr::U256Const2,
            Instr::U256Add,
            Instr::Return,
        ]
    );
}

#[test]
fn approve_asset_clauses_emit_before_the_call() {
    let approval = ApproveAssets {
        address: var("addr"),
        alph_amount: Some(var("amount")),
        tokens: vec![(var("token"), u256(4))],
    };
    let multi = single(asset_script(
        "Test",
        vec![
            func(
                "main",
                true,
                vec![
                    arg("addr", Type::Address),
                    arg("amount", Type::U256),
                    arg("token", Type::ByteVec),
                ],
                vec![],
                vec![Statement::FuncCall {
                    id: FuncId::new("pay"),
                    approve_assets: vec![approval],
                    args: vec![],
                }],
            ),
            func("pay", false, vec![], vec![], vec![]),
        ],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    // Each approval re-emits the address: alph first, then every token.
    assert_eq!(
        compiled.script.methods[0].instrs,
        vec![
            Instr::LoadLocal(0),
            Instr::LoadLocal(1),
            Instr::ApproveAlph,
            Instr::LoadLocal(0),
            Instr::LoadLocal(2),
            Instr::U256Const4,
            Instr::ApproveToken,
            Instr::CallLocal(1),
            Instr::Return,
        ]
    );
}

#[test]
fn external_calls_emit_approvals_before_lengths_and_handle() {
    let multi = MultiContract::new(vec![
        contract(
            "Caller",
            vec![],
            vec![unchecked_func(
                "main",
                true,
                vec![
                    arg("target", Type::ByteVec),
                    arg("addr", Type::Address),
                    arg("amount", Type::U256),
                ],
                vec![],
                vec![Statement::ContractCall {
                    obj: contract_conv("Callee", var("target")),
                    id: FuncId::new("f"),
                    approve_assets: vec![ApproveAssets {
                        address: var("addr"),
                        alph_amount: Some(var("amount")),
                        tokens: vec![],
                    }],
                    args: vec![],
                }],
            )],
        ),
        contract(
            "Callee",
            vec![],
            vec![unchecked_func("f", true, vec![], vec![], vec![])],
        ),
    ]);
    let compiled = compile_contract(&multi, 0, &CompilerConfig::default()).expect("compile");
    assert_eq!(
        compiled.contract.methods[0].instrs,
        vec![
            Instr::LoadLocal(1),
            Instr::LoadLocal(2),
            Instr::ApproveAlph,
            Instr::U256Const0,
            Instr::U256Const0,
            Instr::LoadLocal(0),
            Instr::CallExternal(0),
            Instr::Return,
        ]
    );
    assert!(compiled.warnings.is_empty(), "{:?}", compiled.warnings);
}

#[test]
fn statement_position_calls_pop_their_returns() {
    let multi = single(asset_script(
        "Test",
        vec![
            func(
                "main",
                true,
                vec![],
                vec![],
                vec![call_stmt("two", vec![])],
            ),
            func(
                "two",
                false,
                vec![],
                vec![Type::U256, Type::U256],
                vec![ret(vec![u256(1), u256(2)])],
            ),
        ],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    assert_eq!(
        compiled.script.methods[0].instrs,
        vec![Instr::CallLocal(1), Instr::Pop, Instr::Pop, Instr::Return]
    );
    assert_eq!(run_method(&compiled.script.methods, 0, vec![]), Ok(vec![]));
}
