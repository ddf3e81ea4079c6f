mod common;

use basalt::bytecode::{Instr, verify_methods};
use basalt::compiler::types::Type;
use basalt::{CompilerConfig, compile_asset_script, compile_contract};
use common::*;

#[test]
fn asset_script_arithmetic_lowers_to_exact_instructions() {
    let multi = single(asset_script(
        "Foo",
        vec![func(
            "bar",
            true,
            vec![arg("a", Type::U256), arg("b", Type::U256)],
            vec![Type::U256],
            vec![ret(vec![add(var("a"), var("b"))])],
        )],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    let method = &compiled.script.methods[0];
    assert_eq!(
        method.instrs,
        vec![
            Instr::LoadLocal(0),
            Instr::LoadLocal(1),
            Instr::U256Add,
            Instr::Return,
        ]
    );
    assert_eq!(method.args_length, 2);
    assert_eq!(method.locals_length, 2);
    assert_eq!(method.return_length, 1);
    assert!(compiled.warnings.is_empty());
    verify_methods(&compiled.script.methods).expect("verify");
}

fn fibonacci_u256() -> basalt::compiler::ast::MultiContract {
    single(asset_script(
        "Fib",
        vec![func(
            "fib",
            true,
            vec![arg("n", Type::U256)],
            vec![Type::U256],
            vec![if_else(
                lt(var("n"), u256(2)),
                vec![ret(vec![var("n")])],
                vec![ret(vec![add(
                    call("fib", vec![sub(var("n"), u256(1))]),
                    call("fib", vec![sub(var("n"), u256(2))]),
                )])],
            )],
        )],
    ))
}

#[test]
fn fibonacci_of_ten_is_fifty_five() {
    let compiled =
        compile_asset_script(&fibonacci_u256(), 0, &CompilerConfig::default()).expect("compile");
    verify_methods(&compiled.script.methods).expect("verify");
    let result = run_method(&compiled.script.methods, 0, vec![u256_val(10)]).expect("run");
    assert_eq!(result, vec![u256_val(55)]);
}

#[test]
fn signed_fibonacci_of_ten_is_fifty_five() {
    use basalt::bytecode::{I256, Val};
    let multi = single(asset_script(
        "Fib",
        vec![func(
            "fib",
            true,
            vec![arg("n", Type::I256)],
            vec![Type::I256],
            vec![if_else(
                lt(var("n"), i256(2)),
                vec![ret(vec![var("n")])],
                vec![ret(vec![add(
                    call("fib", vec![sub(var("n"), i256(1))]),
                    call("fib", vec![sub(var("n"), i256(2))]),
                )])],
            )],
        )],
    ));
    let compiled = compile_asset_script(&multi, 0, &CompilerConfig::default()).expect("compile");
    let result =
        run_method(&compiled.script.methods, 0, vec![Val::I256(I256::from(10))]).expect("run");
    assert_eq!(result, vec![Val::I256(I256::from(55))]);
}

#[test]
fn contract_fields_load_and_store_through_field_slots() {
    let multi = single(contract(
        "Counter",
        vec![mut_arg("count", Type::U256)],
        vec![
            func("get", true, vec![], vec![Type::U256], vec![ret(vec![var("count")])]),
            func(
                "incr",
                true,
                vec![],
                vec![],
                vec![assign("count", add(var("count"), u256(1)))],
            ),
        ],
    ));
    let compiled = compile_contract(&multi, 0, &CompilerConfig::default()).expect("compile");
    assert_eq!(compiled.contract.field_length, 1);
    assert_eq!(
        compiled.contract.methods[0].instrs,
        vec![Instr::LoadField(0), Instr::Return]
    );
    assert_eq!(
        compiled.contract.methods[1].instrs,
        vec![
            Instr::LoadField(0),
            Instr::U256Const1,
            Instr::U256Add,
            Instr::StoreField(0),
            Instr::Return,
        ]
    );
    assert!(compiled.warnings.is_empty());
}

#[test]
fn recompiling_the_same_tree_is_idempotent() {
    // Expression types are memoised on first compilation; a second run over
    // the same tree must produce identical code and warnings.
    let multi = fibonacci_u256();
    let config = CompilerConfig::default();
    let first = compile_asset_script(&multi, 0, &config).expect("compile");
    let second = compile_asset_script(&multi, 0, &config).expect("recompile");
    assert_eq!(first.script, second.script);
    assert_eq!(first.warnings, second.warnings);
}
