// Copyright 2024 The lispr Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end scenarios driven through the public `Vm`/`Parser` API, the
//! same path the `lisp` binary takes.

use lispr::context::Vm;
use lispr::parser::Parser;

fn eval_all(vm: &mut Vm, source: &str) -> Vec<Result<lispr::SExpr, lispr::EvalContext>> {
    let mut parser = Parser::new(source.as_bytes());
    let mut results = Vec::new();
    while let Some(form) = parser.next(vm) {
        let sexpr = match form {
            Ok(v) => v,
            Err(e) => panic!("unexpected parse error: {:?}", e),
        };
        results.push(vm.eval(sexpr));
    }
    results
}

fn expect_ok(result: Result<lispr::SExpr, lispr::EvalContext>) -> lispr::SExpr {
    match result {
        Ok(v) => v,
        Err(e) => panic!("expected evaluation to succeed, got: {}", e),
    }
}

fn expect_err(result: Result<lispr::SExpr, lispr::EvalContext>) -> lispr::EvalContext {
    match result {
        Ok(_) => panic!("expected evaluation to fail"),
        Err(e) => e,
    }
}

fn eval_last(vm: &mut Vm, source: &str) -> lispr::SExpr {
    expect_ok(eval_all(vm, source).pop().expect("at least one form"))
}

#[test]
fn arithmetic_round_trips_through_the_parser() {
    let mut vm = Vm::new();
    assert_eq!(eval_last(&mut vm, "(+ 1 2)").number(), 3.0);
    assert_eq!(eval_last(&mut vm, "(* 3 4)").number(), 12.0);
    assert_eq!(eval_last(&mut vm, "(+ 2 3)").number(), eval_last(&mut vm, "(+ 3 2)").number());
    assert_eq!(eval_last(&mut vm, "(* 2 3)").number(), eval_last(&mut vm, "(* 3 2)").number());
}

#[test]
fn fibonacci_via_define_and_recursion() {
    let mut vm = Vm::new();
    eval_last(&mut vm, "(define fib (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))");
    assert_eq!(eval_last(&mut vm, "(fib 10)").number(), 55.0);
}

#[test]
fn let_and_set_share_the_top_level_scope() {
    let mut vm = Vm::new();
    eval_last(&mut vm, "(let x 5)");
    eval_last(&mut vm, "(set y 10)");
    assert_eq!(eval_last(&mut vm, "(+ x y)").number(), 15.0);
}

#[test]
fn lambda_values_apply_through_funcall() {
    let mut vm = Vm::new();
    eval_last(&mut vm, "(define double (n) (* n 2))");
    assert_eq!(eval_last(&mut vm, "(funcall 'double 21)").number(), 42.0);
}

#[test]
fn cond_picks_the_first_truthy_clause() {
    let mut vm = Vm::new();
    let result = eval_last(
        &mut vm,
        "(cond ((< 1 0) 'never) ((< 0 1) 'first) ((< 0 2) 'second))",
    );
    assert_eq!(result.bytes(), b"first");
}

#[test]
fn cons_car_cdr_preserve_insertion_order() {
    let mut vm = Vm::new();
    let list = eval_last(&mut vm, "(cons 1 (cons 2 (cons 3 ())))");
    assert_eq!(list.car().number(), 1.0);
    assert_eq!(list.cdr().car().number(), 2.0);
    assert_eq!(list.cdr().cdr().car().number(), 3.0);
    assert!(list.cdr().cdr().cdr().is_nil());
}

#[test]
fn quote_is_the_identity_of_parsing() {
    let mut vm = Vm::new();
    let quoted = eval_last(&mut vm, "'(a b c)");
    assert_eq!(quoted.car().bytes(), b"a");
    assert_eq!(quoted.cdr().car().bytes(), b"b");
}

#[test]
fn wrong_arg_type_reports_arg_invalid_type() {
    let mut vm = Vm::new();
    let mut results = eval_all(&mut vm, "(+ 1 'a)");
    let err = expect_err(results.remove(0));
    assert!(format!("{}", err).contains("wrong type for argument"));
}

#[test]
fn calling_an_undefined_name_is_an_illegal_call_with_a_one_frame_backtrace() {
    let mut vm = Vm::new();
    let mut results = eval_all(&mut vm, "(undefined-name 1 2)");
    let err = expect_err(results.remove(0));
    let rendered = format!("{}", err);
    assert!(rendered.contains("not callable"));
    assert!(rendered.contains("1: <script>"));
}

#[test]
fn invalid_escape_in_a_string_literal_is_a_parse_error() {
    let mut vm = Vm::new();
    let mut parser = Parser::new(br#"(print "\q")"#);
    let result = parser.next(&mut vm).expect("one form present");
    let errors = match result {
        Ok(_) => panic!("expected a parse error"),
        Err(e) => e,
    };
    assert!(format!("{}", errors.render(br#"(print "\q")"#)).contains("invalid escape"));
}

#[test]
fn deeply_recursive_call_reports_max_stack_depth_instead_of_aborting() {
    let mut vm = Vm::new();
    eval_last(&mut vm, "(define loop (n) (loop (+ n 1)))");
    let mut results = eval_all(&mut vm, "(loop 0)");
    let err = expect_err(results.remove(0));
    assert!(format!("{}", err).contains("maximum recursion depth"));
}
