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

//! The builtin dispatch table: a flat, linearly-searched list of named
//! primitives, each declaring its own arity, variadic flag, and whether
//! `eval_func` should evaluate its arguments before calling it.

use crate::context::Vm;
use crate::eval::{self, eval_body_sequence, eval_func, eval_internal, expect_type, validate_param_list};
use crate::eval_context::{EvalContext, SExprType};
use crate::gc::Rooted;
use crate::value::SExpr;

pub struct BuiltinDef {
    pub name: &'static [u8],
    pub variadic: bool,
    pub arg_count: usize,
    pub eval_args: bool,
    pub func: fn(&mut Vm, &mut EvalContext, SExpr) -> Result<SExpr, ()>,
}

/// Linear lookup by name, same shape as the evaluator's own dispatch: the
/// table is small enough that a scan beats the bookkeeping of a hash map.
pub fn lookup(name: &[u8]) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Warms the symbol-interning cache with names the table itself produces,
/// so the first `if`, `define`, or `or` in a session isn't what pays for
/// allocating them.
pub fn install(vm: &mut Vm) {
    const NAMES: [&[u8]; 4] = [b"t", b"function", b"lambda", b"begin"];
    for name in NAMES {
        vm.intern_symbol(name);
    }
}

fn truthy(vm: &mut Vm, cond: bool) -> SExpr {
    if cond {
        vm.intern_symbol(b"t")
    } else {
        SExpr::NIL
    }
}

fn sexpr_type_of(v: SExpr) -> SExprType {
    if v.is_symbol() {
        SExprType::Symbol
    } else if v.is_string() {
        SExprType::String
    } else if v.is_number() {
        SExprType::Number
    } else {
        SExprType::Cons
    }
}

fn two_numbers(ctx: &mut EvalContext, args: SExpr) -> Result<(f64, f64), ()> {
    let a0 = args.car();
    let a1 = args.cdr().car();
    let r0 = expect_type(ctx, a0, 0, SExprType::Number);
    let r1 = expect_type(ctx, a1, 1, SExprType::Number);
    if r0.is_err() || r1.is_err() {
        return Err(());
    }
    Ok((a0.number(), a1.number()))
}

/// The source's documented equality policy for numbers: `|a-b| < a*b*1e-6`.
/// This is zero (never equal unless bit-identical) whenever either operand
/// is zero, and can go negative when the operands have opposite signs —
/// preserved as-is rather than replaced with a symmetric tolerance.
fn eq_bool(ctx: &mut EvalContext, args: SExpr) -> Result<bool, ()> {
    let a = args.car();
    let b = args.cdr().car();
    if a.is_symbol() && b.is_symbol() {
        Ok(a.bytes() == b.bytes())
    } else if a.is_string() && b.is_string() {
        Ok(a.bytes() == b.bytes())
    } else if a.is_number() && b.is_number() {
        let (va, vb) = (a.number(), b.number());
        let precision = va * vb * 1e-6;
        Ok((va - vb).abs() < precision)
    } else if a.is_cons() || b.is_cons() {
        ctx.illegal_call(args);
        Err(())
    } else {
        ctx.invalid_type(1, b, sexpr_type_of(a));
        Err(())
    }
}

fn b_nil_p(vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    Ok(truthy(vm, args.car().is_nil()))
}

fn b_symbol_p(vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    Ok(truthy(vm, args.car().is_symbol()))
}

fn b_string_p(vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    Ok(truthy(vm, args.car().is_string()))
}

fn b_number_p(vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    Ok(truthy(vm, args.car().is_number()))
}

fn b_list_p(vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    Ok(truthy(vm, args.car().is_cons()))
}

fn b_sexp_to_bool(vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    Ok(truthy(vm, !args.car().is_nil()))
}

fn b_cons(vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    Ok(vm.cons(args.car(), args.cdr().car()))
}

fn b_add(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let (a, b) = two_numbers(ctx, args)?;
    Ok(vm.make_number(a + b))
}

fn b_sub(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let (a, b) = two_numbers(ctx, args)?;
    Ok(vm.make_number(a - b))
}

fn b_mul(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let (a, b) = two_numbers(ctx, args)?;
    Ok(vm.make_number(a * b))
}

fn b_div(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let (a, b) = two_numbers(ctx, args)?;
    Ok(vm.make_number(a / b))
}

/// `a % b` is the fractional part of `a/b` scaled back by `b` — not the
/// usual `fmod`. If `a/b` isn't a normal float (zero, infinite, subnormal,
/// or NaN) that value is returned unchanged rather than run through `fract`.
fn b_mod(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let (a, b) = two_numbers(ctx, args)?;
    let dividend = a / b;
    if !dividend.is_normal() {
        return Ok(vm.make_number(dividend));
    }
    Ok(vm.make_number(dividend.fract() * b))
}

fn b_lt(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let (a, b) = two_numbers(ctx, args)?;
    Ok(truthy(vm, a < b))
}

fn b_gt(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let (a, b) = two_numbers(ctx, args)?;
    Ok(truthy(vm, a > b))
}

fn b_lte(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let (a, b) = two_numbers(ctx, args)?;
    Ok(truthy(vm, a <= b))
}

fn b_gte(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let (a, b) = two_numbers(ctx, args)?;
    Ok(truthy(vm, a >= b))
}

fn b_eq(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let eq = eq_bool(ctx, args)?;
    Ok(truthy(vm, eq))
}

fn b_neq(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let eq = eq_bool(ctx, args)?;
    Ok(truthy(vm, !eq))
}

fn b_not(vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    Ok(truthy(vm, args.car().is_nil()))
}

/// True for a `('function ...)` tagged list, the shape `b_function` and
/// `b_define` produce — `car`/`cdr` must reject these as not plain conses
/// so that function values stay opaque.
fn is_function_value(v: SExpr) -> bool {
    v.is_cons() && v.car().symbol_eq(b"function")
}

fn b_car(_vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let a0 = args.car();
    if !a0.is_cons() || is_function_value(a0) {
        ctx.invalid_type(0, a0, SExprType::Cons);
        return Err(());
    }
    Ok(a0.car())
}

fn b_cdr(_vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let a0 = args.car();
    if !a0.is_cons() || is_function_value(a0) {
        ctx.invalid_type(0, a0, SExprType::Cons);
        return Err(());
    }
    Ok(a0.cdr())
}

fn b_quote(_vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    Ok(args.car())
}

fn b_set(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let name = args.car();
    if !name.is_symbol() {
        ctx.invalid_type(0, name, SExprType::Symbol);
        return Err(());
    }
    let value_expr = args.cdr().car();
    let name_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, name.0);
    let value = eval_internal(vm, ctx, value_expr)?;
    let value_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, value.0);
    vm.vars.set(&mut vm.gc, &vm.types.sexpr, SExpr(name_root.raw()), SExpr(value_root.raw()));
    Ok(SExpr(value_root.raw()))
}

/// Binds into the nearest enclosing real scope — `let`'s own frame is
/// transparent, so this always reaches past it to the caller's frame (or,
/// at the top level, the global variable environment).
fn b_let(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let name = args.car();
    if !name.is_symbol() {
        ctx.invalid_type(0, name, SExprType::Symbol);
        return Err(());
    }
    let value_expr = args.cdr().car();
    let name_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, name.0);
    let value = eval_internal(vm, ctx, value_expr)?;
    let value_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, value.0);
    let bound = ctx.bind_nearest_valid(&mut vm.gc, &vm.types.sexpr, SExpr(name_root.raw()), SExpr(value_root.raw()));
    if bound.is_none() {
        vm.vars.set(&mut vm.gc, &vm.types.sexpr, SExpr(name_root.raw()), SExpr(value_root.raw()));
    }
    Ok(SExpr(value_root.raw()))
}

fn b_and(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let a0 = args.car();
    let a1 = args.cdr().car();
    let a1_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, a1.0);
    let first = eval_internal(vm, ctx, a0)?;
    if first.is_nil() {
        return Ok(SExpr::NIL);
    }
    eval_internal(vm, ctx, SExpr(a1_root.raw()))
}

fn b_or(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let a0 = args.car();
    let a1 = args.cdr().car();
    let a1_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, a1.0);
    let first = eval_internal(vm, ctx, a0)?;
    if !first.is_nil() {
        return Ok(vm.intern_symbol(b"t"));
    }
    eval_internal(vm, ctx, SExpr(a1_root.raw()))
}

fn b_if(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let a0 = args.car();
    let a1 = args.cdr().car();
    let a2 = args.cdr().cdr().car();
    let a1_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, a1.0);
    let a2_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, a2.0);
    let cond = eval_internal(vm, ctx, a0)?;
    if !cond.is_nil() {
        eval_internal(vm, ctx, SExpr(a1_root.raw()))
    } else {
        eval_internal(vm, ctx, SExpr(a2_root.raw()))
    }
}

fn b_lambda(vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let tag = vm.intern_symbol(b"lambda");
    Ok(vm.cons(tag, args))
}

/// Resolves `name` to a callable function value: a user-defined function's
/// stored value is already the tagged `(function id params body)` list;
/// a builtin gets wrapped into the same shape with empty params/body, a
/// placeholder that `funcall` never has to unpack since it dispatches
/// builtins by name directly rather than through this structure.
fn b_function(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let name = args.car();
    if !name.is_symbol() {
        ctx.invalid_type(0, name, SExprType::Symbol);
        return Err(());
    }
    if let Some(stored) = vm.funcs.lookup(name) {
        return Ok(stored);
    }
    if lookup(name.bytes()).is_none() {
        ctx.symbol_lookup_failed(name);
        return Err(());
    }
    let name_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, name.0);
    let tag = vm.intern_symbol(b"function");
    let tag_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, tag.0);
    let inner = vm.cons(SExpr::NIL, SExpr::NIL);
    let params_and_body = vm.cons(SExpr::NIL, inner);
    let tail = vm.cons(SExpr(name_root.raw()), params_and_body);
    Ok(vm.cons(SExpr(tag_root.raw()), tail))
}

/// `begin`'s own frame is transparent, same as `let`'s, so any `set`/`let`
/// inside its forms binds into the caller's scope rather than a scope that
/// vanishes the moment `begin` returns.
fn b_begin(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    if args.is_nil() {
        ctx.erronous_arg_count(1, args);
        return Err(());
    }
    eval_body_sequence(vm, ctx, args)
}

fn b_cond(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let args_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, args.0);
    let mut index = 0usize;
    loop {
        let cur = SExpr(args_root.raw());
        if cur.is_nil() {
            ctx.illegal_call(args);
            return Err(());
        }
        let pair = cur.car();
        if !pair.is_pair() {
            ctx.cond_arg_not_pair(index, pair);
            return Err(());
        }
        let test = pair.car();
        let expr = pair.cdr().car();
        let expr_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, expr.0);
        let test_val = eval_internal(vm, ctx, test)?;
        if !test_val.is_nil() {
            return eval_internal(vm, ctx, SExpr(expr_root.raw()));
        }
        args_root.set_raw(SExpr(args_root.raw()).cdr().0);
        index += 1;
    }
}

/// `(define name (params) body-forms...)` stores `(function name params
/// (begin body-forms...))` in the function environment. Wrapping the body
/// in `begin` is what lets a definition have more than one form even
/// though a function's own `body` slot is always a single expression.
fn b_define(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let len = match args.list_len() {
        Ok(n) => n,
        Err(idx) => {
            ctx.dotted_arg_list(idx, args);
            return Err(());
        }
    };
    if len < 3 {
        ctx.erronous_arg_count(3, args);
        return Err(());
    }

    let args_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, args.0);

    let name = SExpr(args_root.raw()).car();
    if !name.is_symbol() {
        ctx.invalid_type(0, name, SExprType::Symbol);
        return Err(());
    }
    let params = SExpr(args_root.raw()).cdr().car();
    validate_param_list(ctx, params)?;

    let name_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, name.0);
    let params_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, params.0);

    let begin_sym = vm.intern_symbol(b"begin");
    let begin_sym_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, begin_sym.0);
    let body_forms = SExpr(args_root.raw()).cdr().cdr();
    let body = vm.cons(SExpr(begin_sym_root.raw()), body_forms);
    let body_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, body.0);

    let func_tag = vm.intern_symbol(b"function");
    let func_tag_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, func_tag.0);

    let body_singleton = vm.cons(SExpr(body_root.raw()), SExpr::NIL);
    let params_and_body = vm.cons(SExpr(params_root.raw()), body_singleton);
    let name_and_rest = vm.cons(SExpr(name_root.raw()), params_and_body);
    let function_value = vm.cons(SExpr(func_tag_root.raw()), name_and_rest);

    vm.funcs.set(&mut vm.gc, &vm.types.sexpr, SExpr(name_root.raw()), function_value);
    Ok(SExpr::NIL)
}

/// Dispatches `name` exactly the way a direct `(name ...)` call would —
/// builtin table first, then the function environment — so builtins are
/// just as callable through `funcall` as user-defined functions are.
fn b_funcall(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    if args.is_nil() {
        ctx.erronous_arg_count(1, args);
        return Err(());
    }
    let name = args.car();
    if !name.is_symbol() {
        ctx.invalid_type(0, name, SExprType::Symbol);
        return Err(());
    }
    let rest = args.cdr();
    if let Some(def) = lookup(name.bytes()) {
        return eval_func(vm, ctx, name, SExpr::NIL, Some(def), rest);
    }
    match vm.funcs.lookup(name) {
        Some(function_value) => {
            let def = function_value.cdr().cdr();
            eval_func(vm, ctx, name, def, None, rest)
        }
        None => {
            ctx.symbol_lookup_failed(name);
            Err(())
        }
    }
}

fn b_eval(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    eval_internal(vm, ctx, args.car())
}

fn b_print(_vm: &mut Vm, _ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    let arg0 = args.car();
    println!("{}", arg0);
    Ok(arg0)
}

static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef { name: b"nil?", variadic: false, arg_count: 1, eval_args: true, func: b_nil_p },
    BuiltinDef { name: b"symbol?", variadic: false, arg_count: 1, eval_args: true, func: b_symbol_p },
    BuiltinDef { name: b"string?", variadic: false, arg_count: 1, eval_args: true, func: b_string_p },
    BuiltinDef { name: b"number?", variadic: false, arg_count: 1, eval_args: true, func: b_number_p },
    BuiltinDef { name: b"list?", variadic: false, arg_count: 1, eval_args: true, func: b_list_p },
    BuiltinDef { name: b"sexp_to_bool", variadic: false, arg_count: 1, eval_args: true, func: b_sexp_to_bool },
    BuiltinDef { name: b"cons", variadic: false, arg_count: 2, eval_args: true, func: b_cons },
    BuiltinDef { name: b"add", variadic: false, arg_count: 2, eval_args: true, func: b_add },
    BuiltinDef { name: b"sub", variadic: false, arg_count: 2, eval_args: true, func: b_sub },
    BuiltinDef { name: b"mul", variadic: false, arg_count: 2, eval_args: true, func: b_mul },
    BuiltinDef { name: b"div", variadic: false, arg_count: 2, eval_args: true, func: b_div },
    BuiltinDef { name: b"mod", variadic: false, arg_count: 2, eval_args: true, func: b_mod },
    BuiltinDef { name: b"+", variadic: false, arg_count: 2, eval_args: true, func: b_add },
    BuiltinDef { name: b"-", variadic: false, arg_count: 2, eval_args: true, func: b_sub },
    BuiltinDef { name: b"*", variadic: false, arg_count: 2, eval_args: true, func: b_mul },
    BuiltinDef { name: b"/", variadic: false, arg_count: 2, eval_args: true, func: b_div },
    BuiltinDef { name: b"%", variadic: false, arg_count: 2, eval_args: true, func: b_mod },
    BuiltinDef { name: b"lt", variadic: false, arg_count: 2, eval_args: true, func: b_lt },
    BuiltinDef { name: b"gt", variadic: false, arg_count: 2, eval_args: true, func: b_gt },
    BuiltinDef { name: b"lte", variadic: false, arg_count: 2, eval_args: true, func: b_lte },
    BuiltinDef { name: b"gte", variadic: false, arg_count: 2, eval_args: true, func: b_gte },
    BuiltinDef { name: b"eq", variadic: false, arg_count: 2, eval_args: true, func: b_eq },
    BuiltinDef { name: b"not", variadic: false, arg_count: 1, eval_args: true, func: b_not },
    BuiltinDef { name: b"<", variadic: false, arg_count: 2, eval_args: true, func: b_lt },
    BuiltinDef { name: b">", variadic: false, arg_count: 2, eval_args: true, func: b_gt },
    BuiltinDef { name: b"<=", variadic: false, arg_count: 2, eval_args: true, func: b_lte },
    BuiltinDef { name: b">=", variadic: false, arg_count: 2, eval_args: true, func: b_gte },
    BuiltinDef { name: b"==", variadic: false, arg_count: 2, eval_args: true, func: b_eq },
    BuiltinDef { name: b"!=", variadic: false, arg_count: 2, eval_args: true, func: b_neq },
    BuiltinDef { name: b"!", variadic: false, arg_count: 1, eval_args: true, func: b_not },
    BuiltinDef { name: b"car", variadic: false, arg_count: 1, eval_args: true, func: b_car },
    BuiltinDef { name: b"cdr", variadic: false, arg_count: 1, eval_args: true, func: b_cdr },
    BuiltinDef { name: b"eval", variadic: false, arg_count: 1, eval_args: true, func: b_eval },
    BuiltinDef { name: b"print", variadic: false, arg_count: 1, eval_args: true, func: b_print },
    BuiltinDef { name: b"quote", variadic: false, arg_count: 1, eval_args: false, func: b_quote },
    BuiltinDef { name: b"set", variadic: false, arg_count: 2, eval_args: false, func: b_set },
    BuiltinDef { name: b"and", variadic: false, arg_count: 2, eval_args: false, func: b_and },
    BuiltinDef { name: b"or", variadic: false, arg_count: 2, eval_args: false, func: b_or },
    BuiltinDef { name: b"if", variadic: false, arg_count: 3, eval_args: false, func: b_if },
    BuiltinDef { name: b"lambda", variadic: false, arg_count: 2, eval_args: false, func: b_lambda },
    BuiltinDef { name: b"function", variadic: false, arg_count: 1, eval_args: false, func: b_function },
    BuiltinDef { name: b"let", variadic: false, arg_count: 2, eval_args: false, func: b_let },
    BuiltinDef { name: b"begin", variadic: true, arg_count: 0, eval_args: false, func: b_begin },
    BuiltinDef { name: b"cond", variadic: true, arg_count: 0, eval_args: false, func: b_cond },
    BuiltinDef { name: b"define", variadic: true, arg_count: 0, eval_args: false, func: b_define },
    BuiltinDef { name: b"funcall", variadic: true, arg_count: 0, eval_args: false, func: b_funcall },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn eval_str(vm: &mut Vm, src: &str) -> Result<SExpr, EvalContext> {
        let mut parser = Parser::new(src.as_bytes());
        let sexpr = parser.next(vm).expect("expected one form").expect("expected no parse errors");
        vm.eval(sexpr)
    }

    #[test]
    fn lookup_finds_both_long_and_symbolic_names() {
        assert!(lookup(b"add").is_some());
        assert!(lookup(b"+").is_some());
        assert!(lookup(b"nonexistent").is_none());
    }

    #[test]
    fn arithmetic_and_mod() {
        let mut vm = Vm::new();
        assert_eq!(eval_str(&mut vm, "(+ 3 4)").unwrap().number(), 7.0);
        assert_eq!(eval_str(&mut vm, "(% 7 2)").unwrap().number(), 1.0);
    }

    #[test]
    fn eq_uses_relative_tolerance() {
        let mut vm = Vm::new();
        let r = eval_str(&mut vm, "(== 1.0 1.0000001)").unwrap();
        assert!(!r.is_nil());
    }

    #[test]
    fn zero_operand_equality_is_never_true() {
        let mut vm = Vm::new();
        let r = eval_str(&mut vm, "(== 0 0)").unwrap();
        assert!(r.is_nil(), "the source's tolerance formula is zero whenever an operand is zero");
    }

    #[test]
    fn cond_picks_first_truthy_branch() {
        let mut vm = Vm::new();
        let r = eval_str(&mut vm, "(cond ((< 3 2) 'a) ((< 2 3) 'b) ('t 'c))").unwrap();
        assert_eq!(format!("{}", r), "b");
    }

    #[test]
    fn cond_with_no_match_is_illegal_call() {
        let mut vm = Vm::new();
        let err = eval_str(&mut vm, "(cond ((nil? 1) 'a))").unwrap_err();
        assert!(format!("{}", err).contains("not callable"));
    }

    #[test]
    fn let_and_set_combine() {
        let mut vm = Vm::new();
        eval_str(&mut vm, "(let x 5)").unwrap();
        eval_str(&mut vm, "(set y 10)").unwrap();
        let r = eval_str(&mut vm, "(+ x y)").unwrap();
        assert_eq!(r.number(), 15.0);
    }

    #[test]
    fn define_with_multi_form_body_uses_last_value() {
        let mut vm = Vm::new();
        eval_str(&mut vm, "(define twice (n) (set ignored n) (* n 2))").unwrap();
        let r = eval_str(&mut vm, "(twice 21)").unwrap();
        assert_eq!(r.number(), 42.0);
    }

    #[test]
    fn funcall_reaches_builtins_and_user_functions() {
        let mut vm = Vm::new();
        assert_eq!(eval_str(&mut vm, "(funcall 'add 1 2)").unwrap().number(), 3.0);
        eval_str(&mut vm, "(define sq (n) (* n n))").unwrap();
        assert_eq!(eval_str(&mut vm, "(funcall 'sq 5)").unwrap().number(), 25.0);
    }

    #[test]
    fn and_or_short_circuit() {
        let mut vm = Vm::new();
        assert!(eval_str(&mut vm, "(and () (/ 1 0))").unwrap().is_nil());
        assert_eq!(format!("{}", eval_str(&mut vm, "(or 't (/ 1 0))").unwrap()), "t");
    }

    #[test]
    fn car_and_cdr_reject_function_values_as_opaque() {
        // `function`'s argument is not evaluated, so the bare symbol names
        // the function directly; no quoting needed (or wanted).
        let mut vm = Vm::new();
        eval_str(&mut vm, "(define sq (n) (* n n))").unwrap();
        let err = eval_str(&mut vm, "(car (function sq))").unwrap_err();
        assert!(format!("{}", err).contains("expected cons"));
        let err = eval_str(&mut vm, "(cdr (function sq))").unwrap_err();
        assert!(format!("{}", err).contains("expected cons"));
    }

    #[test]
    fn car_and_cdr_still_work_on_plain_conses() {
        let mut vm = Vm::new();
        assert_eq!(eval_str(&mut vm, "(car '(1 2 3))").unwrap().number(), 1.0);
        assert_eq!(eval_str(&mut vm, "(car (cdr '(1 2 3)))").unwrap().number(), 2.0);
    }
}
