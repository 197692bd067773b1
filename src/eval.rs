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

//! The evaluator: one recursive `eval_internal`, and `eval_func`, the
//! single dispatcher both builtins and user-defined functions go through.
//!
//! A user function value is a tagged list `(function id params body)`; the
//! `id` slot exists so the function's own name shows up in backtraces even
//! though the value itself carries no name. `def` passed around here is
//! always the `(params . (body . nil))` tail shared by both that stored
//! shape and a bare `(lambda (params) body)` form — `body` is always a
//! single form; `define`'s multi-form bodies arrive already wrapped in a
//! `begin`.

use crate::builtin::{self, BuiltinDef};
use crate::context::Vm;
use crate::environment::Environment;
use crate::eval_context::{EvalContext, SExprType, MAX_STACK_DEPTH};
use crate::gc::Rooted;
use crate::value::SExpr;

pub fn eval_internal(vm: &mut Vm, ctx: &mut EvalContext, sexpr: SExpr) -> Result<SExpr, ()> {
    if sexpr.is_nil() {
        return Ok(SExpr::NIL);
    }
    if sexpr.is_number() || sexpr.is_string() {
        return Ok(sexpr);
    }
    if sexpr.is_symbol() {
        return match lookup_symbol(vm, ctx, sexpr) {
            Some(v) => Ok(v),
            None => {
                ctx.symbol_lookup_failed(sexpr);
                Err(())
            }
        };
    }

    if ctx.stack_depth() >= MAX_STACK_DEPTH {
        ctx.max_stack_depth_reached(sexpr);
        return Err(());
    }

    let head = sexpr.car();
    let args = sexpr.cdr();

    if head.is_symbol() {
        if let Some(def) = builtin::lookup(head.bytes()) {
            return eval_func(vm, ctx, head, SExpr::NIL, Some(def), args);
        }
        return match vm.funcs.lookup(head) {
            Some(function_value) => {
                let def = function_value.cdr().cdr();
                eval_func(vm, ctx, head, def, None, args)
            }
            None => {
                ctx.illegal_call(sexpr);
                Err(())
            }
        };
    }

    if head.is_pair() && head.car().symbol_eq(b"lambda") {
        let def = head.cdr();
        return eval_func(vm, ctx, head, def, None, args);
    }

    ctx.illegal_call(sexpr);
    Err(())
}

fn lookup_symbol(vm: &Vm, ctx: &EvalContext, sym: SExpr) -> Option<SExpr> {
    ctx.lookup_in_frames(sym).or_else(|| vm.vars.lookup(sym))
}

/// Validates a `(params body)` definition: `params` must be a proper list
/// of symbols and the definition must have exactly two elements — `body`
/// is a single form (a multi-form function body arrives pre-wrapped in a
/// `begin` by `define`). Returns `(params, body)` on success.
pub(crate) fn validate_function_def(ctx: &mut EvalContext, def: SExpr) -> Result<(SExpr, SExpr), ()> {
    let len = match def.list_len() {
        Ok(n) => n,
        Err(idx) => {
            ctx.dotted_arg_list(idx, def);
            return Err(());
        }
    };
    if len != 2 {
        ctx.erronous_arg_count(2, def);
        return Err(());
    }
    let params = def.car();
    let body = def.cdr().car();
    validate_param_list(ctx, params)?;
    Ok((params, body))
}

/// Checks that `params` is a proper list containing only symbols — shared
/// by function/lambda definitions and `define`'s own parameter list.
pub(crate) fn validate_param_list(ctx: &mut EvalContext, params: SExpr) -> Result<(), ()> {
    let mut p = params;
    let mut index = 0usize;
    loop {
        if p.is_nil() {
            return Ok(());
        }
        if !p.is_cons() {
            ctx.dotted_arg_list(index, params);
            return Err(());
        }
        if !p.car().is_symbol() {
            ctx.invalid_arg_def_type(index, p.car());
            return Err(());
        }
        p = p.cdr();
        index += 1;
    }
}

fn eval_arguments(vm: &mut Vm, ctx: &mut EvalContext, args: SExpr) -> Result<SExpr, ()> {
    if args.is_nil() {
        return Ok(SExpr::NIL);
    }
    // `args` is rooted for the whole call: evaluating its head can itself
    // allocate (and collect), so its tail must be re-read afterward rather
    // than relying on a copy of the pointer taken before that happened.
    let args_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, args.0);
    let head_val = eval_internal(vm, ctx, SExpr(args_root.raw()).car())?;
    let head_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, head_val.0);
    let rest = eval_arguments(vm, ctx, SExpr(args_root.raw()).cdr())?;
    let rest_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, rest.0);
    Ok(vm.cons(SExpr(head_root.raw()), SExpr(rest_root.raw())))
}

/// The one place every call — builtin or user function — goes through:
/// pushes a frame, checks arity against the argument list's actual length,
/// evaluates arguments left to right unless the callee opted out, then
/// either runs the builtin's function pointer or binds parameters and
/// evaluates the body. The frame is always popped on the way out, though
/// `pop_frame` itself becomes a no-op once an error has been recorded, so
/// that the backtrace reflects the call stack at the moment of failure.
pub fn eval_func(
    vm: &mut Vm,
    ctx: &mut EvalContext,
    id: SExpr,
    def: SExpr,
    builtin: Option<&'static BuiltinDef>,
    args: SExpr,
) -> Result<SExpr, ()> {
    ctx.push_frame(&mut vm.gc, id, SExpr::NIL, false);

    let arg_count = match args.list_len() {
        Ok(n) => n,
        Err(idx) => {
            ctx.dotted_arg_list(idx, args);
            ctx.pop_frame();
            return Err(());
        }
    };

    let (eval_args, variadic, var_count, params_root, body_root) = if let Some(b) = builtin {
        (b.eval_args, b.variadic, b.arg_count, None, None)
    } else {
        match validate_function_def(ctx, def) {
            Ok((params, body)) => {
                let var_count = params.list_len().unwrap_or(0);
                // Rooted now, before `eval_arguments` runs below — that
                // call can allocate and relocate them, and these are our
                // only reference to where the def lives in memory.
                let params_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, params.0);
                let body_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, body.0);
                (true, false, var_count, Some(params_root), Some(body_root))
            }
            Err(()) => {
                ctx.pop_frame();
                return Err(());
            }
        }
    };

    if var_count != arg_count && !variadic {
        ctx.erronous_arg_count(var_count, args);
        ctx.pop_frame();
        return Err(());
    }

    let evaluated = if eval_args {
        match eval_arguments(vm, ctx, args) {
            Ok(v) => v,
            Err(()) => {
                ctx.pop_frame();
                return Err(());
            }
        }
    } else {
        args
    };
    let evaluated_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, evaluated.0);

    let result = if let Some(b) = builtin {
        (b.func)(vm, ctx, SExpr(evaluated_root.raw()))
    } else {
        apply_user_function(
            vm,
            ctx,
            SExpr(params_root.unwrap().raw()),
            SExpr(body_root.unwrap().raw()),
            SExpr(evaluated_root.raw()),
        )
    };

    ctx.pop_frame();
    result
}

fn apply_user_function(
    vm: &mut Vm,
    ctx: &mut EvalContext,
    params: SExpr,
    body: SExpr,
    args: SExpr,
) -> Result<SExpr, ()> {
    let mut local = Environment::new(&mut vm.gc, &vm.types.sexpr);
    let p_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, params.0);
    let a_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, args.0);
    let body_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, body.0);
    loop {
        let p = SExpr(p_root.raw());
        if p.is_nil() {
            break;
        }
        let a = SExpr(a_root.raw());
        local.set(&mut vm.gc, &vm.types.sexpr, p.car(), a.car());
        p_root.set_raw(SExpr(p_root.raw()).cdr().0);
        a_root.set_raw(SExpr(a_root.raw()).cdr().0);
    }
    ctx.set_frame_env(local.list(), true);
    eval_internal(vm, ctx, SExpr(body_root.raw()))
}

/// Evaluates each form in `body` in order, returning the last one's value
/// (or nil for an empty body). Shared by user function application and the
/// `let`/`begin` control-flow builtins.
pub(crate) fn eval_body_sequence(vm: &mut Vm, ctx: &mut EvalContext, body: SExpr) -> Result<SExpr, ()> {
    let body_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, body.0);
    let mut result = SExpr::NIL;
    loop {
        let cur = SExpr(body_root.raw());
        if cur.is_nil() {
            break;
        }
        result = eval_internal(vm, ctx, cur.car())?;
        body_root.set_raw(SExpr(body_root.raw()).cdr().0);
    }
    Ok(result)
}

/// Type-checks `sexpr` against `expected`, recording `ArgInvalidType` and
/// returning `Err` if it doesn't match. `arg_index` is the position this
/// argument occupies in the call for diagnostic purposes.
pub fn expect_type(ctx: &mut EvalContext, sexpr: SExpr, arg_index: usize, expected: SExprType) -> Result<(), ()> {
    let matches = match expected {
        SExprType::Symbol => sexpr.is_symbol(),
        SExprType::String => sexpr.is_string(),
        SExprType::Number => sexpr.is_number(),
        SExprType::Cons => sexpr.is_cons(),
    };
    if matches {
        Ok(())
    } else {
        ctx.invalid_type(arg_index, sexpr, expected);
        Err(())
    }
}

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
    fn arithmetic() {
        let mut vm = Vm::new();
        let result = eval_str(&mut vm, "(+ 1 2)").unwrap();
        assert_eq!(result.number(), 3.0);
    }

    #[test]
    fn recursive_define_and_call() {
        // `==` isn't used for the base case here: its documented tolerance
        // `|a-b| < a*b*1e-6` is zero whenever either operand is zero, so it
        // can never report equality against 0. `<` is how the spec's own
        // recursive example avoids that trap.
        let mut vm = Vm::new();
        eval_str(&mut vm, "(define fib (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))").unwrap();
        let result = eval_str(&mut vm, "(fib 10)").unwrap();
        assert_eq!(result.number(), 55.0);
    }

    #[test]
    fn let_and_set_combine_at_top_level() {
        let mut vm = Vm::new();
        eval_str(&mut vm, "(let x 5)").unwrap();
        eval_str(&mut vm, "(set y 10)").unwrap();
        let result = eval_str(&mut vm, "(+ x y)").unwrap();
        assert_eq!(result.number(), 15.0);
    }

    #[test]
    fn undefined_symbol_reports_illegal_call_with_backtrace() {
        let mut vm = Vm::new();
        let err = eval_str(&mut vm, "(undefined-name)").unwrap_err();
        let rendered = format!("{}", err);
        assert!(rendered.contains("undefined-name") || rendered.contains("not callable"));
        assert!(rendered.contains("stack backtrace"));
    }

    #[test]
    fn wrong_arg_type_reports_invalid_type() {
        let mut vm = Vm::new();
        let mut parser = Parser::new(b"(+ 1 'a)");
        let sexpr = parser.next(&mut vm).unwrap().unwrap();
        let err = vm.eval(sexpr).unwrap_err();
        assert!(format!("{}", err).contains("expected number"));
    }
}
