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

//! The `Vm` ties together the collector, the type registry, the global
//! variable and function environments, and symbol interning, and is the
//! one piece of state a caller needs to parse and evaluate source text.

use std::collections::HashMap;

use crate::builtin;
use crate::environment::Environment;
use crate::eval;
use crate::eval_context::EvalContext;
use crate::gc::{Gc, Rooted};
use crate::parse_error::{self};
use crate::value::{self, SExpr, TypeIds};

pub struct TypeRegistry {
    pub sexpr: TypeIds,
    pub parse_error: crate::gc::TypeId,
}

pub struct Vm {
    pub gc: Gc,
    pub types: TypeRegistry,
    pub vars: Environment,
    pub funcs: Environment,
    symbols: HashMap<Vec<u8>, Rooted<SExpr>>,
}

impl Vm {
    pub fn new() -> Vm {
        let mut gc = Gc::new();
        let sexpr_ids = value::register_types(&mut gc);
        let parse_error_type = parse_error::register_type(&mut gc);
        let vars = Environment::new(&mut gc, &sexpr_ids);
        let funcs = Environment::new(&mut gc, &sexpr_ids);
        let mut vm = Vm {
            gc,
            types: TypeRegistry { sexpr: sexpr_ids, parse_error: parse_error_type },
            vars,
            funcs,
            symbols: HashMap::new(),
        };
        builtin::install(&mut vm);
        vm
    }

    /// Interns a symbol by byte content: repeated calls with the same
    /// bytes return the same underlying object, so `env_lookup`'s
    /// byte-equality scan and an eventual pointer-equality fast path agree.
    pub fn intern_symbol(&mut self, bytes: &[u8]) -> SExpr {
        if let Some(existing) = self.symbols.get(bytes) {
            return SExpr(existing.raw());
        }
        let sym = value::make_symbol(&mut self.gc, self.types.sexpr.symbol, bytes);
        self.symbols.insert(bytes.to_vec(), Rooted::new(&mut self.gc, sym.0));
        sym
    }

    pub fn make_string(&mut self, bytes: &[u8]) -> SExpr {
        value::make_string(&mut self.gc, self.types.sexpr.string, bytes)
    }

    pub fn make_number(&mut self, value: f64) -> SExpr {
        value::make_number(&mut self.gc, self.types.sexpr.number, value)
    }

    pub fn cons(&mut self, car: SExpr, cdr: SExpr) -> SExpr {
        value::make_cons(&mut self.gc, self.types.sexpr.cons, car, cdr)
    }

    /// Evaluates one top-level form. Roots it for the whole call so that
    /// any collection triggered deep in the evaluator can't reclaim a part
    /// of the expression tree still waiting to be evaluated.
    pub fn eval(&mut self, sexpr: SExpr) -> Result<SExpr, EvalContext> {
        let mut ctx = EvalContext::new();
        let root: Rooted<SExpr> = Rooted::new(&mut self.gc, sexpr.0);
        match eval::eval_internal(self, &mut ctx, SExpr(root.raw())) {
            Ok(v) => Ok(v),
            Err(()) => Err(ctx),
        }
    }
}

impl Default for Vm {
    fn default() -> Vm {
        Vm::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_same_symbol() {
        let mut vm = Vm::new();
        let a = vm.intern_symbol(b"foo");
        let b = vm.intern_symbol(b"foo");
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn eval_self_evaluating_number() {
        let mut vm = Vm::new();
        let n = vm.make_number(3.0);
        let result = vm.eval(n).unwrap();
        assert_eq!(result.number(), 3.0);
    }
}
