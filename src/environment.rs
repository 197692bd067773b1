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

//! A variable environment is two parallel cons lists, symbols and values,
//! sharing one envelope cell: `(symbols . (values . nil))`. Binding a name
//! never mutates an existing cell — it prepends a fresh pair of cons cells
//! onto both lists, so older bindings of the same name are shadowed, not
//! overwritten, and looking a name up scans newest-first.
//!
//! [`Environment`] owns its envelope as a permanent GC root, which is what
//! the global variable and function environments need since they live for
//! the whole process. Per-call local environments (a function's bound
//! parameters) get their own `Environment` too, rooted independently for
//! as long as the call's stack frame holds onto it. Read-only lookups
//! against a frame's environment go through [`lookup_in_list`] directly,
//! since a pure scan never allocates and so never needs its own root.

use crate::gc::{Gc, Rooted};
use crate::value::{self, SExpr, TypeIds};

pub struct Environment {
    /// `(symbols . (values . nil))`.
    list: Rooted<SExpr>,
}

impl Environment {
    pub fn new(gc: &mut Gc, ids: &TypeIds) -> Environment {
        let values = value::make_cons(gc, ids.cons, SExpr::NIL, SExpr::NIL);
        let list = value::make_cons(gc, ids.cons, SExpr::NIL, values);
        Environment { list: Rooted::new(gc, list.0) }
    }

    pub fn list(&self) -> SExpr {
        SExpr(self.list.raw())
    }

    pub fn set(&mut self, gc: &mut Gc, ids: &TypeIds, symbol: SExpr, value: SExpr) {
        let new_list = extend(gc, ids, self.list(), symbol, value);
        self.list.set_raw(new_list.0);
    }

    pub fn lookup(&self, symbol: SExpr) -> Option<SExpr> {
        lookup_in_list(self.list(), symbol)
    }
}

/// Prepends `(symbol . value)` onto both of `list`'s parallel lists,
/// returning the new envelope. Roots `symbol`, `value`, and `list` across
/// the several allocations this takes, since each later allocation could
/// trigger a collection that would otherwise reclaim an earlier result.
pub fn extend(gc: &mut Gc, ids: &TypeIds, list: SExpr, symbol: SExpr, value: SExpr) -> SExpr {
    let symbol_root: Rooted<SExpr> = Rooted::new(gc, symbol.0);
    let value_root: Rooted<SExpr> = Rooted::new(gc, value.0);
    let list_root: Rooted<SExpr> = Rooted::new(gc, list.0);

    let old_symbols = SExpr(list_root.raw()).car();
    let new_symbols = value::make_cons(gc, ids.cons, SExpr(symbol_root.raw()), old_symbols);
    let symbols_root: Rooted<SExpr> = Rooted::new(gc, new_symbols.0);

    let old_values = SExpr(list_root.raw()).cdr().car();
    let new_values = value::make_cons(gc, ids.cons, SExpr(value_root.raw()), old_values);
    let new_values_cell = value::make_cons(gc, ids.cons, new_values, SExpr::NIL);

    value::make_cons(gc, ids.cons, SExpr(symbols_root.raw()), new_values_cell)
}

/// Scans newest-first for a symbol with matching bytes, returning its
/// bound value. A pure read: never allocates, so `list` never needs to be
/// rooted just to call this.
pub fn lookup_in_list(list: SExpr, symbol: SExpr) -> Option<SExpr> {
    let mut syms = list.car();
    let mut vals = list.cdr().car();
    let needle = symbol.bytes();
    loop {
        if syms.is_nil() {
            return None;
        }
        if syms.car().bytes() == needle {
            return Some(vals.car());
        }
        syms = syms.cdr();
        vals = vals.cdr();
    }
}
