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

//! The S-expression data model: symbols, strings, numbers, and cons cells.
//!
//! All four are GC-managed heap objects with a [`crate::gc::Header`] at
//! their front, and their type ids are fixed by registration order: symbol
//! is `0`, string is `1`, number is `2`, cons is `3`. `NIL` is the null
//! pointer rather than a distinguished object, so any `SExpr` whose pointer
//! is null is implicitly a cons (the empty list).

use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr;

use crate::gc::{Gc, Header, Rooted, TypeId, TypeInfo};

pub const SYMBOL_TYPE_ID: TypeId = 0;
pub const STRING_TYPE_ID: TypeId = 1;
pub const NUMBER_TYPE_ID: TypeId = 2;
pub const CONS_TYPE_ID: TypeId = 3;

/// A pointer to a (possibly nil) S-expression. Nil is the null pointer, so
/// this is always a plain, copyable pointer, never an `Option`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SExpr(pub *mut u8);

impl SExpr {
    pub const NIL: SExpr = SExpr(ptr::null_mut());

    pub fn is_nil(self) -> bool {
        self.0.is_null()
    }

    pub fn type_id(self) -> TypeId {
        if self.is_nil() {
            CONS_TYPE_ID
        } else {
            unsafe { (*(self.0 as *const Header)).type_id }
        }
    }

    pub fn is_symbol(self) -> bool {
        !self.is_nil() && self.type_id() == SYMBOL_TYPE_ID
    }

    pub fn is_string(self) -> bool {
        !self.is_nil() && self.type_id() == STRING_TYPE_ID
    }

    pub fn is_number(self) -> bool {
        !self.is_nil() && self.type_id() == NUMBER_TYPE_ID
    }

    pub fn is_cons(self) -> bool {
        self.type_id() == CONS_TYPE_ID
    }

    pub fn is_pair(self) -> bool {
        self.is_cons() && !self.is_nil()
    }

    /// The raw bytes of a symbol or string. Panics on any other type; call
    /// sites are expected to check `is_symbol`/`is_string` (or the type id)
    /// first, exactly like the cast helpers this is modeled on.
    pub fn bytes(self) -> &'static [u8] {
        assert!(self.is_symbol() || self.is_string(), "not a symbol or string");
        unsafe {
            let buf = &*(self.0 as *const BufRepr);
            std::slice::from_raw_parts(self.0.add(size_of::<BufRepr>()), buf.len)
        }
    }

    pub fn number(self) -> f64 {
        assert!(self.is_number(), "not a number");
        unsafe { (*(self.0 as *const NumberRepr)).value }
    }

    pub fn car(self) -> SExpr {
        if self.is_nil() {
            return SExpr::NIL;
        }
        assert!(self.is_cons(), "not a cons");
        unsafe { SExpr((*(self.0 as *const ConsRepr)).car) }
    }

    pub fn cdr(self) -> SExpr {
        if self.is_nil() {
            return SExpr::NIL;
        }
        assert!(self.is_cons(), "not a cons");
        unsafe { SExpr((*(self.0 as *const ConsRepr)).cdr) }
    }

    pub fn set_car(self, value: SExpr) {
        assert!(self.is_pair(), "not a pair");
        unsafe {
            (*(self.0 as *mut ConsRepr)).car = value.0;
        }
    }

    pub fn set_cdr(self, value: SExpr) {
        assert!(self.is_pair(), "not a pair");
        unsafe {
            (*(self.0 as *mut ConsRepr)).cdr = value.0;
        }
    }

    /// A proper (non-dotted) list's length, or `Err` carrying the number of
    /// cons cells walked before hitting the non-cons tail — the index at
    /// which the list stops being proper.
    pub fn list_len(self) -> Result<usize, usize> {
        let mut n = 0;
        let mut cur = self;
        loop {
            if cur.is_nil() {
                return Ok(n);
            }
            if !cur.is_cons() {
                return Err(n);
            }
            n += 1;
            cur = cur.cdr();
        }
    }

    pub fn symbol_eq(self, bytes: &[u8]) -> bool {
        self.is_symbol() && self.bytes() == bytes
    }
}

#[repr(C)]
struct BufRepr {
    header: Header,
    len: usize,
}

#[repr(C)]
struct NumberRepr {
    header: Header,
    value: f64,
}

#[repr(C)]
struct ConsRepr {
    header: Header,
    car: *mut u8,
    cdr: *mut u8,
}

fn buf_size(obj: *mut u8) -> usize {
    let len = unsafe { (*(obj as *const BufRepr)).len };
    size_of::<BufRepr>() + len
}

fn buf_copy(_gc: &mut Gc, old: *mut u8, new: *mut u8) {
    let size = buf_size(old);
    unsafe {
        ptr::copy_nonoverlapping(old, new, size);
        (*(new as *mut Header)).forward = ptr::null_mut();
    }
}

fn buf_children(_obj: *mut u8, _position: *mut u8) -> *mut u8 {
    ptr::null_mut()
}

fn number_size(_obj: *mut u8) -> usize {
    size_of::<NumberRepr>()
}

fn number_copy(_gc: &mut Gc, old: *mut u8, new: *mut u8) {
    unsafe {
        ptr::copy_nonoverlapping(old, new, size_of::<NumberRepr>());
        (*(new as *mut Header)).forward = ptr::null_mut();
    }
}

fn number_children(_obj: *mut u8, _position: *mut u8) -> *mut u8 {
    ptr::null_mut()
}

fn cons_size(_obj: *mut u8) -> usize {
    size_of::<ConsRepr>()
}

fn cons_copy(gc: &mut Gc, old: *mut u8, new: *mut u8) {
    let (car, cdr) = unsafe {
        let old_cons = &*(old as *const ConsRepr);
        (old_cons.car, old_cons.cdr)
    };
    let new_car = gc.copy_object(car);
    let new_cdr = gc.copy_object(cdr);
    unsafe {
        let new_cons = &mut *(new as *mut ConsRepr);
        new_cons.header.type_id = CONS_TYPE_ID;
        new_cons.header.forward = ptr::null_mut();
        new_cons.car = new_car;
        new_cons.cdr = new_cdr;
    }
}

/// The children cursor for cons cells: `null` asks for the first non-null
/// child (preferring `car`), and asking "what comes after `car`" yields
/// `cdr` if it is non-null. This is the generic walk the out-of-memory
/// recovery path uses, so it must agree with `cons_copy`'s notion of what
/// the children are.
fn cons_children(obj: *mut u8, position: *mut u8) -> *mut u8 {
    unsafe {
        let cons = &*(obj as *const ConsRepr);
        if position.is_null() {
            if !cons.car.is_null() {
                return cons.car;
            }
            return cons.cdr;
        }
        if ptr::eq(position, cons.car) {
            return cons.cdr;
        }
        ptr::null_mut()
    }
}

pub struct TypeIds {
    pub symbol: TypeId,
    pub string: TypeId,
    pub number: TypeId,
    pub cons: TypeId,
}

/// Registers the four S-expression types with the collector in the fixed
/// order their type ids are defined in (symbol, string, number, cons).
pub fn register_types(gc: &mut Gc) -> TypeIds {
    let symbol = gc.add_type(TypeInfo {
        align: align_of::<BufRepr>(),
        size_fn: buf_size,
        copy_fn: buf_copy,
        children_fn: buf_children,
    });
    let string = gc.add_type(TypeInfo {
        align: align_of::<BufRepr>(),
        size_fn: buf_size,
        copy_fn: buf_copy,
        children_fn: buf_children,
    });
    let number = gc.add_type(TypeInfo {
        align: align_of::<NumberRepr>(),
        size_fn: number_size,
        copy_fn: number_copy,
        children_fn: number_children,
    });
    let cons = gc.add_type(TypeInfo {
        align: align_of::<ConsRepr>(),
        size_fn: cons_size,
        copy_fn: cons_copy,
        children_fn: cons_children,
    });
    debug_assert_eq!(symbol, SYMBOL_TYPE_ID);
    debug_assert_eq!(string, STRING_TYPE_ID);
    debug_assert_eq!(number, NUMBER_TYPE_ID);
    debug_assert_eq!(cons, CONS_TYPE_ID);
    TypeIds { symbol, string, number, cons }
}

fn alloc_buf(gc: &mut Gc, type_id: TypeId, bytes: &[u8]) -> SExpr {
    let total = size_of::<BufRepr>() + bytes.len();
    let ptr = gc.alloc(type_id, total, align_of::<BufRepr>());
    unsafe {
        (*(ptr as *mut BufRepr)).len = bytes.len();
        if !bytes.is_empty() {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(size_of::<BufRepr>()), bytes.len());
        }
    }
    SExpr(ptr)
}

pub fn make_symbol(gc: &mut Gc, type_id: TypeId, bytes: &[u8]) -> SExpr {
    alloc_buf(gc, type_id, bytes)
}

pub fn make_string(gc: &mut Gc, type_id: TypeId, bytes: &[u8]) -> SExpr {
    alloc_buf(gc, type_id, bytes)
}

pub fn make_number(gc: &mut Gc, type_id: TypeId, value: f64) -> SExpr {
    let ptr = gc.alloc(type_id, size_of::<NumberRepr>(), align_of::<NumberRepr>());
    unsafe {
        (*(ptr as *mut NumberRepr)).value = value;
    }
    SExpr(ptr)
}

/// Allocates a fresh cons cell, rooting `car` and `cdr` across the
/// allocation itself so a collection triggered by making room for the new
/// cell can't reclaim either one first.
pub fn make_cons(gc: &mut Gc, type_id: TypeId, car: SExpr, cdr: SExpr) -> SExpr {
    let car_root: Rooted<SExpr> = Rooted::new(gc, car.0);
    let cdr_root: Rooted<SExpr> = Rooted::new(gc, cdr.0);
    let ptr = gc.alloc(type_id, size_of::<ConsRepr>(), align_of::<ConsRepr>());
    unsafe {
        let cons = &mut *(ptr as *mut ConsRepr);
        cons.car = car_root.raw();
        cons.cdr = cdr_root.raw();
    }
    SExpr(ptr)
}

/// Formats a number the way the printer does: ten decimal digits, then
/// trailing zeros trimmed, then a bare trailing decimal point trimmed too.
pub fn format_number(n: f64) -> String {
    let mut s = format!("{:.10}", n);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            return write!(f, "()");
        }
        match self.type_id() {
            SYMBOL_TYPE_ID | STRING_TYPE_ID => {
                write!(f, "{}", String::from_utf8_lossy(self.bytes()))
            }
            NUMBER_TYPE_ID => write!(f, "{}", format_number(self.number())),
            CONS_TYPE_ID => {
                write!(f, "(")?;
                let mut cur = *self;
                let mut first = true;
                loop {
                    if cur.is_nil() {
                        break;
                    }
                    if !cur.is_cons() {
                        write!(f, " . {}", cur)?;
                        break;
                    }
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", cur.car())?;
                    first = false;
                    cur = cur.cdr();
                }
                write!(f, ")")
            }
            _ => unreachable!("unknown sexpr type id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Gc, TypeIds) {
        let mut gc = Gc::new();
        let ids = register_types(&mut gc);
        (gc, ids)
    }

    #[test]
    fn type_ids_are_fixed() {
        let (_, ids) = setup();
        assert_eq!(ids.symbol, 0);
        assert_eq!(ids.string, 1);
        assert_eq!(ids.number, 2);
        assert_eq!(ids.cons, 3);
    }

    #[test]
    fn number_formatting_trims_trailing_zeros_and_dot() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-2.25), "-2.25");
    }

    #[test]
    fn cons_print_handles_dotted_tail() {
        let (mut gc, ids) = setup();
        let a = make_number(&mut gc, ids.number, 1.0);
        let b = make_number(&mut gc, ids.number, 2.0);
        let pair = make_cons(&mut gc, ids.cons, a, b);
        assert_eq!(format!("{}", pair), "(1 . 2)");
    }

    #[test]
    fn cons_print_handles_proper_list() {
        let (mut gc, ids) = setup();
        let three = make_number(&mut gc, ids.number, 3.0);
        let list = make_cons(&mut gc, ids.cons, three, SExpr::NIL);
        let two = make_number(&mut gc, ids.number, 2.0);
        let list = make_cons(&mut gc, ids.cons, two, list);
        let one = make_number(&mut gc, ids.number, 1.0);
        let list = make_cons(&mut gc, ids.cons, one, list);
        assert_eq!(format!("{}", list), "(1 2 3)");
    }

    #[test]
    fn symbol_bytes_round_trip() {
        let (mut gc, ids) = setup();
        let sym = make_symbol(&mut gc, ids.symbol, b"foo");
        assert!(sym.is_symbol());
        assert_eq!(sym.bytes(), b"foo");
        assert!(sym.symbol_eq(b"foo"));
        assert!(!sym.symbol_eq(b"bar"));
    }
}
