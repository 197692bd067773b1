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

//! Parse errors accumulate as a GC-managed singly linked list, one node per
//! malformed construct encountered while reading a single top-level form.
//! Nodes carry the byte span of the offending text so the caller can quote
//! it back in a diagnostic.

use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr;

use crate::gc::{Gc, Header, TypeId, TypeInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ParseErrorKind {
    InvalidEscape = 0,
    InvalidSuffix = 1,
    InvalidUtf8 = 2,
    MissingSexpr = 3,
    UnterminatedList = 4,
    UnterminatedString = 5,
}

impl ParseErrorKind {
    fn from_u8(tag: u8) -> ParseErrorKind {
        match tag {
            0 => ParseErrorKind::InvalidEscape,
            1 => ParseErrorKind::InvalidSuffix,
            2 => ParseErrorKind::InvalidUtf8,
            3 => ParseErrorKind::MissingSexpr,
            4 => ParseErrorKind::UnterminatedList,
            5 => ParseErrorKind::UnterminatedString,
            _ => unreachable!("invalid parse error kind tag"),
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ParseErrorKind::InvalidEscape => "invalid escape sequence in string literal",
            ParseErrorKind::InvalidSuffix => "unexpected characters following an atom",
            ParseErrorKind::InvalidUtf8 => "invalid UTF-8 in source text",
            ParseErrorKind::MissingSexpr => "expected an expression but found none",
            ParseErrorKind::UnterminatedList => "unterminated list, missing a closing `)`",
            ParseErrorKind::UnterminatedString => "unterminated string literal",
        }
    }
}

#[repr(C)]
struct Node {
    header: Header,
    kind: u8,
    start: usize,
    end: usize,
    next: *mut u8,
}

fn node_size(_obj: *mut u8) -> usize {
    size_of::<Node>()
}

fn node_copy(gc: &mut Gc, old: *mut u8, new: *mut u8) {
    let next = unsafe { (*(old as *const Node)).next };
    let new_next = gc.copy_object(next);
    unsafe {
        ptr::copy_nonoverlapping(old, new, size_of::<Node>());
        let new_node = &mut *(new as *mut Node);
        new_node.header.forward = ptr::null_mut();
        new_node.next = new_next;
    }
}

fn node_children(obj: *mut u8, position: *mut u8) -> *mut u8 {
    unsafe {
        let node = &*(obj as *const Node);
        if position.is_null() {
            node.next
        } else {
            ptr::null_mut()
        }
    }
}

pub fn register_type(gc: &mut Gc) -> TypeId {
    gc.add_type(TypeInfo {
        align: align_of::<Node>(),
        size_fn: node_size,
        copy_fn: node_copy,
        children_fn: node_children,
    })
}

/// The chain of parse errors accumulated while reading one top-level form.
/// Never empty when returned to a caller — an empty chain just means there
/// was no error at all, represented as `Ok` by the parser.
#[derive(Clone, Copy)]
pub struct ParseErrors {
    head: *mut u8,
    type_id: TypeId,
}

impl ParseErrors {
    pub fn raw(&self) -> *mut u8 {
        self.head
    }

    /// Wraps a non-null chain already built via [`add_error`] — used by the
    /// parser once it decides a top-level form's error chain is non-empty
    /// and needs to be handed back as the `Err` arm.
    pub fn from_chain(head: *mut u8, type_id: TypeId) -> ParseErrors {
        debug_assert!(!head.is_null());
        ParseErrors { head, type_id }
    }

    pub fn iter(&self) -> ParseErrorIter {
        ParseErrorIter { cur: self.head }
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Renders every node's human-readable message, span, and the quoted
    /// source text of that span.
    pub fn render(&self, source: &[u8]) -> String {
        let mut out = String::new();
        for entry in self.iter() {
            let span = &source[entry.start.min(source.len())..entry.end.min(source.len())];
            out.push_str(entry.kind.message());
            out.push_str(&format!(": ({}-{}) `{}`\n", entry.start, entry.end, String::from_utf8_lossy(span)));
        }
        out
    }
}

pub struct ParseErrorEntry {
    pub kind: ParseErrorKind,
    pub start: usize,
    pub end: usize,
}

pub struct ParseErrorIter {
    cur: *mut u8,
}

impl Iterator for ParseErrorIter {
    type Item = ParseErrorEntry;

    fn next(&mut self) -> Option<ParseErrorEntry> {
        if self.cur.is_null() {
            return None;
        }
        let node = unsafe { &*(self.cur as *const Node) };
        let entry = ParseErrorEntry {
            kind: ParseErrorKind::from_u8(node.kind),
            start: node.start,
            end: node.end,
        };
        self.cur = node.next;
        Some(entry)
    }
}

/// Appends a new error node at the tail of a (possibly empty) chain,
/// returning the (unchanged, since we append at the tail) head.
pub fn add_error(
    gc: &mut Gc,
    type_id: TypeId,
    head: *mut u8,
    kind: ParseErrorKind,
    start: usize,
    end: usize,
) -> ParseErrors {
    let fresh = gc.alloc(type_id, size_of::<Node>(), align_of::<Node>());
    unsafe {
        let node = &mut *(fresh as *mut Node);
        node.kind = kind as u8;
        node.start = start;
        node.end = end;
        node.next = ptr::null_mut();
    }
    if head.is_null() {
        return ParseErrors { head: fresh, type_id };
    }
    let mut cur = head;
    loop {
        let next = unsafe { (*(cur as *const Node)).next };
        if next.is_null() {
            unsafe {
                (*(cur as *mut Node)).next = fresh;
            }
            break;
        }
        cur = next;
    }
    ParseErrors { head, type_id }
}

impl fmt::Debug for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|e| format!("{:?}@{}..{}", e.kind, e.start, e.end)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chaining_appends_in_order() {
        let mut gc = Gc::new();
        let type_id = register_type(&mut gc);
        let errors = add_error(&mut gc, type_id, ptr::null_mut(), ParseErrorKind::MissingSexpr, 0, 1);
        let errors = add_error(&mut gc, type_id, errors.raw(), ParseErrorKind::UnterminatedList, 2, 5);
        let kinds: Vec<_> = errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ParseErrorKind::MissingSexpr, ParseErrorKind::UnterminatedList]);
    }

    #[test]
    fn counting() {
        let mut gc = Gc::new();
        let type_id = register_type(&mut gc);
        let errors = add_error(&mut gc, type_id, ptr::null_mut(), ParseErrorKind::InvalidUtf8, 0, 1);
        assert_eq!(errors.count(), 1);
        let errors = add_error(&mut gc, type_id, errors.raw(), ParseErrorKind::InvalidUtf8, 1, 2);
        assert_eq!(errors.count(), 2);
    }

    #[test]
    fn render_quotes_the_offending_span() {
        let mut gc = Gc::new();
        let type_id = register_type(&mut gc);
        let errors = add_error(&mut gc, type_id, ptr::null_mut(), ParseErrorKind::UnterminatedString, 0, 3);
        let rendered = errors.render(b"\"ab");
        assert!(rendered.contains("\"ab"));
        assert!(rendered.contains("unterminated string"));
    }
}
