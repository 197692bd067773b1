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

//! Recursive-descent reader turning a token stream into one S-expression
//! per call. A stray top-level `)` is skipped rather than treated as an
//! error, matching how a REPL driver would want to recover from it.
//! Lexer-level errors (bad escapes, invalid UTF-8) and structural errors
//! found here (`MISSING_SEXPR`, `UNTERMINATED_LIST`) both feed the same
//! error chain; if that chain is non-empty once a top-level form has been
//! read, the form is discarded and the chain is returned instead.

use std::ptr;

use crate::context::Vm;
use crate::gc::Rooted;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::parse_error::{self, ParseErrorKind, ParseErrors};
use crate::value::SExpr;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a [u8]) -> Parser<'a> {
        Parser { lexer: Lexer::new(input), lookahead: None }
    }

    fn peek(&mut self) -> &Token {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next_token());
        }
        self.lookahead.as_ref().unwrap()
    }

    fn bump(&mut self) -> Token {
        self.peek();
        self.lookahead.take().unwrap()
    }

    /// Byte offset of the first unconsumed input: the start of whatever
    /// token is peeked-but-not-yet-taken, or the lexer's scan position if
    /// nothing is buffered. A REPL reusing one growing buffer across lines
    /// slices from here to avoid re-parsing forms it already evaluated.
    pub fn remaining_start(&self) -> usize {
        match &self.lookahead {
            Some(tok) => tok.start,
            None => self.lexer.pos(),
        }
    }

    fn drain_lexer_errors(&mut self, vm: &mut Vm, head: *mut u8) -> *mut u8 {
        let mut head = head;
        for e in self.lexer.take_errors() {
            let errors = parse_error::add_error(&mut vm.gc, vm.types.parse_error, head, e.kind, e.start, e.end);
            head = errors.raw();
        }
        head
    }

    fn parse_symbol(&mut self, vm: &mut Vm, head: &mut *mut u8) -> SExpr {
        let token = self.bump();
        *head = self.drain_lexer_errors(vm, *head);
        vm.intern_symbol(&token.text)
    }

    fn parse_string(&mut self, vm: &mut Vm, head: &mut *mut u8) -> SExpr {
        let token = self.bump();
        *head = self.drain_lexer_errors(vm, *head);
        vm.make_string(&token.text)
    }

    fn parse_number(&mut self, vm: &mut Vm, head: &mut *mut u8) -> SExpr {
        let token = self.bump();
        *head = self.drain_lexer_errors(vm, *head);
        vm.make_number(token.number)
    }

    fn parse_quote(&mut self, vm: &mut Vm, head: &mut *mut u8) -> SExpr {
        let token = self.bump();
        *head = self.drain_lexer_errors(vm, *head);
        let quoted = match self.parse_sexpr(vm, head) {
            Some(v) => v,
            None => {
                let errors =
                    parse_error::add_error(&mut vm.gc, vm.types.parse_error, *head, ParseErrorKind::MissingSexpr, token.start, token.end);
                *head = errors.raw();
                vm.intern_symbol(b"quote-is-missing-sexpr")
            }
        };
        let quoted_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, quoted.0);
        let tail = vm.cons(SExpr(quoted_root.raw()), SExpr::NIL);
        let tail_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, tail.0);
        let quote_sym = vm.intern_symbol(b"quote");
        vm.cons(quote_sym, SExpr(tail_root.raw()))
    }

    fn parse_list(&mut self, vm: &mut Vm, head: &mut *mut u8) -> SExpr {
        let open = self.bump();
        *head = self.drain_lexer_errors(vm, *head);

        let base_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, SExpr::NIL.0);
        let current_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, SExpr::NIL.0);

        loop {
            if self.peek().kind == TokenKind::RightParen {
                self.bump();
                *head = self.drain_lexer_errors(vm, *head);
                break;
            }
            if self.peek().kind == TokenKind::End {
                let errors = parse_error::add_error(
                    &mut vm.gc,
                    vm.types.parse_error,
                    *head,
                    ParseErrorKind::UnterminatedList,
                    open.start,
                    self.peek().end,
                );
                *head = errors.raw();
                break;
            }

            let item = self.parse_sexpr(vm, head).expect("peeked token guarantees an expression");
            let item_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, item.0);
            let cell = vm.cons(SExpr(item_root.raw()), SExpr::NIL);
            let cell_root: Rooted<SExpr> = Rooted::new(&mut vm.gc, cell.0);
            if SExpr(base_root.raw()).is_nil() {
                base_root.set_raw(cell_root.raw());
            } else {
                SExpr(current_root.raw()).set_cdr(SExpr(cell_root.raw()));
            }
            current_root.set_raw(cell_root.raw());
        }

        SExpr(base_root.raw())
    }

    fn parse_sexpr(&mut self, vm: &mut Vm, head: &mut *mut u8) -> Option<SExpr> {
        match self.peek().kind {
            TokenKind::Symbol => Some(self.parse_symbol(vm, head)),
            TokenKind::String => Some(self.parse_string(vm, head)),
            TokenKind::Number => Some(self.parse_number(vm, head)),
            TokenKind::LeftParen => Some(self.parse_list(vm, head)),
            TokenKind::Quote => Some(self.parse_quote(vm, head)),
            TokenKind::RightParen | TokenKind::End => None,
        }
    }

    /// Reads the next top-level form, skipping any stray leading `)`.
    /// Returns `None` once the input is exhausted.
    pub fn next(&mut self, vm: &mut Vm) -> Option<Result<SExpr, ParseErrors>> {
        while self.peek().kind == TokenKind::RightParen {
            self.bump();
        }
        let mut head: *mut u8 = ptr::null_mut();
        head = self.drain_lexer_errors(vm, head);
        let sexpr = self.parse_sexpr(vm, &mut head)?;
        head = self.drain_lexer_errors(vm, head);
        if head.is_null() {
            Some(Ok(sexpr))
        } else {
            Some(Err(ParseErrors::from_chain(head, vm.types.parse_error)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &[u8]) -> Result<SExpr, ParseErrors> {
        let mut vm = Vm::new();
        let mut parser = Parser::new(src);
        parser.next(&mut vm).expect("expected one form")
    }

    #[test]
    fn parses_atoms() {
        let v = parse_one(b"42").unwrap();
        assert_eq!(v.number(), 42.0);
    }

    #[test]
    fn parses_nested_list() {
        let v = parse_one(b"(+ 1 (* 2 3))").unwrap();
        assert!(v.is_cons());
        assert_eq!(v.car().bytes(), b"+");
    }

    #[test]
    fn quote_desugars_to_quote_call() {
        let v = parse_one(b"'x").unwrap();
        assert_eq!(v.car().bytes(), b"quote");
        assert_eq!(v.cdr().car().bytes(), b"x");
    }

    #[test]
    fn unterminated_list_is_a_parse_error() {
        let err = parse_one(b"(+ 1 2").unwrap_err();
        assert!(err.iter().any(|e| e.kind == ParseErrorKind::UnterminatedList));
    }

    #[test]
    fn stray_closing_paren_is_skipped() {
        let mut vm = Vm::new();
        let mut parser = Parser::new(b") 7");
        let v = parser.next(&mut vm).unwrap().unwrap();
        assert_eq!(v.number(), 7.0);
    }

    #[test]
    fn multiple_top_level_forms() {
        let mut vm = Vm::new();
        let mut parser = Parser::new(b"1 2 3");
        let a = parser.next(&mut vm).unwrap().unwrap();
        let b = parser.next(&mut vm).unwrap().unwrap();
        let c = parser.next(&mut vm).unwrap().unwrap();
        assert_eq!((a.number(), b.number(), c.number()), (1.0, 2.0, 3.0));
        assert!(parser.next(&mut vm).is_none());
    }

    #[test]
    fn bad_escape_inside_otherwise_valid_form_is_reported() {
        let err = parse_one(br#"(print "\q")"#).unwrap_err();
        assert!(err.iter().any(|e| e.kind == ParseErrorKind::InvalidEscape));
    }
}
