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

//! `lispr` is a small Lisp-family interpreter: a byte-oriented reader, a
//! tree-walking evaluator with a fixed table of builtins, and a precise
//! copying garbage collector underneath everything that allocates.
//!
//! The pieces a caller needs are re-exported at the crate root; everything
//! else is implementation detail of [`Vm`].

pub mod arena;
pub mod builtin;
pub mod context;
pub mod environment;
pub mod eval;
pub mod eval_context;
pub mod gc;
pub mod lexer;
pub mod parse_error;
pub mod parser;
pub mod value;

pub use context::Vm;
pub use eval_context::EvalContext;
pub use parse_error::ParseErrors;
pub use parser::Parser;
pub use value::SExpr;
