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

//! The `lisp` binary: a REPL on stdin, or a one-shot file reader when
//! given a path. Parse and evaluation errors are printed and the session
//! continues; nothing here aborts except a genuine usage mistake.

use std::fs;
use std::io;
use std::process::ExitCode;

use lispr::context::Vm;
use lispr::parser::Parser;
use log::debug;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use thiserror::Error;

const PROMPT: &str = "$> ";

#[derive(Debug, Error)]
enum CliError {
    #[error("could not read {path}: {source}")]
    ReadFile { path: String, source: io::Error },
    #[error("could not start the line editor: {0}")]
    Editor(#[from] ReadlineError),
}

fn run_form(vm: &mut Vm, source: &[u8], sexpr: lispr::SExpr) {
    match vm.eval(sexpr) {
        Ok(value) => println!("{}", value),
        Err(ctx) => {
            debug!("evaluation error over {} bytes of source", source.len());
            println!("{}", ctx);
        }
    }
}

fn run_source(vm: &mut Vm, source: &[u8]) {
    let mut parser = Parser::new(source);
    while let Some(result) = parser.next(vm) {
        match result {
            Ok(sexpr) => run_form(vm, source, sexpr),
            Err(errors) => print!("{}", errors.render(source)),
        }
    }
}

fn run_file(path: &str) -> Result<(), CliError> {
    let contents = fs::read(path).map_err(|source| CliError::ReadFile { path: path.to_string(), source })?;
    let mut vm = Vm::new();
    run_source(&mut vm, &contents);
    Ok(())
}

/// Every error the lexer can report that only means "the form isn't
/// finished yet", as opposed to one that's actually malformed.
fn only_needs_more_input(errors: &lispr::ParseErrors) -> bool {
    use lispr::parse_error::ParseErrorKind;
    errors
        .iter()
        .all(|e| matches!(e.kind, ParseErrorKind::UnterminatedList | ParseErrorKind::UnterminatedString))
}

fn run_repl() -> Result<(), CliError> {
    let mut editor = DefaultEditor::new()?;
    let mut vm = Vm::new();
    let mut buffer = String::new();

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(e) => return Err(CliError::Editor(e)),
        };
        let _ = editor.add_history_entry(line.as_str());
        buffer.push_str(&line);
        buffer.push('\n');

        loop {
            let mut parser = Parser::new(buffer.as_bytes());
            match parser.next(&mut vm) {
                None => {
                    buffer.clear();
                    break;
                }
                Some(Ok(sexpr)) => {
                    run_form(&mut vm, buffer.as_bytes(), sexpr);
                    let consumed = parser.remaining_start();
                    buffer.drain(..consumed);
                    if buffer.trim().is_empty() {
                        buffer.clear();
                        break;
                    }
                }
                Some(Err(errors)) => {
                    if only_needs_more_input(&errors) {
                        break;
                    }
                    print!("{}", errors.render(buffer.as_bytes()));
                    buffer.clear();
                    break;
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    let result = match args.len() {
        1 => run_repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("usage: lisp [path]");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
