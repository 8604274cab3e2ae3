//! Source-to-bytecode pipeline: hand-rolled lexer, recursive-descent
//! parser, single-pass codegen (spec.md §6 "compile").

mod ast;
mod codegen;
mod lexer;
mod parser;

use std::rc::Rc;

pub use crate::lua_vm::CompileError;

use codegen::CodeGen;
use lexer::Lexer;
use parser::Parser;

use crate::lua_vm::Program;

pub fn compile(source: &str, source_name: &str) -> Result<Program, CompileError> {
    let source_name_rc: Rc<str> = Rc::from(source_name);
    let tokens = Lexer::new(source, source_name_rc.clone()).tokenize()?;
    let mut parser = Parser::new(tokens, source_name.to_string());
    let block = parser.parse_chunk()?;
    let mut gen = CodeGen::new(source_name_rc, source_name.to_string());
    gen.compile_chunk(&block)?;
    Ok(gen.finish())
}
