//! Crate root: wires together the PL/0 compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `scanner` turns the source bytes into a token stream.
//! - `parser` owns all syntactic knowledge and builds the program AST.
//! - `codegen` lowers the AST into i386/NASM assembly, resolving names
//!   through `symtab` as it walks.
//! - `linker` turns the assembled Mach-O object into a native executable.
//! - `error` centralises the diagnostics shared by the other modules.
//!
//! Assembling the emitted text is delegated to an external NASM-compatible
//! assembler; the driver in `main.rs` orchestrates that step.

pub mod ast;
pub mod error;
pub mod linker;
pub mod parser;
pub mod scanner;
pub mod symtab;
pub mod token;

mod codegen;

pub use error::{CompileError, CompileResult};

/// Compile PL/0 source text into i386/NASM assembly.
pub fn compile(source: &[u8], name: &str) -> CompileResult<String> {
  let program = parser::parse(source, name)?;
  codegen::generate(&program)
}
