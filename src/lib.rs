pub mod ast;
pub mod ast_printer;
pub mod codegen;
pub mod error;
pub mod imports;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod types;

use miette::{IntoDiagnostic, Report};
use std::fs;
use std::path::Path;

pub use codegen::{compile, CompilationUnit, Compiler};
pub use imports::{resolve_import_path, PackageCache, PackageEntry};
pub use lexer::Lexer;
pub use parser::Parser;

/// Compiles a single source string with no import context.
pub fn compile_source(source: &str) -> Result<CompilationUnit, Report> {
    let tokens = Lexer::new(source).lex()?;
    let program = Parser::new(tokens, source).parse()?;
    codegen::compile(source, &program)
}

/// Compiles a file; relative imports resolve against the file's directory.
pub fn compile_file(path: &Path, cache: PackageCache) -> Result<CompilationUnit, Report> {
    let source = fs::read_to_string(path).into_diagnostic()?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let tokens = Lexer::new(&source).lex()?;
    let program = Parser::new(tokens, &source).parse()?;
    Compiler::with_imports(&source, base_dir, cache).run(&program)
}
