use crate::ast::{ImportSymbol, Stmt};
use crate::codegen::{initializer_name, CompilationUnit};
use crate::error::CompileError;
use crate::ir::{Function, GlobalDef};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::types::{resolve_type, FieldDef, StructLayout, Ty};
use miette::{Report, SourceSpan};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// In-memory view of the installed-package index. The package system proper
/// (cloning, versions, config files) lives outside the compiler; this is
/// only the lookup surface it exposes.
#[derive(Debug, Clone, Default)]
pub struct PackageCache {
    packages: HashMap<String, PackageEntry>,
}

#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub root: PathBuf,
    /// Where the package keeps its sources; `src` when unconfigured.
    pub source_dir: Option<String>,
}

struct ResolvedPackage {
    root: PathBuf,
    source_dir: String,
    file: String,
}

impl PackageCache {
    pub fn insert(&mut self, name: impl Into<String>, entry: PackageEntry) {
        self.packages.insert(name.into(), entry);
    }

    /// `pkg/sub/file` names the file `sub/file` inside package `pkg`; a bare
    /// package identifier refers to its `main` module.
    fn resolve(&self, path: &str) -> Option<ResolvedPackage> {
        let (name, file) = match path.split_once('/') {
            Some((name, file)) => (name, file.to_string()),
            None => (path, "main".to_string()),
        };
        let entry = self.packages.get(name)?;
        Some(ResolvedPackage {
            root: entry.root.clone(),
            source_dir: entry.source_dir.clone().unwrap_or_else(|| "src".to_string()),
            file,
        })
    }
}

/// Maps an import path to `(local path, import key)`. Filesystem-relative
/// paths pass through unchanged; anything else is tried as a package
/// identifier and, failing that, speculatively treated as `./<path>`. No
/// I/O happens here; a missing file surfaces when the caller reads it.
pub fn resolve_import_path(path: &str, cache: &PackageCache) -> (String, String) {
    if path.starts_with("./") || path.starts_with('/') || path.starts_with("../") {
        return (path.to_string(), path.to_string());
    }
    match cache.resolve(path) {
        Some(resolved) => {
            let mut file = resolved.file;
            if !file.ends_with(".cffc") {
                file.push_str(".cffc");
            }
            let local = resolved
                .root
                .join(&resolved.source_dir)
                .join(&file)
                .to_string_lossy()
                .into_owned();
            (local.clone(), local)
        }
        None => {
            let speculative = format!("./{}", path);
            (speculative.clone(), speculative)
        }
    }
}

/// Which exported symbols an import statement pulls in, and under what
/// names.
#[derive(Debug, Clone)]
pub enum ImportFilter {
    /// `import "path";` — every export under its original name.
    All,
    /// `from "path" import "sym" [as "alias"];`
    One { name: String, alias: Option<String> },
    /// `from "path" import { "a" [as "x"], ... };`
    Many(Vec<ImportSymbol>),
}

impl ImportFilter {
    /// The local binding name for an exported symbol, or `None` when the
    /// filter excludes it. An alias binds the alias only, never the
    /// original name.
    fn binding_for(&self, exported: &str) -> Option<String> {
        match self {
            ImportFilter::All => Some(exported.to_string()),
            ImportFilter::One { name, alias } => {
                (name == exported).then(|| alias.clone().unwrap_or_else(|| name.clone()))
            }
            ImportFilter::Many(symbols) => symbols
                .iter()
                .find(|s| s.name == exported)
                .map(|s| s.alias.clone().unwrap_or_else(|| s.name.clone())),
        }
    }
}

/// Loads and parses the imported file, splices its exported declarations
/// into the current unit, and records the import key for the external
/// build step.
pub fn process_import(
    unit: &mut CompilationUnit,
    cache: &PackageCache,
    base_dir: &Path,
    path: &str,
    filter: ImportFilter,
    source: &str,
    span: SourceSpan,
) -> Result<(), Report> {
    let (local, key) = resolve_import_path(path, cache);
    let full = base_dir.join(&local);

    if full.is_dir() {
        return Err(CompileError::ImportIsDirectory {
            src: source.to_string(),
            span,
            path: full.display().to_string(),
        }
        .into());
    }
    let text = fs::read_to_string(&full).map_err(|err| CompileError::ImportIo {
        src: source.to_string(),
        span,
        path: full.display().to_string(),
        message: err.to_string(),
    })?;

    let tokens = Lexer::new(&text).lex()?;
    let program = Parser::new(tokens, &text).parse()?;

    for stmt in &program.statements {
        if let Stmt::Export(export) = stmt {
            splice_export(unit, &export.inner, &filter);
        }
    }

    if !unit.required_imports.contains(&key) {
        unit.required_imports.push(key);
    }
    Ok(())
}

/// Re-declares one exported statement into the current unit: functions and
/// externs become prototypes, classes become a typedef plus field layout
/// plus method prototypes, variables become external globals. The actual
/// definitions stay in the imported module's own object.
fn splice_export(unit: &mut CompilationUnit, stmt: &Stmt, filter: &ImportFilter) {
    match stmt {
        Stmt::FunDecl(decl) => {
            if let Some(binding) = filter.binding_for(&decl.name.name) {
                let params = decl
                    .params
                    .iter()
                    .map(|p| (p.name.name.clone(), resolve_type(&p.ty.text, &unit.classes)))
                    .collect();
                let ret = decl
                    .return_type
                    .as_ref()
                    .map(|t| resolve_type(&t.text, &unit.classes))
                    .unwrap_or(Ty::Void);
                unit.module.add_function(Function::declare(binding, ret, params));
            }
        }
        Stmt::ExternFn(decl) => {
            if let Some(binding) = filter.binding_for(&decl.name.name) {
                let params = decl
                    .params
                    .iter()
                    .map(|p| (p.name.name.clone(), resolve_type(&p.ty.text, &unit.classes)))
                    .collect();
                let ret = decl
                    .return_type
                    .as_ref()
                    .map(|t| resolve_type(&t.text, &unit.classes))
                    .unwrap_or(Ty::Void);
                unit.module.add_function(Function::declare(binding, ret, params));
            }
        }
        Stmt::ClassDecl(decl) => {
            if let Some(binding) = filter.binding_for(&decl.name.name) {
                splice_class(unit, decl, &binding);
            }
        }
        Stmt::VarDecl(decl) => {
            if let Some(binding) = filter.binding_for(&decl.name.name) {
                let ty = resolve_type(&decl.ty.text, &unit.classes);
                if !unit.module.globals.iter().any(|g| g.name == binding) {
                    unit.module.globals.push(GlobalDef { name: binding, ty });
                }
            }
        }
        _ => {}
    }
}

fn splice_class(unit: &mut CompilationUnit, decl: &crate::ast::ClassDeclStmt, binding: &str) {
    let mut fields = vec![];
    let mut constructor_arity = None;
    for stmt in &decl.body {
        if let Stmt::Field(field) = stmt {
            fields.push(FieldDef {
                name: field.name.name.clone(),
                ty: resolve_type(&field.ty.text, &unit.classes),
                private: field.is_private,
            });
        }
    }

    unit.module
        .add_type_def(binding, fields.iter().map(|f| f.ty.clone()).collect());

    let this_ty = Ty::ptr_to(Ty::Named(binding.to_string()));
    unit.module.add_function(Function::declare(
        initializer_name(binding),
        Ty::Void,
        vec![("this".to_string(), this_ty.clone())],
    ));

    for stmt in &decl.body {
        if let Stmt::FunDecl(method) = stmt {
            if method.name.name == "constructor" {
                constructor_arity = Some(method.params.len());
            }
            let mut params = vec![];
            if !method.is_static {
                params.push(("this".to_string(), this_ty.clone()));
            }
            for param in &method.params {
                params.push((param.name.name.clone(), resolve_type(&param.ty.text, &unit.classes)));
            }
            let ret = method
                .return_type
                .as_ref()
                .map(|t| resolve_type(&t.text, &unit.classes))
                .unwrap_or(Ty::Void);
            unit.module
                .add_function(Function::declare(format!("{}.{}", binding, method.name.name), ret, params));
        }
    }

    unit.classes.insert(
        binding.to_string(),
        StructLayout {
            name: binding.to_string(),
            fields,
            constructor_arity,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_pass_through() {
        let cache = PackageCache::default();
        assert_eq!(
            resolve_import_path("./util.cffc", &cache),
            ("./util.cffc".to_string(), "./util.cffc".to_string())
        );
        assert_eq!(
            resolve_import_path("../lib/a.cffc", &cache),
            ("../lib/a.cffc".to_string(), "../lib/a.cffc".to_string())
        );
    }

    #[test]
    fn package_paths_join_source_dir_and_suffix() {
        let mut cache = PackageCache::default();
        cache.insert(
            "mathlib",
            PackageEntry {
                root: PathBuf::from("/pkgs/mathlib"),
                source_dir: None,
            },
        );
        let (local, key) = resolve_import_path("mathlib/trig", &cache);
        assert_eq!(local, "/pkgs/mathlib/src/trig.cffc");
        assert_eq!(key, local);
    }

    #[test]
    fn unknown_packages_fall_back_to_local() {
        let cache = PackageCache::default();
        let (local, key) = resolve_import_path("utils.cffc", &cache);
        assert_eq!(local, "./utils.cffc");
        assert_eq!(key, local);
    }

    #[test]
    fn alias_binds_alias_only() {
        let filter = ImportFilter::One {
            name: "foo".to_string(),
            alias: Some("bar".to_string()),
        };
        assert_eq!(filter.binding_for("foo"), Some("bar".to_string()));
        assert_eq!(filter.binding_for("bar"), None);
        assert_eq!(filter.binding_for("baz"), None);
    }
}
