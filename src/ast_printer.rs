use crate::ast::{
    AddOp, CmpOp, Comparison, Expression, Factor, FromImportMultipleStmt, FromImportStmt, FunDeclStmt, MulOp, Param,
    Program, Stmt, Term,
};

/// Renders a program back to surface syntax. Parsing the printed form
/// reproduces the same structure, which is what the round-trip test leans
/// on.
pub fn print_program(program: &Program) -> String {
    let mut printer = AstPrinter::default();
    if let Some(package) = &program.package {
        printer.line(&format!("package {};", package.name));
    }
    for stmt in &program.statements {
        printer.stmt(stmt);
    }
    printer.out
}

#[derive(Default)]
struct AstPrinter {
    out: String,
    indent: usize,
}

impl AstPrinter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn block(&mut self, body: &[Stmt]) {
        self.indent += 1;
        for stmt in body {
            self.stmt(stmt);
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => {
                let init = decl
                    .init
                    .as_ref()
                    .map(|e| format!(" = {}", expression(e)))
                    .unwrap_or_default();
                self.line(&format!("var {}: {}{};", decl.name.name, decl.ty.text, init));
            }
            Stmt::Assign(assign) => {
                self.line(&format!("{} = {};", dotted(&assign.target), expression(&assign.value)));
            }
            Stmt::ExternFn(ext) => {
                let ret = ext
                    .return_type
                    .as_ref()
                    .map(|t| format!(": {}", t.text))
                    .unwrap_or_default();
                self.line(&format!("extern func {}({}){};", ext.name.name, params(&ext.params), ret));
            }
            Stmt::FunDecl(decl) => self.fun_decl(decl),
            Stmt::ClassDecl(decl) => {
                self.line(&format!("class {} {{", decl.name.name));
                self.block(&decl.body);
                self.line("}");
            }
            Stmt::Field(field) => {
                let private = if field.is_private { "private " } else { "" };
                self.line(&format!("{}{}: {};", private, field.name.name, field.ty.text));
            }
            Stmt::If(stmt) => {
                self.line(&format!("if ({}) {{", expression(&stmt.condition)));
                self.block(&stmt.body);
                for else_if in &stmt.else_ifs {
                    self.line(&format!("}} else if ({}) {{", expression(&else_if.condition)));
                    self.block(&else_if.body);
                }
                if let Some(else_body) = &stmt.else_body {
                    self.line("} else {");
                    self.block(else_body);
                }
                self.line("}");
            }
            Stmt::For(stmt) => {
                let init = stmt
                    .init
                    .init
                    .as_ref()
                    .map(|e| format!(" = {}", expression(e)))
                    .unwrap_or_default();
                self.line(&format!(
                    "for (var {}: {}{}; {}; {} = {}) {{",
                    stmt.init.name.name,
                    stmt.init.ty.text,
                    init,
                    expression(&stmt.condition),
                    dotted(&stmt.increment.target),
                    expression(&stmt.increment.value),
                ));
                self.block(&stmt.body);
                self.line("}");
            }
            Stmt::While(stmt) => {
                self.line(&format!("while ({}) {{", expression(&stmt.condition)));
                self.block(&stmt.body);
                self.line("}");
            }
            Stmt::Return(stmt) => match &stmt.value {
                Some(value) => self.line(&format!("return {};", expression(value))),
                None => self.line("return;"),
            },
            Stmt::Break(_) => self.line("break;"),
            Stmt::Continue(_) => self.line("continue;"),
            Stmt::Import(stmt) => self.line(&format!("import \"{}\";", stmt.path)),
            Stmt::FromImport(stmt) => self.line(&from_import(stmt)),
            Stmt::FromImportMultiple(stmt) => self.line(&from_import_multiple(stmt)),
            Stmt::Export(stmt) => {
                for _ in 0..self.indent {
                    self.out.push_str("    ");
                }
                self.out.push_str("export ");
                let indent = self.indent;
                self.indent = 0;
                self.stmt(&stmt.inner);
                self.indent = indent;
            }
            Stmt::Expr(stmt) => self.line(&format!("{};", expression(&stmt.expr))),
        }
    }

    fn fun_decl(&mut self, decl: &FunDeclStmt) {
        let private = if decl.is_private { "private " } else { "" };
        let is_static = if decl.is_static { "static " } else { "" };
        let ret = decl
            .return_type
            .as_ref()
            .map(|t| format!(": {}", t.text))
            .unwrap_or_default();
        self.line(&format!(
            "{}{}func {}({}){} {{",
            private,
            is_static,
            decl.name.name,
            params(&decl.params),
            ret
        ));
        self.block(&decl.body);
        self.line("}");
    }
}

fn params(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| format!("{}: {}", p.name.name, p.ty.text))
        .collect::<Vec<_>>()
        .join(", ")
}

fn dotted(path: &crate::ast::DottedIdent) -> String {
    path.segments
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

fn from_import(stmt: &FromImportStmt) -> String {
    match &stmt.alias {
        Some(alias) => format!("from \"{}\" import \"{}\" as \"{}\";", stmt.path, stmt.symbol, alias),
        None => format!("from \"{}\" import \"{}\";", stmt.path, stmt.symbol),
    }
}

fn from_import_multiple(stmt: &FromImportMultipleStmt) -> String {
    let symbols = stmt
        .symbols
        .iter()
        .map(|s| match &s.alias {
            Some(alias) => format!("\"{}\" as \"{}\"", s.name, alias),
            None => format!("\"{}\"", s.name),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("from \"{}\" import {{ {} }};", stmt.path, symbols)
}

pub fn expression(expr: &Expression) -> String {
    let mut text = comparison(&expr.left);
    for (op, rhs) in &expr.right {
        let op = match op {
            AddOp::Add => "+",
            AddOp::Sub => "-",
        };
        text = format!("{} {} {}", text, op, comparison(rhs));
    }
    text
}

fn comparison(cmp: &Comparison) -> String {
    let mut text = term(&cmp.left);
    for (op, rhs) in &cmp.right {
        let op = match op {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        text = format!("{} {} {}", text, op, term(rhs));
    }
    text
}

fn term(t: &Term) -> String {
    let mut text = factor(&t.left);
    for (op, rhs) in &t.right {
        let op = match op {
            MulOp::Mul => "*",
            MulOp::Div => "/",
            MulOp::Rem => "%",
        };
        text = format!("{} {} {}", text, op, factor(rhs));
    }
    text
}

fn factor(f: &Factor) -> String {
    match f {
        Factor::Int { value, .. } => value.to_string(),
        Factor::Float { value, .. } => format!("{:?}", value),
        Factor::Bool { value, .. } => value.to_string(),
        Factor::Str { value, .. } => format!("\"{}\"", value),
        Factor::Duration { value, unit, .. } => format!("{}{}", value, unit),
        Factor::New { class, args, .. } => format!("new {}({})", class.name, arguments(args)),
        Factor::Sub { expr, .. } => format!("({})", expression(expr)),
        Factor::Call { name, args, .. } => format!("{}({})", name.name, arguments(args)),
        Factor::MethodCall { target, args, .. } => format!("{}({})", dotted(target), arguments(args)),
        Factor::Ident(path) => dotted(path),
    }
}

fn arguments(args: &[Expression]) -> String {
    args.iter().map(expression).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn parse(source: &str) -> Program {
        let tokens = Lexer::new(source).lex().unwrap();
        Parser::new(tokens, source).parse().unwrap()
    }

    #[test]
    fn prints_declarations() {
        let program = parse("var x: int = 1 + 2 * 3;");
        assert_eq!(print_program(&program), "var x: int = 1 + 2 * 3;\n");
    }

    #[test]
    fn prints_durations_and_strings() {
        let program = parse("var t: duration = 500ms; var s: string = \"hi\";");
        let printed = print_program(&program);
        assert!(printed.contains("500ms"));
        assert!(printed.contains("\"hi\""));
    }
}
