use caffeinec::ast::{AddOp, CmpOp, Factor, MulOp, Program, Stmt};
use caffeinec::ast_printer::print_program;
use caffeinec::{Lexer, Parser};

fn parse(source: &str) -> Program {
    let tokens = Lexer::new(source).lex().expect("lexing failed");
    Parser::new(tokens, source).parse().expect("parsing failed")
}

fn parse_err(source: &str) -> String {
    let tokens = Lexer::new(source).lex().expect("lexing failed");
    match Parser::new(tokens, source).parse() {
        Ok(_) => panic!("expected a parse error for {source:?}"),
        Err(err) => err.to_string(),
    }
}

#[test]
fn empty_program() {
    let program = parse("");
    assert!(program.statements.is_empty());
    assert!(program.package.is_none());
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let program = parse("var x: int = 2 + 3 * 4;");
    let Stmt::VarDecl(decl) = &program.statements[0] else {
        panic!("expected a var declaration");
    };
    let expr = decl.init.as_ref().expect("initializer");

    // 2 + (3 * 4): one additive fold, the multiplication inside the right
    // comparison's term.
    assert!(matches!(expr.left.left.left, Factor::Int { value: 2, .. }));
    assert_eq!(expr.right.len(), 1);
    let (op, rhs) = &expr.right[0];
    assert_eq!(*op, AddOp::Add);
    assert!(matches!(rhs.left.left, Factor::Int { value: 3, .. }));
    assert_eq!(rhs.left.right.len(), 1);
    let (mul, factor) = &rhs.left.right[0];
    assert_eq!(*mul, MulOp::Mul);
    assert!(matches!(factor, Factor::Int { value: 4, .. }));
}

#[test]
fn comparison_binds_tighter_than_addition() {
    // 1 + 2 == 3 parses as 1 + (2 == 3), a quirk of the grammar shape.
    let program = parse("var b: bool = 1 + 2 == 3;");
    let Stmt::VarDecl(decl) = &program.statements[0] else {
        panic!("expected a var declaration");
    };
    let expr = decl.init.as_ref().expect("initializer");

    assert!(expr.left.right.is_empty());
    assert_eq!(expr.right.len(), 1);
    let (op, rhs) = &expr.right[0];
    assert_eq!(*op, AddOp::Add);
    assert_eq!(rhs.right.len(), 1);
    assert_eq!(rhs.right[0].0, CmpOp::Eq);
}

#[test]
fn duration_literal_is_one_factor() {
    let program = parse("var t: duration = 500ms;");
    let Stmt::VarDecl(decl) = &program.statements[0] else {
        panic!("expected a var declaration");
    };
    let factor = &decl.init.as_ref().expect("initializer").left.left.left;
    match factor {
        Factor::Duration { value, unit, .. } => {
            assert_eq!(*value, 500);
            assert_eq!(unit, "ms");
        }
        other => panic!("expected a duration literal, got {other:?}"),
    }
}

#[test]
fn lookahead_disambiguates_ident_starts() {
    let program = parse("p.x = 1; f(1); p.move(1, 2); x;");

    let Stmt::Assign(assign) = &program.statements[0] else {
        panic!("expected an assignment");
    };
    assert_eq!(assign.target.segments.len(), 2);

    let Stmt::Expr(call) = &program.statements[1] else {
        panic!("expected an expression statement");
    };
    assert!(matches!(call.expr.left.left.left, Factor::Call { .. }));

    let Stmt::Expr(method) = &program.statements[2] else {
        panic!("expected an expression statement");
    };
    match &method.expr.left.left.left {
        Factor::MethodCall { target, args, .. } => {
            assert_eq!(target.segments.len(), 2);
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected a method call, got {other:?}"),
    }

    let Stmt::Expr(ident) = &program.statements[3] else {
        panic!("expected an expression statement");
    };
    assert!(matches!(ident.expr.left.left.left, Factor::Ident(_)));
}

#[test]
fn function_flags_and_pointer_types() {
    let program = parse("private static func id(p: *i8): *i8 { return p; }");
    let Stmt::FunDecl(decl) = &program.statements[0] else {
        panic!("expected a function declaration");
    };
    assert!(decl.is_private);
    assert!(decl.is_static);
    assert_eq!(decl.params[0].ty.text, "*i8");
    assert_eq!(decl.return_type.as_ref().unwrap().text, "*i8");
}

#[test]
fn else_if_chain() {
    let program = parse("if (a < 1) { } else if (a < 2) { } else if (a < 3) { } else { x = 1; }");
    let Stmt::If(stmt) = &program.statements[0] else {
        panic!("expected an if statement");
    };
    assert_eq!(stmt.else_ifs.len(), 2);
    assert_eq!(stmt.else_body.as_ref().map(|b| b.len()), Some(1));
}

#[test]
fn for_statement_shape() {
    let program = parse("for (var i: int = 0; i < 10; i = i + 1) { f(i); }");
    let Stmt::For(stmt) = &program.statements[0] else {
        panic!("expected a for statement");
    };
    assert_eq!(stmt.init.name.name, "i");
    assert_eq!(stmt.increment.target.head().name, "i");
    assert_eq!(stmt.body.len(), 1);
}

#[test]
fn import_forms() {
    let program = parse(
        "import \"./a.cffc\";\n\
         from \"./b.cffc\" import \"foo\" as \"bar\";\n\
         from \"pkg/c\" import { \"x\", \"y\" as \"z\" };",
    );

    assert!(matches!(&program.statements[0], Stmt::Import(i) if i.path == "./a.cffc"));

    let Stmt::FromImport(from) = &program.statements[1] else {
        panic!("expected a from-import");
    };
    assert_eq!(from.symbol, "foo");
    assert_eq!(from.alias.as_deref(), Some("bar"));

    let Stmt::FromImportMultiple(multi) = &program.statements[2] else {
        panic!("expected a multi-symbol from-import");
    };
    assert_eq!(multi.symbols.len(), 2);
    assert_eq!(multi.symbols[1].alias.as_deref(), Some("z"));
}

#[test]
fn export_wraps_declarations_only() {
    let program = parse("export func f() { }");
    assert!(matches!(&program.statements[0], Stmt::Export(_)));

    let err = parse_err("export break;");
    assert!(err.contains("export"), "unexpected error: {err}");
}

#[test]
fn package_header() {
    let program = parse("package geometry; var x: int = 1;");
    assert_eq!(program.package.as_ref().map(|p| p.name.as_str()), Some("geometry"));
    assert_eq!(program.statements.len(), 1);
}

#[test]
fn missing_semicolon_is_an_error() {
    let err = parse_err("var x: int = 1");
    assert!(err.to_lowercase().contains("semicolon"), "unexpected error: {err}");
}

#[test]
fn printed_form_is_a_fixed_point() {
    let source = "\
package demo;
extern func puts(s: string): int;
class Point {
    x: int;
    private y: int;
    func constructor(a: int, b: int) {
        this.x = a;
        this.y = b;
    }
    static func origin(): Point {
        return new Point(0, 0);
    }
}
func classify(n: int): int {
    if (n < 0) {
        return 0 - 1;
    } else if (n == 0) {
        return 0;
    } else {
        return 1;
    }
}
var total: int = 0;
for (var i: int = 0; i < 10; i = i + 1) {
    total = total + i;
    if (total > 20) {
        break;
    }
}
while (total > 0) {
    total = total - 1;
}
var t: duration = 500ms;
var p: Point = new Point(1, 2);
p.x = classify(3 + 4 * 5);
puts(\"done\");
";
    let once = print_program(&parse(source));
    let twice = print_program(&parse(&once));
    assert_eq!(once, twice);
}
