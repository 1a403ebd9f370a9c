use miette::SourceSpan;

/// A single identifier segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: SourceSpan,
}

/// A possibly dotted identifier path (`a` or `a.b.c`).
#[derive(Debug, Clone, PartialEq)]
pub struct DottedIdent {
    pub segments: Vec<Ident>,
    pub span: SourceSpan,
}

impl DottedIdent {
    pub fn head(&self) -> &Ident {
        &self.segments[0]
    }
}

/// Textual type annotation as written in source (`int`, `*i8`, `Point`, ...),
/// resolved against builtins and declared classes during code generation.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub text: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub package: Option<Ident>,
    pub statements: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl(VarDeclStmt),
    Assign(AssignStmt),
    ExternFn(ExternFnStmt),
    FunDecl(FunDeclStmt),
    ClassDecl(ClassDeclStmt),
    Field(FieldDeclStmt),
    If(IfStmt),
    For(Box<ForStmt>),
    While(WhileStmt),
    Return(ReturnStmt),
    Break(SourceSpan),
    Continue(SourceSpan),
    Import(ImportStmt),
    FromImport(FromImportStmt),
    FromImportMultiple(FromImportMultipleStmt),
    Export(ExportStmt),
    Expr(ExprStmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclStmt {
    pub name: Ident,
    pub ty: TypeName,
    pub init: Option<Expression>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignStmt {
    pub target: DottedIdent,
    pub value: Expression,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeName,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternFnStmt {
    pub name: Ident,
    pub params: Vec<Param>,
    pub return_type: Option<TypeName>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunDeclStmt {
    pub is_private: bool,
    pub is_static: bool,
    pub name: Ident,
    pub params: Vec<Param>,
    pub return_type: Option<TypeName>,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDeclStmt {
    pub name: Ident,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclStmt {
    pub is_private: bool,
    pub name: Ident,
    pub ty: TypeName,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub condition: Expression,
    pub body: Vec<Stmt>,
    pub else_ifs: Vec<ElseIf>,
    pub else_body: Option<Vec<Stmt>>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: Expression,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub init: VarDeclStmt,
    pub condition: Expression,
    pub increment: AssignStmt,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub condition: Expression,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub value: Option<Expression>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportStmt {
    pub path: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromImportStmt {
    pub path: String,
    pub symbol: String,
    pub alias: Option<String>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSymbol {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromImportMultipleStmt {
    pub path: String,
    pub symbols: Vec<ImportSymbol>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportStmt {
    pub inner: Box<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmt {
    pub expr: Expression,
    pub span: SourceSpan,
}

/// `+` and `-` fold over comparisons; comparisons bind tighter than additive
/// operators in this grammar, and that shape is preserved on purpose.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub left: Comparison,
    pub right: Vec<(AddOp, Comparison)>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Term,
    pub right: Vec<(CmpOp, Term)>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub left: Factor,
    pub right: Vec<(MulOp, Factor)>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulOp {
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Factor {
    Int {
        value: i64,
        span: SourceSpan,
    },
    Float {
        value: f64,
        span: SourceSpan,
    },
    Bool {
        value: bool,
        span: SourceSpan,
    },
    Str {
        value: String,
        span: SourceSpan,
    },
    /// Integer literal captured together with its unit suffix (`500ms`).
    Duration {
        value: i64,
        unit: String,
        span: SourceSpan,
    },
    /// `new ClassName(args)`
    New {
        class: Ident,
        args: Vec<Expression>,
        span: SourceSpan,
    },
    /// Parenthesized sub-expression.
    Sub {
        expr: Box<Expression>,
        span: SourceSpan,
    },
    /// `name(args)`
    Call {
        name: Ident,
        args: Vec<Expression>,
        span: SourceSpan,
    },
    /// `a.b.method(args)` — the last segment is the method name.
    MethodCall {
        target: DottedIdent,
        args: Vec<Expression>,
        span: SourceSpan,
    },
    Ident(DottedIdent),
}

impl Factor {
    pub fn span(&self) -> SourceSpan {
        match self {
            Factor::Int { span, .. }
            | Factor::Float { span, .. }
            | Factor::Bool { span, .. }
            | Factor::Str { span, .. }
            | Factor::Duration { span, .. }
            | Factor::New { span, .. }
            | Factor::Sub { span, .. }
            | Factor::Call { span, .. }
            | Factor::MethodCall { span, .. } => *span,
            Factor::Ident(ident) => ident.span,
        }
    }
}

impl Stmt {
    pub fn span(&self) -> SourceSpan {
        match self {
            Stmt::VarDecl(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::ExternFn(s) => s.span,
            Stmt::FunDecl(s) => s.span,
            Stmt::ClassDecl(s) => s.span,
            Stmt::Field(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Break(span) | Stmt::Continue(span) => *span,
            Stmt::Import(s) => s.span,
            Stmt::FromImport(s) => s.span,
            Stmt::FromImportMultiple(s) => s.span,
            Stmt::Export(s) => s.span,
            Stmt::Expr(s) => s.span,
        }
    }
}
