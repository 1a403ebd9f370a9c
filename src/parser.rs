use crate::ast::{
    AddOp, AssignStmt, ClassDeclStmt, CmpOp, Comparison, DottedIdent, ElseIf, Expression, ExportStmt, ExprStmt,
    ExternFnStmt, Factor, FieldDeclStmt, ForStmt, FromImportMultipleStmt, FromImportStmt, FunDeclStmt, Ident, IfStmt,
    ImportStmt, ImportSymbol, MulOp, Param, Program, ReturnStmt, Stmt, Term, TypeName, VarDeclStmt, WhileStmt,
};
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};
use miette::{Report, SourceOffset, SourceSpan};

type ParseResult<T> = Result<T, Report>;

pub const DURATION_UNITS: [&str; 6] = ["ns", "us", "ms", "s", "m", "h"];

pub struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            position: 0,
            source,
        }
    }

    pub fn parse(&mut self) -> ParseResult<Program> {
        let start = self.peek().span;

        let package = if self.peek().is_ident("package") {
            self.advance();
            let name = self.expect_ident("package")?;
            self.expect_semicolon()?;
            Some(name)
        } else {
            None
        };

        let mut statements = vec![];
        while !self.is_at_end() {
            statements.push(self.statement()?);
        }

        Ok(Program {
            package,
            statements,
            span: self.create_span(start, self.previous().span),
        })
    }

    // token helpers

    fn peek(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.position + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.position.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
        }
    }

    fn match_punct(&mut self, c: char) -> bool {
        if self.peek().is_punct(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_ident(&mut self, name: &str) -> bool {
        if self.peek().is_ident(name) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn create_span(&self, start: SourceSpan, end: SourceSpan) -> SourceSpan {
        let left = SourceOffset::from(start.offset());
        let right = end.offset() + end.len();
        SourceSpan::new(left, right.saturating_sub(left.offset()))
    }

    fn unexpected(&self, expected: &str) -> Report {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            ParseError::UnexpectedEof {
                src: self.source.to_string(),
                expected: expected.to_string(),
            }
            .into()
        } else {
            ParseError::UnexpectedToken {
                src: self.source.to_string(),
                span: token.span,
                expected: expected.to_string(),
                found: token.kind.to_string(),
            }
            .into()
        }
    }

    fn expect_punct(&mut self, c: char, expected: &str) -> ParseResult<()> {
        if self.match_punct(c) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_semicolon(&mut self) -> ParseResult<()> {
        if self.match_punct(';') {
            Ok(())
        } else {
            let span = self.previous().span;
            let offset = SourceOffset::from(span.offset() + span.len());
            Err(ParseError::MissingSemicolon {
                src: self.source.to_string(),
                span: SourceSpan::new(offset, 0),
            }
            .into())
        }
    }

    fn expect_ident(&mut self, context: &str) -> ParseResult<Ident> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Ident {
                    name,
                    span: token.span,
                })
            }
            _ => Err(ParseError::ExpectedIdentifier {
                src: self.source.to_string(),
                span: token.span,
                context: context.to_string(),
            }
            .into()),
        }
    }

    fn expect_string(&mut self, expected: &str) -> ParseResult<(String, SourceSpan)> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Str(value) => {
                self.advance();
                Ok((value, token.span))
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    /// `'*'* (Ident | Int)` — pointer stars followed by a base type name,
    /// collected back into the textual spelling the type resolver takes.
    fn type_name(&mut self) -> ParseResult<TypeName> {
        let start = self.peek().span;
        let mut text = String::new();
        while self.match_punct('*') {
            text.push('*');
        }
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                text.push_str(&name);
            }
            TokenKind::Int(width) => {
                self.advance();
                text.push_str(&width.to_string());
            }
            _ => {
                return Err(ParseError::ExpectedType {
                    src: self.source.to_string(),
                    span: token.span,
                }
                .into());
            }
        }
        Ok(TypeName {
            text,
            span: self.create_span(start, self.previous().span),
        })
    }

    // lookahead predicates (fixed-length, evaluated before committing)

    /// `Ident ('.' Ident)* '='`
    fn lookahead_assignment(&self) -> bool {
        if !matches!(self.peek().kind, TokenKind::Ident(_)) {
            return false;
        }
        let mut i = 1;
        while self.peek_at(i).is_punct('.') && matches!(self.peek_at(i + 1).kind, TokenKind::Ident(_)) {
            i += 2;
        }
        self.peek_at(i).is_punct('=')
    }

    /// `'private'? 'static'? 'func'`
    fn lookahead_fun_decl(&self) -> bool {
        let mut i = 0;
        if self.peek_at(i).is_ident("private") {
            i += 1;
        }
        if self.peek_at(i).is_ident("static") {
            i += 1;
        }
        self.peek_at(i).is_ident("func")
    }

    /// `'private'? Ident ':'` — a class field declaration.
    fn lookahead_field(&self) -> bool {
        let mut i = 0;
        if self.peek_at(i).is_ident("private") {
            i += 1;
        }
        matches!(self.peek_at(i).kind, TokenKind::Ident(_)) && self.peek_at(i + 1).is_punct(':')
    }

    /// `Ident '('`
    fn lookahead_call(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Ident(_)) && self.peek_at(1).is_punct('(')
    }

    /// `Ident ('.' Ident)+ '('`
    fn lookahead_method_call(&self) -> bool {
        if !matches!(self.peek().kind, TokenKind::Ident(_)) {
            return false;
        }
        let mut i = 1;
        let mut dots = 0;
        while self.peek_at(i).is_punct('.') && matches!(self.peek_at(i + 1).kind, TokenKind::Ident(_)) {
            i += 2;
            dots += 1;
        }
        dots > 0 && self.peek_at(i).is_punct('(')
    }

    // statements

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.peek().is_ident("var") {
            let decl = self.var_declaration()?;
            self.expect_semicolon()?;
            Ok(Stmt::VarDecl(decl))
        } else if self.lookahead_assignment() {
            let assign = self.assignment()?;
            self.expect_semicolon()?;
            Ok(Stmt::Assign(assign))
        } else if self.peek().is_ident("extern") {
            self.extern_fn()
        } else if self.lookahead_fun_decl() {
            Ok(Stmt::FunDecl(self.fun_declaration()?))
        } else if self.peek().is_ident("class") {
            self.class_declaration()
        } else if self.peek().is_ident("if") {
            self.if_statement()
        } else if self.peek().is_ident("for") {
            self.for_statement()
        } else if self.peek().is_ident("while") {
            self.while_statement()
        } else if self.peek().is_ident("return") {
            self.return_statement()
        } else if self.peek().is_ident("break") {
            let span = self.peek().span;
            self.advance();
            self.expect_semicolon()?;
            Ok(Stmt::Break(span))
        } else if self.peek().is_ident("continue") {
            let span = self.peek().span;
            self.advance();
            self.expect_semicolon()?;
            Ok(Stmt::Continue(span))
        } else if self.peek().is_ident("import") {
            self.import_statement()
        } else if self.peek().is_ident("from") {
            self.from_import_statement()
        } else if self.peek().is_ident("export") {
            self.export_statement()
        } else if self.lookahead_field() {
            self.field_declaration()
        } else {
            self.expression_statement()
        }
    }

    /// `'var' Ident ':' Type ('=' Expression)?` — terminator handled by the caller,
    /// since `for` initializers reuse this without one.
    fn var_declaration(&mut self) -> ParseResult<VarDeclStmt> {
        let start = self.peek().span;
        self.advance(); // var
        let name = self.expect_ident("variable")?;
        self.expect_punct(':', "':' and a type annotation")?;
        let ty = self.type_name()?;

        let init = if self.match_punct('=') {
            Some(self.expression()?)
        } else {
            None
        };

        Ok(VarDeclStmt {
            name,
            ty,
            init,
            span: self.create_span(start, self.previous().span),
        })
    }

    fn assignment(&mut self) -> ParseResult<AssignStmt> {
        let start = self.peek().span;
        let target = self.dotted_ident()?;
        self.expect_punct('=', "'='")?;
        let value = self.expression()?;

        Ok(AssignStmt {
            target,
            value,
            span: self.create_span(start, self.previous().span),
        })
    }

    fn parameter_list(&mut self) -> ParseResult<Vec<Param>> {
        self.expect_punct('(', "'('")?;
        let mut params = vec![];
        if !self.peek().is_punct(')') {
            loop {
                let start = self.peek().span;
                let name = self.expect_ident("parameter")?;
                self.expect_punct(':', "':' and a parameter type")?;
                let ty = self.type_name()?;
                params.push(Param {
                    name,
                    ty,
                    span: self.create_span(start, self.previous().span),
                });
                if !self.match_punct(',') {
                    break;
                }
            }
        }
        self.expect_punct(')', "')'")?;
        Ok(params)
    }

    fn extern_fn(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        self.advance(); // extern
        if !self.match_ident("func") {
            return Err(self.unexpected("`func` after `extern`"));
        }
        let name = self.expect_ident("function")?;
        let params = self.parameter_list()?;
        let return_type = if self.match_punct(':') {
            Some(self.type_name()?)
        } else {
            None
        };
        self.expect_semicolon()?;

        Ok(Stmt::ExternFn(ExternFnStmt {
            name,
            params,
            return_type,
            span: self.create_span(start, self.previous().span),
        }))
    }

    fn fun_declaration(&mut self) -> ParseResult<FunDeclStmt> {
        let start = self.peek().span;
        let is_private = self.match_ident("private");
        let is_static = self.match_ident("static");
        self.advance(); // func
        let name = self.expect_ident("function")?;
        let params = self.parameter_list()?;
        let return_type = if self.match_punct(':') {
            Some(self.type_name()?)
        } else {
            None
        };
        let body = self.block()?;

        Ok(FunDeclStmt {
            is_private,
            is_static,
            name,
            params,
            return_type,
            body,
            span: self.create_span(start, self.previous().span),
        })
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        self.advance(); // class
        let name = self.expect_ident("class")?;
        let body = self.block()?;

        Ok(Stmt::ClassDecl(ClassDeclStmt {
            name,
            body,
            span: self.create_span(start, self.previous().span),
        }))
    }

    fn field_declaration(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        let is_private = self.match_ident("private");
        let name = self.expect_ident("field")?;
        self.expect_punct(':', "':' and a field type")?;
        let ty = self.type_name()?;
        self.expect_semicolon()?;

        Ok(Stmt::Field(FieldDeclStmt {
            is_private,
            name,
            ty,
            span: self.create_span(start, self.previous().span),
        }))
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect_punct('{', "'{'")?;
        let mut statements = vec![];
        while !self.peek().is_punct('}') {
            if self.is_at_end() {
                return Err(self.unexpected("'}'"));
            }
            statements.push(self.statement()?);
        }
        self.advance(); // }
        Ok(statements)
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        self.advance(); // if
        self.expect_punct('(', "'(' before the condition")?;
        let condition = self.expression()?;
        self.expect_punct(')', "')' after the condition")?;
        let body = self.block()?;

        let mut else_ifs = vec![];
        let mut else_body = None;
        while self.peek().is_ident("else") {
            if self.peek_at(1).is_ident("if") {
                let elif_start = self.peek().span;
                self.advance(); // else
                self.advance(); // if
                self.expect_punct('(', "'(' before the condition")?;
                let condition = self.expression()?;
                self.expect_punct(')', "')' after the condition")?;
                let body = self.block()?;
                else_ifs.push(ElseIf {
                    condition,
                    body,
                    span: self.create_span(elif_start, self.previous().span),
                });
            } else {
                self.advance(); // else
                else_body = Some(self.block()?);
                break;
            }
        }

        Ok(Stmt::If(IfStmt {
            condition,
            body,
            else_ifs,
            else_body,
            span: self.create_span(start, self.previous().span),
        }))
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        self.advance(); // for
        self.expect_punct('(', "'('")?;
        if !self.peek().is_ident("var") {
            return Err(self.unexpected("a `var` initializer"));
        }
        let init = self.var_declaration()?;
        self.expect_semicolon()?;
        let condition = self.expression()?;
        self.expect_semicolon()?;
        let increment = self.assignment()?;
        self.expect_punct(')', "')'")?;
        let body = self.block()?;

        Ok(Stmt::For(Box::new(ForStmt {
            init,
            condition,
            increment,
            body,
            span: self.create_span(start, self.previous().span),
        })))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        self.advance(); // while
        self.expect_punct('(', "'('")?;
        let condition = self.expression()?;
        self.expect_punct(')', "')'")?;
        let body = self.block()?;

        Ok(Stmt::While(WhileStmt {
            condition,
            body,
            span: self.create_span(start, self.previous().span),
        }))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        self.advance(); // return
        let value = if self.peek().is_punct(';') {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_semicolon()?;

        Ok(Stmt::Return(ReturnStmt {
            value,
            span: self.create_span(start, self.previous().span),
        }))
    }

    fn import_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        self.advance(); // import
        let (path, _) = self.expect_string("a quoted import path")?;
        self.expect_semicolon()?;

        Ok(Stmt::Import(ImportStmt {
            path,
            span: self.create_span(start, self.previous().span),
        }))
    }

    fn from_import_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        self.advance(); // from
        let (path, _) = self.expect_string("a quoted import path")?;
        if !self.match_ident("import") {
            return Err(self.unexpected("`import`"));
        }

        if self.match_punct('{') {
            let mut symbols = vec![];
            loop {
                let (name, _) = self.expect_string("a quoted symbol name")?;
                let alias = if self.match_ident("as") {
                    Some(self.expect_string("a quoted alias")?.0)
                } else {
                    None
                };
                symbols.push(ImportSymbol { name, alias });
                if !self.match_punct(',') {
                    break;
                }
            }
            self.expect_punct('}', "'}'")?;
            self.expect_semicolon()?;
            Ok(Stmt::FromImportMultiple(FromImportMultipleStmt {
                path,
                symbols,
                span: self.create_span(start, self.previous().span),
            }))
        } else {
            let (symbol, _) = self.expect_string("a quoted symbol name")?;
            let alias = if self.match_ident("as") {
                Some(self.expect_string("a quoted alias")?.0)
            } else {
                None
            };
            self.expect_semicolon()?;
            Ok(Stmt::FromImport(FromImportStmt {
                path,
                symbol,
                alias,
                span: self.create_span(start, self.previous().span),
            }))
        }
    }

    fn export_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        self.advance(); // export
        let inner = self.statement()?;
        match inner {
            Stmt::FunDecl(_) | Stmt::ExternFn(_) | Stmt::ClassDecl(_) | Stmt::VarDecl(_) => Ok(Stmt::Export(ExportStmt {
                span: self.create_span(start, inner.span()),
                inner: Box::new(inner),
            })),
            other => Err(ParseError::InvalidExport {
                src: self.source.to_string(),
                span: other.span(),
            }
            .into()),
        }
    }

    /// Bare expression statement; the terminator is optional here while most
    /// other statement kinds require one. The grammar is inconsistent about
    /// this on purpose.
    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        let expr = self.expression()?;
        self.match_punct(';');

        Ok(Stmt::Expr(ExprStmt {
            expr,
            span: self.create_span(start, self.previous().span),
        }))
    }

    // expressions, precedence encoded structurally:
    // Expression (+ -) -> Comparison (== != < <= > >=) -> Term (* / %) -> Factor

    pub fn expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek().span;
        let left = self.comparison()?;
        let mut right = vec![];
        loop {
            let op = if self.peek().is_punct('+') {
                AddOp::Add
            } else if self.peek().is_punct('-') {
                AddOp::Sub
            } else {
                break;
            };
            self.advance();
            right.push((op, self.comparison()?));
        }

        Ok(Expression {
            left,
            right,
            span: self.create_span(start, self.previous().span),
        })
    }

    fn comparison(&mut self) -> ParseResult<Comparison> {
        let start = self.peek().span;
        let left = self.term()?;
        let mut right = vec![];
        while let Some(op) = self.match_cmp_op() {
            right.push((op, self.term()?));
        }

        Ok(Comparison {
            left,
            right,
            span: self.create_span(start, self.previous().span),
        })
    }

    fn match_cmp_op(&mut self) -> Option<CmpOp> {
        let op = if self.peek().is_punct('=') && self.peek_at(1).is_punct('=') {
            Some((CmpOp::Eq, 2))
        } else if self.peek().is_punct('!') && self.peek_at(1).is_punct('=') {
            Some((CmpOp::Ne, 2))
        } else if self.peek().is_punct('<') && self.peek_at(1).is_punct('=') {
            Some((CmpOp::Le, 2))
        } else if self.peek().is_punct('>') && self.peek_at(1).is_punct('=') {
            Some((CmpOp::Ge, 2))
        } else if self.peek().is_punct('<') {
            Some((CmpOp::Lt, 1))
        } else if self.peek().is_punct('>') {
            Some((CmpOp::Gt, 1))
        } else {
            None
        };

        if let Some((op, len)) = op {
            for _ in 0..len {
                self.advance();
            }
            Some(op)
        } else {
            None
        }
    }

    fn term(&mut self) -> ParseResult<Term> {
        let start = self.peek().span;
        let left = self.factor()?;
        let mut right = vec![];
        loop {
            let op = if self.peek().is_punct('*') {
                MulOp::Mul
            } else if self.peek().is_punct('/') {
                MulOp::Div
            } else if self.peek().is_punct('%') {
                MulOp::Rem
            } else {
                break;
            };
            self.advance();
            right.push((op, self.factor()?));
        }

        Ok(Term {
            left,
            right,
            span: self.create_span(start, self.previous().span),
        })
    }

    fn argument_list(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect_punct('(', "'('")?;
        let mut args = vec![];
        if !self.peek().is_punct(')') {
            loop {
                args.push(self.expression()?);
                if !self.match_punct(',') {
                    break;
                }
            }
        }
        self.expect_punct(')', "')'")?;
        Ok(args)
    }

    fn dotted_ident(&mut self) -> ParseResult<DottedIdent> {
        let start = self.peek().span;
        let mut segments = vec![self.expect_ident("identifier")?];
        while self.peek().is_punct('.') && matches!(self.peek_at(1).kind, TokenKind::Ident(_)) {
            self.advance(); // .
            segments.push(self.expect_ident("field")?);
        }

        Ok(DottedIdent {
            segments,
            span: self.create_span(start, self.previous().span),
        })
    }

    fn factor(&mut self) -> ParseResult<Factor> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Int(value) => {
                let value = *value;
                self.advance();
                // An integer directly followed by a unit identifier is one
                // duration literal, not two tokens.
                if let TokenKind::Ident(unit) = &self.peek().kind {
                    if DURATION_UNITS.contains(&unit.as_str()) {
                        let unit = unit.clone();
                        self.advance();
                        return Ok(Factor::Duration {
                            value,
                            unit,
                            span: self.create_span(token.span, self.previous().span),
                        });
                    }
                }
                Ok(Factor::Int {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Float(value) => {
                let value = *value;
                self.advance();
                Ok(Factor::Float {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance();
                Ok(Factor::Str {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Ident(name) if name == "true" || name == "false" => {
                let value = name == "true";
                self.advance();
                Ok(Factor::Bool {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Ident(name) if name == "new" => {
                self.advance();
                let class = self.expect_ident("class")?;
                let args = self.argument_list()?;
                Ok(Factor::New {
                    class,
                    args,
                    span: self.create_span(token.span, self.previous().span),
                })
            }
            TokenKind::Punct('(') => {
                self.advance();
                let expr = self.expression()?;
                self.expect_punct(')', "')'")?;
                Ok(Factor::Sub {
                    expr: Box::new(expr),
                    span: self.create_span(token.span, self.previous().span),
                })
            }
            TokenKind::Ident(_) if self.lookahead_call() => {
                let name = self.expect_ident("function")?;
                let args = self.argument_list()?;
                Ok(Factor::Call {
                    name,
                    args,
                    span: self.create_span(token.span, self.previous().span),
                })
            }
            TokenKind::Ident(_) if self.lookahead_method_call() => {
                let target = self.dotted_ident()?;
                let args = self.argument_list()?;
                Ok(Factor::MethodCall {
                    target,
                    args,
                    span: self.create_span(token.span, self.previous().span),
                })
            }
            TokenKind::Ident(_) => Ok(Factor::Ident(self.dotted_ident()?)),
            _ => Err(ParseError::ExpectedExpression {
                src: self.source.to_string(),
                span: token.span,
            }
            .into()),
        }
    }
}
