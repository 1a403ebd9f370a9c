use crate::ast::{
    AddOp, AssignStmt, ClassDeclStmt, CmpOp, Comparison, DottedIdent, Expression, ExternFnStmt, Factor, FunDeclStmt,
    IfStmt, MulOp, Program, Stmt, Term, TypeName, VarDeclStmt,
};
use crate::error::CompileError;
use crate::imports::{self, ImportFilter, PackageCache};
use crate::ir::{BinOp, BlockId, Function, Instr, Module, Pred, Terminator, Value};
use crate::types::{resolve_type, FieldDef, StructLayout, Ty};
use miette::{Report, SourceSpan};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

type CompileResult<T> = Result<T, Report>;

/// Everything the whole compilation shares: the module under construction,
/// the declared class layouts, and the import keys the external build step
/// must link in. The two-pass capture analysis clones this wholesale and
/// throws the clone away, so it must stay a plain value type.
#[derive(Debug, Clone, Default)]
pub struct CompilationUnit {
    pub module: Module,
    pub classes: HashMap<String, StructLayout>,
    pub required_imports: Vec<String>,
}

/// Branch targets of the innermost enclosing loop.
#[derive(Debug, Clone, Copy)]
struct FlowControl {
    leave: BlockId,
    cont: BlockId,
}

/// One lexical scope. Scopes form a tree through `parent`, used for lookup
/// only; the arena owns them all. `used` records names this scope had to
/// resolve through its parent, in first-use order.
struct Scope {
    vars: HashMap<String, Value>,
    used: Vec<String>,
    parent: Option<usize>,
    flow: Option<FlowControl>,
    fn_idx: usize,
    block: BlockId,
}

pub struct Compiler<'a> {
    source: &'a str,
    pub unit: CompilationUnit,
    scopes: Vec<Scope>,
    current: usize,
    base_dir: PathBuf,
    cache: PackageCache,
}

/// Compiles a whole program into a fresh compilation unit. Top-level
/// statements land in an implicit `main` returning i32.
pub fn compile(source: &str, program: &Program) -> CompileResult<CompilationUnit> {
    Compiler::new(source).run(program)
}

impl<'a> Compiler<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_imports(source, Path::new("."), PackageCache::default())
    }

    pub fn with_imports(source: &'a str, base_dir: &Path, cache: PackageCache) -> Self {
        Compiler {
            source,
            unit: CompilationUnit::default(),
            scopes: vec![],
            current: 0,
            base_dir: base_dir.to_path_buf(),
            cache,
        }
    }

    pub fn run(mut self, program: &Program) -> CompileResult<CompilationUnit> {
        let main = Function::define("main", Ty::I32, vec![]);
        let idx = self.unit.module.add_function(main);
        self.current = self.push_scope(None, idx, BlockId(0));

        for stmt in &program.statements {
            self.statement(stmt)?;
        }
        if !self.current_block().is_terminated() {
            self.terminate(Terminator::Ret(Some(Value::Int { value: 0, ty: Ty::I32 })));
        }
        Ok(self.unit)
    }

    // scope and emission plumbing

    fn push_scope(&mut self, parent: Option<usize>, fn_idx: usize, block: BlockId) -> usize {
        self.scopes.push(Scope {
            vars: HashMap::new(),
            used: vec![],
            parent,
            flow: None,
            fn_idx,
            block,
        });
        self.scopes.len() - 1
    }

    fn func_mut(&mut self) -> &mut Function {
        let fn_idx = self.scopes[self.current].fn_idx;
        &mut self.unit.module.functions[fn_idx]
    }

    fn current_block(&self) -> &crate::ir::Block {
        let scope = &self.scopes[self.current];
        self.unit.module.functions[scope.fn_idx].block(scope.block)
    }

    fn set_block(&mut self, block: BlockId) {
        self.scopes[self.current].block = block;
    }

    fn emit(&mut self, instr: Instr) {
        let block = self.scopes[self.current].block;
        self.func_mut().block_mut(block).instrs.push(instr);
    }

    fn terminate(&mut self, term: Terminator) {
        let block = self.scopes[self.current].block;
        self.func_mut().block_mut(block).terminate(term);
    }

    fn fresh_reg(&mut self) -> usize {
        self.func_mut().fresh_reg()
    }

    fn add_block(&mut self, hint: &str) -> BlockId {
        self.func_mut().add_block(hint)
    }

    fn bind(&mut self, name: &str, value: Value) {
        self.scopes[self.current].vars.insert(name.to_string(), value);
    }

    fn mark_used(&mut self, scope: usize, name: &str) {
        let used = &mut self.scopes[scope].used;
        if !used.iter().any(|u| u == name) {
            used.push(name.to_string());
        }
    }

    /// Current-function parameters first, then local bindings, then the
    /// parent chain. Every scope that had to delegate records the name in
    /// its used set; that record is what the capture analysis reads.
    fn lookup(&mut self, scope: usize, name: &str) -> Option<Value> {
        let fn_idx = self.scopes[scope].fn_idx;
        if let Some(param) = self.unit.module.functions[fn_idx].param(name) {
            return Some(param);
        }
        if let Some(value) = self.scopes[scope].vars.get(name) {
            return Some(value.clone());
        }
        let parent = self.scopes[scope].parent?;
        let found = self.lookup(parent, name)?;
        self.mark_used(scope, name);
        Some(found)
    }

    /// Scope-chain lookup with a final fallback to imported globals, which
    /// live at module level and are never captured.
    fn lookup_name(&mut self, name: &str) -> Option<Value> {
        if let Some(value) = self.lookup(self.current, name) {
            return Some(value);
        }
        self.unit.module.globals.iter().find(|g| g.name == name).map(|g| Value::Global {
            name: g.name.clone(),
            ty: Ty::ptr_to(g.ty.clone()),
        })
    }

    /// Slots and globals are storage addresses; everything else is a plain
    /// value.
    fn is_storage(value: &Value) -> bool {
        value.is_slot() || matches!(value, Value::Global { .. })
    }

    fn resolve(&self, ty: &TypeName) -> Ty {
        resolve_type(&ty.text, &self.unit.classes)
    }

    fn resolve_ret(&self, ty: &Option<TypeName>) -> Ty {
        ty.as_ref().map(|t| self.resolve(t)).unwrap_or(Ty::Void)
    }

    fn src(&self) -> String {
        self.source.to_string()
    }

    // statements

    fn statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::VarDecl(decl) => self.var_decl(decl),
            Stmt::Assign(assign) => self.assign(assign),
            Stmt::ExternFn(ext) => self.extern_fn(ext),
            Stmt::FunDecl(decl) => self.fun_decl(decl),
            Stmt::ClassDecl(decl) => self.class_decl(decl),
            Stmt::Field(field) => Err(CompileError::FieldOutsideClass {
                src: self.src(),
                span: field.span,
            }
            .into()),
            Stmt::If(stmt) => self.if_stmt(stmt),
            Stmt::For(stmt) => {
                self.var_decl(&stmt.init)?;
                self.loop_body(&stmt.condition, &stmt.body, Some(&stmt.increment))
            }
            Stmt::While(stmt) => self.loop_body(&stmt.condition, &stmt.body, None),
            Stmt::Return(stmt) => {
                let value = match &stmt.value {
                    Some(expr) => Some(self.expression(expr)?),
                    None => None,
                };
                self.terminate(Terminator::Ret(value));
                Ok(())
            }
            Stmt::Break(span) => {
                let flow = self.enclosing_flow().ok_or_else(|| CompileError::BreakOutsideLoop {
                    src: self.src(),
                    span: *span,
                })?;
                self.terminate(Terminator::Br(flow.leave));
                Ok(())
            }
            Stmt::Continue(span) => {
                let flow = self.enclosing_flow().ok_or_else(|| CompileError::ContinueOutsideLoop {
                    src: self.src(),
                    span: *span,
                })?;
                self.terminate(Terminator::Br(flow.cont));
                Ok(())
            }
            Stmt::Import(stmt) => self.process_import(&stmt.path, ImportFilter::All, stmt.span),
            Stmt::FromImport(stmt) => self.process_import(
                &stmt.path,
                ImportFilter::One {
                    name: stmt.symbol.clone(),
                    alias: stmt.alias.clone(),
                },
                stmt.span,
            ),
            Stmt::FromImportMultiple(stmt) => {
                self.process_import(&stmt.path, ImportFilter::Many(stmt.symbols.clone()), stmt.span)
            }
            // Exports compile like the wrapped declaration; the marker only
            // matters to files importing this one.
            Stmt::Export(stmt) => self.statement(&stmt.inner),
            Stmt::Expr(stmt) => self.expression(&stmt.expr).map(|_| ()),
        }
    }

    fn process_import(&mut self, path: &str, filter: ImportFilter, span: SourceSpan) -> CompileResult<()> {
        imports::process_import(
            &mut self.unit,
            &self.cache,
            &self.base_dir,
            path,
            filter,
            self.source,
            span,
        )
    }

    fn enclosing_flow(&self) -> Option<FlowControl> {
        let mut scope = Some(self.current);
        while let Some(idx) = scope {
            if let Some(flow) = self.scopes[idx].flow {
                return Some(flow);
            }
            scope = self.scopes[idx].parent;
        }
        None
    }

    /// A definition with an initializer that is already a storage slot
    /// aliases that slot; any other initializer gets a fresh slot. Without
    /// an initializer the slot is zeroed.
    fn var_decl(&mut self, decl: &VarDeclStmt) -> CompileResult<()> {
        match &decl.init {
            Some(init) => {
                let value = self.expression(init)?;
                if value.is_slot() {
                    self.bind(&decl.name.name, value);
                } else {
                    let slot = self.alloca(value.ty());
                    self.emit(Instr::Store {
                        value,
                        ptr: slot.clone(),
                    });
                    self.bind(&decl.name.name, slot);
                }
            }
            None => {
                let ty = self.resolve(&decl.ty);
                let slot = self.alloca(ty.clone());
                if let Some(zero) = zero_value(&ty) {
                    self.emit(Instr::Store {
                        value: zero,
                        ptr: slot.clone(),
                    });
                }
                self.bind(&decl.name.name, slot);
            }
        }
        Ok(())
    }

    fn alloca(&mut self, ty: Ty) -> Value {
        let dst = self.fresh_reg();
        self.emit(Instr::Alloca { dst, ty: ty.clone() });
        Value::Reg {
            id: dst,
            ty: Ty::ptr_to(ty),
            slot: true,
        }
    }

    fn assign(&mut self, assign: &AssignStmt) -> CompileResult<()> {
        let value = self.expression(&assign.value)?;
        if assign.target.segments.len() == 1 {
            let name = &assign.target.head().name;
            let target = self.lookup_name(name).ok_or_else(|| CompileError::UnboundName {
                src: self.src(),
                span: assign.target.span,
                name: name.clone(),
            })?;
            if Self::is_storage(&target) {
                self.emit(Instr::Store { value, ptr: target });
            } else {
                // The binding never had storage; the name is rebound to the
                // new value instead of stored through.
                self.bind(name, value);
            }
        } else {
            let (ptr, _) = self.field_pointer(&assign.target)?;
            self.emit(Instr::Store { value, ptr });
        }
        Ok(())
    }

    fn extern_fn(&mut self, ext: &ExternFnStmt) -> CompileResult<()> {
        let params = ext
            .params
            .iter()
            .map(|p| (p.name.name.clone(), self.resolve(&p.ty)))
            .collect();
        let ret = self.resolve_ret(&ext.return_type);
        self.unit.module.add_function(Function::declare(&ext.name.name, ret, params));
        Ok(())
    }

    // function compilation: two-pass closure capture

    fn fun_decl(&mut self, decl: &FunDeclStmt) -> CompileResult<()> {
        let captures = self.analyze_free_variables(decl)?;
        for (name, _) in &captures {
            self.mark_used(self.current, name);
        }

        let ret = self.resolve_ret(&decl.return_type);
        let mut params: Vec<(String, Ty)> = decl
            .params
            .iter()
            .map(|p| (p.name.name.clone(), self.resolve(&p.ty)))
            .collect();
        params.extend(captures);

        self.lower_function(&decl.name.name, ret, params, &decl.body, decl.name.span)
    }

    /// Pass one: compile the body against a scratch clone of the unit, with
    /// parameters pre-bound to dummy constants so lookups succeed, purely to
    /// populate the used set. Whatever the scratch pass emitted is thrown
    /// away with the clone; the used names and their chain-resolved types
    /// come back as the capture list.
    fn analyze_free_variables(&mut self, decl: &FunDeclStmt) -> CompileResult<Vec<(String, Ty)>> {
        let saved_unit = self.unit.clone();
        let saved_scope = self.current;

        let scratch = Function::define(format!("{}.scratch", decl.name.name), Ty::Void, vec![]);
        let scratch_idx = self.unit.module.add_function(scratch);
        let scope = self.push_scope(Some(saved_scope), scratch_idx, BlockId(0));
        self.current = scope;
        for param in &decl.params {
            self.bind(&param.name.name, Value::bool(false));
        }

        let mut outcome = Ok(());
        for stmt in &decl.body {
            if let Err(err) = self.statement(stmt) {
                outcome = Err(err);
                break;
            }
        }

        let mut captures = vec![];
        if outcome.is_ok() {
            let used = self.scopes[scope].used.clone();
            for name in used {
                if let Some(value) = self.lookup(saved_scope, &name) {
                    captures.push((name, value.ty()));
                }
            }
        }

        self.current = saved_scope;
        self.unit = saved_unit;
        outcome?;
        Ok(captures)
    }

    /// Pass two: the definitive function. Its scope has no parent, so names
    /// that did not become parameters fail the normal way.
    fn lower_function(
        &mut self,
        name: &str,
        ret: Ty,
        params: Vec<(String, Ty)>,
        body: &[Stmt],
        span: SourceSpan,
    ) -> CompileResult<()> {
        let func = Function::define(name, ret.clone(), params);
        let idx = self.unit.module.add_function(func);

        let saved = self.current;
        self.current = self.push_scope(None, idx, BlockId(0));

        let mut outcome = Ok(());
        for stmt in body {
            if let Err(err) = self.statement(stmt) {
                outcome = Err(err);
                break;
            }
        }
        if outcome.is_ok() && !self.current_block().is_terminated() {
            if ret == Ty::Void {
                self.terminate(Terminator::Ret(None));
            } else {
                // An unterminated final block only means a missing return if
                // control can actually reach it; a merge block orphaned
                // because every branch already returned is fine.
                let block = self.scopes[self.current].block;
                let func = &self.unit.module.functions[self.scopes[self.current].fn_idx];
                if block == func.entry() || func.has_predecessors(block) {
                    outcome = Err(CompileError::MissingReturn {
                        src: self.src(),
                        span,
                        name: name.to_string(),
                    }
                    .into());
                }
            }
        }

        self.current = saved;
        outcome
    }

    // classes

    fn class_decl(&mut self, decl: &ClassDeclStmt) -> CompileResult<()> {
        let class_name = decl.name.name.clone();

        // Field indices follow field declaration order only; methods
        // interleaved between fields do not occupy slots.
        let mut fields = vec![];
        for stmt in &decl.body {
            if let Stmt::Field(field) = stmt {
                fields.push(FieldDef {
                    name: field.name.name.clone(),
                    ty: self.resolve(&field.ty),
                    private: field.is_private,
                });
            }
        }

        self.unit
            .module
            .add_type_def(&class_name, fields.iter().map(|f| f.ty.clone()).collect());
        self.unit.classes.insert(
            class_name.clone(),
            StructLayout {
                name: class_name.clone(),
                fields: fields.clone(),
                constructor_arity: None,
            },
        );

        self.emit_initializer(&class_name, &fields);

        for stmt in &decl.body {
            if let Stmt::FunDecl(method) = stmt {
                if method.name.name == "constructor" {
                    if let Some(layout) = self.unit.classes.get_mut(&class_name) {
                        layout.constructor_arity = Some(method.params.len());
                    }
                }
                self.class_method(&class_name, method)?;
            }
        }
        Ok(())
    }

    /// The generated zeroing initializer, named with a `-` so no source
    /// identifier can collide with it. `new` calls it before the
    /// constructor.
    fn emit_initializer(&mut self, class_name: &str, fields: &[FieldDef]) {
        let this_ty = Ty::ptr_to(Ty::Named(class_name.to_string()));
        let mut init = Function::define(
            initializer_name(class_name),
            Ty::Void,
            vec![("this".to_string(), this_ty)],
        );
        let entry = init.entry();
        let this = match init.param("this") {
            Some(p) => p,
            None => return,
        };

        for (idx, field) in fields.iter().enumerate() {
            if let Some(zero) = zero_value(&field.ty) {
                let dst = init.fresh_reg();
                init.block_mut(entry).instrs.push(Instr::GetElementPtr {
                    dst,
                    base_ty: Ty::Named(class_name.to_string()),
                    ptr: this.clone(),
                    indices: vec![
                        Value::Int { value: 0, ty: Ty::I32 },
                        Value::Int {
                            value: idx as i64,
                            ty: Ty::I32,
                        },
                    ],
                });
                init.block_mut(entry).instrs.push(Instr::Store {
                    value: zero,
                    ptr: Value::Reg {
                        id: dst,
                        ty: Ty::ptr_to(field.ty.clone()),
                        slot: true,
                    },
                });
            }
        }
        init.block_mut(entry).terminate(Terminator::Ret(None));
        self.unit.module.add_function(init);
    }

    /// Methods are ordinary functions named `Class.method` with an implicit
    /// leading `this: *Class`; `static` methods get no `this`. Methods are
    /// compiled in a single pass, capture analysis applies to free-standing
    /// functions only.
    fn class_method(&mut self, class_name: &str, method: &FunDeclStmt) -> CompileResult<()> {
        let qualified = format!("{}.{}", class_name, method.name.name);
        let ret = self.resolve_ret(&method.return_type);

        let mut params = vec![];
        if !method.is_static {
            params.push((
                "this".to_string(),
                Ty::ptr_to(Ty::Named(class_name.to_string())),
            ));
        }
        for param in &method.params {
            params.push((param.name.name.clone(), self.resolve(&param.ty)));
        }

        self.lower_function(&qualified, ret, params, &method.body, method.name.span)
    }

    // control flow

    fn if_stmt(&mut self, stmt: &IfStmt) -> CompileResult<()> {
        let cond = self.expression(&stmt.condition)?;
        let then_block = self.add_block("then");
        let mut else_block = self.add_block("else");
        let merge = self.add_block("merge");
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });

        self.set_block(then_block);
        for inner in &stmt.body {
            self.statement(inner)?;
        }
        self.terminate(Terminator::Br(merge));

        for else_if in &stmt.else_ifs {
            self.set_block(else_block);
            let cond = self.expression(&else_if.condition)?;
            let clause_then = self.add_block("then");
            let next_else = self.add_block("else");
            self.terminate(Terminator::CondBr {
                cond,
                then_block: clause_then,
                else_block: next_else,
            });

            self.set_block(clause_then);
            for inner in &else_if.body {
                self.statement(inner)?;
            }
            self.terminate(Terminator::Br(merge));
            else_block = next_else;
        }

        self.set_block(else_block);
        if let Some(else_body) = &stmt.else_body {
            for inner in else_body {
                self.statement(inner)?;
            }
        }
        self.terminate(Terminator::Br(merge));

        self.set_block(merge);
        Ok(())
    }

    /// Shared while/for lowering. The condition is compiled twice: once in
    /// the entry block and once at the end of every iteration, each with its
    /// own conditional branch. There is no shared header block; this
    /// two-point shape is load-bearing for output equivalence.
    fn loop_body(&mut self, condition: &Expression, body: &[Stmt], increment: Option<&AssignStmt>) -> CompileResult<()> {
        let cond = self.expression(condition)?;
        let loop_block = self.add_block("loop");
        let leave_block = self.add_block("leave");
        self.terminate(Terminator::CondBr {
            cond,
            then_block: loop_block,
            else_block: leave_block,
        });

        let saved = self.current;
        self.current = self.push_scope(Some(saved), self.scopes[saved].fn_idx, loop_block);
        self.scopes[self.current].flow = Some(FlowControl {
            leave: leave_block,
            cont: loop_block,
        });

        let mut outcome = Ok(());
        for stmt in body {
            if let Err(err) = self.statement(stmt) {
                outcome = Err(err);
                break;
            }
        }
        if outcome.is_ok() {
            if let Some(increment) = increment {
                outcome = self.assign(increment);
            }
        }
        if outcome.is_ok() {
            match self.expression(condition) {
                Ok(cond) => self.terminate(Terminator::CondBr {
                    cond,
                    then_block: loop_block,
                    else_block: leave_block,
                }),
                Err(err) => outcome = Err(err),
            }
        }

        self.current = saved;
        self.set_block(leave_block);
        outcome
    }

    // expressions

    pub(crate) fn expression(&mut self, expr: &Expression) -> CompileResult<Value> {
        let mut left = self.comparison(&expr.left)?;
        for (op, rhs) in &expr.right {
            let right = self.comparison(rhs)?;
            let right = self.load_if_matching(&left, right);
            let op = match op {
                AddOp::Add => BinOp::Add,
                AddOp::Sub => BinOp::Sub,
            };
            left = self.bin(op, left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self, cmp: &Comparison) -> CompileResult<Value> {
        let mut left = self.term(&cmp.left)?;
        for (op, rhs) in &cmp.right {
            let right = self.term(rhs)?;
            let right = self.load_if_matching(&left, right);
            let pred = match op {
                CmpOp::Eq => Pred::Eq,
                CmpOp::Ne => Pred::Ne,
                CmpOp::Lt => Pred::Slt,
                CmpOp::Le => Pred::Sle,
                CmpOp::Gt => Pred::Sgt,
                CmpOp::Ge => Pred::Sge,
            };
            let dst = self.fresh_reg();
            self.emit(Instr::ICmp {
                dst,
                pred,
                lhs: left,
                rhs: right,
            });
            left = Value::Reg {
                id: dst,
                ty: Ty::Bool,
                slot: false,
            };
        }
        Ok(left)
    }

    fn term(&mut self, term: &Term) -> CompileResult<Value> {
        let mut left = self.factor(&term.left)?;
        for (op, rhs) in &term.right {
            let right = self.factor(rhs)?;
            let right = self.load_if_matching(&left, right);
            let op = match op {
                MulOp::Mul => BinOp::Mul,
                MulOp::Div => BinOp::SDiv,
                MulOp::Rem => BinOp::SRem,
            };
            left = self.bin(op, left, right);
        }
        Ok(left)
    }

    fn bin(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let ty = lhs.ty();
        let dst = self.fresh_reg();
        self.emit(Instr::Bin { dst, op, lhs, rhs });
        Value::Reg { id: dst, ty, slot: false }
    }

    /// A right operand that is a slot pointing at the left operand's type is
    /// loaded before use.
    fn load_if_matching(&mut self, left: &Value, right: Value) -> Value {
        if right.is_slot() && *right.ty().pointee() == left.ty() {
            self.load(right)
        } else {
            right
        }
    }

    fn load(&mut self, ptr: Value) -> Value {
        let ty = ptr.ty().pointee().clone();
        let dst = self.fresh_reg();
        self.emit(Instr::Load {
            dst,
            ty: ty.clone(),
            ptr,
        });
        Value::Reg { id: dst, ty, slot: false }
    }

    fn factor(&mut self, factor: &Factor) -> CompileResult<Value> {
        match factor {
            Factor::Int { value, .. } => Ok(Value::Int {
                value: *value,
                ty: Ty::I64,
            }),
            Factor::Float { value, .. } => Ok(Value::Float { value: *value }),
            Factor::Bool { value, .. } => Ok(Value::bool(*value)),
            Factor::Duration { value, unit, .. } => Ok(Value::Float {
                value: *value as f64 * unit_seconds(unit),
            }),
            Factor::Str { value, .. } => Ok(self.string_literal(value)),
            Factor::Sub { expr, .. } => self.expression(expr),
            Factor::New { class, args, span } => self.instantiate(class, args, *span),
            Factor::Call { name, args, span } => self.call(&name.name, args, *span, None),
            Factor::MethodCall { target, args, span } => self.method_call(target, args, *span),
            Factor::Ident(path) => self.identifier_value(path),
        }
    }

    /// Strings live on the heap: `malloc(len + 1)`, one store per byte, then
    /// the zero terminator.
    fn string_literal(&mut self, text: &str) -> Value {
        self.unit
            .module
            .ensure_declared("malloc", Ty::string(), vec![("size".to_string(), Ty::I64)]);

        let bytes = text.as_bytes();
        let dst = self.fresh_reg();
        self.emit(Instr::Call {
            dst: Some(dst),
            ret: Ty::string(),
            callee: "malloc".to_string(),
            args: vec![Value::Int {
                value: bytes.len() as i64 + 1,
                ty: Ty::I64,
            }],
        });
        let ptr = Value::Reg {
            id: dst,
            ty: Ty::string(),
            slot: false,
        };

        for (offset, byte) in bytes.iter().chain(std::iter::once(&0u8)).enumerate() {
            let slot = self.fresh_reg();
            self.emit(Instr::GetElementPtr {
                dst: slot,
                base_ty: Ty::I8,
                ptr: ptr.clone(),
                indices: vec![Value::Int {
                    value: offset as i64,
                    ty: Ty::I64,
                }],
            });
            self.emit(Instr::Store {
                value: Value::Int {
                    value: *byte as i64,
                    ty: Ty::I8,
                },
                ptr: Value::Reg {
                    id: slot,
                    ty: Ty::string(),
                    slot: true,
                },
            });
        }
        ptr
    }

    /// `new C(args)`: stack-allocate the layout, run the zeroing initializer
    /// when the class has one, then the constructor when the class has one.
    /// Initializer zeroes, constructor overwrites.
    fn instantiate(&mut self, class: &crate::ast::Ident, args: &[Expression], span: SourceSpan) -> CompileResult<Value> {
        let layout = self
            .unit
            .classes
            .get(&class.name)
            .cloned()
            .ok_or_else(|| CompileError::UnknownClass {
                src: self.src(),
                span,
                name: class.name.clone(),
            })?;

        let this = self.alloca(Ty::Named(layout.name.clone()));

        let init_name = initializer_name(&layout.name);
        if self.unit.module.function(&init_name).is_some() {
            self.emit(Instr::Call {
                dst: None,
                ret: Ty::Void,
                callee: init_name,
                args: vec![this.clone()],
            });
        }

        if let Some(arity) = layout.constructor_arity {
            if args.len() != arity {
                return Err(CompileError::WrongConstructorArity {
                    src: self.src(),
                    span,
                    name: layout.name.clone(),
                    expected: arity,
                    found: args.len(),
                }
                .into());
            }
            let mut call_args = vec![this.clone()];
            for arg in args {
                call_args.push(self.expression(arg)?);
            }
            self.emit(Instr::Call {
                dst: None,
                ret: Ty::Void,
                callee: format!("{}.constructor", layout.name),
                args: call_args,
            });
        }

        Ok(this)
    }

    fn call(
        &mut self,
        callee: &str,
        args: &[Expression],
        span: SourceSpan,
        receiver: Option<Value>,
    ) -> CompileResult<Value> {
        let ret = match self.unit.module.function(callee) {
            Some(func) => func.ret.clone(),
            None => {
                return Err(CompileError::UnknownFunction {
                    src: self.src(),
                    span,
                    name: callee.to_string(),
                }
                .into());
            }
        };

        let mut call_args = vec![];
        if let Some(receiver) = receiver {
            call_args.push(receiver);
        }
        for arg in args {
            call_args.push(self.expression(arg)?);
        }

        if ret == Ty::Void {
            self.emit(Instr::Call {
                dst: None,
                ret: Ty::Void,
                callee: callee.to_string(),
                args: call_args,
            });
            Ok(Value::Int { value: 0, ty: Ty::Void })
        } else {
            let dst = self.fresh_reg();
            self.emit(Instr::Call {
                dst: Some(dst),
                ret: ret.clone(),
                callee: callee.to_string(),
                args: call_args,
            });
            Ok(Value::Reg { id: dst, ty: ret, slot: false })
        }
    }

    /// `a.b.method(args)`: everything before the last segment resolves the
    /// receiver, the last segment is the method. The receiver pointer is
    /// passed as the implicit first argument.
    fn method_call(&mut self, target: &DottedIdent, args: &[Expression], span: SourceSpan) -> CompileResult<Value> {
        let method = &target.segments[target.segments.len() - 1];
        let receiver_path = DottedIdent {
            segments: target.segments[..target.segments.len() - 1].to_vec(),
            span: target.span,
        };

        let receiver = if receiver_path.segments.len() == 1 {
            let name = &receiver_path.head().name;
            self.lookup_name(name).ok_or_else(|| CompileError::UnboundName {
                src: self.src(),
                span: receiver_path.span,
                name: name.clone(),
            })?
        } else {
            let (ptr, field_ty) = self.field_pointer(&receiver_path)?;
            // A pointer-typed field holds the instance pointer itself.
            if field_ty.is_ptr() {
                self.load(ptr)
            } else {
                ptr
            }
        };

        let class_name = match receiver.ty().pointee() {
            Ty::Named(name) => name.clone(),
            _ => {
                return Err(CompileError::MethodOnValue {
                    src: self.src(),
                    span,
                    method: method.name.clone(),
                }
                .into());
            }
        };

        let qualified = format!("{}.{}", class_name, method.name);
        if self.unit.module.function(&qualified).is_none() {
            return Err(CompileError::UnknownMethod {
                src: self.src(),
                span: method.span,
                method: method.name.clone(),
                type_name: class_name,
            }
            .into());
        }
        self.call(&qualified, args, span, Some(receiver))
    }

    /// A plain identifier loads scalars out of their slot but yields struct
    /// and pointer slots as-is; a dotted identifier walks the field layouts
    /// and loads the final field.
    fn identifier_value(&mut self, path: &DottedIdent) -> CompileResult<Value> {
        if path.segments.len() == 1 {
            let name = &path.head().name;
            let value = self.lookup_name(name).ok_or_else(|| CompileError::UnboundName {
                src: self.src(),
                span: path.span,
                name: name.clone(),
            })?;
            if Self::is_storage(&value) {
                match value.ty().pointee() {
                    Ty::Named(_) | Ty::Ptr(_) => Ok(value),
                    _ => Ok(self.load(value)),
                }
            } else {
                Ok(value)
            }
        } else {
            let (ptr, _) = self.field_pointer(path)?;
            Ok(self.load(ptr))
        }
    }

    /// Resolves `a.b.c` to a pointer at the final field, chaining
    /// `getelementptr` through each intermediate struct. Struct-valued
    /// fields chain directly; pointer-valued fields are loaded first.
    fn field_pointer(&mut self, path: &DottedIdent) -> CompileResult<(Value, Ty)> {
        let head = path.head();
        let base = self.lookup_name(&head.name).ok_or_else(|| CompileError::UnboundName {
            src: self.src(),
            span: head.span,
            name: head.name.clone(),
        })?;

        let mut class_name = match base.ty().pointee() {
            Ty::Named(name) => name.clone(),
            other => {
                return Err(CompileError::UnknownField {
                    src: self.src(),
                    span: path.segments[1].span,
                    field: path.segments[1].name.clone(),
                    type_name: other.to_string(),
                }
                .into());
            }
        };
        let mut ptr = base;

        for (pos, segment) in path.segments.iter().enumerate().skip(1) {
            let layout = self
                .unit
                .classes
                .get(&class_name)
                .cloned()
                .ok_or_else(|| CompileError::UnknownClass {
                    src: self.src(),
                    span: segment.span,
                    name: class_name.clone(),
                })?;
            let idx = layout.field_index(&segment.name).ok_or_else(|| CompileError::UnknownField {
                src: self.src(),
                span: segment.span,
                field: segment.name.clone(),
                type_name: class_name.clone(),
            })?;
            let field_ty = layout.fields[idx].ty.clone();

            let dst = self.fresh_reg();
            self.emit(Instr::GetElementPtr {
                dst,
                base_ty: Ty::Named(class_name.clone()),
                ptr,
                indices: vec![
                    Value::Int { value: 0, ty: Ty::I32 },
                    Value::Int {
                        value: idx as i64,
                        ty: Ty::I32,
                    },
                ],
            });
            let gep = Value::Reg {
                id: dst,
                ty: Ty::ptr_to(field_ty.clone()),
                slot: true,
            };

            if pos == path.segments.len() - 1 {
                return Ok((gep, field_ty));
            }

            match &field_ty {
                Ty::Named(next) => {
                    class_name = next.clone();
                    ptr = gep;
                }
                Ty::Ptr(inner) => match inner.as_ref() {
                    Ty::Named(next) => {
                        class_name = next.clone();
                        ptr = self.load(gep);
                    }
                    other => {
                        return Err(CompileError::UnknownField {
                            src: self.src(),
                            span: path.segments[pos + 1].span,
                            field: path.segments[pos + 1].name.clone(),
                            type_name: other.to_string(),
                        }
                        .into());
                    }
                },
                other => {
                    return Err(CompileError::UnknownField {
                        src: self.src(),
                        span: path.segments[pos + 1].span,
                        field: path.segments[pos + 1].name.clone(),
                        type_name: other.to_string(),
                    }
                    .into());
                }
            }
        }
        unreachable!("dotted path has at least two segments")
    }
}

pub(crate) fn initializer_name(class_name: &str) -> String {
    format!("{}.-init", class_name)
}

fn unit_seconds(unit: &str) -> f64 {
    match unit {
        "h" => 3600.0,
        "m" => 60.0,
        "s" => 1.0,
        "ms" => 1e-3,
        "us" => 1e-6,
        _ => 1e-9, // ns; the parser admits no other unit
    }
}

fn zero_value(ty: &Ty) -> Option<Value> {
    match ty {
        Ty::Int { .. } | Ty::Bool | Ty::Duration => Some(Value::Int { value: 0, ty: ty.clone() }),
        Ty::Float { .. } => Some(Value::Float { value: 0.0 }),
        Ty::Ptr(_) => Some(Value::Null(ty.clone())),
        Ty::Void | Ty::Named(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_units() {
        assert_eq!(unit_seconds("h"), 3600.0);
        assert_eq!(unit_seconds("m"), 60.0);
        assert_eq!(unit_seconds("s"), 1.0);
        assert_eq!(unit_seconds("ms"), 1e-3);
        assert_eq!(unit_seconds("us"), 1e-6);
        assert_eq!(unit_seconds("ns"), 1e-9);
    }

    #[test]
    fn zero_values_cover_scalars_and_pointers() {
        assert_eq!(
            zero_value(&Ty::I64),
            Some(Value::Int { value: 0, ty: Ty::I64 })
        );
        assert_eq!(
            zero_value(&Ty::string()),
            Some(Value::Null(Ty::string()))
        );
        assert_eq!(zero_value(&Ty::Named("Point".into())), None);
    }
}
