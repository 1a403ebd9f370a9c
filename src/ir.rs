use crate::types::Ty;
use std::fmt::{Display, Formatter};

/// Index of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int { value: i64, ty: Ty },
    Float { value: f64 },
    Null(Ty),
    /// Result of an instruction. `slot` marks registers that hold a storage
    /// address (alloca and getelementptr results) rather than a plain value;
    /// reads through them go via `load`, writes via `store`.
    Reg { id: usize, ty: Ty, slot: bool },
    Param { name: String, ty: Ty },
    Global { name: String, ty: Ty },
}

impl Value {
    pub fn bool(value: bool) -> Value {
        Value::Int {
            value: value as i64,
            ty: Ty::Bool,
        }
    }

    pub fn ty(&self) -> Ty {
        match self {
            Value::Int { ty, .. } => ty.clone(),
            Value::Float { .. } => Ty::F64,
            Value::Null(ty) => ty.clone(),
            Value::Reg { ty, .. } => ty.clone(),
            Value::Param { ty, .. } => ty.clone(),
            Value::Global { ty, .. } => ty.clone(),
        }
    }

    pub fn is_slot(&self) -> bool {
        matches!(self, Value::Reg { slot: true, .. })
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int { value, .. } => write!(f, "{}", value),
            Value::Float { value } => write!(f, "{:?}", value),
            Value::Null(_) => write!(f, "null"),
            Value::Reg { id, .. } => write!(f, "%t{}", id),
            Value::Param { name, .. } => write!(f, "%{}", name),
            Value::Global { name, .. } => write!(f, "@{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
}

impl BinOp {
    fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
        }
    }
}

/// The six signed comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl Pred {
    fn mnemonic(self) -> &'static str {
        match self {
            Pred::Eq => "eq",
            Pred::Ne => "ne",
            Pred::Slt => "slt",
            Pred::Sle => "sle",
            Pred::Sgt => "sgt",
            Pred::Sge => "sge",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Alloca {
        dst: usize,
        ty: Ty,
    },
    Load {
        dst: usize,
        ty: Ty,
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    /// Struct field addressing: `base_ty` is the aggregate the pointer
    /// points at, `indices` select into it.
    GetElementPtr {
        dst: usize,
        base_ty: Ty,
        ptr: Value,
        indices: Vec<Value>,
    },
    Bin {
        dst: usize,
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        dst: usize,
        pred: Pred,
        lhs: Value,
        rhs: Value,
    },
    Call {
        dst: Option<usize>,
        ret: Ty,
        callee: String,
        args: Vec<Value>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(Option<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub instrs: Vec<Instr>,
    pub term: Option<Terminator>,
}

impl Block {
    pub fn is_terminated(&self) -> bool {
        self.term.is_some()
    }

    /// First terminator wins. A block already closed by `break` or `return`
    /// keeps that terminator; the structured-control epilogue that follows
    /// is dropped.
    pub fn terminate(&mut self, term: Terminator) {
        if self.term.is_none() {
            self.term = Some(term);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ret: Ty,
    pub params: Vec<(String, Ty)>,
    pub blocks: Vec<Block>,
    /// Prototype only (`declare` in the rendered text).
    pub is_decl: bool,
    next_reg: usize,
    next_label: usize,
}

impl Function {
    pub fn define(name: impl Into<String>, ret: Ty, params: Vec<(String, Ty)>) -> Self {
        let mut func = Function {
            name: name.into(),
            ret,
            params,
            blocks: vec![],
            is_decl: false,
            next_reg: 0,
            next_label: 0,
        };
        func.add_block("entry");
        func
    }

    pub fn declare(name: impl Into<String>, ret: Ty, params: Vec<(String, Ty)>) -> Self {
        Function {
            name: name.into(),
            ret,
            params,
            blocks: vec![],
            is_decl: true,
            next_reg: 0,
            next_label: 0,
        }
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn add_block(&mut self, hint: &str) -> BlockId {
        let label = if self.blocks.is_empty() {
            hint.to_string()
        } else {
            let label = format!("{}{}", hint, self.next_label);
            self.next_label += 1;
            label
        };
        self.blocks.push(Block {
            label,
            instrs: vec![],
            term: None,
        });
        BlockId(self.blocks.len() - 1)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }

    pub fn fresh_reg(&mut self) -> usize {
        let id = self.next_reg;
        self.next_reg += 1;
        id
    }

    pub fn param(&self, name: &str) -> Option<Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(n, ty)| Value::Param {
            name: n.clone(),
            ty: ty.clone(),
        })
    }

    /// Whether any branch in the function targets this block. Blocks whose
    /// incoming branches were all dropped by first-write-wins termination
    /// end up unreachable.
    pub fn has_predecessors(&self, id: BlockId) -> bool {
        self.blocks.iter().any(|block| match &block.term {
            Some(Terminator::Br(target)) => *target == id,
            Some(Terminator::CondBr {
                then_block,
                else_block,
                ..
            }) => *then_block == id || *else_block == id,
            _ => false,
        })
    }

    fn label(&self, id: BlockId) -> &str {
        &self.blocks[id.0].label
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<Ty>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDef {
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub type_defs: Vec<TypeDef>,
    pub globals: Vec<GlobalDef>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Adds a function, replacing any previous one with the same name so a
    /// definition can supersede an earlier prototype.
    pub fn add_function(&mut self, func: Function) -> usize {
        if let Some(idx) = self.functions.iter().position(|f| f.name == func.name) {
            self.functions[idx] = func;
            idx
        } else {
            self.functions.push(func);
            self.functions.len() - 1
        }
    }

    /// Declares an external prototype unless the name is already present.
    pub fn ensure_declared(&mut self, name: &str, ret: Ty, params: Vec<(String, Ty)>) {
        if self.function(name).is_none() {
            self.functions.push(Function::declare(name, ret, params));
        }
    }

    pub fn add_type_def(&mut self, name: impl Into<String>, fields: Vec<Ty>) {
        let name = name.into();
        if let Some(def) = self.type_defs.iter_mut().find(|d| d.name == name) {
            def.fields = fields;
        } else {
            self.type_defs.push(TypeDef { name, fields });
        }
    }
}

fn signature(f: &mut Formatter<'_>, func: &Function) -> std::fmt::Result {
    let params = func
        .params
        .iter()
        .map(|(name, ty)| {
            if func.is_decl {
                ty.to_string()
            } else {
                format!("{} %{}", ty, name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    write!(f, "{} @{}({})", func.ret, func.name, params)
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for def in &self.type_defs {
            let fields = def
                .fields
                .iter()
                .map(Ty::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "%{} = type {{ {} }}", def.name, fields)?;
        }
        if !self.type_defs.is_empty() {
            writeln!(f)?;
        }

        for global in &self.globals {
            writeln!(f, "@{} = external global {}", global.name, global.ty)?;
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
        }

        for func in self.functions.iter().filter(|func| func.is_decl) {
            write!(f, "declare ")?;
            signature(f, func)?;
            writeln!(f)?;
        }

        for func in self.functions.iter().filter(|func| !func.is_decl) {
            writeln!(f)?;
            write!(f, "define ")?;
            signature(f, func)?;
            writeln!(f, " {{")?;
            for block in &func.blocks {
                writeln!(f, "{}:", block.label)?;
                for instr in &block.instrs {
                    write_instr(f, instr)?;
                }
                match &block.term {
                    Some(Terminator::Br(target)) => {
                        writeln!(f, "  br label %{}", func.label(*target))?;
                    }
                    Some(Terminator::CondBr {
                        cond,
                        then_block,
                        else_block,
                    }) => {
                        writeln!(
                            f,
                            "  br i1 {}, label %{}, label %{}",
                            cond,
                            func.label(*then_block),
                            func.label(*else_block)
                        )?;
                    }
                    Some(Terminator::Ret(Some(value))) => {
                        writeln!(f, "  ret {} {}", value.ty(), value)?;
                    }
                    Some(Terminator::Ret(None)) => {
                        writeln!(f, "  ret void")?;
                    }
                    None => writeln!(f, "  unreachable")?,
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

fn write_instr(f: &mut Formatter<'_>, instr: &Instr) -> std::fmt::Result {
    match instr {
        Instr::Alloca { dst, ty } => writeln!(f, "  %t{} = alloca {}", dst, ty),
        Instr::Load { dst, ty, ptr } => {
            writeln!(f, "  %t{} = load {}, {} {}", dst, ty, ptr.ty(), ptr)
        }
        Instr::Store { value, ptr } => {
            writeln!(f, "  store {} {}, {} {}", value.ty(), value, ptr.ty(), ptr)
        }
        Instr::GetElementPtr {
            dst,
            base_ty,
            ptr,
            indices,
        } => {
            write!(f, "  %t{} = getelementptr {}, {} {}", dst, base_ty, ptr.ty(), ptr)?;
            for index in indices {
                write!(f, ", {} {}", index.ty(), index)?;
            }
            writeln!(f)
        }
        Instr::Bin { dst, op, lhs, rhs } => {
            writeln!(f, "  %t{} = {} {} {}, {}", dst, op.mnemonic(), lhs.ty(), lhs, rhs)
        }
        Instr::ICmp { dst, pred, lhs, rhs } => {
            writeln!(
                f,
                "  %t{} = icmp {} {} {}, {}",
                dst,
                pred.mnemonic(),
                lhs.ty(),
                lhs,
                rhs
            )
        }
        Instr::Call {
            dst,
            ret,
            callee,
            args,
        } => {
            let args = args
                .iter()
                .map(|a| format!("{} {}", a.ty(), a))
                .collect::<Vec<_>>()
                .join(", ");
            match dst {
                Some(dst) => writeln!(f, "  %t{} = call {} @{}({})", dst, ret, callee, args),
                None => writeln!(f, "  call {} @{}({})", ret, callee, args),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_terminator_wins() {
        let mut func = Function::define("f", Ty::Void, vec![]);
        let entry = func.entry();
        func.block_mut(entry).terminate(Terminator::Ret(None));
        let other = func.add_block("dead");
        func.block_mut(entry).terminate(Terminator::Br(other));
        assert_eq!(func.block(entry).term, Some(Terminator::Ret(None)));
    }

    #[test]
    fn definition_replaces_prototype() {
        let mut module = Module::new();
        module.ensure_declared("f", Ty::I64, vec![("x".into(), Ty::I64)]);
        module.add_function(Function::define("f", Ty::I64, vec![("x".into(), Ty::I64)]));
        assert_eq!(module.functions.len(), 1);
        assert!(!module.functions[0].is_decl);
    }

    #[test]
    fn renders_a_small_function() {
        let mut module = Module::new();
        let mut func = Function::define("add", Ty::I64, vec![("a".into(), Ty::I64), ("b".into(), Ty::I64)]);
        let entry = func.entry();
        let dst = func.fresh_reg();
        let a = func.param("a").unwrap();
        let b = func.param("b").unwrap();
        func.block_mut(entry).instrs.push(Instr::Bin {
            dst,
            op: BinOp::Add,
            lhs: a,
            rhs: b,
        });
        func.block_mut(entry).terminate(Terminator::Ret(Some(Value::Reg {
            id: dst,
            ty: Ty::I64,
            slot: false,
        })));
        module.add_function(func);

        let text = module.to_string();
        assert!(text.contains("define i64 @add(i64 %a, i64 %b) {"));
        assert!(text.contains("%t0 = add i64 %a, %b"));
        assert!(text.contains("ret i64 %t0"));
    }

    #[test]
    fn renders_type_defs_and_declarations() {
        let mut module = Module::new();
        module.add_type_def("Point", vec![Ty::I64, Ty::I64]);
        module.ensure_declared("malloc", Ty::ptr_to(Ty::I8), vec![("size".into(), Ty::I64)]);

        let text = module.to_string();
        assert!(text.contains("%Point = type { i64, i64 }"));
        assert!(text.contains("declare i8* @malloc(i64)"));
    }
}
