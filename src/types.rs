use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// The closed set of value types the compiler works with. Equality is
/// structural.
#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    Int { bits: u32, signed: bool },
    Float { bits: u32 },
    Bool,
    Void,
    Ptr(Box<Ty>),
    /// 64-bit signed tick count; duration literals lower to f64 seconds.
    Duration,
    /// A declared class, laid out as a struct.
    Named(String),
}

impl Ty {
    pub const I8: Ty = Ty::Int { bits: 8, signed: true };
    pub const I32: Ty = Ty::Int { bits: 32, signed: true };
    pub const I64: Ty = Ty::Int { bits: 64, signed: true };
    pub const F64: Ty = Ty::Float { bits: 64 };

    pub fn ptr_to(inner: Ty) -> Ty {
        Ty::Ptr(Box::new(inner))
    }

    pub fn string() -> Ty {
        Ty::ptr_to(Ty::I8)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Ty::Ptr(_))
    }

    /// The pointee of a pointer type; any other type is its own pointee,
    /// which keeps loads through non-slot registers harmless.
    pub fn pointee(&self) -> &Ty {
        match self {
            Ty::Ptr(inner) => inner,
            other => other,
        }
    }
}

impl Display for Ty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Int { bits, .. } => write!(f, "i{}", bits),
            Ty::Float { bits: 32 } => write!(f, "float"),
            Ty::Float { .. } => write!(f, "double"),
            Ty::Bool => write!(f, "i1"),
            Ty::Void => write!(f, "void"),
            Ty::Ptr(inner) => write!(f, "{}*", inner),
            Ty::Duration => write!(f, "i64"),
            Ty::Named(name) => write!(f, "%{}", name),
        }
    }
}

/// Ordered field table of a declared class. Field indices follow declaration
/// order; methods do not occupy slots.
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Constructor parameter count, when the class declares one.
    pub constructor_arity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: Ty,
    pub private: bool,
}

impl StructLayout {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Resolves a textual type annotation against the builtin table and the
/// declared classes. Never fails: names that resolve to nothing become
/// `Void`, matching the permissive lookup the rest of the compiler expects.
pub fn resolve_type(text: &str, classes: &HashMap<String, StructLayout>) -> Ty {
    let mut stars = 0;
    let mut rest = text;
    while let Some(stripped) = rest.strip_prefix('*') {
        stars += 1;
        rest = stripped;
    }

    let base = resolve_base(rest, classes);
    (0..stars).fold(base, |ty, _| Ty::ptr_to(ty))
}

fn resolve_base(name: &str, classes: &HashMap<String, StructLayout>) -> Ty {
    match name {
        "int" => Ty::I64,
        "float" | "f64" => Ty::F64,
        "f32" => Ty::Float { bits: 32 },
        "bool" => Ty::Bool,
        "void" => Ty::Void,
        "string" => Ty::string(),
        "duration" => Ty::Duration,
        "byte" => Ty::Int { bits: 8, signed: false },
        "char" => Ty::I32,
        _ => {
            if let Some(width) = int_width(name) {
                return width;
            }
            // ptr8 / ptr16 / ... are pointer spellings, same family as *8.
            if let Some(rest) = name.strip_prefix("ptr") {
                if let Some(width) = int_width(rest).or_else(|| bare_width(rest)) {
                    return Ty::ptr_to(width);
                }
            }
            if let Some(width) = bare_width(name) {
                return width;
            }
            if classes.contains_key(name) {
                Ty::Named(name.to_string())
            } else {
                Ty::Void
            }
        }
    }
}

/// `i8`/`u64` style spellings.
fn int_width(name: &str) -> Option<Ty> {
    let signed = match name.chars().next()? {
        'i' => true,
        'u' => false,
        _ => return None,
    };
    let digits = &name[1..];
    match digits {
        "8" | "16" | "32" | "64" => Some(Ty::Int {
            bits: digits.parse().ok()?,
            signed,
        }),
        _ => None,
    }
}

/// Bare width after a `*` or `ptr` prefix (`*8` means pointer to i8).
fn bare_width(name: &str) -> Option<Ty> {
    match name {
        "8" | "16" | "32" | "64" => Some(Ty::Int {
            bits: name.parse().ok()?,
            signed: true,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_classes() -> HashMap<String, StructLayout> {
        HashMap::new()
    }

    #[test]
    fn builtins() {
        let classes = no_classes();
        assert_eq!(resolve_type("int", &classes), Ty::I64);
        assert_eq!(resolve_type("bool", &classes), Ty::Bool);
        assert_eq!(resolve_type("string", &classes), Ty::ptr_to(Ty::I8));
        assert_eq!(resolve_type("byte", &classes), Ty::Int { bits: 8, signed: false });
        assert_eq!(resolve_type("char", &classes), Ty::I32);
        assert_eq!(resolve_type("u16", &classes), Ty::Int { bits: 16, signed: false });
    }

    #[test]
    fn pointer_spellings_agree() {
        let classes = no_classes();
        let expected = Ty::ptr_to(Ty::I8);
        assert_eq!(resolve_type("*i8", &classes), expected);
        assert_eq!(resolve_type("*8", &classes), expected);
        assert_eq!(resolve_type("ptr8", &classes), expected);
        assert_eq!(
            resolve_type("**i32", &classes),
            Ty::ptr_to(Ty::ptr_to(Ty::I32))
        );
    }

    #[test]
    fn class_names_resolve_to_named() {
        let mut classes = no_classes();
        classes.insert(
            "Point".to_string(),
            StructLayout {
                name: "Point".to_string(),
                fields: vec![],
                constructor_arity: None,
            },
        );
        assert_eq!(
            resolve_type("Point", &classes),
            Ty::Named("Point".to_string())
        );
        assert_eq!(
            resolve_type("*Point", &classes),
            Ty::ptr_to(Ty::Named("Point".to_string()))
        );
    }

    #[test]
    fn unresolved_names_fall_back_to_void() {
        let classes = no_classes();
        assert_eq!(resolve_type("Mystery", &classes), Ty::Void);
        // Resolution is stable: resolving the rendered form of a resolved
        // builtin yields the same type.
        let once = resolve_type("i32", &classes);
        assert_eq!(resolve_type(&once.to_string(), &classes), once);
    }
}
