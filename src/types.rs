//! Host type descriptors and their dialect equivalents.
//!
//! Every captured member carries a `HostType`; every type name written in a
//! kernel body is mapped through `dialect_type_name`. Anything that does not
//! map is rejected by the classifier or the rewriter.

pub mod vector;

pub use vector::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
}

impl ScalarKind {
    /// Dialect spelling of the scalar type.
    pub fn dialect_name(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::UInt => "uint",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
        }
    }

    /// Prefix of the host vector type family (`Float` → `Float3`).
    pub fn vector_family(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "Bool",
            ScalarKind::Int => "Int",
            ScalarKind::UInt => "UInt",
            ScalarKind::Float => "Float",
            ScalarKind::Double => "Double",
        }
    }

    /// GPU-side size in bytes. Booleans are 32-bit on the GPU regardless
    /// of the host representation.
    pub fn size(&self) -> u32 {
        match self {
            ScalarKind::Double => 8,
            _ => 4,
        }
    }

    fn from_host_name(name: &str) -> Option<ScalarKind> {
        match name {
            "bool" => Some(ScalarKind::Bool),
            "int" | "i32" => Some(ScalarKind::Int),
            "uint" | "u32" => Some(ScalarKind::UInt),
            "float" | "f32" => Some(ScalarKind::Float),
            "double" | "f64" => Some(ScalarKind::Double),
            _ => None,
        }
    }
}

/// Signature of a captured function reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FnSignature {
    pub params: Vec<HostType>,
    pub ret: Option<Box<HostType>>,
    /// False when the referenced function carries captured state of its own.
    pub stateless: bool,
}

impl FnSignature {
    pub fn new(params: Vec<HostType>, ret: Option<HostType>) -> Self {
        Self {
            params,
            ret: ret.map(Box::new),
            stateless: true,
        }
    }

    /// A function reference that closes over state (a delegate / closure).
    pub fn stateful(params: Vec<HostType>, ret: Option<HostType>) -> Self {
        Self {
            stateless: false,
            ..Self::new(params, ret)
        }
    }

    /// All parameter and return types are scalars or vectors.
    pub fn is_numeric(&self) -> bool {
        self.params.iter().all(HostType::is_numeric)
            && self.ret.as_deref().map_or(true, HostType::is_numeric)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Scalar(ScalarKind),
    Vector(ScalarKind, u8),
    ConstantBuffer(Box<HostType>),
    ReadOnlyBuffer(Box<HostType>),
    ReadWriteBuffer(Box<HostType>),
    Function(FnSignature),
    /// A host type with no dialect counterpart, kept by name for diagnostics.
    Opaque(String),
}

impl HostType {
    pub const BOOL: HostType = HostType::Scalar(ScalarKind::Bool);
    pub const INT: HostType = HostType::Scalar(ScalarKind::Int);
    pub const UINT: HostType = HostType::Scalar(ScalarKind::UInt);
    pub const FLOAT: HostType = HostType::Scalar(ScalarKind::Float);
    pub const DOUBLE: HostType = HostType::Scalar(ScalarKind::Double);

    /// Parse a scalar or vector host type name (`f32`, `Float3`, `UInt2`).
    pub fn parse(name: &str) -> Option<HostType> {
        if let Some(kind) = ScalarKind::from_host_name(name) {
            return Some(HostType::Scalar(kind));
        }
        let last = name.chars().last()?;
        let lanes = last.to_digit(10)? as u8;
        if !(2..=4).contains(&lanes) {
            return None;
        }
        let family = &name[..name.len() - last.len_utf8()];
        let kind = match family {
            "Bool" => ScalarKind::Bool,
            "Int" => ScalarKind::Int,
            "UInt" => ScalarKind::UInt,
            "Float" => ScalarKind::Float,
            "Double" => ScalarKind::Double,
            _ => return None,
        };
        Some(HostType::Vector(kind, lanes))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, HostType::Scalar(_) | HostType::Vector(..))
    }

    /// Dialect spelling for scalar and vector types.
    pub fn dialect_name(&self) -> Option<String> {
        match self {
            HostType::Scalar(kind) => Some(kind.dialect_name().to_string()),
            HostType::Vector(kind, lanes) => Some(format!("{}{}", kind.dialect_name(), lanes)),
            _ => None,
        }
    }

    /// Packed size inside the constant blob.
    pub fn byte_size(&self) -> Option<u32> {
        match self {
            HostType::Scalar(kind) => Some(kind.size()),
            HostType::Vector(kind, lanes) => Some(kind.size() * *lanes as u32),
            _ => None,
        }
    }

    /// Host-facing name used in error messages.
    pub fn host_name(&self) -> String {
        match self {
            HostType::Scalar(kind) => match kind {
                ScalarKind::Bool => "bool".to_string(),
                ScalarKind::Int => "i32".to_string(),
                ScalarKind::UInt => "u32".to_string(),
                ScalarKind::Float => "f32".to_string(),
                ScalarKind::Double => "f64".to_string(),
            },
            HostType::Vector(kind, lanes) => format!("{}{}", kind.vector_family(), lanes),
            HostType::ConstantBuffer(elem) => format!("ConstantBuffer<{}>", elem.host_name()),
            HostType::ReadOnlyBuffer(elem) => format!("ReadOnlyBuffer<{}>", elem.host_name()),
            HostType::ReadWriteBuffer(elem) => format!("ReadWriteBuffer<{}>", elem.host_name()),
            HostType::Function(sig) => {
                let params: Vec<String> = sig.params.iter().map(HostType::host_name).collect();
                let prefix = if sig.stateless { "fn" } else { "closure" };
                match &sig.ret {
                    Some(ret) => format!("{}({}) -> {}", prefix, params.join(", "), ret.host_name()),
                    None => format!("{}({})", prefix, params.join(", ")),
                }
            }
            HostType::Opaque(name) => name.clone(),
        }
    }
}

/// Map a host type name written in a kernel body to its dialect name.
pub fn dialect_type_name(host: &str) -> Option<String> {
    HostType::parse(host).and_then(|ty| ty.dialect_name())
}
