//! Member classification: which binding category each captured field is.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::rewrite::keywords;
use crate::span::Span;
use crate::types::HostType;

use super::MemberSpec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Scalar,
    Vector,
    ConstantBufferRef,
    ReadOnlyBufferRef,
    ReadWriteBufferRef,
    StatelessFunctionRef,
}

impl Category {
    /// Scalar and vector members live in the constant blob.
    pub fn is_value(&self) -> bool {
        matches!(self, Category::Scalar | Category::Vector)
    }
}

/// A classified member of a kernel shape.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedMember {
    /// Leaf field name as registered.
    pub name: String,
    /// Name of the member in generated text.
    pub dialect_name: String,
    pub ty: HostType,
    pub category: Category,
    /// Declaration-order index.
    pub index: usize,
    /// Access path through enclosing scopes, leaf included.
    pub path: Option<Vec<String>>,
}

impl CapturedMember {
    /// The path the kernel body uses to reach this member.
    pub fn access_path(&self) -> Vec<String> {
        self.path.clone().unwrap_or_else(|| vec![self.name.clone()])
    }
}

/// First matching category for a host type, or `None` if nothing fits.
pub fn category_of(ty: &HostType) -> Option<Category> {
    match ty {
        HostType::ConstantBuffer(elem) if elem.is_numeric() => Some(Category::ConstantBufferRef),
        HostType::ReadOnlyBuffer(elem) if elem.is_numeric() => Some(Category::ReadOnlyBufferRef),
        HostType::ReadWriteBuffer(elem) if elem.is_numeric() => Some(Category::ReadWriteBufferRef),
        HostType::Scalar(_) => Some(Category::Scalar),
        HostType::Vector(..) => Some(Category::Vector),
        HostType::Function(sig) if sig.stateless && sig.is_numeric() => Some(Category::StatelessFunctionRef),
        _ => None,
    }
}

/// Classify registered members in declaration order.
pub fn classify<'m>(kernel: &str, specs: impl IntoIterator<Item = &'m MemberSpec>) -> Result<Vec<CapturedMember>> {
    let mut members = Vec::new();
    let mut seen: HashMap<String, String> = HashMap::new();

    for (index, spec) in specs.into_iter().enumerate() {
        let shown = match &spec.path {
            Some(path) => path.join("."),
            None => spec.name.clone(),
        };
        let category = category_of(&spec.ty).ok_or_else(|| Error::UnsupportedCapture {
            kernel: kernel.to_string(),
            member: shown.clone(),
            type_name: spec.ty.host_name(),
        })?;

        // Nested members are flattened to their leaf name, so two leaves
        // with the same name cannot both live at the top level.
        let dialect_name = keywords::escape(&spec.name);
        if let Some(previous) = seen.insert(dialect_name.clone(), shown.clone()) {
            return Err(Error::translation(
                format!(
                    "kernel `{}` captures both `{}` and `{}`, which flatten to the same name `{}`",
                    kernel, previous, shown, dialect_name
                ),
                Span::dummy(),
            ));
        }

        members.push(CapturedMember {
            name: spec.name.clone(),
            dialect_name,
            ty: spec.ty.clone(),
            category,
            index,
            path: spec.path.clone(),
        });
    }

    if members.is_empty() {
        return Err(Error::EmptyKernel {
            kernel: kernel.to_string(),
        });
    }
    Ok(members)
}
