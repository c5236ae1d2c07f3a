//! Kernel shapes: the immutable, cached description of one kernel type.

use std::collections::BTreeSet;

use tracing::debug;

use crate::codegen::{self, Program};
use crate::error::{Error, Result};
use crate::identity::{self, KernelIdentity, StructuralId};
use crate::layout::BindingPlan;
use crate::rewrite::{self, Translation};
use crate::span::Span;
use crate::types::{FnSignature, HostType};

use super::classify::{self, CapturedMember, Category};
use super::{check_thread_group, Accessor, KernelDef, ShaderFn};

/// Classified members plus translated body of one kernel type.
pub struct KernelShape<K> {
    name: String,
    members: Vec<CapturedMember>,
    accessors: Vec<Accessor<K>>,
    translation: Translation,
    thread_group: [u32; 3],
    structural_id: StructuralId,
}

impl<K: 'static> KernelShape<K> {
    /// Classify and translate a registered kernel. Rejection happens
    /// before any translation work.
    pub fn build(def: KernelDef<K>) -> Result<Self> {
        let name = def.name().to_string();
        if def.members().is_empty() {
            return Err(Error::EmptyKernel { kernel: name });
        }
        let thread_group = def.thread_group_size();
        check_thread_group(thread_group)
            .map_err(|message| Error::translation(format!("kernel `{}`: {}", name, message), Span::dummy()))?;
        let members = classify::classify(&name, def.members().iter().map(|m| &m.spec))?;
        let translation = rewrite::rewrite_entry(&def, &members)?;
        let structural_id = identity::structural_id(&name, &members, &translation, thread_group);
        debug!(
            kernel.name = %name,
            members = members.len(),
            helpers = translation.helpers.len(),
            shape = %structural_id,
            "built kernel shape"
        );
        let accessors = def.members.into_iter().map(|m| m.accessor).collect();
        Ok(Self {
            name,
            members,
            accessors,
            translation,
            thread_group,
            structural_id,
        })
    }
}

impl<K> KernelShape<K> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[CapturedMember] {
        &self.members
    }

    /// Accessors in declaration order, parallel to [`Self::members`].
    pub fn accessors(&self) -> &[Accessor<K>] {
        &self.accessors
    }

    pub fn translation(&self) -> &Translation {
        &self.translation
    }

    pub fn thread_group(&self) -> [u32; 3] {
        self.thread_group
    }

    pub fn structural_id(&self) -> StructuralId {
        self.structural_id
    }

    /// Static paths the body reached, in discovery order.
    pub fn references(&self) -> &[String] {
        &self.translation.references
    }

    pub fn plan(&self) -> BindingPlan {
        BindingPlan::build(&self.members)
    }

    /// Functions bound to the function-reference members of `kernel`, in
    /// member order.
    pub fn bound_functions<'k>(&self, kernel: &'k K) -> Vec<(&CapturedMember, &'k ShaderFn)> {
        self.members
            .iter()
            .zip(&self.accessors)
            .filter_map(|(member, accessor)| match accessor {
                Accessor::Function(get) if member.category == Category::StatelessFunctionRef => {
                    Some((member, get(kernel)))
                }
                _ => None,
            })
            .collect()
    }

    /// Cache key of the program `kernel` compiles to.
    pub fn identity(&self, kernel: &K) -> KernelIdentity {
        let functions = self.bound_functions(kernel).into_iter().map(|(_, f)| f.id());
        KernelIdentity::new(&self.structural_id, functions)
    }

    /// Complete dialect source for `kernel`: the shape's own translation
    /// plus one helper per bound function reference.
    pub fn source_text(&self, kernel: &K, plan: &BindingPlan) -> Result<String> {
        let mut reserved: BTreeSet<String> = self.translation.names.clone();
        let mut helpers = Vec::new();
        for (member, function) in self.bound_functions(kernel) {
            if let HostType::Function(declared) = &member.ty {
                check_signature(&self.name, member, declared, function)?;
            }
            let translated = rewrite::rewrite_function(function.def(), &member.dialect_name, &reserved)?;
            reserved = translated.names;
            helpers.extend(translated.helpers);
        }
        helpers.extend(self.translation.helpers.iter().cloned());

        codegen::render(&Program {
            kernel: &self.name,
            plan,
            thread_group: self.thread_group,
            constants: &self.translation.constants,
            helpers: &helpers,
            body: &self.translation.body,
        })
    }
}

fn check_signature(kernel: &str, member: &CapturedMember, declared: &FnSignature, bound: &ShaderFn) -> Result<()> {
    let actual = bound.signature();
    if actual.params == declared.params && actual.ret == declared.ret {
        return Ok(());
    }
    Err(Error::translation(
        format!(
            "kernel `{}` declares `{}` as `{}` but the bound function `{}` is `{}`",
            kernel,
            member.name,
            member.ty.host_name(),
            bound.def().name.node,
            HostType::Function(actual.clone()).host_name()
        ),
        bound.def().name.span,
    ))
}
