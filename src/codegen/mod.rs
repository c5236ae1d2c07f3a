//! Dialect text assembly.
//!
//! Puts a translated kernel together with its binding plan into one HLSL
//! compute shader. The blob `cbuffer` lists the header words and then
//! every value member in declaration order, so the compiler's own packing
//! reproduces the offsets chosen by [`crate::layout`].

use std::fmt::Write;

use crate::error::{Error, Result};
use crate::layout::{BindingPlan, Placement, ResourceClass, BLOB_SLOT};
use crate::rewrite::{ConstantDecl, HelperFunction, ENTRY_POINT, THREAD_IDS};
use crate::span::Span;
use crate::types::HostType;

/// Element count declared for constant-buffer array members.
pub const CONSTANT_BUFFER_LEN: u32 = 4096;

const INDENT: &str = "    ";

/// Everything that goes into one shader source.
pub struct Program<'a> {
    pub kernel: &'a str,
    pub plan: &'a BindingPlan,
    pub thread_group: [u32; 3],
    pub constants: &'a [ConstantDecl],
    pub helpers: &'a [HelperFunction],
    /// Entry body lines at relative depth 0.
    pub body: &'a [String],
}

fn dialect(ty: &HostType) -> Result<String> {
    ty.dialect_name().ok_or_else(|| Error::UnsupportedType {
        name: ty.host_name(),
        span: Span::dummy(),
    })
}

fn element(ty: &HostType) -> Result<String> {
    match ty {
        HostType::ConstantBuffer(elem) | HostType::ReadOnlyBuffer(elem) | HostType::ReadWriteBuffer(elem) => {
            dialect(elem)
        }
        other => dialect(other),
    }
}

/// Render the complete shader source.
pub fn render(program: &Program) -> Result<String> {
    let mut sections: Vec<String> = Vec::new();
    sections.push(format!("// Generated by kernelforge for kernel `{}`.", program.kernel));

    // ─── Constant blob ─────────────────────────────────────────
    let mut blob = format!("cbuffer __Dispatch : register(b{})\n{{\n", BLOB_SLOT);
    for axis in ["__x", "__y", "__z"] {
        let _ = writeln!(blob, "{}uint {};", INDENT, axis);
    }
    for member in program.plan.members() {
        if let Placement::Constant { .. } = member.placement {
            let _ = writeln!(blob, "{}{} {};", INDENT, dialect(&member.ty)?, member.name);
        }
    }
    blob.push_str("};");
    sections.push(blob);

    // ─── Resources ─────────────────────────────────────────────
    let mut resources = Vec::new();
    for range in program.plan.descriptor_ranges() {
        let member = &program.plan.members()[range.member];
        let elem = element(&member.ty)?;
        resources.push(match range.class {
            ResourceClass::Constant => format!(
                "cbuffer __{}_cb : register({}) {{ {} {}[{}]; }};",
                member.name, range, elem, member.name, CONSTANT_BUFFER_LEN
            ),
            ResourceClass::ReadOnly => {
                format!("StructuredBuffer<{}> {} : register({});", elem, member.name, range)
            }
            ResourceClass::ReadWrite => {
                format!("RWStructuredBuffer<{}> {} : register({});", elem, member.name, range)
            }
        });
    }
    if !resources.is_empty() {
        sections.push(resources.join("\n"));
    }

    // ─── Statics and helpers ───────────────────────────────────
    // Prototypes first: constant initializers and helpers may call any helper.
    if !program.helpers.is_empty() {
        let prototypes: Vec<String> = program.helpers.iter().map(|h| format!("{};", h.prototype)).collect();
        sections.push(prototypes.join("\n"));
    }
    if !program.constants.is_empty() {
        let decls: Vec<&str> = program.constants.iter().map(|c| c.text.as_str()).collect();
        sections.push(decls.join("\n"));
    }
    for helper in program.helpers {
        sections.push(helper.text.clone());
    }

    // ─── Entry point ───────────────────────────────────────────
    let [x, y, z] = program.thread_group;
    let mut entry = format!(
        "[numthreads({}, {}, {})]\nvoid {}(uint3 {} : SV_DispatchThreadID)\n{{\n",
        x, y, z, ENTRY_POINT, THREAD_IDS
    );
    let _ = writeln!(
        entry,
        "{}if ({t}.x < __x && {t}.y < __y && {t}.z < __z)",
        INDENT,
        t = THREAD_IDS
    );
    let _ = writeln!(entry, "{}{{", INDENT);
    for line in program.body {
        if line.is_empty() {
            entry.push('\n');
        } else {
            let _ = writeln!(entry, "{}{}{}", INDENT, INDENT, line);
        }
    }
    let _ = writeln!(entry, "{}}}", INDENT);
    entry.push('}');
    sections.push(entry);

    let mut out = sections.join("\n\n");
    out.push('\n');
    Ok(out)
}
