//! Dialect reserved words and the identifier remap applied to them.

/// Prefix given to host identifiers that collide with dialect keywords.
pub const RESERVED_PREFIX: &str = "__reserved__";

/// HLSL keywords, built-in type names and names the generated code itself
/// uses. Kept sorted for binary search.
const RESERVED: &[&str] = &[
    "AppendStructuredBuffer",
    "Buffer",
    "ByteAddressBuffer",
    "ConstantBuffer",
    "ConsumeStructuredBuffer",
    "Execute",
    "InputPatch",
    "OutputPatch",
    "RWBuffer",
    "RWByteAddressBuffer",
    "RWStructuredBuffer",
    "RWTexture1D",
    "RWTexture2D",
    "RWTexture3D",
    "SamplerComparisonState",
    "SamplerState",
    "StructuredBuffer",
    "Texture1D",
    "Texture2D",
    "Texture3D",
    "TextureCube",
    "ThreadIds",
    "asm",
    "asm_fragment",
    "bool",
    "break",
    "case",
    "cbuffer",
    "centroid",
    "class",
    "column_major",
    "compile",
    "compile_fragment",
    "const",
    "continue",
    "default",
    "discard",
    "do",
    "double",
    "dword",
    "else",
    "export",
    "extern",
    "false",
    "float",
    "for",
    "fxgroup",
    "groupshared",
    "half",
    "if",
    "in",
    "inline",
    "inout",
    "int",
    "interface",
    "line",
    "lineadj",
    "linear",
    "matrix",
    "min10float",
    "min12int",
    "min16float",
    "min16int",
    "min16uint",
    "namespace",
    "nointerpolation",
    "noperspective",
    "out",
    "packoffset",
    "pass",
    "point",
    "precise",
    "register",
    "return",
    "row_major",
    "sample",
    "sampler",
    "shared",
    "snorm",
    "stateblock",
    "static",
    "string",
    "struct",
    "switch",
    "tbuffer",
    "technique",
    "texture",
    "triangle",
    "triangleadj",
    "true",
    "typedef",
    "uint",
    "uniform",
    "unorm",
    "unsigned",
    "vector",
    "void",
    "volatile",
    "while",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED.binary_search(&name).is_ok()
        // `__x`, `__y`, `__z` and other double-underscore names are ours.
        || name.starts_with("__")
}

/// Remap an identifier so it cannot collide with a dialect keyword.
pub fn escape(name: &str) -> String {
    if is_reserved(name) {
        format!("{}{}", RESERVED_PREFIX, name)
    } else {
        name.to_string()
    }
}
