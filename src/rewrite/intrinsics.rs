//! The `Hlsl` intrinsic class: host-side names of dialect built-ins.

/// Receiver name kernel bodies use to call an intrinsic (`Hlsl.Sqrt(x)`).
pub const INTRINSIC_CLASS: &str = "Hlsl";

/// (host name, dialect name), sorted by host name.
const INTRINSICS: &[(&str, &str)] = &[
    ("Abs", "abs"),
    ("Acos", "acos"),
    ("All", "all"),
    ("Any", "any"),
    ("AsDouble", "asdouble"),
    ("AsFloat", "asfloat"),
    ("AsInt", "asint"),
    ("AsUInt", "asuint"),
    ("Asin", "asin"),
    ("Atan", "atan"),
    ("Atan2", "atan2"),
    ("Ceil", "ceil"),
    ("Clamp", "clamp"),
    ("Cos", "cos"),
    ("Cosh", "cosh"),
    ("CountBits", "countbits"),
    ("Cross", "cross"),
    ("Degrees", "degrees"),
    ("Distance", "distance"),
    ("Dot", "dot"),
    ("Exp", "exp"),
    ("Exp2", "exp2"),
    ("FirstBitHigh", "firstbithigh"),
    ("FirstBitLow", "firstbitlow"),
    ("Floor", "floor"),
    ("Fma", "fma"),
    ("Fmod", "fmod"),
    ("Frac", "frac"),
    ("IsFinite", "isfinite"),
    ("IsInfinite", "isinf"),
    ("IsNaN", "isnan"),
    ("Ldexp", "ldexp"),
    ("Length", "length"),
    ("Lerp", "lerp"),
    ("Log", "log"),
    ("Log10", "log10"),
    ("Log2", "log2"),
    ("Mad", "mad"),
    ("Max", "max"),
    ("Min", "min"),
    ("Normalize", "normalize"),
    ("Pow", "pow"),
    ("Radians", "radians"),
    ("Rcp", "rcp"),
    ("Reflect", "reflect"),
    ("Refract", "refract"),
    ("ReverseBits", "reversebits"),
    ("Round", "round"),
    ("Rsqrt", "rsqrt"),
    ("Saturate", "saturate"),
    ("Sign", "sign"),
    ("Sin", "sin"),
    ("Sinh", "sinh"),
    ("SmoothStep", "smoothstep"),
    ("Sqrt", "sqrt"),
    ("Step", "step"),
    ("Tan", "tan"),
    ("Tanh", "tanh"),
    ("Trunc", "trunc"),
];

/// Dialect name of an `Hlsl.<name>` intrinsic.
pub fn lookup(name: &str) -> Option<&'static str> {
    INTRINSICS
        .binary_search_by(|(host, _)| host.cmp(&name))
        .ok()
        .map(|i| INTRINSICS[i].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        assert!(INTRINSICS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("Sqrt"), Some("sqrt"));
        assert_eq!(lookup("AsUInt"), Some("asuint"));
        assert_eq!(lookup("IsInfinite"), Some("isinf"));
        assert_eq!(lookup("sqrt"), None);
        assert_eq!(lookup("Teleport"), None);
    }
}
