//! Kernel identity: the compilation cache key.
//!
//! A [`StructuralId`] is a blake3 digest over a canonical serialization of a
//! kernel shape (members, translated body, helpers, thread-group size). A
//! [`KernelIdentity`] folds the identities of the function references bound
//! in one live instance into the structural id, so the same shape with
//! different bound helpers compiles to different programs.
//!
//! Function identities come from [`Normalizer`], which hashes a function's
//! computation rather than its spelling: renaming a parameter, a local or
//! the function itself keeps the same id.

mod normalize;

pub use normalize::Normalizer;

use std::fmt;

use crate::ast::FnDef;
use crate::kernel::classify::CapturedMember;
use crate::rewrite::Translation;

/// Bumped whenever either serialization changes.
pub const HASH_VERSION: u8 = 1;

/// Odd multiplier of the order-sensitive identity mix.
const MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// A 32-byte blake3 digest of a kernel shape.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructuralId(pub [u8; 32]);

impl StructuralId {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First 8 bytes, little-endian.
    pub fn prefix(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(bytes)
    }
}

impl fmt::Debug for StructuralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructuralId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for StructuralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", &self.to_hex()[..16])
    }
}

/// Cache key of a compiled program. Never used for instance equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelIdentity(u64);

impl KernelIdentity {
    /// Mix bound function identities into a shape id, in member order.
    pub fn new(shape: &StructuralId, functions: impl IntoIterator<Item = u64>) -> Self {
        let mut h = shape.prefix();
        for id in functions {
            h = h.wrapping_mul(MIX).wrapping_add(id);
        }
        KernelIdentity(h)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for KernelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// ─── Shape hashing ─────────────────────────────────────────────────

/// Length-prefixed writes so adjacent fields cannot run together.
struct ShapeHasher(blake3::Hasher);

impl ShapeHasher {
    fn u8(&mut self, v: u8) {
        self.0.update(&[v]);
    }

    fn u32(&mut self, v: u32) {
        self.0.update(&v.to_le_bytes());
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.0.update(s.as_bytes());
    }

    fn strs<'s>(&mut self, items: impl ExactSizeIterator<Item = &'s str>) {
        self.u32(items.len() as u32);
        for s in items {
            self.str(s);
        }
    }
}

/// Structural id of a translated kernel shape.
pub fn structural_id(
    kernel: &str,
    members: &[CapturedMember],
    translation: &Translation,
    thread_group: [u32; 3],
) -> StructuralId {
    let mut h = ShapeHasher(blake3::Hasher::new());
    h.u8(HASH_VERSION);
    h.str(kernel);

    h.u32(members.len() as u32);
    for member in members {
        h.str(&member.dialect_name);
        h.str(&member.ty.host_name());
        h.u8(member.category as u8);
        h.strs(member.access_path().iter().map(String::as_str));
    }

    h.strs(translation.body.iter().map(String::as_str));
    h.strs(translation.helpers.iter().map(|f| f.text.as_str()));
    h.strs(translation.constants.iter().map(|c| c.text.as_str()));

    for extent in thread_group {
        h.u32(extent);
    }
    StructuralId(*h.0.finalize().as_bytes())
}

/// Content identity of a function, independent of its bound names.
pub fn function_id(def: &FnDef) -> u64 {
    let bytes = Normalizer::new().normalize_fn(def);
    let digest = blake3::hash(&bytes);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}
