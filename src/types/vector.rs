//! Host-side scalar and vector value types that can be captured by a kernel.
//!
//! Each type knows its `HostType` and how to write itself into the constant
//! blob in GPU layout (little-endian, booleans widened to 32 bits).

use super::{HostType, ScalarKind};

/// A value that can be captured as a Scalar or Vector kernel member.
pub trait ShaderValue: Copy + Send + Sync + 'static {
    const HOST_TYPE: HostType;

    /// Write the GPU representation into `out`, which is exactly
    /// `HOST_TYPE.byte_size()` bytes long.
    fn write_bytes(&self, out: &mut [u8]);
}

macro_rules! pod_scalar {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl ShaderValue for $ty {
                const HOST_TYPE: HostType = HostType::Scalar(ScalarKind::$kind);

                fn write_bytes(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

pod_scalar! {
    f32 => Float,
    f64 => Double,
    i32 => Int,
    u32 => UInt,
}

impl ShaderValue for bool {
    const HOST_TYPE: HostType = HostType::Scalar(ScalarKind::Bool);

    fn write_bytes(&self, out: &mut [u8]) {
        out.copy_from_slice(&(*self as u32).to_le_bytes());
    }
}

macro_rules! pod_vector {
    ($($name:ident($elem:ty, $kind:ident, $lanes:literal) { $($field:ident),+ })*) => {
        $(
            #[repr(C)]
            #[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
            pub struct $name {
                $(pub $field: $elem,)+
            }

            impl $name {
                pub const fn new($($field: $elem),+) -> Self {
                    Self { $($field),+ }
                }

                /// All lanes set to `v`.
                pub const fn splat(v: $elem) -> Self {
                    Self { $($field: v),+ }
                }
            }

            impl ShaderValue for $name {
                const HOST_TYPE: HostType = HostType::Vector(ScalarKind::$kind, $lanes);

                fn write_bytes(&self, out: &mut [u8]) {
                    let lanes: [$elem; $lanes] = bytemuck::cast(*self);
                    for (chunk, lane) in out.chunks_exact_mut(std::mem::size_of::<$elem>()).zip(lanes) {
                        chunk.copy_from_slice(&lane.to_le_bytes());
                    }
                }
            }
        )*
    };
}

pod_vector! {
    Float2(f32, Float, 2) { x, y }
    Float3(f32, Float, 3) { x, y, z }
    Float4(f32, Float, 4) { x, y, z, w }
    Double2(f64, Double, 2) { x, y }
    Double3(f64, Double, 3) { x, y, z }
    Double4(f64, Double, 4) { x, y, z, w }
    Int2(i32, Int, 2) { x, y }
    Int3(i32, Int, 3) { x, y, z }
    Int4(i32, Int, 4) { x, y, z, w }
    UInt2(u32, UInt, 2) { x, y }
    UInt3(u32, UInt, 3) { x, y, z }
    UInt4(u32, UInt, 4) { x, y, z, w }
}

macro_rules! bool_vector {
    ($($name:ident($lanes:literal) { $($field:ident),+ })*) => {
        $(
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
            pub struct $name {
                $(pub $field: bool,)+
            }

            impl $name {
                pub const fn new($($field: bool),+) -> Self {
                    Self { $($field),+ }
                }
            }

            impl ShaderValue for $name {
                const HOST_TYPE: HostType = HostType::Vector(ScalarKind::Bool, $lanes);

                fn write_bytes(&self, out: &mut [u8]) {
                    let lanes = [$(self.$field),+];
                    for (chunk, lane) in out.chunks_exact_mut(4).zip(lanes) {
                        chunk.copy_from_slice(&(lane as u32).to_le_bytes());
                    }
                }
            }
        )*
    };
}

bool_vector! {
    Bool2(2) { x, y }
    Bool3(3) { x, y, z }
    Bool4(4) { x, y, z, w }
}
