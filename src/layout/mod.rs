//! Binding plan: resource slot assignment and constant-blob packing.
//!
//! Three independent zero-based slot counters (constant, read-only,
//! read-write) are advanced in declaration order. Constant slot 0 always
//! holds the packed blob, so constant-buffer members start at slot 1.
//!
//! Blob packing follows HLSL constant-buffer rules: a 12-byte header holds
//! the dispatch extents, then each scalar or vector member is placed at the
//! cursor unless it would straddle a 16-byte boundary, in which case the
//! cursor first advances to that boundary.

pub mod mask;

use std::fmt;

use crate::error::Result;
use crate::kernel::classify::{CapturedMember, Category};
use crate::types::HostType;

/// Bytes of dispatch extents (`__x`, `__y`, `__z`) at the start of the blob.
pub const HEADER_SIZE: u32 = 12;

/// Register size of a constant buffer.
pub const BLOB_ALIGNMENT: u32 = 16;

/// Constant slot holding the packed blob.
pub const BLOB_SLOT: u32 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceClass {
    Constant,
    ReadOnly,
    ReadWrite,
}

impl ResourceClass {
    /// HLSL register prefix (`b`, `t`, `u`).
    pub fn register_prefix(&self) -> char {
        match self {
            ResourceClass::Constant => 'b',
            ResourceClass::ReadOnly => 't',
            ResourceClass::ReadWrite => 'u',
        }
    }

    fn of(category: Category) -> Option<ResourceClass> {
        match category {
            Category::ConstantBufferRef => Some(ResourceClass::Constant),
            Category::ReadOnlyBufferRef => Some(ResourceClass::ReadOnly),
            Category::ReadWriteBufferRef => Some(ResourceClass::ReadWrite),
            _ => None,
        }
    }
}

/// One bound resource as the execution engine sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub class: ResourceClass,
    pub slot: u32,
    /// Declaration index of the member bound here.
    pub member: usize,
}

impl fmt::Display for DescriptorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.register_prefix(), self.slot)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Byte range inside the constant blob.
    Constant { offset: u32, size: u32 },
    /// Resource slot; `handle` is the index into the dispatch handle array.
    Resource {
        class: ResourceClass,
        slot: u32,
        handle: usize,
    },
    /// Function references become helpers and carry no dispatch data.
    Helper,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberBinding {
    pub name: String,
    pub ty: HostType,
    pub category: Category,
    pub placement: Placement,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BindingPlan {
    members: Vec<MemberBinding>,
    /// Resource ranges in handle-array order: constant, read-only,
    /// read-write, each by slot. The blob is not among them.
    ranges: Vec<DescriptorRange>,
    constant_slots: u32,
    read_only_slots: u32,
    read_write_slots: u32,
    blob_size: u32,
}

/// Offset at which a value of `size` bytes lands when the cursor is at
/// `cursor`. Anything wider than a register always starts on one.
pub fn pack_offset(cursor: u32, size: u32) -> u32 {
    let used = (cursor % BLOB_ALIGNMENT) as i64;
    if used > BLOB_ALIGNMENT as i64 - size as i64 {
        align_up(cursor, BLOB_ALIGNMENT)
    } else {
        cursor
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

impl BindingPlan {
    pub fn build(members: &[CapturedMember]) -> BindingPlan {
        // Slot 0 is the blob.
        let mut constant_slots = BLOB_SLOT + 1;
        let mut read_only_slots = 0;
        let mut read_write_slots = 0;
        let mut cursor = HEADER_SIZE;

        let mut placements = Vec::with_capacity(members.len());
        for member in members {
            let placement = match ResourceClass::of(member.category) {
                Some(class) => {
                    let counter = match class {
                        ResourceClass::Constant => &mut constant_slots,
                        ResourceClass::ReadOnly => &mut read_only_slots,
                        ResourceClass::ReadWrite => &mut read_write_slots,
                    };
                    let slot = *counter;
                    *counter += 1;
                    Placement::Resource { class, slot, handle: 0 }
                }
                None if member.category.is_value() => {
                    let size = member.ty.byte_size().unwrap_or(0);
                    let offset = pack_offset(cursor, size);
                    cursor = offset + size;
                    Placement::Constant { offset, size }
                }
                None => Placement::Helper,
            };
            placements.push(placement);
        }

        // Handle-array positions follow the fixed category order.
        let constant_base = 0usize;
        let read_only_base = (constant_slots - 1) as usize;
        let read_write_base = read_only_base + read_only_slots as usize;
        let mut ranges = Vec::new();
        for (index, placement) in placements.iter_mut().enumerate() {
            if let Placement::Resource { class, slot, handle } = placement {
                *handle = match class {
                    ResourceClass::Constant => constant_base + (*slot - 1) as usize,
                    ResourceClass::ReadOnly => read_only_base + *slot as usize,
                    ResourceClass::ReadWrite => read_write_base + *slot as usize,
                };
                ranges.push(DescriptorRange {
                    class: *class,
                    slot: *slot,
                    member: index,
                });
            }
        }
        ranges.sort_by_key(|r| (r.class, r.slot));

        let members = members
            .iter()
            .zip(placements)
            .map(|(m, placement)| MemberBinding {
                name: m.dialect_name.clone(),
                ty: m.ty.clone(),
                category: m.category,
                placement,
            })
            .collect();

        BindingPlan {
            members,
            ranges,
            constant_slots,
            read_only_slots,
            read_write_slots,
            blob_size: align_up(cursor, BLOB_ALIGNMENT),
        }
    }

    /// Per-member placements in declaration order.
    pub fn members(&self) -> &[MemberBinding] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&MemberBinding> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Resource ranges; the i-th dispatch handle binds the i-th range.
    pub fn descriptor_ranges(&self) -> &[DescriptorRange] {
        &self.ranges
    }

    /// Slots used in `class`. The constant count includes the blob.
    pub fn slot_count(&self, class: ResourceClass) -> u32 {
        match class {
            ResourceClass::Constant => self.constant_slots,
            ResourceClass::ReadOnly => self.read_only_slots,
            ResourceClass::ReadWrite => self.read_write_slots,
        }
    }

    /// Total resource slots, blob included.
    pub fn total_slots(&self) -> u32 {
        self.constant_slots + self.read_only_slots + self.read_write_slots
    }

    /// Length of the dispatch handle array.
    pub fn resource_count(&self) -> usize {
        self.ranges.len()
    }

    /// Padded size of the constant blob, header included.
    pub fn blob_size(&self) -> u32 {
        self.blob_size
    }

    /// Bit `i` set iff read-write slot `i` is bound.
    pub fn read_write_mask(&self) -> Result<u64> {
        let slots: Vec<&DescriptorRange> = self
            .ranges
            .iter()
            .filter(|r| r.class == ResourceClass::ReadWrite)
            .collect();
        mask::index_mask(&slots, |r| r.slot as i64)
    }
}
