//! Resource-index bitmask.

use crate::error::{Error, Result};

/// Number of indices a mask can hold.
pub const MASK_WIDTH: u32 = u64::BITS;

/// Bit `i` set iff some record has index `i`. An index outside
/// `0..MASK_WIDTH` is an error, never wrapped or skipped.
pub fn index_mask<R>(records: &[R], index_of: impl Fn(&R) -> i64) -> Result<u64> {
    let mut mask = 0u64;
    for record in records {
        let index = index_of(record);
        if index < 0 || index >= MASK_WIDTH as i64 {
            return Err(Error::IndexOutOfRange {
                index,
                width: MASK_WIDTH,
            });
        }
        mask |= 1u64 << index;
    }
    Ok(mask)
}

/// Mask over a flat array of `stride`-byte records, each holding a
/// little-endian `i32` index at byte `offset`.
pub fn index_mask_from_bytes(bytes: &[u8], stride: usize, offset: usize) -> Result<u64> {
    if stride == 0 || offset.checked_add(4).map_or(true, |end| end > stride) {
        return Err(Error::Layout {
            message: format!(
                "record stride {} cannot hold a 4-byte index at offset {}",
                stride, offset
            ),
        });
    }
    if bytes.len() % stride != 0 {
        return Err(Error::Layout {
            message: format!(
                "{} bytes is not a whole number of {}-byte records",
                bytes.len(),
                stride
            ),
        });
    }
    let records: Vec<&[u8]> = bytes.chunks_exact(stride).collect();
    index_mask(&records, |record| {
        let raw: i32 = bytemuck::pod_read_unaligned(&record[offset..offset + 4]);
        i32::from_le(raw) as i64
    })
}
