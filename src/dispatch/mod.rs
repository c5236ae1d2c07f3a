//! Dispatch-data extraction.
//!
//! A [`DispatchExtractor`] is built once per kernel shape from its binding
//! plan. It is a flat list of (accessor, target) operations: reading a live
//! kernel only runs those accessors and copies their output into
//! caller-owned buffers, so it needs no locking.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::error::{Error, Result};
use crate::kernel::{Accessor, ResourceHandle};
use crate::layout::{BindingPlan, Placement, HEADER_SIZE};

// ─── Dispatch data ─────────────────────────────────────────────────

/// Everything the execution engine needs besides the program: the
/// resource-handle array and the packed constant blob.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchData {
    resources: Vec<ResourceHandle>,
    constants: Vec<u8>,
}

impl DispatchData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles in descriptor-range order.
    pub fn resources(&self) -> &[ResourceHandle] {
        &self.resources
    }

    /// The handle array as raw bytes, for upload.
    pub fn resource_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.resources)
    }

    /// The constant blob, header included.
    pub fn constants(&self) -> &[u8] {
        &self.constants
    }

    /// Little-endian word at `offset` in the constant blob.
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.constants.get(offset..offset + 4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(bytes);
        Some(u32::from_le_bytes(word))
    }

    /// Dispatch extents from the blob header.
    pub fn extents(&self) -> Option<[u32; 3]> {
        Some([self.read_u32(0)?, self.read_u32(4)?, self.read_u32(8)?])
    }

    /// Empty both buffers, keeping their allocations.
    pub fn clear(&mut self) {
        self.resources.clear();
        self.constants.clear();
    }

    fn reset(&mut self, blob_size: usize, resource_count: usize) {
        self.clear();
        self.constants.resize(blob_size, 0);
        self.resources.resize(resource_count, ResourceHandle::NULL);
    }

    fn capacity(&self) -> usize {
        self.constants.capacity() + self.resources.capacity()
    }
}

// ─── Extractor ─────────────────────────────────────────────────────

enum Op<K> {
    Constant {
        offset: usize,
        size: usize,
        read: Arc<dyn Fn(&K, &mut [u8]) + Send + Sync>,
    },
    Resource {
        handle: usize,
        read: Arc<dyn Fn(&K) -> ResourceHandle + Send + Sync>,
    },
}

/// Reads dispatch data out of live instances of one kernel shape.
pub struct DispatchExtractor<K> {
    ops: Vec<Op<K>>,
    blob_size: usize,
    resource_count: usize,
}

impl<K> fmt::Debug for DispatchExtractor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchExtractor")
            .field("ops", &self.ops.len())
            .field("blob_size", &self.blob_size)
            .field("resource_count", &self.resource_count)
            .finish()
    }
}

impl<K> DispatchExtractor<K> {
    /// `accessors` must be parallel to `plan.members()`.
    pub fn build(plan: &BindingPlan, accessors: &[Accessor<K>]) -> Result<Self> {
        if plan.members().len() != accessors.len() {
            return Err(Error::Layout {
                message: format!(
                    "binding plan has {} members but {} accessors were supplied",
                    plan.members().len(),
                    accessors.len()
                ),
            });
        }
        let mut ops = Vec::with_capacity(accessors.len());
        for (index, (member, accessor)) in plan.members().iter().zip(accessors).enumerate() {
            let op = match (&member.placement, accessor) {
                (Placement::Constant { offset, size }, Accessor::Value(read)) => Op::Constant {
                    offset: *offset as usize,
                    size: *size as usize,
                    read: Arc::clone(read),
                },
                (Placement::Resource { handle, .. }, Accessor::Resource(read)) => Op::Resource {
                    handle: *handle,
                    read: Arc::clone(read),
                },
                (Placement::Helper, _) => continue,
                (placement, accessor) => {
                    return Err(Error::Layout {
                        message: format!(
                            "member {} `{}` is placed as {:?} but registered with a {:?} accessor",
                            index, member.name, placement, accessor
                        ),
                    })
                }
            };
            ops.push(op);
        }
        Ok(Self {
            ops,
            blob_size: plan.blob_size() as usize,
            resource_count: plan.resource_count(),
        })
    }

    pub fn blob_size(&self) -> usize {
        self.blob_size
    }

    pub fn resource_count(&self) -> usize {
        self.resource_count
    }

    /// Write `kernel`'s current member values and `extents` into `data`.
    /// Handles are not validated here; the execution engine rejects bad ones.
    pub fn extract(&self, kernel: &K, extents: [u32; 3], data: &mut DispatchData) {
        data.reset(self.blob_size, self.resource_count);
        let header = &mut data.constants[..HEADER_SIZE as usize];
        for (word, extent) in header.chunks_exact_mut(4).zip(extents) {
            word.copy_from_slice(&extent.to_le_bytes());
        }
        for op in &self.ops {
            match op {
                Op::Constant { offset, size, read } => read(kernel, &mut data.constants[*offset..*offset + *size]),
                Op::Resource { handle, read } => data.resources[*handle] = read(kernel),
            }
        }
    }
}

// ─── Pool ──────────────────────────────────────────────────────────

/// Bounded free list of [`DispatchData`] buffers.
#[derive(Debug)]
pub struct DispatchDataPool {
    free: Mutex<Vec<DispatchData>>,
    capacity: usize,
}

impl DispatchDataPool {
    /// A pool retaining at most `capacity` idle buffers.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Idle buffers currently retained.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Borrow a buffer for one dispatch; it returns here when dropped.
    pub fn acquire(self: &Arc<Self>) -> PooledDispatchData {
        let reused = self.free.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let data = match reused {
            Some(data) => {
                trace!(capacity = data.capacity(), "reusing pooled dispatch data");
                data
            }
            None => DispatchData::new(),
        };
        PooledDispatchData {
            data,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut data: DispatchData) {
        data.clear();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(data);
        }
    }
}

/// A [`DispatchData`] on loan from a [`DispatchDataPool`].
pub struct PooledDispatchData {
    data: DispatchData,
    pool: Arc<DispatchDataPool>,
}

impl fmt::Debug for PooledDispatchData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data.fmt(f)
    }
}

impl Deref for PooledDispatchData {
    type Target = DispatchData;

    fn deref(&self) -> &DispatchData {
        &self.data
    }
}

impl DerefMut for PooledDispatchData {
    fn deref_mut(&mut self) -> &mut DispatchData {
        &mut self.data
    }
}

impl Drop for PooledDispatchData {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.data));
    }
}

#[cfg(test)]
mod tests;
