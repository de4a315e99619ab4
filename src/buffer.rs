//! Pooled large buffers with provenance-routed release.
//!
//! A server keeps one [`BufferProvider`] for its whole lifetime. The
//! provider owns a bounded pool of uniformly sized buffers; requests that
//! the pool cannot satisfy fall back to the general allocator. Every
//! [`Buffer`] it hands out is tagged with where it came from, and release
//! routes strictly by that tag: pooled buffers return to their slot, heap
//! buffers go back to the allocator. A buffer freed down the wrong path
//! would corrupt the pool, so the tag travels with the buffer itself.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use crate::{Error, Result};

/// Where a [`Buffer`]'s storage came from, which decides its release path.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// A slot in the shared pool; release returns it to that slot.
    Pooled(usize),
    /// A one-off allocation sized to the request; release frees it.
    Heap,
}

/// A byte buffer leased from a [`BufferProvider`].
///
/// Dereferences to its full capacity. Give it back with
/// [`BufferProvider::free`]; dropping it instead permanently retires a
/// pool slot.
#[derive(Debug)]
pub struct Buffer {
    data: Box<[u8]>,
    provenance: Provenance,
}

impl Buffer {
    /// The origin tag that routes this buffer's release.
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

struct Pool {
    slots: Vec<Option<Box<[u8]>>>,
    free: Vec<usize>,
}

/// Owner of the shared large-buffer pool, with heap fallback.
///
/// Shared by every connection thread; acquire and release are serialised
/// with a mutex. Connection-local buffers (the reader's fixed buffer) never
/// pass through here.
pub struct BufferProvider {
    pool: Mutex<Pool>,
    large_buffer_size: usize,
}

impl BufferProvider {
    /// Creates a provider whose pool holds `count` buffers of `size` bytes
    /// each, allocated up front.
    pub fn new(count: usize, size: usize) -> Self {
        let slots = (0..count)
            .map(|_| Some(vec![0u8; size].into_boxed_slice()))
            .collect();
        Self {
            pool: Mutex::new(Pool {
                slots,
                free: (0..count).collect(),
            }),
            large_buffer_size: size,
        }
    }

    /// Leases a buffer of at least `size` bytes.
    ///
    /// Requests no larger than the pool's buffer size are served from the
    /// pool when a slot is free; everything else is heap-allocated to
    /// exactly `size` bytes. Fails with [`Error::AllocationFailed`] only
    /// when the allocator itself refuses.
    pub fn alloc_pooled_or(&self, size: usize) -> Result<Buffer> {
        if size <= self.large_buffer_size {
            let mut pool = self.pool.lock().unwrap();
            if let Some(slot) = pool.free.pop() {
                let data = pool.slots[slot].take().expect("free slot occupied");
                return Ok(Buffer {
                    data,
                    provenance: Provenance::Pooled(slot),
                });
            }
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| Error::AllocationFailed)?;
        data.resize(size, 0);
        Ok(Buffer {
            data: data.into_boxed_slice(),
            provenance: Provenance::Heap,
        })
    }

    /// Replaces `buffer` with one of at least `new_capacity` bytes,
    /// carrying over its first `preserve` bytes. The input buffer is
    /// released; if it already holds `new_capacity` it is returned as-is.
    pub fn grow(&self, buffer: Buffer, preserve: usize, new_capacity: usize) -> Result<Buffer> {
        if buffer.len() >= new_capacity {
            return Ok(buffer);
        }

        let mut grown = match self.alloc_pooled_or(new_capacity) {
            Ok(grown) => grown,
            Err(err) => {
                self.free(buffer);
                return Err(err);
            }
        };
        grown[..preserve].copy_from_slice(&buffer[..preserve]);
        self.free(buffer);
        Ok(grown)
    }

    /// Releases a buffer along the path its provenance dictates.
    pub fn free(&self, buffer: Buffer) {
        match buffer.provenance {
            Provenance::Pooled(slot) => {
                let mut pool = self.pool.lock().unwrap();
                pool.slots[slot] = Some(buffer.data);
                pool.free.push(slot);
            }
            Provenance::Heap => drop(buffer),
        }
    }

    /// Number of pool slots currently free.
    pub fn available(&self) -> usize {
        self.pool.lock().unwrap().free.len()
    }
}
