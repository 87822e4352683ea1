// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Persistently-mapped CPU views of GPU buffers.

use crate::renderer::error::ResourceError;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A CPU-writable view of a whole buffer that stays mapped while the GPU uses it.
///
/// The view is handed out by
/// [`GraphicsDevice::map_persistent`](crate::renderer::GraphicsDevice::map_persistent)
/// and owned by whoever owns the buffer (a transient page, a large allocation).
/// Writes are unsynchronized: the owner must only write ranges the GPU is not
/// reading, which the frame recycler guarantees for transient memory.
pub struct PersistentMapping {
    ptr: NonNull<u8>,
    len: usize,
    /// Keeps host-backed memory alive for as long as the mapping exists.
    memory: Option<Arc<HostMemory>>,
}

// SAFETY: the mapping is only ever accessed through `&mut self` by a single owner.
unsafe impl Send for PersistentMapping {}

impl PersistentMapping {
    /// Wraps `len` bytes starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `len` bytes for as long as the mapping
    /// lives, whatever happens to the buffer it was created from, and no other
    /// CPU reference may alias that memory while the mapping hands out slices.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self {
            ptr,
            len,
            memory: None,
        }
    }

    /// Size of the mapped range in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` for a zero-length mapping.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the writable bytes `offset .. offset + len`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::OutOfBounds`] if the range leaves the mapping.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], ResourceError> {
        let end = offset.checked_add(len).ok_or(ResourceError::OutOfBounds)?;
        if end > self.len {
            return Err(ResourceError::OutOfBounds);
        }
        // SAFETY: the range is inside the mapping and `&mut self` guarantees exclusivity.
        unsafe {
            Ok(std::slice::from_raw_parts_mut(
                self.ptr.as_ptr().add(offset),
                len,
            ))
        }
    }
}

impl fmt::Debug for PersistentMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentMapping")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("host", &self.memory.is_some())
            .finish()
    }
}

/// A zeroed, fixed-size heap allocation standing in for device memory.
///
/// A buffer and its mapping share the allocation through an [`Arc`]: the bytes
/// are freed when the last of them goes away, so destroying a buffer never
/// invalidates a mapping that is still alive. It can be mapped once.
pub struct HostMemory {
    ptr: NonNull<u8>,
    len: usize,
    mapped: AtomicBool,
}

// SAFETY: the allocation is plain bytes. Mutable access goes through the single
// mapping (`&mut PersistentMapping`) or through `&mut HostMemory`.
unsafe impl Send for HostMemory {}
unsafe impl Sync for HostMemory {}

impl HostMemory {
    /// Allocates `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Self {
        let raw = Box::into_raw(vec![0u8; len].into_boxed_slice());
        // SAFETY: `Box::into_raw` never returns null.
        let ptr = unsafe { NonNull::new_unchecked(raw.cast::<u8>()) };
        Self {
            ptr,
            len,
            mapped: AtomicBool::new(false),
        }
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` for an empty allocation.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` once [`HostMemory::map`] succeeded.
    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    /// The bytes, for initialization before the memory is shared.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: `&mut self` is exclusive; a mapping would hold an `Arc`
        // clone and make `&mut HostMemory` unreachable.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Copies `len` bytes from `offset`, the way a GPU readback would.
    ///
    /// Meant for inspection between frames: the copy is not ordered with
    /// writes going through the mapping.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, ResourceError> {
        let end = offset.checked_add(len).ok_or(ResourceError::OutOfBounds)?;
        if end > self.len {
            return Err(ResourceError::OutOfBounds);
        }
        let mut out = vec![0u8; len];
        // SAFETY: the range is inside the allocation and `out` is a fresh buffer.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), out.as_mut_ptr(), len);
        }
        Ok(out)
    }

    /// Maps the whole allocation.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotMappable`] if it is already mapped.
    pub fn map(self: &Arc<Self>) -> Result<PersistentMapping, ResourceError> {
        if self.mapped.swap(true, Ordering::AcqRel) {
            return Err(ResourceError::NotMappable);
        }
        Ok(PersistentMapping {
            ptr: self.ptr,
            len: self.len,
            memory: Some(Arc::clone(self)),
        })
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        let raw = std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
        // SAFETY: `raw` is the slice produced by `Box::into_raw` in `zeroed`.
        unsafe { drop(Box::from_raw(raw)) };
    }
}

impl fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMemory")
            .field("len", &self.len)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_mut_writes_through() {
        let mut backing = vec![0u8; 64];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let mut mapping = unsafe { PersistentMapping::from_raw_parts(ptr, backing.len()) };

        mapping.slice_mut(8, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        drop(mapping);

        assert_eq!(&backing[8..12], &[1, 2, 3, 4]);
        assert!(backing[..8].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_slice_mut_rejects_out_of_range() {
        let mut backing = vec![0u8; 16];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let mut mapping = unsafe { PersistentMapping::from_raw_parts(ptr, backing.len()) };

        assert!(matches!(
            mapping.slice_mut(12, 8),
            Err(ResourceError::OutOfBounds)
        ));
        assert!(matches!(
            mapping.slice_mut(usize::MAX, 2),
            Err(ResourceError::OutOfBounds)
        ));
        assert_eq!(mapping.slice_mut(16, 0).unwrap().len(), 0);
    }

    #[test]
    fn test_host_memory_maps_once() {
        let mut memory = HostMemory::zeroed(8);
        memory.bytes_mut()[0] = 9;
        let memory = Arc::new(memory);

        let mut mapping = memory.map().unwrap();
        assert!(memory.is_mapped());
        assert_eq!(memory.map().unwrap_err(), ResourceError::NotMappable);

        mapping.slice_mut(1, 2).unwrap().copy_from_slice(&[4, 5]);
        assert_eq!(memory.read(0, 4).unwrap(), vec![9, 4, 5, 0]);
        assert_eq!(memory.read(6, 4), Err(ResourceError::OutOfBounds));
    }

    #[test]
    fn test_mapping_outlives_its_owner() {
        let memory = Arc::new(HostMemory::zeroed(16));
        let mut mapping = memory.map().unwrap();
        assert_eq!(Arc::strong_count(&memory), 2);
        drop(memory);

        mapping.slice_mut(12, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&mapping.slice_mut(12, 4).unwrap()[..], &[1u8, 2, 3, 4][..]);
    }
}
