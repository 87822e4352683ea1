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

//! Pools of equally-sized blocks carved out of persistently-mapped pages.

use crate::renderer::api::{BufferDescriptor, BufferId, BufferUsage, PersistentMapping};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use std::borrow::Cow;

/// One backing buffer of a pool, mapped for its whole lifetime.
#[derive(Debug)]
struct Page {
    buffer: BufferId,
    mapping: PersistentMapping,
    /// One flag per block, set while the block is handed out.
    in_use: Vec<bool>,
}

/// The location of a block inside its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BlockRef {
    pub(crate) page: u32,
    pub(crate) block: u32,
}

/// A size class: its pages and the blocks currently free for reuse.
#[derive(Debug)]
pub(crate) struct Pool {
    block_size: u64,
    page_size: u64,
    pages: Vec<Page>,
    /// Popped from the back.
    free: Vec<BlockRef>,
}

impl Pool {
    pub(crate) fn new(block_size: u64, page_size: u64) -> Self {
        Self {
            block_size,
            page_size,
            pages: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn block_size(&self) -> u64 {
        self.block_size
    }

    pub(crate) fn blocks_per_page(&self) -> u32 {
        (self.page_size / self.block_size) as u32
    }

    pub(crate) fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub(crate) fn free_blocks(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn total_blocks(&self) -> usize {
        self.pages.len() * self.blocks_per_page() as usize
    }

    /// Hands out a free block, creating a page first when none is left.
    pub(crate) fn acquire(
        &mut self,
        device: &dyn GraphicsDevice,
        pool_index: usize,
    ) -> Result<BlockRef, ResourceError> {
        if self.free.is_empty() {
            self.grow(device, pool_index)?;
        }
        let block = self.free.pop().ok_or(ResourceError::InvalidHandle)?;
        if let Some(flag) = self.in_use_mut(block) {
            *flag = true;
        }
        Ok(block)
    }

    /// Returns a block to the free list. A block that is not handed out is
    /// left alone and `false` is returned.
    pub(crate) fn release(&mut self, block: BlockRef) -> bool {
        match self.in_use_mut(block) {
            Some(flag) if *flag => {
                *flag = false;
                self.free.push(block);
                true
            }
            _ => {
                log::warn!(
                    "Transient block {block:?} of the {} B pool released while not in use",
                    self.block_size
                );
                false
            }
        }
    }

    fn in_use_mut(&mut self, block: BlockRef) -> Option<&mut bool> {
        self.pages
            .get_mut(block.page as usize)?
            .in_use
            .get_mut(block.block as usize)
    }

    /// Backing buffer of `page`.
    pub(crate) fn page_buffer(&self, page: u32) -> Option<BufferId> {
        self.pages.get(page as usize).map(|p| p.buffer)
    }

    /// Writable bytes of `block`, `len` bytes from its start.
    pub(crate) fn block_bytes_mut(
        &mut self,
        block: BlockRef,
        len: u64,
    ) -> Result<&mut [u8], ResourceError> {
        if block.block >= self.blocks_per_page() || len > self.block_size {
            return Err(ResourceError::OutOfBounds);
        }
        let offset = block.block as u64 * self.block_size;
        let page = self
            .pages
            .get_mut(block.page as usize)
            .ok_or(ResourceError::InvalidHandle)?;
        page.mapping.slice_mut(offset as usize, len as usize)
    }

    /// Creates one page and pushes all of its blocks, so that they are popped
    /// in ascending order.
    fn grow(
        &mut self,
        device: &dyn GraphicsDevice,
        pool_index: usize,
    ) -> Result<(), ResourceError> {
        let page_index = self.pages.len() as u32;
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Owned(format!(
                "transient pool {pool_index} page {page_index}"
            ))),
            size: self.page_size,
            usage: BufferUsage::VERTEX
                | BufferUsage::INDEX
                | BufferUsage::UNIFORM
                | BufferUsage::MAP_WRITE,
            persistently_mapped: true,
        })?;
        let mapping = match device.map_persistent(buffer) {
            Ok(mapping) => mapping,
            Err(e) => {
                if let Err(destroy) = device.destroy_buffer(buffer) {
                    log::warn!("Failed to destroy unmappable page buffer {buffer:?}: {destroy:?}");
                }
                return Err(e);
            }
        };
        let blocks = self.blocks_per_page();
        self.pages.push(Page {
            buffer,
            mapping,
            in_use: vec![false; blocks as usize],
        });

        self.free.extend((0..blocks).rev().map(|block| BlockRef {
            page: page_index,
            block,
        }));

        log::info!(
            "Transient pool {} ({} B blocks): created page {} ({} blocks, {} pages total)",
            pool_index,
            self.block_size,
            page_index,
            blocks,
            self.pages.len()
        );
        Ok(())
    }

    /// Destroys every page. Mappings are dropped before their buffers.
    pub(crate) fn destroy(&mut self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        self.free.clear();
        let mut result = Ok(());
        for page in self.pages.drain(..) {
            let Page {
                buffer, mapping, ..
            } = page;
            drop(mapping);
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("Failed to destroy transient page {buffer:?}: {e:?}");
                result = result.and(Err(e));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::mock::MockGraphicsDevice;

    #[test]
    fn test_fresh_page_hands_out_ascending_blocks() {
        let device = MockGraphicsDevice::new();
        let mut pool = Pool::new(256, 1024);

        let blocks: Vec<_> = (0..4)
            .map(|_| pool.acquire(&device, 0).unwrap().block)
            .collect();
        assert_eq!(blocks, vec![0, 1, 2, 3]);
        assert_eq!(pool.page_count(), 1);
        assert_eq!(pool.free_blocks(), 0);

        let next = pool.acquire(&device, 0).unwrap();
        assert_eq!(next, BlockRef { page: 1, block: 0 });
        assert_eq!(device.live_buffers(), 2);
    }

    #[test]
    fn test_release_is_lifo_and_rejects_repeats() {
        let device = MockGraphicsDevice::new();
        let mut pool = Pool::new(256, 1024);
        let a = pool.acquire(&device, 0).unwrap();
        let b = pool.acquire(&device, 0).unwrap();

        assert!(pool.release(a));
        assert!(pool.release(b));
        assert!(!pool.release(b));
        assert!(!pool.release(BlockRef { page: 7, block: 0 }));
        assert_eq!(pool.free_blocks(), 4);

        assert_eq!(pool.acquire(&device, 0).unwrap(), b);
        assert_eq!(pool.acquire(&device, 0).unwrap(), a);
        pool.destroy(&device).unwrap();
        assert_eq!(device.live_buffers(), 0);
    }
}
