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

use super::handle::{BlockHandle, TransientBuffer};
use super::pool::{BlockRef, Pool};
use super::recycler::{FrameRing, Reclaimed, SlotState};
use super::size_class::SizeClasses;
use crate::renderer::api::{
    BufferDescriptor, BufferId, PersistentMapping, TransientSettings, TransientUsage,
};
use crate::renderer::error::{FrameError, ResourceError, SettingsError};
use crate::renderer::traits::GraphicsDevice;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// A dedicated buffer serving one request larger than every size class.
#[derive(Debug)]
struct LargeAllocation {
    mapping: PersistentMapping,
    size: u64,
}

/// Usage of one size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Block size in bytes.
    pub block_size: u64,
    /// Pages created so far.
    pub pages: usize,
    /// Blocks over all pages.
    pub total_blocks: usize,
    /// Blocks ready to be handed out.
    pub free_blocks: usize,
}

/// A snapshot of the allocator's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorStats {
    /// The frame currently recording.
    pub frame: u64,
    /// One entry per size class.
    pub pools: Vec<PoolStats>,
    /// Dedicated buffers alive.
    pub live_large: usize,
    /// Bytes held by dedicated buffers.
    pub large_bytes: u64,
    /// Allocations not yet returned, current frame included.
    pub allocations_in_flight: usize,
    /// Closed frames waiting on a late fence.
    pub stalled_frames: usize,
    /// Bounded fence waits that expired.
    pub fence_timeouts: u64,
    /// Pooled blocks returned to their free lists since creation.
    pub reclaimed_blocks: u64,
    /// Dedicated buffers destroyed since creation.
    pub released_large: u64,
}

impl fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "frame {}: {} in flight, {} stalled frames, {} fence timeouts",
            self.frame, self.allocations_in_flight, self.stalled_frames, self.fence_timeouts
        )?;
        for (i, pool) in self.pools.iter().enumerate() {
            if pool.pages == 0 {
                continue;
            }
            writeln!(
                f,
                "  pool {i} ({} B): {} pages, {}/{} blocks free",
                pool.block_size, pool.pages, pool.free_blocks, pool.total_blocks
            )?;
        }
        write!(
            f,
            "  large: {} live ({} B), {} released",
            self.live_large, self.large_bytes, self.released_large
        )
    }
}

/// What a frame boundary did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// The frame that starts recording.
    pub frame: u64,
    /// Pooled blocks returned to their free lists.
    pub reclaimed_blocks: usize,
    /// Dedicated buffers destroyed.
    pub released_large: usize,
    /// Closed frames still waiting on a late fence.
    pub stalled_frames: usize,
}

/// The frame-synchronized transient allocator.
///
/// Requests are served from power-of-two size classes backed by lazily created,
/// persistently-mapped pages; requests above the largest class get a dedicated
/// buffer. Every allocation is tracked by the frame ring and only becomes
/// reusable once the fence closing its frame has signaled.
#[derive(Debug)]
pub struct TransientAllocator {
    classes: SizeClasses,
    pools: Vec<Pool>,
    large: HashMap<BufferId, LargeAllocation>,
    ring: FrameRing,
    reclaimed_blocks: u64,
    released_large: u64,
}

impl TransientAllocator {
    /// Creates an allocator with no page yet.
    pub fn new(settings: &TransientSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        let classes = SizeClasses::from_settings(settings);
        let pools = (0..classes.count())
            .map(|c| Pool::new(classes.block_size(c), settings.page_size))
            .collect();
        Ok(Self {
            classes,
            pools,
            large: HashMap::new(),
            ring: FrameRing::new(
                settings.ring_depth,
                settings.fence_timeout(),
                settings.timeout_policy,
            ),
            reclaimed_blocks: 0,
            released_large: 0,
        })
    }

    /// The frame currently recording.
    pub fn frame_number(&self) -> u64 {
        self.ring.frame()
    }

    /// Number of frames in flight.
    pub fn ring_depth(&self) -> usize {
        self.ring.depth()
    }

    /// The size classes served by the pools.
    pub fn size_classes(&self) -> SizeClasses {
        self.classes
    }

    /// State of ring slot `slot`.
    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.ring.slot_state(slot)
    }

    /// Allocates `size` bytes of transient memory for the current frame.
    ///
    /// # Errors
    ///
    /// [`ResourceError::ZeroSized`] for an empty request, or whatever the device
    /// reports while creating a page or a dedicated buffer.
    pub fn allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        size: u64,
        usage: TransientUsage,
    ) -> Result<TransientBuffer, ResourceError> {
        if size == 0 {
            return Err(ResourceError::ZeroSized);
        }
        let frame = self.ring.frame();

        let Some(class) = self.classes.class_for(size) else {
            return self.allocate_large(device, size, usage);
        };
        let pool = &mut self.pools[class];
        let BlockRef { page, block } = pool.acquire(device, class)?;
        let buffer = pool.page_buffer(page).ok_or(ResourceError::InvalidHandle)?;
        let handle = BlockHandle::Pooled {
            pool: class as u16,
            page,
            block,
        };
        self.ring.track(handle);

        Ok(TransientBuffer {
            buffer,
            offset: block as u64 * pool.block_size(),
            size,
            frame,
            handle,
        })
    }

    /// Allocates `bytes.len()` bytes and copies `bytes` into them.
    pub fn allocate_with_data(
        &mut self,
        device: &dyn GraphicsDevice,
        usage: TransientUsage,
        bytes: &[u8],
    ) -> Result<TransientBuffer, ResourceError> {
        let buffer = self.allocate(device, bytes.len() as u64, usage)?;
        self.mapped_mut(&buffer)?.copy_from_slice(bytes);
        Ok(buffer)
    }

    /// The writable bytes of `buffer`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::StaleTransient`] once a frame boundary has passed since
    /// the allocation, [`ResourceError::InvalidHandle`] for a handle this
    /// allocator did not hand out.
    pub fn mapped_mut(&mut self, buffer: &TransientBuffer) -> Result<&mut [u8], ResourceError> {
        let current = self.ring.frame();
        if buffer.frame != current {
            return Err(ResourceError::StaleTransient {
                allocated_in: buffer.frame,
                current,
            });
        }
        match buffer.handle {
            BlockHandle::Pooled { pool, page, block } => {
                let pool = self
                    .pools
                    .get_mut(pool as usize)
                    .ok_or(ResourceError::InvalidHandle)?;
                if pool.page_buffer(page) != Some(buffer.buffer) {
                    return Err(ResourceError::InvalidHandle);
                }
                pool.block_bytes_mut(BlockRef { page, block }, buffer.size)
            }
            BlockHandle::Large { buffer: id } => {
                let large = self
                    .large
                    .get_mut(&id)
                    .ok_or(ResourceError::InvalidHandle)?;
                let size = large.size as usize;
                large.mapping.slice_mut(0, size)
            }
        }
    }

    /// Copies `bytes` into `buffer` at `offset`.
    pub fn write(
        &mut self,
        buffer: &TransientBuffer,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), ResourceError> {
        let end = offset
            .checked_add(bytes.len() as u64)
            .ok_or(ResourceError::OutOfBounds)?;
        if end > buffer.size {
            return Err(ResourceError::OutOfBounds);
        }
        let mapped = self.mapped_mut(buffer)?;
        mapped[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }

    /// Closes the current frame and recycles the oldest one.
    ///
    /// # Errors
    ///
    /// [`FrameError::FenceTimeout`] when the oldest frame's fence did not signal
    /// within the bounded wait and the policy is
    /// [`FenceTimeoutPolicy::Defer`](crate::renderer::api::FenceTimeoutPolicy::Defer).
    /// The boundary still happened: the next frame is recording.
    pub fn mark_frame_boundary(
        &mut self,
        device: &dyn GraphicsDevice,
    ) -> Result<FrameReport, FrameError> {
        let reclaimed = self.ring.advance(device);
        let report = self.release(device, reclaimed)?;
        log::trace!(
            "Frame {} begins: {} blocks reclaimed, {} large released",
            report.frame,
            report.reclaimed_blocks,
            report.released_large
        );
        Ok(report)
    }

    /// Waits, up to `timeout`, for the GPU to finish every closed frame and
    /// recycles them all. The current frame keeps its allocations.
    pub fn wait_idle(
        &mut self,
        device: &dyn GraphicsDevice,
        timeout: Duration,
    ) -> Result<FrameReport, FrameError> {
        let reclaimed = self.ring.drain(device, timeout);
        self.release(device, reclaimed)
    }

    /// Allocator statistics.
    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            frame: self.ring.frame(),
            pools: self
                .pools
                .iter()
                .map(|p| PoolStats {
                    block_size: p.block_size(),
                    pages: p.page_count(),
                    total_blocks: p.total_blocks(),
                    free_blocks: p.free_blocks(),
                })
                .collect(),
            live_large: self.large.len(),
            large_bytes: self.large.values().map(|l| l.size).sum(),
            allocations_in_flight: self.ring.allocations_in_flight(),
            stalled_frames: self.ring.stalled_frames(),
            fence_timeouts: self.ring.fence_timeouts(),
            reclaimed_blocks: self.reclaimed_blocks,
            released_large: self.released_large,
        }
    }

    /// Destroys every page and dedicated buffer. In-flight allocations are
    /// abandoned; call [`Self::wait_idle`] first.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        let abandoned = self.ring.abandon(device);
        if !abandoned.is_empty() {
            log::debug!("Abandoning {} transient allocations", abandoned.len());
        }
        let mut result = Ok(());
        for (id, large) in self.large.drain() {
            drop(large.mapping);
            if let Err(e) = device.destroy_buffer(id) {
                log::warn!("Failed to destroy large transient buffer {id:?}: {e:?}");
                result = result.and(Err(e));
            }
        }
        for pool in &mut self.pools {
            result = result.and(pool.destroy(device));
        }
        result
    }

    fn allocate_large(
        &mut self,
        device: &dyn GraphicsDevice,
        size: u64,
        usage: TransientUsage,
    ) -> Result<TransientBuffer, ResourceError> {
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Borrowed("transient large")),
            size,
            usage: usage.buffer_usage(),
            persistently_mapped: true,
        })?;
        let mapping = match device.map_persistent(buffer) {
            Ok(mapping) => mapping,
            Err(e) => {
                if let Err(destroy) = device.destroy_buffer(buffer) {
                    log::warn!("Failed to destroy unmappable buffer {buffer:?}: {destroy:?}");
                }
                return Err(e);
            }
        };
        self.large.insert(buffer, LargeAllocation { mapping, size });
        let handle = BlockHandle::Large { buffer };
        self.ring.track(handle);
        log::debug!(
            "Transient large allocation of {} B ({:?}) in frame {}",
            size,
            usage,
            self.ring.frame()
        );

        Ok(TransientBuffer {
            buffer,
            offset: 0,
            size,
            frame: self.ring.frame(),
            handle,
        })
    }

    /// Returns reclaimed handles to their pools and destroys dedicated buffers.
    fn release(
        &mut self,
        device: &dyn GraphicsDevice,
        reclaimed: Reclaimed,
    ) -> Result<FrameReport, FrameError> {
        let mut report = FrameReport {
            frame: self.ring.frame(),
            stalled_frames: self.ring.stalled_frames(),
            ..Default::default()
        };
        let mut failure = reclaimed.failure;

        for handle in reclaimed.handles {
            match handle {
                BlockHandle::Pooled { pool, page, block } => {
                    if let Some(pool) = self.pools.get_mut(pool as usize) {
                        if pool.release(BlockRef { page, block }) {
                            report.reclaimed_blocks += 1;
                        }
                    }
                }
                BlockHandle::Large { buffer } => {
                    if let Some(large) = self.large.remove(&buffer) {
                        drop(large.mapping);
                    }
                    match device.destroy_buffer(buffer) {
                        Ok(()) => report.released_large += 1,
                        Err(e) => {
                            log::warn!("Failed to destroy large transient buffer {buffer:?}: {e:?}");
                            failure.get_or_insert(e.into());
                        }
                    }
                }
            }
        }
        self.reclaimed_blocks += report.reclaimed_blocks as u64;
        self.released_large += report.released_large as u64;
        if report.reclaimed_blocks > 0 || report.released_large > 0 {
            log::debug!(
                "Frame {}: reclaimed {} blocks, released {} large buffers",
                report.frame,
                report.reclaimed_blocks,
                report.released_large
            );
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::FenceTimeoutPolicy;
    use crate::renderer::mock::MockGraphicsDevice;

    fn allocator() -> TransientAllocator {
        TransientAllocator::new(&TransientSettings::default()).unwrap()
    }

    #[test]
    fn test_zero_sized_request_is_rejected() {
        let device = MockGraphicsDevice::new();
        let mut alloc = allocator();
        assert_eq!(
            alloc.allocate(&device, 0, TransientUsage::Vertex),
            Err(ResourceError::ZeroSized)
        );
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_pages_are_created_lazily() {
        let device = MockGraphicsDevice::new();
        let mut alloc = allocator();
        assert_eq!(device.live_buffers(), 0);

        let a = alloc.allocate(&device, 100, TransientUsage::Vertex).unwrap();
        let b = alloc.allocate(&device, 200, TransientUsage::Constant).unwrap();

        assert_eq!(device.live_buffers(), 1);
        assert_eq!(a.buffer(), b.buffer());
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 256);
        assert_eq!(a.handle().pool_index(), Some(0));

        let stats = alloc.stats();
        assert_eq!(stats.pools[0].pages, 1);
        assert_eq!(stats.pools[0].total_blocks, 4096);
        assert_eq!(stats.pools[0].free_blocks, 4094);
        assert_eq!(stats.pools[1].pages, 0);
    }

    #[test]
    fn test_exhausted_pool_grows_a_page() {
        let device = MockGraphicsDevice::new();
        let mut alloc = allocator();
        // 16 blocks of 64 KiB per 1 MiB page.
        for _ in 0..17 {
            alloc.allocate(&device, 60_000, TransientUsage::Vertex).unwrap();
        }
        let stats = alloc.stats();
        assert_eq!(stats.pools[8].pages, 2);
        assert_eq!(stats.pools[8].free_blocks, 15);
    }

    #[test]
    fn test_large_request_gets_dedicated_buffer() {
        let device = MockGraphicsDevice::new();
        let mut alloc = allocator();
        let buffer = alloc
            .allocate(&device, 1_000_000, TransientUsage::Vertex)
            .unwrap();

        assert!(buffer.handle().is_large());
        assert_eq!(buffer.handle().pool_index(), None);
        assert_eq!(buffer.offset(), 0);
        assert_eq!(alloc.stats().live_large, 1);
        assert!(alloc.stats().pools.iter().all(|p| p.pages == 0));
        assert_eq!(alloc.mapped_mut(&buffer).unwrap().len(), 1_000_000);
    }

    #[test]
    fn test_blocks_return_after_ring_depth_frames() {
        let device = MockGraphicsDevice::new();
        let mut alloc = allocator();
        let first: Vec<_> = (0..4)
            .map(|_| alloc.allocate(&device, 100, TransientUsage::Constant).unwrap())
            .collect();

        alloc.mark_frame_boundary(&device).unwrap();
        alloc.mark_frame_boundary(&device).unwrap();
        assert_eq!(alloc.stats().pools[0].free_blocks, 4092);

        let report = alloc.mark_frame_boundary(&device).unwrap();
        assert_eq!(report.frame, 3);
        assert_eq!(report.reclaimed_blocks, 4);
        assert_eq!(alloc.stats().pools[0].free_blocks, 4096);

        let again = alloc.allocate(&device, 100, TransientUsage::Constant).unwrap();
        assert!(first.iter().any(|b| b.offset() == again.offset()));
    }

    #[test]
    fn test_no_reuse_before_fence_signals() {
        let device = MockGraphicsDevice::new();
        device.hold_fences();
        let mut alloc = allocator();
        let first = alloc.allocate(&device, 64, TransientUsage::Vertex).unwrap();

        alloc.mark_frame_boundary(&device).unwrap();
        alloc.mark_frame_boundary(&device).unwrap();
        let err = alloc.mark_frame_boundary(&device).unwrap_err();
        assert!(matches!(err, FrameError::FenceTimeout { frame: 0, .. }));

        let next = alloc.allocate(&device, 64, TransientUsage::Vertex).unwrap();
        assert_ne!(next.offset(), first.offset());
        assert_eq!(alloc.stats().stalled_frames, 1);

        device.signal_all();
        let report = alloc.mark_frame_boundary(&device).unwrap();
        assert_eq!(report.reclaimed_blocks, 1);
        assert_eq!(alloc.stats().stalled_frames, 0);
    }

    #[test]
    fn test_reclaim_policy_reuses_on_timeout() {
        let device = MockGraphicsDevice::new();
        device.hold_fences();
        let settings = TransientSettings {
            timeout_policy: FenceTimeoutPolicy::Reclaim,
            ..Default::default()
        };
        let mut alloc = TransientAllocator::new(&settings).unwrap();
        alloc.allocate(&device, 64, TransientUsage::Vertex).unwrap();

        for _ in 0..3 {
            alloc.mark_frame_boundary(&device).unwrap();
        }
        let stats = alloc.stats();
        assert_eq!(stats.fence_timeouts, 1);
        assert_eq!(stats.pools[0].free_blocks, 4096);
    }

    #[test]
    fn test_large_buffer_destroyed_on_reclaim() {
        let device = MockGraphicsDevice::new();
        let mut alloc = allocator();
        alloc
            .allocate(&device, 100_000, TransientUsage::Index)
            .unwrap();
        assert_eq!(device.live_buffers(), 1);

        for _ in 0..2 {
            alloc.mark_frame_boundary(&device).unwrap();
        }
        let report = alloc.mark_frame_boundary(&device).unwrap();
        assert_eq!(report.released_large, 1);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(alloc.stats().released_large, 1);
    }

    #[test]
    fn test_mapping_is_stale_after_boundary() {
        let device = MockGraphicsDevice::new();
        let mut alloc = allocator();
        let buffer = alloc.allocate(&device, 16, TransientUsage::Vertex).unwrap();
        assert!(alloc.mapped_mut(&buffer).is_ok());

        alloc.mark_frame_boundary(&device).unwrap();
        assert_eq!(
            alloc.mapped_mut(&buffer),
            Err(ResourceError::StaleTransient {
                allocated_in: 0,
                current: 1
            })
        );
    }

    #[test]
    fn test_write_reaches_backing_buffer() {
        let device = MockGraphicsDevice::new();
        let mut alloc = allocator();
        alloc.allocate(&device, 16, TransientUsage::Vertex).unwrap();
        let buffer = alloc
            .allocate_with_data(&device, TransientUsage::Constant, &[9; 8])
            .unwrap();
        alloc.write(&buffer, 2, &[1, 2]).unwrap();

        assert_eq!(
            device.buffer_bytes(buffer.buffer(), buffer.offset() as usize, 8),
            vec![9, 9, 1, 2, 9, 9, 9, 9]
        );
        assert_eq!(alloc.write(&buffer, 7, &[0, 0]), Err(ResourceError::OutOfBounds));
    }

    #[test]
    fn test_wait_idle_then_destroy_releases_everything() {
        let device = MockGraphicsDevice::new();
        let mut alloc = allocator();
        alloc.allocate(&device, 16, TransientUsage::Vertex).unwrap();
        alloc.allocate(&device, 200_000, TransientUsage::Vertex).unwrap();
        alloc.mark_frame_boundary(&device).unwrap();

        let report = alloc.wait_idle(&device, Duration::from_millis(1)).unwrap();
        assert_eq!(report.reclaimed_blocks, 1);
        assert_eq!(report.released_large, 1);

        alloc.destroy(&device).unwrap();
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_fences(), 0);
    }
}
