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

//! A [`GraphicsDevice`] backed by host memory with a simulated GPU timeline.

use kiln_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, FenceId, FenceStatus, GraphicsDevice, HostMemory,
    PersistentMapping, PipelineState, PipelineStateDescriptor, PipelineStateId, ResourceError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Tunables of the simulated GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessSettings {
    /// How many fences must be inserted after a fence before the simulated GPU
    /// reaches it on its own. `0` signals every fence on insertion.
    pub fence_latency: u64,
}

impl Default for HeadlessSettings {
    fn default() -> Self {
        Self { fence_latency: 1 }
    }
}

/// Counters of the headless device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// Buffers alive.
    pub live_buffers: usize,
    /// Bytes held by live buffers.
    pub buffer_bytes: u64,
    /// Highest number of bytes held at once.
    pub peak_buffer_bytes: u64,
    /// Fences not yet destroyed.
    pub live_fences: usize,
    /// Fences inserted since creation.
    pub submitted_fences: u64,
    /// Fences the simulated GPU has reached.
    pub completed_fences: u64,
    /// Pipeline states compiled.
    pub pipelines: usize,
}

/// A live buffer. Its memory is shared with its mapping, if any, and outlives
/// `destroy_buffer` until that mapping is dropped too.
#[derive(Debug)]
struct HeadlessBuffer {
    memory: Arc<HostMemory>,
    usage: BufferUsage,
    persistently_mapped: bool,
}

/// Fence values are consecutive; a fence is signaled once `completed` reaches it.
#[derive(Debug, Default)]
struct Timeline {
    submitted: u64,
    completed: u64,
    stalled: bool,
    live: HashSet<FenceId>,
}

impl Timeline {
    fn progress(&mut self, latency: u64) {
        if !self.stalled {
            self.completed = self.completed.max(self.submitted.saturating_sub(latency));
        }
    }

    fn status(&self, fence: FenceId) -> FenceStatus {
        if fence.0 <= self.completed {
            FenceStatus::Signaled
        } else {
            FenceStatus::Pending
        }
    }
}

#[derive(Debug)]
struct HeadlessDeviceInternal {
    settings: HeadlessSettings,
    buffers: Mutex<HashMap<BufferId, HeadlessBuffer>>,
    timeline: Mutex<Timeline>,
    pipelines: Mutex<HashMap<PipelineStateId, Option<String>>>,
    next_buffer_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,
    allocated_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
}

/// A device that keeps buffers in host memory and simulates GPU completion.
///
/// The simulated GPU trails the CPU by [`HeadlessSettings::fence_latency`]
/// fences: polling a younger fence reports it pending, while a bounded wait
/// lets the GPU drain everything submitted. [`HeadlessDevice::stall_gpu`] freezes
/// the timeline so that waits time out, until [`HeadlessDevice::resume_gpu`].
#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    internal: Arc<HeadlessDeviceInternal>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessSettings::default())
    }
}

impl HeadlessDevice {
    /// Creates a device with the given timeline settings.
    pub fn new(settings: HeadlessSettings) -> Self {
        log::info!(
            "HeadlessDevice: created with a fence latency of {}",
            settings.fence_latency
        );
        Self {
            internal: Arc::new(HeadlessDeviceInternal {
                settings,
                buffers: Mutex::new(HashMap::new()),
                timeline: Mutex::new(Timeline::default()),
                pipelines: Mutex::new(HashMap::new()),
                next_buffer_id: AtomicUsize::new(1),
                next_pipeline_id: AtomicUsize::new(1),
                allocated_bytes: AtomicUsize::new(0),
                peak_bytes: AtomicUsize::new(0),
            }),
        }
    }

    /// Freezes the simulated GPU: no fence signals until [`Self::resume_gpu`].
    pub fn stall_gpu(&self) {
        if let Ok(mut timeline) = self.timeline() {
            log::warn!("HeadlessDevice: GPU stalled at fence {}", timeline.completed);
            timeline.stalled = true;
        }
    }

    /// Lets the simulated GPU make progress again.
    pub fn resume_gpu(&self) {
        if let Ok(mut timeline) = self.timeline() {
            timeline.stalled = false;
            timeline.progress(self.internal.settings.fence_latency);
            log::info!("HeadlessDevice: GPU resumed at fence {}", timeline.completed);
        }
    }

    /// Copies `len` bytes of buffer `id` from `offset`.
    pub fn read_buffer(
        &self,
        id: BufferId,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, ResourceError> {
        let buffers = self.buffers()?;
        let buffer = buffers.get(&id).ok_or(ResourceError::NotFound)?;
        buffer.memory.read(offset, len)
    }

    /// The usage a live buffer was created with.
    pub fn buffer_usage(&self, id: BufferId) -> Option<BufferUsage> {
        self.buffers().ok()?.get(&id).map(|b| b.usage)
    }

    /// Current counters.
    pub fn stats(&self) -> HeadlessStats {
        let (live_buffers, buffer_bytes) = self
            .buffers()
            .map(|b| (b.len(), b.values().map(|b| b.memory.len() as u64).sum::<u64>()))
            .unwrap_or_default();
        let (live_fences, submitted_fences, completed_fences) = self
            .timeline()
            .map(|t| (t.live.len(), t.submitted, t.completed))
            .unwrap_or_default();
        HeadlessStats {
            live_buffers,
            buffer_bytes,
            peak_buffer_bytes: self.internal.peak_bytes.load(Ordering::Relaxed) as u64,
            live_fences,
            submitted_fences,
            completed_fences,
            pipelines: self.pipelines().map(|p| p.len()).unwrap_or_default(),
        }
    }

    fn buffers(&self) -> Result<MutexGuard<'_, HashMap<BufferId, HeadlessBuffer>>, ResourceError> {
        self.internal
            .buffers
            .lock()
            .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned (buffers): {e}")))
    }

    fn timeline(&self) -> Result<MutexGuard<'_, Timeline>, ResourceError> {
        self.internal
            .timeline
            .lock()
            .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned (timeline): {e}")))
    }

    fn pipelines(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<PipelineStateId, Option<String>>>, ResourceError> {
        self.internal
            .pipelines
            .lock()
            .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned (pipelines): {e}")))
    }

    fn generate_buffer_id(&self) -> BufferId {
        BufferId(self.internal.next_buffer_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_pipeline_id(&self) -> PipelineStateId {
        PipelineStateId(self.internal.next_pipeline_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert_buffer(
        &self,
        descriptor: &BufferDescriptor,
        memory: HostMemory,
    ) -> Result<BufferId, ResourceError> {
        let size = memory.len();
        let id = self.generate_buffer_id();
        self.buffers()?.insert(
            id,
            HeadlessBuffer {
                memory: Arc::new(memory),
                usage: descriptor.usage,
                persistently_mapped: descriptor.persistently_mapped,
            },
        );
        self.track_allocation(size);

        log::debug!(
            "HeadlessDevice: Created buffer '{}' with ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            size
        );
        Ok(id)
    }

    fn track_allocation(&self, bytes: usize) {
        let current = self
            .internal
            .allocated_bytes
            .fetch_add(bytes, Ordering::Relaxed)
            + bytes;
        self.internal.peak_bytes.fetch_max(current, Ordering::Relaxed);
    }
}

fn host_size(descriptor: &BufferDescriptor) -> Result<usize, ResourceError> {
    usize::try_from(descriptor.size).map_err(|_| {
        ResourceError::BackendError(format!("buffer size {} exceeds host memory", descriptor.size))
    })
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let size = host_size(descriptor)?;
        self.insert_buffer(descriptor, HostMemory::zeroed(size))
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        if data.len() as u64 > descriptor.size {
            return Err(ResourceError::OutOfBounds);
        }
        let mut memory = HostMemory::zeroed(host_size(descriptor)?);
        memory.bytes_mut()[..data.len()].copy_from_slice(data);
        self.insert_buffer(descriptor, memory)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        match self.buffers()?.remove(&id) {
            Some(buffer) => {
                self.internal
                    .allocated_bytes
                    .fetch_sub(buffer.memory.len(), Ordering::Relaxed);
                if buffer.memory.is_mapped() {
                    log::debug!("HeadlessDevice: Destroyed buffer with ID: {id:?} (still mapped)");
                } else {
                    log::debug!("HeadlessDevice: Destroyed buffer with ID: {id:?}");
                }
                Ok(())
            }
            None => {
                log::warn!("HeadlessDevice: destroy_buffer on unknown ID {id:?}");
                Err(ResourceError::NotFound)
            }
        }
    }

    fn map_persistent(&self, id: BufferId) -> Result<PersistentMapping, ResourceError> {
        let buffers = self.buffers()?;
        let buffer = buffers.get(&id).ok_or(ResourceError::NotFound)?;
        if !buffer.persistently_mapped || !buffer.usage.contains(BufferUsage::MAP_WRITE) {
            return Err(ResourceError::NotMappable);
        }
        // A buffer is mapped at most once; a second attempt is `NotMappable`.
        buffer.memory.map()
    }

    fn insert_fence(&self) -> Result<FenceId, ResourceError> {
        let mut timeline = self.timeline()?;
        timeline.submitted += 1;
        let fence = FenceId(timeline.submitted);
        timeline.live.insert(fence);
        timeline.progress(self.internal.settings.fence_latency);
        log::trace!(
            "HeadlessDevice: Inserted fence {} (GPU at {})",
            fence.0,
            timeline.completed
        );
        Ok(fence)
    }

    fn fence_status(&self, fence: FenceId) -> Result<FenceStatus, ResourceError> {
        let timeline = self.timeline()?;
        if !timeline.live.contains(&fence) {
            return Err(ResourceError::NotFound);
        }
        Ok(timeline.status(fence))
    }

    fn wait_fence(&self, fence: FenceId, timeout: Duration) -> Result<FenceStatus, ResourceError> {
        let mut timeline = self.timeline()?;
        if !timeline.live.contains(&fence) {
            return Err(ResourceError::NotFound);
        }
        if !timeline.stalled {
            // A running GPU drains everything already submitted within the wait.
            timeline.completed = timeline.submitted;
        } else {
            log::debug!(
                "HeadlessDevice: wait on fence {} timed out after {:?} (GPU stalled)",
                fence.0,
                timeout
            );
        }
        Ok(timeline.status(fence))
    }

    fn destroy_fence(&self, fence: FenceId) -> Result<(), ResourceError> {
        if self.timeline()?.live.remove(&fence) {
            Ok(())
        } else {
            log::warn!("HeadlessDevice: destroy_fence on unknown fence {}", fence.0);
            Err(ResourceError::NotFound)
        }
    }

    fn create_pipeline_state(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<PipelineState, ResourceError> {
        let id = self.generate_pipeline_id();
        let state = PipelineState::from_descriptor(id, descriptor);
        self.pipelines()?
            .insert(id, descriptor.label.as_deref().map(str::to_owned));
        log::debug!(
            "HeadlessDevice: Created pipeline state '{}' with ID: {:?} (stencil: {})",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            state.stencil_enabled
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn mappable(size: u64) -> BufferDescriptor<'static> {
        BufferDescriptor {
            label: Some(Cow::Borrowed("test")),
            size,
            usage: BufferUsage::VERTEX | BufferUsage::MAP_WRITE,
            persistently_mapped: true,
        }
    }

    #[test]
    fn test_mapping_writes_are_visible() {
        let device = HeadlessDevice::default();
        let id = device.create_buffer(&mappable(32)).unwrap();
        let mut mapping = device.map_persistent(id).unwrap();
        mapping.slice_mut(4, 2).unwrap().copy_from_slice(&[7, 8]);
        drop(mapping);

        assert_eq!(device.read_buffer(id, 3, 4).unwrap(), vec![0, 7, 8, 0]);
        assert_eq!(device.map_persistent(id).unwrap_err(), ResourceError::NotMappable);
    }

    #[test]
    fn test_mapping_survives_buffer_destruction() {
        let device = HeadlessDevice::default();
        let id = device.create_buffer(&mappable(16)).unwrap();
        let mut mapping = device.map_persistent(id).unwrap();

        device.destroy_buffer(id).unwrap();
        assert_eq!(device.stats().live_buffers, 0);
        assert_eq!(device.read_buffer(id, 0, 4), Err(ResourceError::NotFound));

        // The bytes stay owned by the mapping until it is dropped.
        mapping.slice_mut(0, 16).unwrap().fill(0xAB);
        assert!(mapping.slice_mut(0, 16).unwrap().iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn test_unmappable_buffer() {
        let device = HeadlessDevice::default();
        let id = device
            .create_buffer_with_data(
                &BufferDescriptor {
                    label: None,
                    size: 4,
                    usage: BufferUsage::INDEX,
                    persistently_mapped: false,
                },
                &[1, 2, 3, 4],
            )
            .unwrap();
        assert_eq!(device.map_persistent(id).unwrap_err(), ResourceError::NotMappable);
        assert_eq!(device.read_buffer(id, 0, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_fences_trail_by_latency() {
        let device = HeadlessDevice::new(HeadlessSettings { fence_latency: 2 });
        let a = device.insert_fence().unwrap();
        let b = device.insert_fence().unwrap();
        assert_eq!(device.fence_status(a).unwrap(), FenceStatus::Pending);

        device.insert_fence().unwrap();
        assert_eq!(device.fence_status(a).unwrap(), FenceStatus::Signaled);
        assert_eq!(device.fence_status(b).unwrap(), FenceStatus::Pending);

        assert_eq!(
            device.wait_fence(b, Duration::from_millis(1)).unwrap(),
            FenceStatus::Signaled
        );
    }

    #[test]
    fn test_stalled_gpu_times_out_until_resumed() {
        let device = HeadlessDevice::new(HeadlessSettings { fence_latency: 0 });
        device.stall_gpu();
        let fence = device.insert_fence().unwrap();
        assert_eq!(
            device.wait_fence(fence, Duration::from_millis(1)).unwrap(),
            FenceStatus::Pending
        );

        device.resume_gpu();
        assert_eq!(device.fence_status(fence).unwrap(), FenceStatus::Signaled);
        device.destroy_fence(fence).unwrap();
        assert_eq!(device.fence_status(fence), Err(ResourceError::NotFound));
    }

    #[test]
    fn test_stats_track_bytes() {
        let device = HeadlessDevice::default();
        let a = device.create_buffer(&mappable(100)).unwrap();
        device.create_buffer(&mappable(50)).unwrap();
        device.destroy_buffer(a).unwrap();

        let stats = device.stats();
        assert_eq!(stats.live_buffers, 1);
        assert_eq!(stats.buffer_bytes, 50);
        assert_eq!(stats.peak_buffer_bytes, 150);
        assert_eq!(device.destroy_buffer(a), Err(ResourceError::NotFound));
    }
}
