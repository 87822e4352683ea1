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

//! The explicit owner of the device handle and the per-device render state.

use crate::renderer::{
    execute, AllocatorStats, CommandBuffer, CommandSink, ExecutionStats, FrameError,
    FrameReport, GraphicsDevice, PipelineState, PipelineStateDescriptor, RenderError,
    RenderSettings, ResourceError, TransientAllocator, TransientBuffer, TransientUsage,
};
use std::sync::Arc;
use std::time::Duration;

/// How long shutdown waits for the GPU before tearing memory down regardless.
const SHUTDOWN_FENCE_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything tied to one initialized device: the device itself, the settings
/// it was brought up with and the transient allocator.
///
/// There is no global instance; callers pass the context to whatever needs it.
/// Its lifetime spans [`GraphicsContext::init`] to [`GraphicsContext::shutdown`].
#[derive(Debug)]
pub struct GraphicsContext {
    device: Arc<dyn GraphicsDevice>,
    settings: RenderSettings,
    transient: TransientAllocator,
}

impl GraphicsContext {
    /// Validates `settings` and sets up the transient allocator on `device`.
    pub fn init(
        device: Arc<dyn GraphicsDevice>,
        settings: RenderSettings,
    ) -> Result<Self, RenderError> {
        let transient = TransientAllocator::new(&settings.transient)?;
        log::info!(
            "Graphics context initialized: {} frames in flight, {} size classes ({}..={} B), {} B pages",
            settings.transient.ring_depth,
            settings.transient.pool_count,
            settings.transient.min_block_size(),
            settings.transient.max_block_size(),
            settings.transient.page_size
        );
        Ok(Self {
            device,
            settings,
            transient,
        })
    }

    /// The device.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// The settings the context was initialized with.
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// The transient allocator.
    pub fn transient(&self) -> &TransientAllocator {
        &self.transient
    }

    /// The frame currently recording.
    pub fn frame_number(&self) -> u64 {
        self.transient.frame_number()
    }

    /// See [`TransientAllocator::allocate`].
    pub fn allocate(
        &mut self,
        size: u64,
        usage: TransientUsage,
    ) -> Result<TransientBuffer, ResourceError> {
        self.transient.allocate(self.device.as_ref(), size, usage)
    }

    /// See [`TransientAllocator::allocate_with_data`].
    pub fn allocate_with_data(
        &mut self,
        usage: TransientUsage,
        bytes: &[u8],
    ) -> Result<TransientBuffer, ResourceError> {
        self.transient
            .allocate_with_data(self.device.as_ref(), usage, bytes)
    }

    /// See [`TransientAllocator::mapped_mut`].
    pub fn mapped_mut(&mut self, buffer: &TransientBuffer) -> Result<&mut [u8], ResourceError> {
        self.transient.mapped_mut(buffer)
    }

    /// See [`TransientAllocator::write`].
    pub fn write(
        &mut self,
        buffer: &TransientBuffer,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), ResourceError> {
        self.transient.write(buffer, offset, bytes)
    }

    /// See [`TransientAllocator::mark_frame_boundary`].
    pub fn mark_frame_boundary(&mut self) -> Result<FrameReport, FrameError> {
        self.transient.mark_frame_boundary(self.device.as_ref())
    }

    /// Replays `buffer` against `sink`.
    pub fn execute(&self, buffer: &CommandBuffer, sink: &mut dyn CommandSink) -> ExecutionStats {
        execute(buffer, sink)
    }

    /// Compiles a pipeline state on the device.
    pub fn create_pipeline_state(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<PipelineState, ResourceError> {
        self.device.create_pipeline_state(descriptor)
    }

    /// Allocator statistics.
    pub fn stats(&self) -> AllocatorStats {
        self.transient.stats()
    }

    /// Waits for in-flight frames, then destroys every page and dedicated
    /// buffer. Memory is released even when the wait times out; the first
    /// error is returned.
    pub fn shutdown(mut self) -> Result<(), RenderError> {
        let idle = self
            .transient
            .wait_idle(self.device.as_ref(), SHUTDOWN_FENCE_TIMEOUT);
        if let Err(e) = &idle {
            log::error!("GPU not idle at shutdown, releasing transient memory anyway: {e}");
        }
        let destroyed = self.transient.destroy(self.device.as_ref());
        log::info!(
            "Graphics context shut down after {} frames",
            self.transient.frame_number()
        );
        idle?;
        destroyed?;
        Ok(())
    }
}
