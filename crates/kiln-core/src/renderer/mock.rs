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

//! In-memory device and tracing sink used by the unit tests of this crate.

use crate::math::LinearRgba;
use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::{CommandSink, GraphicsDevice};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct MockBuffer {
    memory: Arc<HostMemory>,
    mappable: bool,
}

/// A mock graphics device backed by heap memory, with manually driven fences.
#[derive(Debug)]
pub(crate) struct MockGraphicsDevice {
    next_id: AtomicUsize,
    auto_signal: AtomicBool,
    buffers: Mutex<HashMap<BufferId, MockBuffer>>,
    fences: Mutex<HashMap<FenceId, bool>>,
    waits: AtomicUsize,
}

impl MockGraphicsDevice {
    /// A device whose fences signal as soon as they are inserted.
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            auto_signal: AtomicBool::new(true),
            buffers: Mutex::new(HashMap::new()),
            fences: Mutex::new(HashMap::new()),
            waits: AtomicUsize::new(0),
        }
    }

    /// Fences inserted from now on stay pending until [`Self::signal_all`].
    pub(crate) fn hold_fences(&self) {
        self.auto_signal.store(false, Ordering::SeqCst);
    }

    /// Signals every live fence and restores auto-signaling.
    pub(crate) fn signal_all(&self) {
        self.auto_signal.store(true, Ordering::SeqCst);
        for signaled in self.fences.lock().unwrap().values_mut() {
            *signaled = true;
        }
    }

    pub(crate) fn live_buffers(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }

    pub(crate) fn live_fences(&self) -> usize {
        self.fences.lock().unwrap().len()
    }

    pub(crate) fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    pub(crate) fn buffer_bytes(&self, id: BufferId, offset: usize, len: usize) -> Vec<u8> {
        self.buffers.lock().unwrap()[&id]
            .memory
            .read(offset, len)
            .unwrap()
    }

    fn next(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        self.create_buffer_with_data(descriptor, &[])
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        if data.len() as u64 > descriptor.size {
            return Err(ResourceError::OutOfBounds);
        }
        let mut memory = HostMemory::zeroed(descriptor.size as usize);
        memory.bytes_mut()[..data.len()].copy_from_slice(data);
        let id = BufferId(self.next());
        self.buffers.lock().unwrap().insert(
            id,
            MockBuffer {
                memory: Arc::new(memory),
                mappable: descriptor.persistently_mapped
                    && descriptor.usage.contains(BufferUsage::MAP_WRITE),
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.buffers
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn map_persistent(&self, id: BufferId) -> Result<PersistentMapping, ResourceError> {
        let buffers = self.buffers.lock().unwrap();
        let buffer = buffers.get(&id).ok_or(ResourceError::NotFound)?;
        if !buffer.mappable {
            return Err(ResourceError::NotMappable);
        }
        buffer.memory.map()
    }

    fn insert_fence(&self) -> Result<FenceId, ResourceError> {
        let id = FenceId(self.next() as u64);
        let signaled = self.auto_signal.load(Ordering::SeqCst);
        self.fences.lock().unwrap().insert(id, signaled);
        Ok(id)
    }

    fn fence_status(&self, fence: FenceId) -> Result<FenceStatus, ResourceError> {
        match self.fences.lock().unwrap().get(&fence) {
            Some(true) => Ok(FenceStatus::Signaled),
            Some(false) => Ok(FenceStatus::Pending),
            None => Err(ResourceError::NotFound),
        }
    }

    fn wait_fence(&self, fence: FenceId, _timeout: Duration) -> Result<FenceStatus, ResourceError> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        self.fence_status(fence)
    }

    fn destroy_fence(&self, fence: FenceId) -> Result<(), ResourceError> {
        self.fences
            .lock()
            .unwrap()
            .remove(&fence)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_pipeline_state(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<PipelineState, ResourceError> {
        Ok(PipelineState::from_descriptor(
            PipelineStateId(self.next()),
            descriptor,
        ))
    }
}

/// Records a compact trace of every sink call.
#[derive(Debug, Default)]
pub(crate) struct TraceSink {
    pub(crate) calls: Vec<String>,
}

impl CommandSink for TraceSink {
    fn set_render_target(&mut self, target: RenderTarget) {
        self.calls.push(format!("rt {}", target.id.0));
    }
    fn set_screen_render_target(&mut self) {
        self.calls.push("screen".into());
    }
    fn set_render_targets(&mut self, color: &[RenderTarget], _depth: Option<RenderTarget>) {
        self.calls.push(format!("rts {}", color.len()));
    }
    fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.calls.push(format!("viewports {}", viewports.len()));
    }
    fn clear_color(&mut self, _color: LinearRgba) {
        self.calls.push("clear color".into());
    }
    fn clear_depth(&mut self, depth: f32) {
        self.calls.push(format!("clear depth {depth}"));
    }
    fn bind_vertex_buffers(&mut self, _layout: InputLayoutId, buffers: &[VertexBufferBinding]) {
        self.calls.push(format!("vb {}", buffers.len()));
    }
    fn bind_constant_buffers(&mut self, buffers: &[BufferBinding]) {
        self.calls.push(format!("cb {}", buffers.len()));
    }
    fn bind_textures(&mut self, textures: &[TextureId], _samplers: &[SamplerId]) {
        self.calls.push(format!("tex {}", textures.len()));
    }
    fn set_pipeline_state(&mut self, state: PipelineStateId) {
        self.calls.push(format!("pso {}", state.0));
    }
    fn set_stencil_reference(&mut self, reference: u32) {
        self.calls.push(format!("stencil {reference}"));
    }
    fn draw(&mut self, _p: PrimitiveTopology, vertices: Range<u32>, _i: Range<u32>) {
        self.calls.push(format!("draw {vertices:?}"));
    }
    fn draw_indexed(
        &mut self,
        _p: PrimitiveTopology,
        _ib: IndexBufferBinding,
        _base: i32,
        indices: Range<u32>,
        _i: Range<u32>,
    ) {
        self.calls.push(format!("draw indexed {indices:?}"));
    }
    fn draw_procedural(&mut self, _p: PrimitiveTopology, count: u32, _i: Range<u32>) {
        self.calls.push(format!("draw procedural {count}"));
    }
}
