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

//! A [`CommandSink`] that records every call instead of talking to a GPU.

use kiln_core::math::LinearRgba;
use kiln_core::renderer::{
    BufferBinding, CommandSink, IndexBufferBinding, InputLayoutId, PipelineStateId,
    PrimitiveTopology, RenderTarget, SamplerId, TextureId, VertexBufferBinding, Viewport,
};
use std::ops::Range;

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOp {
    /// `set_render_target`
    SetRenderTarget(RenderTarget),
    /// `set_screen_render_target`
    SetScreenRenderTarget,
    /// `set_render_targets`
    SetRenderTargets {
        /// Color targets.
        color: Vec<RenderTarget>,
        /// Depth target.
        depth: Option<RenderTarget>,
    },
    /// `set_viewports`
    SetViewports(Vec<Viewport>),
    /// `clear_color`
    ClearColor(LinearRgba),
    /// `clear_depth`
    ClearDepth(f32),
    /// `bind_vertex_buffers`
    BindVertexBuffers {
        /// Input layout.
        layout: InputLayoutId,
        /// Bound buffers.
        buffers: Vec<VertexBufferBinding>,
    },
    /// `bind_constant_buffers`
    BindConstantBuffers(Vec<BufferBinding>),
    /// `bind_textures`
    BindTextures {
        /// Bound textures.
        textures: Vec<TextureId>,
        /// Their samplers.
        samplers: Vec<SamplerId>,
    },
    /// `set_pipeline_state`
    SetPipelineState(PipelineStateId),
    /// `set_stencil_reference`
    SetStencilReference(u32),
    /// `draw`
    Draw {
        /// Topology.
        primitive: PrimitiveTopology,
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// `draw_indexed`
    DrawIndexed {
        /// Topology.
        primitive: PrimitiveTopology,
        /// Index source.
        index_buffer: IndexBufferBinding,
        /// Base vertex.
        base_vertex: i32,
        /// Index range.
        indices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// `draw_procedural`
    DrawProcedural {
        /// Topology.
        primitive: PrimitiveTopology,
        /// Generated vertices.
        vertex_count: u32,
        /// Instance range.
        instances: Range<u32>,
    },
}

impl DeviceOp {
    /// `true` for the draw calls.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DeviceOp::Draw { .. } | DeviceOp::DrawIndexed { .. } | DeviceOp::DrawProcedural { .. }
        )
    }
}

/// Captures the calls of a replay, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    ops: Vec<DeviceOp>,
}

impl RecordingSink {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls received so far.
    pub fn ops(&self) -> &[DeviceOp] {
        &self.ops
    }

    /// Takes the recorded calls, leaving the recorder empty.
    pub fn take(&mut self) -> Vec<DeviceOp> {
        std::mem::take(&mut self.ops)
    }

    /// Number of draw calls received.
    pub fn draw_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_draw()).count()
    }

    /// Forgets every recorded call.
    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

impl CommandSink for RecordingSink {
    fn set_render_target(&mut self, target: RenderTarget) {
        self.ops.push(DeviceOp::SetRenderTarget(target));
    }

    fn set_screen_render_target(&mut self) {
        self.ops.push(DeviceOp::SetScreenRenderTarget);
    }

    fn set_render_targets(&mut self, color: &[RenderTarget], depth: Option<RenderTarget>) {
        self.ops.push(DeviceOp::SetRenderTargets {
            color: color.to_vec(),
            depth,
        });
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.ops.push(DeviceOp::SetViewports(viewports.to_vec()));
    }

    fn clear_color(&mut self, color: LinearRgba) {
        self.ops.push(DeviceOp::ClearColor(color));
    }

    fn clear_depth(&mut self, depth: f32) {
        self.ops.push(DeviceOp::ClearDepth(depth));
    }

    fn bind_vertex_buffers(&mut self, layout: InputLayoutId, buffers: &[VertexBufferBinding]) {
        self.ops.push(DeviceOp::BindVertexBuffers {
            layout,
            buffers: buffers.to_vec(),
        });
    }

    fn bind_constant_buffers(&mut self, buffers: &[BufferBinding]) {
        self.ops.push(DeviceOp::BindConstantBuffers(buffers.to_vec()));
    }

    fn bind_textures(&mut self, textures: &[TextureId], samplers: &[SamplerId]) {
        self.ops.push(DeviceOp::BindTextures {
            textures: textures.to_vec(),
            samplers: samplers.to_vec(),
        });
    }

    fn set_pipeline_state(&mut self, state: PipelineStateId) {
        self.ops.push(DeviceOp::SetPipelineState(state));
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.ops.push(DeviceOp::SetStencilReference(reference));
    }

    fn draw(&mut self, primitive: PrimitiveTopology, vertices: Range<u32>, instances: Range<u32>) {
        self.ops.push(DeviceOp::Draw {
            primitive,
            vertices,
            instances,
        });
    }

    fn draw_indexed(
        &mut self,
        primitive: PrimitiveTopology,
        index_buffer: IndexBufferBinding,
        base_vertex: i32,
        indices: Range<u32>,
        instances: Range<u32>,
    ) {
        self.ops.push(DeviceOp::DrawIndexed {
            primitive,
            index_buffer,
            base_vertex,
            indices,
            instances,
        });
    }

    fn draw_procedural(
        &mut self,
        primitive: PrimitiveTopology,
        vertex_count: u32,
        instances: Range<u32>,
    ) {
        self.ops.push(DeviceOp::DrawProcedural {
            primitive,
            vertex_count,
            instances,
        });
    }
}
