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

use crate::math::LinearRgba;
use crate::renderer::api::*;

/// The device command interface a command buffer is replayed against.
///
/// There is one method per recorded command kind, plus the bucket bindings the
/// render queue applies between buckets. Backends translate each call to the
/// native API; recorders capture them for inspection.
pub trait CommandSink {
    /// Binds a single off-screen color target.
    fn set_render_target(&mut self, target: RenderTarget);

    /// Binds the default (screen) framebuffer.
    fn set_screen_render_target(&mut self);

    /// Binds the color targets and optional depth target of a bucket.
    fn set_render_targets(&mut self, color: &[RenderTarget], depth: Option<RenderTarget>);

    /// Sets the viewports of a bucket.
    fn set_viewports(&mut self, viewports: &[Viewport]);

    /// Clears the bound color targets.
    fn clear_color(&mut self, color: LinearRgba);

    /// Clears the bound depth target.
    fn clear_depth(&mut self, depth: f32);

    /// Binds vertex buffers to consecutive slots, starting at slot 0.
    fn bind_vertex_buffers(&mut self, layout: InputLayoutId, buffers: &[VertexBufferBinding]);

    /// Binds constant buffers to consecutive slots, starting at slot 0.
    fn bind_constant_buffers(&mut self, buffers: &[BufferBinding]);

    /// Binds texture/sampler pairs to consecutive units, starting at unit 0.
    fn bind_textures(&mut self, textures: &[TextureId], samplers: &[SamplerId]);

    /// Binds a precompiled pipeline state.
    fn set_pipeline_state(&mut self, state: PipelineStateId);

    /// Sets the stencil reference value for subsequent draws.
    fn set_stencil_reference(&mut self, reference: u32);

    /// Issues a non-indexed draw.
    fn draw(
        &mut self,
        primitive: PrimitiveTopology,
        vertices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    );

    /// Issues an indexed draw.
    fn draw_indexed(
        &mut self,
        primitive: PrimitiveTopology,
        index_buffer: IndexBufferBinding,
        base_vertex: i32,
        indices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    );

    /// Issues a draw with no bound vertex input; vertices are generated in the shader.
    fn draw_procedural(
        &mut self,
        primitive: PrimitiveTopology,
        vertex_count: u32,
        instances: std::ops::Range<u32>,
    );
}
