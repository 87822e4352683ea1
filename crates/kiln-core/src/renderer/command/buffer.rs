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
use crate::renderer::error::{BindingKind, CommandError};
use std::ops::Range;

/// One recorded operation.
///
/// Variable-length payloads (binding lists) live in side arenas of the owning
/// [`CommandBuffer`] and are referenced by index range.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Clears the bound color targets.
    ClearColor(LinearRgba),
    /// Clears the bound depth target.
    ClearDepth(f32),
    /// Binds an off-screen render target.
    SetRenderTarget(RenderTarget),
    /// Binds the screen framebuffer.
    SetScreenRenderTarget,
    /// Binds vertex buffers, read through `layout`.
    BindVertexBuffers {
        /// The input layout.
        layout: InputLayoutId,
        /// Range in the vertex binding arena.
        bindings: Range<u32>,
    },
    /// Binds constant buffers.
    BindConstantBuffers {
        /// Range in the constant binding arena.
        bindings: Range<u32>,
    },
    /// Binds texture/sampler pairs.
    BindTextures {
        /// Range in the texture and sampler arenas.
        bindings: Range<u32>,
    },
    /// Binds a pipeline state and the stencil reference to draw with.
    SetPipelineState {
        /// The state.
        state: PipelineStateId,
        /// Whether draws under the state use the stencil reference.
        stencil_enabled: bool,
        /// The stencil reference.
        stencil_reference: u32,
    },
    /// A non-indexed draw.
    Draw {
        /// Primitive topology.
        primitive: PrimitiveTopology,
        /// Vertices to draw.
        vertices: Range<u32>,
        /// Instances to draw.
        instances: Range<u32>,
    },
    /// An indexed draw.
    DrawIndexed {
        /// Primitive topology.
        primitive: PrimitiveTopology,
        /// Index source.
        index_buffer: IndexBufferBinding,
        /// Added to every index.
        base_vertex: i32,
        /// Indices to draw.
        indices: Range<u32>,
        /// Instances to draw.
        instances: Range<u32>,
    },
    /// A draw with no vertex input.
    DrawProcedural {
        /// Primitive topology.
        primitive: PrimitiveTopology,
        /// Vertices generated by the shader.
        vertex_count: u32,
        /// Instances to draw.
        instances: Range<u32>,
    },
}

impl Command {
    /// `true` for the draw variants.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Command::Draw { .. } | Command::DrawIndexed { .. } | Command::DrawProcedural { .. }
        )
    }
}

/// An append-only list of rendering commands, replayable any number of times.
///
/// Records are never modified once written; [`CommandBuffer::reset`] drops them
/// all while keeping the allocated storage for the next frame.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    vertex_bindings: Vec<VertexBufferBinding>,
    constant_bindings: Vec<BufferBinding>,
    textures: Vec<TextureId>,
    samplers: Vec<SamplerId>,
}

impl CommandBuffer {
    /// Creates an empty command buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty command buffer with room for `commands` records.
    pub fn with_capacity(commands: usize) -> Self {
        Self {
            commands: Vec::with_capacity(commands),
            ..Default::default()
        }
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The recorded commands, in order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drops every record, keeping capacity.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.vertex_bindings.clear();
        self.constant_bindings.clear();
        self.textures.clear();
        self.samplers.clear();
    }

    /// Vertex bindings referenced by a [`Command::BindVertexBuffers`].
    pub fn vertex_bindings(&self, range: &Range<u32>) -> &[VertexBufferBinding] {
        &self.vertex_bindings[range.start as usize..range.end as usize]
    }

    /// Constant bindings referenced by a [`Command::BindConstantBuffers`].
    pub fn constant_bindings(&self, range: &Range<u32>) -> &[BufferBinding] {
        &self.constant_bindings[range.start as usize..range.end as usize]
    }

    /// Textures and samplers referenced by a [`Command::BindTextures`].
    pub fn texture_bindings(&self, range: &Range<u32>) -> (&[TextureId], &[SamplerId]) {
        let r = range.start as usize..range.end as usize;
        (&self.textures[r.clone()], &self.samplers[r])
    }

    /// Records a color clear.
    pub fn record_clear_color(&mut self, color: LinearRgba) {
        self.commands.push(Command::ClearColor(color));
    }

    /// Records a depth clear.
    pub fn record_clear_depth(&mut self, depth: f32) {
        self.commands.push(Command::ClearDepth(depth));
    }

    /// Records an off-screen render target bind.
    pub fn record_set_render_target(&mut self, target: RenderTarget) {
        self.commands.push(Command::SetRenderTarget(target));
    }

    /// Records a bind of the screen framebuffer.
    pub fn record_set_screen_render_target(&mut self) {
        self.commands.push(Command::SetScreenRenderTarget);
    }

    /// Records a vertex buffer bind.
    ///
    /// # Errors
    ///
    /// [`CommandError::TooManyBindings`] above [`MAX_VERTEX_BUFFER_BINDINGS`].
    pub fn record_bind_vertex_buffers(
        &mut self,
        buffers: &[VertexBufferBinding],
        layout: InputLayoutId,
    ) -> Result<(), CommandError> {
        check_count(BindingKind::VertexBuffer, buffers.len(), MAX_VERTEX_BUFFER_BINDINGS)?;
        let bindings = push_range(&mut self.vertex_bindings, buffers);
        self.commands
            .push(Command::BindVertexBuffers { layout, bindings });
        Ok(())
    }

    /// Records a constant buffer bind.
    ///
    /// # Errors
    ///
    /// [`CommandError::TooManyBindings`] above [`MAX_CONSTANT_BUFFER_BINDINGS`].
    pub fn record_bind_constant_buffers(
        &mut self,
        buffers: &[BufferBinding],
    ) -> Result<(), CommandError> {
        check_count(
            BindingKind::ConstantBuffer,
            buffers.len(),
            MAX_CONSTANT_BUFFER_BINDINGS,
        )?;
        let bindings = push_range(&mut self.constant_bindings, buffers);
        self.commands.push(Command::BindConstantBuffers { bindings });
        Ok(())
    }

    /// Records a texture/sampler bind; `textures[i]` is sampled with `samplers[i]`.
    ///
    /// # Errors
    ///
    /// [`CommandError::TextureSamplerMismatch`] if the lists differ in length,
    /// [`CommandError::TooManyBindings`] above [`MAX_TEXTURE_UNITS`].
    pub fn record_bind_textures(
        &mut self,
        textures: &[TextureId],
        samplers: &[SamplerId],
    ) -> Result<(), CommandError> {
        if textures.len() != samplers.len() {
            return Err(CommandError::TextureSamplerMismatch {
                textures: textures.len(),
                samplers: samplers.len(),
            });
        }
        check_count(BindingKind::Texture, textures.len(), MAX_TEXTURE_UNITS)?;
        let bindings = push_range(&mut self.textures, textures);
        self.samplers.extend_from_slice(samplers);
        self.commands.push(Command::BindTextures { bindings });
        Ok(())
    }

    /// Records a pipeline state bind with the state's own stencil reference.
    pub fn record_set_pipeline_state(&mut self, state: &PipelineState) {
        self.record_set_pipeline_state_with_stencil(state, state.stencil_reference);
    }

    /// Records a pipeline state bind with an explicit stencil reference.
    pub fn record_set_pipeline_state_with_stencil(
        &mut self,
        state: &PipelineState,
        reference: u32,
    ) {
        self.commands.push(Command::SetPipelineState {
            state: state.id,
            stencil_enabled: state.stencil_enabled,
            stencil_reference: reference,
        });
    }

    /// Records a non-indexed draw.
    ///
    /// # Errors
    ///
    /// [`CommandError::RangeOverflow`] if a first/count pair ends past `u32::MAX`.
    pub fn record_draw(
        &mut self,
        primitive: PrimitiveTopology,
        first_vertex: u32,
        vertex_count: u32,
        first_instance: u32,
        instance_count: u32,
    ) -> Result<(), CommandError> {
        let vertices = span(first_vertex, vertex_count)?;
        let instances = span(first_instance, instance_count)?;
        self.commands.push(Command::Draw {
            primitive,
            vertices,
            instances,
        });
        Ok(())
    }

    /// Records an indexed draw. `first_vertex` is added to every fetched index.
    #[allow(clippy::too_many_arguments)]
    pub fn record_draw_indexed(
        &mut self,
        primitive: PrimitiveTopology,
        index_buffer: IndexBufferBinding,
        first_vertex: i32,
        first_index: u32,
        index_count: u32,
        first_instance: u32,
        instance_count: u32,
    ) -> Result<(), CommandError> {
        let indices = span(first_index, index_count)?;
        let instances = span(first_instance, instance_count)?;
        self.commands.push(Command::DrawIndexed {
            primitive,
            index_buffer,
            base_vertex: first_vertex,
            indices,
            instances,
        });
        Ok(())
    }

    /// Records a draw whose vertices are generated in the shader.
    pub fn record_draw_procedural(
        &mut self,
        primitive: PrimitiveTopology,
        vertex_count: u32,
        first_instance: u32,
        instance_count: u32,
    ) -> Result<(), CommandError> {
        let instances = span(first_instance, instance_count)?;
        self.commands.push(Command::DrawProcedural {
            primitive,
            vertex_count,
            instances,
        });
        Ok(())
    }
}

fn check_count(kind: BindingKind, count: usize, max: usize) -> Result<(), CommandError> {
    if count > max {
        return Err(CommandError::TooManyBindings { kind, count, max });
    }
    Ok(())
}

fn push_range<T: Copy>(arena: &mut Vec<T>, items: &[T]) -> Range<u32> {
    let start = arena.len() as u32;
    arena.extend_from_slice(items);
    start..arena.len() as u32
}

fn span(first: u32, count: u32) -> Result<Range<u32>, CommandError> {
    let end = first
        .checked_add(count)
        .ok_or(CommandError::RangeOverflow { first, count })?;
    Ok(first..end)
}
