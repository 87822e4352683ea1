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

use super::buffer::{Command, CommandBuffer};
use crate::renderer::traits::CommandSink;

/// Counters of one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Commands dispatched.
    pub commands: usize,
    /// Draw commands among them.
    pub draws: usize,
    /// Extra stencil reference updates issued before draws.
    pub stencil_updates: usize,
}

impl ExecutionStats {
    /// Total calls made on the sink.
    pub fn sink_calls(&self) -> usize {
        self.commands + self.stencil_updates
    }

    /// Adds `other` to `self`.
    pub fn accumulate(&mut self, other: ExecutionStats) {
        self.commands += other.commands;
        self.draws += other.draws;
        self.stencil_updates += other.stencil_updates;
    }
}

/// Cross-command state carried while replaying one command buffer.
///
/// A pipeline bind carries a stencil reference, but the reference only matters
/// to draws made under a stencil-testing pipeline. It is applied right before
/// the first such draw, and not again while it stays unchanged.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    stencil_enabled: bool,
    pending_stencil: Option<u32>,
    applied_stencil: Option<u32>,
    stats: ExecutionStats,
}

impl ExecutionContext {
    /// A context with no pipeline bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters so far.
    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    /// Replays every command of `buffer` in order, one sink call per command.
    pub fn execute(&mut self, buffer: &CommandBuffer, sink: &mut dyn CommandSink) {
        for command in buffer.commands() {
            self.dispatch(buffer, command, sink);
        }
    }

    fn dispatch(&mut self, buffer: &CommandBuffer, command: &Command, sink: &mut dyn CommandSink) {
        self.stats.commands += 1;
        if command.is_draw() {
            self.stats.draws += 1;
            self.apply_stencil(sink);
        }
        match command {
            Command::ClearColor(color) => sink.clear_color(*color),
            Command::ClearDepth(depth) => sink.clear_depth(*depth),
            Command::SetRenderTarget(target) => sink.set_render_target(*target),
            Command::SetScreenRenderTarget => sink.set_screen_render_target(),
            Command::BindVertexBuffers { layout, bindings } => {
                sink.bind_vertex_buffers(*layout, buffer.vertex_bindings(bindings))
            }
            Command::BindConstantBuffers { bindings } => {
                sink.bind_constant_buffers(buffer.constant_bindings(bindings))
            }
            Command::BindTextures { bindings } => {
                let (textures, samplers) = buffer.texture_bindings(bindings);
                sink.bind_textures(textures, samplers)
            }
            Command::SetPipelineState {
                state,
                stencil_enabled,
                stencil_reference,
            } => {
                self.stencil_enabled = *stencil_enabled;
                self.pending_stencil = Some(*stencil_reference);
                sink.set_pipeline_state(*state)
            }
            Command::Draw {
                primitive,
                vertices,
                instances,
            } => sink.draw(*primitive, vertices.clone(), instances.clone()),
            Command::DrawIndexed {
                primitive,
                index_buffer,
                base_vertex,
                indices,
                instances,
            } => sink.draw_indexed(
                *primitive,
                *index_buffer,
                *base_vertex,
                indices.clone(),
                instances.clone(),
            ),
            Command::DrawProcedural {
                primitive,
                vertex_count,
                instances,
            } => sink.draw_procedural(*primitive, *vertex_count, instances.clone()),
        }
    }

    fn apply_stencil(&mut self, sink: &mut dyn CommandSink) {
        if !self.stencil_enabled {
            return;
        }
        if let Some(reference) = self.pending_stencil {
            if self.applied_stencil != Some(reference) {
                sink.set_stencil_reference(reference);
                self.applied_stencil = Some(reference);
                self.stats.stencil_updates += 1;
            }
        }
    }
}

/// Replays `buffer` against `sink` with a fresh [`ExecutionContext`].
///
/// The buffer is only read: executing it twice issues the same calls twice.
pub fn execute(buffer: &CommandBuffer, sink: &mut dyn CommandSink) -> ExecutionStats {
    let mut context = ExecutionContext::new();
    context.execute(buffer, sink);
    context.stats()
}
