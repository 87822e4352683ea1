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

use super::buffer::CommandBuffer;
use std::collections::HashMap;

/// Identifies a prerecorded command buffer within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u32);

/// Where the render queue looks up the command buffer of a submission.
pub trait SubmissionSource {
    /// The command buffer recorded for `id`, if any.
    fn command_buffer(&self, id: SubmissionId) -> Option<&CommandBuffer>;
}

impl SubmissionSource for [CommandBuffer] {
    fn command_buffer(&self, id: SubmissionId) -> Option<&CommandBuffer> {
        self.get(id.0 as usize)
    }
}

impl SubmissionSource for HashMap<SubmissionId, CommandBuffer> {
    fn command_buffer(&self, id: SubmissionId) -> Option<&CommandBuffer> {
        self.get(&id)
    }
}

/// A per-frame arena of command buffers addressed by [`SubmissionId`].
///
/// Buffers are reset rather than freed between frames, so recording reuses
/// the storage of previous frames.
#[derive(Debug, Default)]
pub struct SubmissionTable {
    buffers: Vec<CommandBuffer>,
    used: usize,
}

impl SubmissionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the next submission with an empty command buffer.
    pub fn begin(&mut self) -> (SubmissionId, &mut CommandBuffer) {
        let id = SubmissionId(self.used as u32);
        if self.used == self.buffers.len() {
            self.buffers.push(CommandBuffer::new());
        }
        self.used += 1;
        let buffer = &mut self.buffers[id.0 as usize];
        buffer.reset();
        (id, buffer)
    }

    /// The command buffer of `id`, while it belongs to the current frame.
    pub fn get(&self, id: SubmissionId) -> Option<&CommandBuffer> {
        self.buffers[..self.used].get(id.0 as usize)
    }

    /// Mutable access to the command buffer of `id`.
    pub fn get_mut(&mut self, id: SubmissionId) -> Option<&mut CommandBuffer> {
        self.buffers[..self.used].get_mut(id.0 as usize)
    }

    /// Number of submissions opened this frame.
    pub fn len(&self) -> usize {
        self.used
    }

    /// `true` if no submission was opened this frame.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Invalidates every submission, keeping the buffers for reuse.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

impl SubmissionSource for SubmissionTable {
    fn command_buffer(&self, id: SubmissionId) -> Option<&CommandBuffer> {
        self.get(id)
    }
}
