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

//! Defines data structures related to GPU buffer resources.

use crate::kiln_bitflags;
use crate::renderer::api::pipeline::IndexFormat;
use std::borrow::Cow;

kiln_bitflags! {
    /// A set of flags describing the allowed usages of a [`BufferId`].
    ///
    /// Backends use them to pick a memory type and to validate bindings.
    pub struct BufferUsage: u32 {
        /// The buffer can be mapped for writing on the CPU.
        const MAP_WRITE = 1 << 0;
        /// The buffer can be bound as a vertex buffer.
        const VERTEX = 1 << 2;
        /// The buffer can be bound as an index buffer.
        const INDEX = 1 << 3;
        /// The buffer can be bound as a uniform (constant) buffer.
        const UNIFORM = 1 << 4;
    }
}

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label for the buffer.
    pub label: Option<Cow<'a, str>>,
    /// The total size of the buffer in bytes.
    pub size: u64,
    /// A bitmask of [`BufferUsage`] flags describing how the buffer will be used.
    pub usage: BufferUsage,
    /// If `true`, the buffer must support
    /// [`GraphicsDevice::map_persistent`](crate::renderer::GraphicsDevice::map_persistent)
    /// for its whole lifetime.
    pub persistently_mapped: bool,
}

/// An opaque handle to a GPU buffer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

/// The role a transient allocation is going to be bound as.
///
/// Only dedicated (large) allocations care: pooled pages are created with every
/// binding usage so any block can serve any role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientUsage {
    /// Per-draw vertex data.
    Vertex,
    /// Per-draw index data.
    Index,
    /// Per-draw shader constants.
    Constant,
}

impl TransientUsage {
    /// The buffer usage a dedicated backing buffer for this role is created with.
    pub fn buffer_usage(self) -> BufferUsage {
        let role = match self {
            TransientUsage::Vertex => BufferUsage::VERTEX,
            TransientUsage::Index => BufferUsage::INDEX,
            TransientUsage::Constant => BufferUsage::UNIFORM,
        };
        role | BufferUsage::MAP_WRITE
    }
}

/// A byte range of a buffer, as bound by constant-buffer commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBinding {
    /// The backing buffer.
    pub buffer: BufferId,
    /// Byte offset of the range inside `buffer`.
    pub offset: u64,
    /// Byte size of the range.
    pub size: u64,
}

/// A vertex buffer bound to one input slot, with the stride taken from the input layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    /// The backing buffer.
    pub buffer: BufferId,
    /// Byte offset of the first vertex inside `buffer`.
    pub offset: u64,
    /// Byte distance between consecutive vertices.
    pub stride: u32,
}

/// An index buffer as consumed by an indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferBinding {
    /// The backing buffer.
    pub buffer: BufferId,
    /// Byte offset of index 0 inside `buffer`.
    pub offset: u64,
    /// Width of one index.
    pub format: IndexFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_usage_maps_to_binding_role() {
        let vertex = TransientUsage::Vertex.buffer_usage();
        assert!(vertex.contains(BufferUsage::VERTEX | BufferUsage::MAP_WRITE));
        assert!(!vertex.intersects(BufferUsage::INDEX | BufferUsage::UNIFORM));

        assert!(TransientUsage::Index
            .buffer_usage()
            .contains(BufferUsage::INDEX));
        assert!(TransientUsage::Constant
            .buffer_usage()
            .contains(BufferUsage::UNIFORM));
    }
}
