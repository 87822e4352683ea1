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

//! Caller-visible handles to transient memory.

use crate::renderer::api::{
    BufferBinding, BufferId, IndexBufferBinding, IndexFormat, VertexBufferBinding,
};

/// Where a transient allocation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockHandle {
    /// A block of a size-class pool.
    Pooled {
        /// Size class.
        pool: u16,
        /// Page inside the pool.
        page: u32,
        /// Block inside the page.
        block: u32,
    },
    /// A dedicated buffer for a request larger than every size class.
    Large {
        /// The dedicated buffer.
        buffer: BufferId,
    },
}

impl BlockHandle {
    /// The size class of a pooled block, `None` for a large allocation.
    pub fn pool_index(&self) -> Option<usize> {
        match self {
            BlockHandle::Pooled { pool, .. } => Some(*pool as usize),
            BlockHandle::Large { .. } => None,
        }
    }

    /// `true` for a dedicated allocation.
    pub fn is_large(&self) -> bool {
        matches!(self, BlockHandle::Large { .. })
    }
}

/// A piece of GPU-visible memory valid for the frame it was allocated in.
///
/// The handle itself is plain data and may be kept around, but its bytes can
/// only be written while its frame is still recording, and the GPU range it
/// describes is recycled a ring depth of frames later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransientBuffer {
    pub(crate) buffer: BufferId,
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) frame: u64,
    pub(crate) handle: BlockHandle,
}

impl TransientBuffer {
    /// The backing buffer (a pool page or a dedicated buffer).
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Byte offset of the allocation inside [`Self::buffer`].
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Requested size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Frame the allocation belongs to.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Where the allocation lives.
    pub fn handle(&self) -> BlockHandle {
        self.handle
    }

    /// Binds the allocation as a constant buffer.
    pub fn binding(&self) -> BufferBinding {
        BufferBinding {
            buffer: self.buffer,
            offset: self.offset,
            size: self.size,
        }
    }

    /// Binds the allocation as a vertex buffer of `stride`-byte vertices.
    pub fn vertex_binding(&self, stride: u32) -> VertexBufferBinding {
        VertexBufferBinding {
            buffer: self.buffer,
            offset: self.offset,
            stride,
        }
    }

    /// Binds the allocation as an index buffer.
    pub fn index_binding(&self, format: IndexFormat) -> IndexBufferBinding {
        IndexBufferBinding {
            buffer: self.buffer,
            offset: self.offset,
            format,
        }
    }
}
