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

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use std::fmt::Debug;
use std::time::Duration;

/// The device-level contract the transient allocator and the frame recycler
/// rely on.
///
/// Implementations use interior mutability: every method takes `&self` so a
/// device can be shared behind an `Arc` by the context and its collaborators.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - The buffer configuration.
    /// ## Errors
    /// * `ResourceError` - If the backend cannot create the buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a new GPU buffer initialized with `data`.
    /// Used for permanent (non-transient) geometry.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If `data` is larger than the descriptor's size.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a buffer.
    ///
    /// A live [`PersistentMapping`] of it stays writable: implementations must
    /// keep the mapped memory alive until the mapping is dropped.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Maps the whole buffer for unsynchronized CPU writes that remain valid
    /// while the GPU uses the buffer.
    /// ## Errors
    /// * `ResourceError::NotMappable` - If the buffer was not created with
    ///   `persistently_mapped` and [`BufferUsage::MAP_WRITE`], or is already mapped.
    fn map_persistent(&self, id: BufferId) -> Result<PersistentMapping, ResourceError>;

    /// Inserts a fence after every piece of work submitted so far.
    fn insert_fence(&self) -> Result<FenceId, ResourceError>;

    /// Polls a fence without blocking.
    fn fence_status(&self, fence: FenceId) -> Result<FenceStatus, ResourceError>;

    /// Blocks until the fence signals or `timeout` expires, whichever comes first.
    fn wait_fence(&self, fence: FenceId, timeout: Duration) -> Result<FenceStatus, ResourceError>;

    /// Releases a fence.
    fn destroy_fence(&self, fence: FenceId) -> Result<(), ResourceError>;

    /// Compiles an immutable pipeline state.
    fn create_pipeline_state(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<PipelineState, ResourceError>;
}
