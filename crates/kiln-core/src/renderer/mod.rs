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

//! Provides the backend-agnostic rendering contracts and the transient-memory,
//! command and queue machinery built on top of them.
//!
//! The contracts ([`GraphicsDevice`], [`CommandSink`]) describe *what* a backend must
//! do; `kiln-infra` supplies the *how*. Everything else in this module only talks to
//! those traits, so the same allocator and queue run against any backend.

pub mod api;
pub mod command;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;
pub mod queue;
pub mod traits;
pub mod transient;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::command::{
    execute, Command, CommandBuffer, ExecutionContext, ExecutionStats, SubmissionId,
    SubmissionSource, SubmissionTable,
};
pub use self::error::{
    BindingKind, CommandError, FrameError, QueueError, RenderError, ResourceError, SettingsError,
};
pub use self::queue::{BucketId, ClearFlags, FlushStats, RenderItem, RenderQueue, SortKey};
pub use self::traits::{CommandSink, GraphicsDevice};
pub use self::transient::{
    AllocatorStats, BlockHandle, FrameReport, PoolStats, SizeClasses, SlotState,
    TransientAllocator, TransientBuffer,
};
