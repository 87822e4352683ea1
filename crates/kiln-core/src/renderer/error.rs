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

//! Error types of the rendering subsystems.
//!
//! Each subsystem owns one enum; [`RenderError`] wraps them all for callers
//! that do not care which layer failed.

use crate::renderer::api::FenceId;
use crate::renderer::command::SubmissionId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors related to GPU resources and transient memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The requested resource does not exist on the device.
    #[error("resource not found")]
    NotFound,
    /// A handle does not belong to this allocator or device.
    #[error("invalid resource handle")]
    InvalidHandle,
    /// A read or write range leaves the resource.
    #[error("access out of bounds")]
    OutOfBounds,
    /// Zero-byte allocations are not supported.
    #[error("zero-sized allocation requested")]
    ZeroSized,
    /// The transient buffer was allocated before the last frame boundary.
    #[error("transient buffer from frame {allocated_in} used in frame {current}")]
    StaleTransient {
        /// Frame the buffer was allocated in.
        allocated_in: u64,
        /// Frame currently recording.
        current: u64,
    },
    /// The buffer was not created for persistent mapping.
    #[error("buffer cannot be persistently mapped")]
    NotMappable,
    /// The backend reported an error.
    #[error("backend error: {0}")]
    BackendError(String),
}

/// Errors raised at frame boundaries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A frame's fence did not signal within the bounded wait.
    #[error("fence {fence:?} of frame {frame} still pending after {waited:?}")]
    FenceTimeout {
        /// Frame whose memory could not be reclaimed.
        frame: u64,
        /// The fence that was waited on.
        fence: FenceId,
        /// How long the recycler waited.
        waited: Duration,
    },
    /// A device call failed while closing or reclaiming a frame.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// The family of a binding list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Vertex buffers.
    VertexBuffer,
    /// Constant (uniform) buffers.
    ConstantBuffer,
    /// Texture/sampler pairs.
    Texture,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::VertexBuffer => write!(f, "vertex buffer"),
            BindingKind::ConstantBuffer => write!(f, "constant buffer"),
            BindingKind::Texture => write!(f, "texture"),
        }
    }
}

/// Errors raised while recording a command buffer. Nothing is recorded on error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// More bindings than the device supports.
    #[error("{count} {kind} bindings exceed the limit of {max}")]
    TooManyBindings {
        /// Which binding list overflowed.
        kind: BindingKind,
        /// Requested count.
        count: usize,
        /// Supported maximum.
        max: usize,
    },
    /// Every texture needs exactly one sampler.
    #[error("{textures} textures bound with {samplers} samplers")]
    TextureSamplerMismatch {
        /// Number of textures.
        textures: usize,
        /// Number of samplers.
        samplers: usize,
    },
    /// A draw range ends past `u32::MAX`.
    #[error("draw range {first} + {count} overflows")]
    RangeOverflow {
        /// First vertex, index or instance.
        first: u32,
        /// Number of elements.
        count: u32,
    },
}

/// Errors raised by the render queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The bucket id does not address one of the queue's buckets.
    #[error("bucket {bucket} out of range (max {max})")]
    BucketOutOfRange {
        /// Requested bucket.
        bucket: u32,
        /// Number of buckets.
        max: usize,
    },
    /// More color targets than a bucket can hold.
    #[error("{count} color targets exceed the limit of {max}")]
    TooManyColorTargets {
        /// Requested count.
        count: usize,
        /// Supported maximum.
        max: usize,
    },
    /// More viewports than a bucket can hold.
    #[error("{count} viewports exceed the limit of {max}")]
    TooManyViewports {
        /// Requested count.
        count: usize,
        /// Supported maximum.
        max: usize,
    },
    /// A queued item references a submission with no recorded commands.
    #[error("unknown submission {0:?}")]
    UnknownSubmission(SubmissionId),
}

/// Errors in user-provided settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// At least two frames must be in flight.
    #[error("invalid ring depth {0}, at least 2 frames are required")]
    InvalidRingDepth(usize),
    /// At least one size class is required.
    #[error("invalid pool count {0}")]
    InvalidPoolCount(usize),
    /// Block sizes out of the supported range.
    #[error("invalid block sizes: min log2 {min_log2} with {pool_count} pools")]
    InvalidBlockSize {
        /// Log2 of the smallest block.
        min_log2: u32,
        /// Number of classes.
        pool_count: usize,
    },
    /// Pages must hold a whole number of the largest blocks.
    #[error("page size {page_size} is not a multiple of the largest block size {max_block_size}")]
    InvalidPageSize {
        /// Configured page size.
        page_size: u64,
        /// Largest block size.
        max_block_size: u64,
    },
}

/// A high-level error that can occur anywhere in the rendering system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Invalid settings.
    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),
    /// Resource failure.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
    /// Frame boundary failure.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    /// Recording failure.
    #[error("command error: {0}")]
    Command(#[from] CommandError),
    /// Queue failure.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}
