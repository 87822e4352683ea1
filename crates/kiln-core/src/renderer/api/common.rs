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

//! Shared limits and small value types used across the rendering API.

use serde::{Deserialize, Serialize};

/// Maximum number of vertex buffers bound by a single command.
pub const MAX_VERTEX_BUFFER_BINDINGS: usize = 8;

/// Maximum number of constant buffers bound by a single command.
pub const MAX_CONSTANT_BUFFER_BINDINGS: usize = 14;

/// Maximum number of texture/sampler pairs bound by a single command.
pub const MAX_TEXTURE_UNITS: usize = 16;

/// Maximum number of color render targets of a queue bucket.
pub const MAX_COLOR_TARGETS: usize = 8;

/// Maximum number of viewports of a queue bucket.
pub const MAX_VIEWPORTS: usize = 16;

/// Number of buckets a [`RenderQueue`](crate::renderer::RenderQueue) can address.
pub const MAX_BUCKETS: usize = 16;

/// The default number of frames the GPU may lag behind the CPU before transient
/// memory is recycled (current, N-1, N-2).
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

/// A rectangular region of a render target, with its depth range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge, in pixels.
    pub x: f32,
    /// Top edge, in pixels.
    pub y: f32,
    /// Width, in pixels.
    pub width: f32,
    /// Height, in pixels.
    pub height: f32,
    /// Depth mapped to the near plane.
    pub min_depth: f32,
    /// Depth mapped to the far plane.
    pub max_depth: f32,
}

impl Viewport {
    /// A viewport covering `width` x `height` pixels from the origin, full depth range.
    pub const fn with_size(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::with_size(0.0, 0.0)
    }
}
