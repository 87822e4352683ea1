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

//! Settings for the rendering system.

use crate::renderer::api::common::DEFAULT_FRAMES_IN_FLIGHT;
use crate::renderer::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest supported block size exponent (16 MiB blocks).
const MAX_BLOCK_SIZE_LOG2: u32 = 24;

/// What the frame recycler does when a slot's fence is still pending after the
/// bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FenceTimeoutPolicy {
    /// Keep the blocks out of their free lists until the fence signals, and
    /// report the stall as an error.
    #[default]
    Defer,
    /// Warn and reclaim anyway. The GPU may still be reading the memory.
    Reclaim,
}

/// Configuration of the transient allocator and its frame recycler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransientSettings {
    /// Number of frames in flight (the recycler's ring depth).
    pub ring_depth: usize,
    /// Log2 of the smallest block size.
    pub min_block_size_log2: u32,
    /// Number of size classes, each twice the block size of the previous one.
    pub pool_count: usize,
    /// Size of one backing page in bytes.
    pub page_size: u64,
    /// Upper bound of the blocking wait on a pending fence, in microseconds.
    pub fence_timeout_us: u64,
    /// Behavior when that wait expires.
    pub timeout_policy: FenceTimeoutPolicy,
}

impl Default for TransientSettings {
    fn default() -> Self {
        Self {
            ring_depth: DEFAULT_FRAMES_IN_FLIGHT,
            min_block_size_log2: 8,
            pool_count: 9,
            page_size: 1 << 20,
            fence_timeout_us: 1_000,
            timeout_policy: FenceTimeoutPolicy::Defer,
        }
    }
}

impl TransientSettings {
    /// Size in bytes of the smallest size class.
    pub fn min_block_size(&self) -> u64 {
        1 << self.min_block_size_log2
    }

    /// Size in bytes of the largest size class.
    pub fn max_block_size(&self) -> u64 {
        let classes = self.pool_count.saturating_sub(1) as u32;
        1 << (self.min_block_size_log2 + classes)
    }

    /// The bounded fence wait as a [`Duration`].
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_micros(self.fence_timeout_us)
    }

    /// Checks that the configuration describes a usable allocator.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.ring_depth < 2 {
            return Err(SettingsError::InvalidRingDepth(self.ring_depth));
        }
        if self.pool_count == 0 {
            return Err(SettingsError::InvalidPoolCount(self.pool_count));
        }
        let largest_log2 = self.min_block_size_log2 as u64 + self.pool_count as u64 - 1;
        if self.min_block_size_log2 < 4 || largest_log2 > MAX_BLOCK_SIZE_LOG2 as u64 {
            return Err(SettingsError::InvalidBlockSize {
                min_log2: self.min_block_size_log2,
                pool_count: self.pool_count,
            });
        }
        let max_block = self.max_block_size();
        if self.page_size < max_block || self.page_size % max_block != 0 {
            return Err(SettingsError::InvalidPageSize {
                page_size: self.page_size,
                max_block_size: max_block,
            });
        }
        Ok(())
    }
}

/// A collection of global settings that affect the rendering process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Transient memory configuration.
    pub transient: TransientSettings,
}

impl RenderSettings {
    /// Validates every nested section.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.transient.validate()
    }
}
