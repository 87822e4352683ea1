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

//! Mapping of request sizes to power-of-two size classes.

use crate::renderer::api::TransientSettings;

/// The ladder of block sizes served by the pools.
///
/// Class `c` serves blocks of `2^(min_log2 + c)` bytes. A request goes to the
/// smallest class whose block fits it; anything above the last class is served
/// by a dedicated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClasses {
    min_log2: u32,
    count: usize,
}

impl SizeClasses {
    /// Creates `count` classes starting at `2^min_log2` bytes.
    pub const fn new(min_log2: u32, count: usize) -> Self {
        Self { min_log2, count }
    }

    /// The classes described by the transient settings.
    pub fn from_settings(settings: &TransientSettings) -> Self {
        Self::new(settings.min_block_size_log2, settings.pool_count)
    }

    /// Number of classes.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Block size of class `class`, in bytes.
    pub fn block_size(&self, class: usize) -> u64 {
        1 << (self.min_log2 + class as u32)
    }

    /// Block size of the largest class.
    pub fn max_block_size(&self) -> u64 {
        self.block_size(self.count.saturating_sub(1))
    }

    /// Returns the class serving `size` bytes, or `None` when the request
    /// exceeds the largest class and must take the large path.
    pub fn class_for(&self, size: u64) -> Option<usize> {
        if size <= 1 << self.min_log2 {
            return Some(0);
        }
        let bit_length = u64::BITS - (size - 1).leading_zeros();
        let class = (bit_length - self.min_log2) as usize;
        (class < self.count).then_some(class)
    }
}
