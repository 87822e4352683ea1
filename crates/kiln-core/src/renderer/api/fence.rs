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

//! GPU completion fences.

/// An opaque handle to a fence inserted in the device's submission stream.
///
/// A fence signals once every piece of GPU work submitted before its insertion
/// has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FenceId(pub u64);

/// The observed state of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceStatus {
    /// The GPU has finished all the work preceding the fence.
    Signaled,
    /// The GPU has not reached the fence yet (or a bounded wait expired first).
    Pending,
}

impl FenceStatus {
    /// `true` for [`FenceStatus::Signaled`].
    pub fn is_signaled(self) -> bool {
        matches!(self, FenceStatus::Signaled)
    }
}
