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

//! Frame-synchronized transient GPU memory.
//!
//! Short-lived vertex, index and constant data is carved out of persistently
//! mapped pages grouped by power-of-two size class. A ring of frame slots
//! tracks which allocations each frame made; a slot's blocks go back to their
//! free lists only after the fence inserted when the frame closed has
//! signaled, a ring depth of frames later.

mod allocator;
mod handle;
mod pool;
mod recycler;
mod size_class;

pub use self::allocator::{AllocatorStats, FrameReport, PoolStats, TransientAllocator};
pub use self::handle::{BlockHandle, TransientBuffer};
pub use self::recycler::SlotState;
pub use self::size_class::SizeClasses;
