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

//! Backend-agnostic rendering API types.
//!
//! - **[`buffer`]**: buffer handles, usages and bindings.
//! - **[`mapping`]**: persistently-mapped CPU views of GPU buffers.
//! - **[`texture`]**: textures, samplers and render targets.
//! - **[`pipeline`]**: precompiled pipeline states and their descriptors.
//! - **[`fence`]**: GPU completion fences.
//! - **[`common`]**: viewports and binding limits.
//! - **[`settings`]**: tunables of the transient allocator and queue.

pub mod buffer;
pub mod common;
pub mod fence;
pub mod mapping;
pub mod pipeline;
pub mod settings;
pub mod texture;

pub use self::buffer::*;
pub use self::common::*;
pub use self::fence::*;
pub use self::mapping::*;
pub use self::pipeline::*;
pub use self::settings::*;
pub use self::texture::*;
