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

//! # Kiln Core
//!
//! Frame-synchronized transient GPU memory, deferred command buffers and the
//! sorted render queue, expressed against backend-agnostic device contracts.
//!
//! Concrete devices live in `kiln-infra`; this crate only knows the
//! [`GraphicsDevice`](renderer::GraphicsDevice) and
//! [`CommandSink`](renderer::CommandSink) traits.

#![warn(missing_docs)]

pub mod context;
pub mod math;
pub mod renderer;
pub mod utils;

pub use context::GraphicsContext;
