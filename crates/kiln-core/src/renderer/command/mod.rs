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

//! Deferred command recording and replay.
//!
//! A [`CommandBuffer`] is recorded once and replayed through [`execute`] against
//! any [`CommandSink`](crate::renderer::CommandSink), in recording order.

mod buffer;
mod executor;
mod submission;

pub use self::buffer::{Command, CommandBuffer};
pub use self::executor::{execute, ExecutionContext, ExecutionStats};
pub use self::submission::{SubmissionId, SubmissionSource, SubmissionTable};
