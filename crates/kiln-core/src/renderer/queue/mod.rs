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

//! The sorted render queue.
//!
//! Submissions are tagged with a 64-bit sort key, bucket id in the high half
//! and submission id in the low half. A flush replays them in key order, and
//! each time the bucket changes it first binds that bucket's render targets
//! (the screen for a bucket without any) and viewports and issues its pending
//! clears.

use crate::kiln_bitflags;
use crate::math::LinearRgba;
use crate::renderer::api::{
    RenderTarget, Viewport, MAX_BUCKETS, MAX_COLOR_TARGETS, MAX_VIEWPORTS,
};
use crate::renderer::command::{ExecutionContext, ExecutionStats, SubmissionId, SubmissionSource};
use crate::renderer::error::QueueError;
use crate::renderer::traits::CommandSink;

/// Index of a bucket, below [`MAX_BUCKETS`].
pub type BucketId = u32;

/// Ordering key of a queued submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortKey(pub u64);

impl SortKey {
    /// `bucket << 32 | submission`.
    pub const fn new(bucket: BucketId, submission: SubmissionId) -> Self {
        Self(((bucket as u64) << 32) | submission.0 as u64)
    }

    /// The bucket half.
    pub const fn bucket(self) -> BucketId {
        (self.0 >> 32) as u32
    }

    /// The submission half.
    pub const fn submission(self) -> SubmissionId {
        SubmissionId(self.0 as u32)
    }
}

/// A queued submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderItem {
    /// Where the item sorts.
    pub sort_key: SortKey,
    /// The prerecorded command buffer to replay.
    pub submission: SubmissionId,
}

kiln_bitflags! {
    /// Clears a bucket issues when it becomes active.
    pub struct ClearFlags: u8 {
        /// Clear the color targets.
        const COLOR = 1 << 0;
        /// Clear the depth target.
        const DEPTH = 1 << 1;
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    color_targets: Vec<RenderTarget>,
    depth_target: Option<RenderTarget>,
    viewports: Vec<Viewport>,
    clears: ClearFlags,
    clear_color: LinearRgba,
    clear_depth: f32,
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            color_targets: Vec::new(),
            depth_target: None,
            viewports: Vec::new(),
            clears: ClearFlags::EMPTY,
            clear_color: LinearRgba::BLACK,
            clear_depth: 1.0,
        }
    }
}

impl Bucket {
    /// Binds the bucket's targets, or the screen when it has none, then its
    /// viewports and clears. Nothing of the previous bucket stays bound.
    fn apply(&self, sink: &mut dyn CommandSink) {
        if self.color_targets.is_empty() && self.depth_target.is_none() {
            sink.set_screen_render_target();
        } else {
            sink.set_render_targets(&self.color_targets, self.depth_target);
        }
        sink.set_viewports(&self.viewports);
        if self.clears.contains(ClearFlags::COLOR) {
            sink.clear_color(self.clear_color);
        }
        if self.clears.contains(ClearFlags::DEPTH) {
            sink.clear_depth(self.clear_depth);
        }
    }
}

/// Counters of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Items replayed.
    pub items: usize,
    /// Times a new bucket became active.
    pub bucket_switches: usize,
    /// Totals over every replayed command buffer.
    pub execution: ExecutionStats,
}

/// Collects one frame of submissions and replays them sorted.
#[derive(Debug)]
pub struct RenderQueue {
    items: Vec<RenderItem>,
    buckets: Vec<Bucket>,
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderQueue {
    /// Creates a queue with [`MAX_BUCKETS`] unconfigured buckets.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            buckets: vec![Bucket::default(); MAX_BUCKETS],
        }
    }

    /// Queued items, in submission order until the next flush.
    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queues `submission` in `bucket`.
    pub fn submit(
        &mut self,
        bucket: BucketId,
        submission: SubmissionId,
    ) -> Result<SortKey, QueueError> {
        check_bucket(bucket)?;
        let sort_key = SortKey::new(bucket, submission);
        self.items.push(RenderItem {
            sort_key,
            submission,
        });
        log::trace!("Queued submission {:?} in bucket {}", submission, bucket);
        Ok(sort_key)
    }

    /// Sets the render targets bound when `bucket` becomes active.
    pub fn set_bucket_render_targets(
        &mut self,
        bucket: BucketId,
        color_targets: &[RenderTarget],
        depth_target: Option<RenderTarget>,
    ) -> Result<(), QueueError> {
        if color_targets.len() > MAX_COLOR_TARGETS {
            return Err(QueueError::TooManyColorTargets {
                count: color_targets.len(),
                max: MAX_COLOR_TARGETS,
            });
        }
        let bucket = self.bucket_mut(bucket)?;
        bucket.color_targets.clear();
        bucket.color_targets.extend_from_slice(color_targets);
        bucket.depth_target = depth_target;
        Ok(())
    }

    /// Sets the viewports applied when `bucket` becomes active.
    pub fn set_bucket_viewports(
        &mut self,
        bucket: BucketId,
        viewports: &[Viewport],
    ) -> Result<(), QueueError> {
        if viewports.len() > MAX_VIEWPORTS {
            return Err(QueueError::TooManyViewports {
                count: viewports.len(),
                max: MAX_VIEWPORTS,
            });
        }
        let bucket = self.bucket_mut(bucket)?;
        bucket.viewports.clear();
        bucket.viewports.extend_from_slice(viewports);
        Ok(())
    }

    /// Makes `bucket` clear its color targets to `color` whenever it becomes active.
    pub fn clear_color(&mut self, bucket: BucketId, color: LinearRgba) -> Result<(), QueueError> {
        let bucket = self.bucket_mut(bucket)?;
        bucket.clears.insert(ClearFlags::COLOR);
        bucket.clear_color = color;
        Ok(())
    }

    /// Makes `bucket` clear its depth target to `depth` whenever it becomes active.
    pub fn clear_depth(&mut self, bucket: BucketId, depth: f32) -> Result<(), QueueError> {
        let bucket = self.bucket_mut(bucket)?;
        bucket.clears.insert(ClearFlags::DEPTH);
        bucket.clear_depth = depth;
        Ok(())
    }

    /// Restores the default configuration of `bucket`: no targets, no
    /// viewports, no clears.
    pub fn reset_bucket(&mut self, bucket: BucketId) -> Result<(), QueueError> {
        *self.bucket_mut(bucket)? = Bucket::default();
        Ok(())
    }

    /// Drops every queued item without issuing anything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Replays every queued item in sort-key order, then empties the queue.
    ///
    /// Bucket configuration survives the flush.
    ///
    /// # Errors
    ///
    /// [`QueueError::UnknownSubmission`] stops the flush at the first item whose
    /// submission has no command buffer in `source`. The queue is emptied anyway.
    pub fn flush(
        &mut self,
        source: &dyn SubmissionSource,
        sink: &mut dyn CommandSink,
    ) -> Result<FlushStats, QueueError> {
        // Stable: equal keys keep submission order.
        self.items.sort_by_key(|item| item.sort_key);
        let result = self.replay(source, sink);
        self.items.clear();
        if let Ok(stats) = &result {
            log::trace!(
                "Flushed {} items over {} buckets",
                stats.items,
                stats.bucket_switches
            );
        }
        result
    }

    fn replay(
        &self,
        source: &dyn SubmissionSource,
        sink: &mut dyn CommandSink,
    ) -> Result<FlushStats, QueueError> {
        let mut stats = FlushStats::default();
        let mut active: Option<BucketId> = None;

        for item in &self.items {
            let bucket = item.sort_key.bucket();
            if active != Some(bucket) {
                self.buckets[bucket as usize].apply(sink);
                active = Some(bucket);
                stats.bucket_switches += 1;
            }
            let Some(buffer) = source.command_buffer(item.submission) else {
                log::error!(
                    "Submission {:?} in bucket {} has no command buffer",
                    item.submission,
                    bucket
                );
                return Err(QueueError::UnknownSubmission(item.submission));
            };
            let mut context = ExecutionContext::new();
            context.execute(buffer, sink);
            stats.execution.accumulate(context.stats());
            stats.items += 1;
        }
        Ok(stats)
    }

    fn bucket_mut(&mut self, bucket: BucketId) -> Result<&mut Bucket, QueueError> {
        check_bucket(bucket)?;
        Ok(&mut self.buckets[bucket as usize])
    }
}

fn check_bucket(bucket: BucketId) -> Result<(), QueueError> {
    if bucket as usize >= MAX_BUCKETS {
        return Err(QueueError::BucketOutOfRange {
            bucket,
            max: MAX_BUCKETS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::{PipelineState, PipelineStateId, PrimitiveTopology, RenderTargetId};
    use crate::renderer::command::{CommandBuffer, SubmissionTable};
    use crate::renderer::mock::TraceSink;

    /// One submission per id, each binding pipeline `id` and drawing once.
    fn table(count: u32) -> SubmissionTable {
        let mut table = SubmissionTable::new();
        for i in 0..count {
            let (_, cb) = table.begin();
            cb.record_set_pipeline_state(&PipelineState {
                id: PipelineStateId(i as usize),
                stencil_enabled: false,
                stencil_reference: 0,
            });
            cb.record_draw(PrimitiveTopology::TriangleList, 0, 3, 0, 1).unwrap();
        }
        table
    }

    fn target(id: usize) -> RenderTarget {
        RenderTarget {
            id: RenderTargetId(id),
            width: 64,
            height: 64,
        }
    }

    #[test]
    fn test_sort_key_layout() {
        let key = SortKey::new(3, SubmissionId(7));
        assert_eq!(key.0, (3u64 << 32) | 7);
        assert_eq!(key.bucket(), 3);
        assert_eq!(key.submission(), SubmissionId(7));
    }

    #[test]
    fn test_flush_orders_by_bucket_then_submission() {
        let table = table(6);
        let mut queue = RenderQueue::new();
        queue.submit(1, SubmissionId(5)).unwrap();
        queue.submit(0, SubmissionId(2)).unwrap();
        queue.submit(1, SubmissionId(1)).unwrap();

        let mut sink = TraceSink::default();
        let stats = queue.flush(&table, &mut sink).unwrap();

        let pipelines: Vec<_> = sink
            .calls
            .iter()
            .filter(|c| c.starts_with("pso"))
            .cloned()
            .collect();
        assert_eq!(pipelines, vec!["pso 2", "pso 1", "pso 5"]);
        assert_eq!(stats.items, 3);
        assert_eq!(stats.bucket_switches, 2);
        assert_eq!(stats.execution.draws, 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_flush_issues_nothing() {
        let mut queue = RenderQueue::new();
        queue.clear_color(0, LinearRgba::WHITE).unwrap();
        let mut sink = TraceSink::default();

        let stats = queue.flush(&table(0), &mut sink).unwrap();
        assert!(sink.calls.is_empty());
        assert_eq!(stats, FlushStats::default());
    }

    #[test]
    fn test_bucket_state_applied_on_switch() {
        let table = table(3);
        let mut queue = RenderQueue::new();
        queue
            .set_bucket_render_targets(2, &[target(1), target(2)], Some(target(3)))
            .unwrap();
        queue
            .set_bucket_viewports(2, &[Viewport::with_size(64.0, 64.0)])
            .unwrap();
        queue.clear_depth(2, 0.5).unwrap();
        queue.clear_color(2, LinearRgba::BLACK).unwrap();
        queue.submit(2, SubmissionId(0)).unwrap();
        queue.submit(2, SubmissionId(1)).unwrap();

        let mut sink = TraceSink::default();
        queue.flush(&table, &mut sink).unwrap();
        assert_eq!(
            sink.calls,
            vec![
                "rts 2",
                "viewports 1",
                "clear color",
                "clear depth 0.5",
                "pso 0",
                "draw 0..3",
                "pso 1",
                "draw 0..3"
            ]
        );

        // Configuration and clears persist across flushes.
        queue.submit(2, SubmissionId(2)).unwrap();
        let mut sink = TraceSink::default();
        queue.flush(&table, &mut sink).unwrap();
        assert_eq!(sink.calls[..4], ["rts 2", "viewports 1", "clear color", "clear depth 0.5"]);

        queue.reset_bucket(2).unwrap();
        queue.submit(2, SubmissionId(2)).unwrap();
        let mut sink = TraceSink::default();
        queue.flush(&table, &mut sink).unwrap();
        assert_eq!(sink.calls, vec!["screen", "viewports 0", "pso 2", "draw 0..3"]);
    }

    #[test]
    fn test_unconfigured_bucket_rebinds_the_screen() {
        let table = table(2);
        let mut queue = RenderQueue::new();
        queue.set_bucket_render_targets(0, &[target(4)], None).unwrap();
        queue
            .set_bucket_viewports(0, &[Viewport::with_size(64.0, 64.0)])
            .unwrap();
        queue.submit(0, SubmissionId(0)).unwrap();
        queue.submit(1, SubmissionId(1)).unwrap();

        let mut sink = TraceSink::default();
        let stats = queue.flush(&table, &mut sink).unwrap();
        assert_eq!(
            sink.calls,
            vec![
                "rts 1",
                "viewports 1",
                "pso 0",
                "draw 0..3",
                "screen",
                "viewports 0",
                "pso 1",
                "draw 0..3"
            ]
        );
        assert_eq!(stats.bucket_switches, 2);
    }

    #[test]
    fn test_equal_keys_keep_submission_order() {
        use std::collections::HashMap;

        let mut source = HashMap::new();
        for id in [1u32, 3] {
            let mut cb = CommandBuffer::new();
            cb.record_set_pipeline_state(&PipelineState {
                id: PipelineStateId(id as usize),
                stencil_enabled: false,
                stencil_reference: 0,
            });
            source.insert(SubmissionId(id), cb);
        }
        let mut queue = RenderQueue::new();
        queue.submit(0, SubmissionId(3)).unwrap();
        queue.submit(0, SubmissionId(1)).unwrap();
        queue.submit(0, SubmissionId(3)).unwrap();
        let keys: Vec<_> = queue.items().iter().map(|i| i.sort_key).collect();
        assert_eq!(keys[0], keys[2]);

        let mut sink = TraceSink::default();
        let stats = queue.flush(&source, &mut sink).unwrap();
        assert_eq!(sink.calls, vec!["screen", "viewports 0", "pso 1", "pso 3", "pso 3"]);
        assert_eq!(stats.items, 3);

        queue.submit(0, SubmissionId(2)).unwrap();
        assert_eq!(
            queue.flush(&source, &mut sink),
            Err(QueueError::UnknownSubmission(SubmissionId(2)))
        );
    }

    #[test]
    fn test_bucket_range_and_limits() {
        let mut queue = RenderQueue::new();
        assert_eq!(
            queue.submit(16, SubmissionId(0)),
            Err(QueueError::BucketOutOfRange { bucket: 16, max: 16 })
        );
        assert!(queue.clear_depth(u32::MAX, 1.0).is_err());
        assert!(queue.submit(15, SubmissionId(0)).is_ok());

        let targets = [target(0); MAX_COLOR_TARGETS + 1];
        assert_eq!(
            queue.set_bucket_render_targets(0, &targets, None),
            Err(QueueError::TooManyColorTargets { count: 9, max: 8 })
        );
        let viewports = [Viewport::default(); MAX_VIEWPORTS + 1];
        assert_eq!(
            queue.set_bucket_viewports(0, &viewports),
            Err(QueueError::TooManyViewports { count: 17, max: 16 })
        );
    }

    #[test]
    fn test_unknown_submission_fails_and_clears() {
        let table = table(1);
        let mut queue = RenderQueue::new();
        queue.submit(0, SubmissionId(0)).unwrap();
        queue.submit(0, SubmissionId(9)).unwrap();

        let mut sink = TraceSink::default();
        assert_eq!(
            queue.flush(&table, &mut sink),
            Err(QueueError::UnknownSubmission(SubmissionId(9)))
        );
        assert!(queue.is_empty());
        assert_eq!(sink.calls, vec!["screen", "viewports 0", "pso 0", "draw 0..3"]);
    }

    #[test]
    fn test_clear_drops_items_silently() {
        let mut queue = RenderQueue::new();
        queue.submit(0, SubmissionId(0)).unwrap();
        queue.clear();
        let mut sink = TraceSink::default();
        queue.flush(&table(1), &mut sink).unwrap();
        assert!(sink.calls.is_empty());
    }
}
