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

use criterion::{criterion_group, criterion_main, Criterion};
use kiln_core::renderer::{
    CommandBuffer, PipelineState, PipelineStateId, PrimitiveTopology, RenderQueue, SubmissionId,
    SubmissionTable, TransientAllocator, TransientSettings, TransientUsage,
};
use kiln_infra::{HeadlessDevice, HeadlessSettings, RecordingSink};
use std::hint::black_box;

fn bench_transient(c: &mut Criterion) {
    let device = HeadlessDevice::new(HeadlessSettings { fence_latency: 0 });
    let mut allocator = TransientAllocator::new(&TransientSettings::default()).unwrap();
    let payload = [0u8; 192];

    let mut group = c.benchmark_group("Transient Allocator");

    group.bench_function("1000 small allocations + boundary", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                let buffer = allocator
                    .allocate_with_data(&device, TransientUsage::Constant, &payload)
                    .unwrap();
                black_box(buffer);
            }
            allocator.mark_frame_boundary(&device).unwrap();
        });
    });

    group.bench_function("mixed sizes + boundary", |b| {
        b.iter(|| {
            for i in 0..256u64 {
                let size = 64 << (i % 10);
                black_box(allocator.allocate(&device, size, TransientUsage::Vertex).unwrap());
            }
            allocator.mark_frame_boundary(&device).unwrap();
        });
    });

    group.finish();
    allocator.destroy(&device).unwrap();
}

fn bench_queue(c: &mut Criterion) {
    let mut table = SubmissionTable::new();
    for i in 0..1000usize {
        let (_, cb) = table.begin();
        record_draw(cb, i);
    }
    let mut queue = RenderQueue::new();
    let mut sink = RecordingSink::new();

    let mut group = c.benchmark_group("Render Queue");

    group.bench_function("submit + flush 1000 items over 4 buckets", |b| {
        b.iter(|| {
            for i in (0..1000u32).rev() {
                queue.submit(i % 4, SubmissionId(i)).unwrap();
            }
            black_box(queue.flush(&table, &mut sink).unwrap());
            sink.clear();
        });
    });

    group.finish();
}

fn record_draw(cb: &mut CommandBuffer, i: usize) {
    cb.record_set_pipeline_state(&PipelineState {
        id: PipelineStateId(i % 8),
        stencil_enabled: false,
        stencil_reference: 0,
    });
    cb.record_draw(PrimitiveTopology::TriangleList, 0, 36, 0, 1).unwrap();
}

criterion_group!(benches, bench_transient, bench_queue);
criterion_main!(benches);
