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

// Kiln Sandbox
// Runs a few headless frames through the allocator, the command buffers and the queue.

use std::mem;
use std::sync::Arc;

use anyhow::{Context, Result};
use kiln_core::math::LinearRgba;
use kiln_core::renderer::{
    CompareFunction, DepthStencilStateDescriptor, InputLayoutId, PipelineState,
    PipelineStateDescriptor, PrimitiveTopology, RenderQueue, RenderSettings, StencilFaceState,
    StencilOperation, SubmissionTable, TransientUsage, Viewport,
};
use kiln_core::GraphicsContext;
use kiln_infra::{HeadlessDevice, HeadlessSettings, RecordingSink};

const DEFAULT_FRAME_COUNT: u64 = 8;
const QUADS_PER_FRAME: usize = 16;

const SCENE_BUCKET: u32 = 0;
const OVERLAY_BUCKET: u32 = 1;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawConstants {
    offset: [f32; 4],
    tint: [f32; 4],
}

fn quad(size: f32) -> [Vertex; 4] {
    let color = [0.8, 0.3, 0.1];
    [
        Vertex { position: [-size, -size, 0.0], color },
        Vertex { position: [size, -size, 0.0], color },
        Vertex { position: [-size, size, 0.0], color },
        Vertex { position: [size, size, 0.0], color },
    ]
}

/// Reads render settings from a JSON file, or the defaults without one.
fn load_settings(path: Option<&str>) -> Result<RenderSettings> {
    let Some(path) = path else {
        return Ok(RenderSettings::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings from {path}"))?;
    let settings: RenderSettings =
        serde_json::from_str(&text).with_context(|| format!("parsing settings in {path}"))?;
    log::info!("Loaded render settings from {}", path);
    Ok(settings)
}

struct Pipelines {
    scene: PipelineState,
    overlay: PipelineState,
}

fn create_pipelines(context: &GraphicsContext) -> Result<Pipelines> {
    let scene = context.create_pipeline_state(&PipelineStateDescriptor {
        label: Some("scene".into()),
        depth_stencil: Some(DepthStencilStateDescriptor::default()),
        ..Default::default()
    })?;
    let mask = StencilFaceState {
        compare: CompareFunction::Equal,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        depth_pass_op: StencilOperation::Keep,
    };
    let overlay = context.create_pipeline_state(&PipelineStateDescriptor {
        label: Some("overlay".into()),
        depth_stencil: Some(DepthStencilStateDescriptor {
            stencil_front: mask,
            stencil_back: mask,
            stencil_reference: 1,
            ..Default::default()
        }),
        ..Default::default()
    })?;
    Ok(Pipelines { scene, overlay })
}

fn record_frame(
    context: &mut GraphicsContext,
    pipelines: &Pipelines,
    table: &mut SubmissionTable,
    queue: &mut RenderQueue,
) -> Result<()> {
    let frame = context.frame_number();
    for i in 0..QUADS_PER_FRAME {
        let vertices = context.allocate_with_data(
            TransientUsage::Vertex,
            bytemuck::cast_slice(&quad(0.05 + i as f32 * 0.01)),
        )?;
        let constants = DrawConstants {
            offset: [i as f32 * 0.1 - 0.8, 0.0, 0.0, 0.0],
            tint: [1.0, 1.0, 1.0, (frame % 4) as f32 * 0.25],
        };
        let uniforms =
            context.allocate_with_data(TransientUsage::Constant, bytemuck::bytes_of(&constants))?;

        let (id, buffer) = table.begin();
        buffer.record_set_pipeline_state(&pipelines.scene);
        buffer.record_bind_vertex_buffers(
            &[vertices.vertex_binding(mem::size_of::<Vertex>() as u32)],
            InputLayoutId(0),
        )?;
        buffer.record_bind_constant_buffers(&[uniforms.binding()])?;
        buffer.record_draw(PrimitiveTopology::TriangleStrip, 0, 4, 0, 1)?;
        queue.submit(SCENE_BUCKET, id)?;
    }

    // A full-screen overlay masked by the stencil, with vertices generated in the shader.
    let (id, buffer) = table.begin();
    buffer.record_set_pipeline_state(&pipelines.overlay);
    buffer.record_draw_procedural(PrimitiveTopology::TriangleList, 3, 0, 1)?;
    queue.submit(OVERLAY_BUCKET, id)?;
    Ok(())
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    // Usage: sandbox [settings.json] [frame count]
    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = load_settings(args.first().map(String::as_str))?;
    let frame_count = match args.get(1) {
        Some(n) => n
            .parse::<u64>()
            .with_context(|| format!("invalid frame count {n:?}"))?,
        None => DEFAULT_FRAME_COUNT,
    };
    let device = HeadlessDevice::new(HeadlessSettings::default());
    let mut context = GraphicsContext::init(Arc::new(device.clone()), settings)?;
    let pipelines = create_pipelines(&context)?;

    let mut queue = RenderQueue::new();
    queue.set_bucket_viewports(SCENE_BUCKET, &[Viewport::with_size(1280.0, 720.0)])?;
    queue.clear_color(SCENE_BUCKET, LinearRgba::rgb(0.1, 0.1, 0.12))?;
    queue.clear_depth(SCENE_BUCKET, 1.0)?;
    queue.set_bucket_viewports(OVERLAY_BUCKET, &[Viewport::with_size(1280.0, 720.0)])?;

    let mut table = SubmissionTable::new();
    let mut sink = RecordingSink::new();

    for _ in 0..frame_count {
        table.reset();
        sink.clear();
        record_frame(&mut context, &pipelines, &mut table, &mut queue)?;
        let flushed = queue.flush(&table, &mut sink)?;
        log::debug!(
            "Frame {}: {} items, {} draws, {} device calls",
            context.frame_number(),
            flushed.items,
            sink.draw_count(),
            sink.ops().len()
        );
        match context.mark_frame_boundary() {
            Ok(report) => log::debug!(
                "Frame {} started: {} blocks reclaimed",
                report.frame,
                report.reclaimed_blocks
            ),
            Err(e) => log::warn!("Frame boundary: {}", e),
        }
    }

    log::info!(
        "Transient allocator after {} frames:\n{}",
        frame_count,
        context.stats()
    );
    context.shutdown()?;
    log::info!("Device after shutdown: {:?}", device.stats());
    Ok(())
}
