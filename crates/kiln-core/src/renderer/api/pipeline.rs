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

//! Precompiled pipeline states and the descriptors they are built from.

use std::borrow::Cow;

/// The type of primitive assembled from vertex data by a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Each vertex is a point.
    PointList,
    /// Each pair of vertices is a line.
    LineList,
    /// Each vertex after the first extends a line strip.
    LineStrip,
    /// Each group of three vertices is a triangle.
    #[default]
    TriangleList,
    /// Each vertex after the first two extends a triangle strip.
    TriangleStrip,
}

/// The width of the indices of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit unsigned indices.
    Uint16,
    /// 32-bit unsigned indices.
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub const fn size(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// Which triangle faces are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
}

/// The winding order that designates a front face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise triangles are front-facing.
    #[default]
    Ccw,
    /// Clockwise triangles are front-facing.
    Cw,
}

/// How polygons are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Filled polygons.
    #[default]
    Fill,
    /// Polygon edges only.
    Line,
}

/// A comparison used by depth and stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Passes if the new value is less than the existing one.
    Less,
    /// Passes if the values are equal.
    Equal,
    /// Passes if the new value is less than or equal to the existing one.
    LessEqual,
    /// Passes if the new value is greater than the existing one.
    Greater,
    /// Passes if the values differ.
    NotEqual,
    /// Passes if the new value is greater than or equal to the existing one.
    GreaterEqual,
    /// Always passes.
    #[default]
    Always,
}

/// An operation applied to the stencil buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    /// Keep the current value.
    #[default]
    Keep,
    /// Set the value to zero.
    Zero,
    /// Replace the value with the stencil reference.
    Replace,
    /// Bitwise-invert the value.
    Invert,
    /// Increment, clamping to the maximum.
    IncrementClamp,
    /// Decrement, clamping to zero.
    DecrementClamp,
    /// Increment, wrapping to zero.
    IncrementWrap,
    /// Decrement, wrapping to the maximum.
    DecrementWrap,
}

/// A factor of the blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0.0
    Zero,
    /// 1.0
    One,
    /// Source color.
    Src,
    /// 1.0 - source color.
    OneMinusSrc,
    /// Source alpha.
    SrcAlpha,
    /// 1.0 - source alpha.
    OneMinusSrcAlpha,
    /// Destination color.
    Dst,
    /// 1.0 - destination color.
    OneMinusDst,
    /// Destination alpha.
    DstAlpha,
    /// 1.0 - destination alpha.
    OneMinusDstAlpha,
}

/// How the two blend terms are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// src + dst
    #[default]
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    ReverseSubtract,
    /// min(src, dst)
    Min,
    /// max(src, dst)
    Max,
}

/// Rasterization state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterizerStateDescriptor {
    /// The face culling mode, `None` disables culling.
    pub cull_mode: Option<CullMode>,
    /// The front-face winding.
    pub front_face: FrontFace,
    /// Fill or wireframe.
    pub polygon_mode: PolygonMode,
    /// If `true`, fragments are not clipped by depth.
    pub unclipped_depth: bool,
    /// If `true`, the scissor rectangle is applied.
    pub scissor_enabled: bool,
}

/// Stencil test and operations for one face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    /// The stencil comparison.
    pub compare: CompareFunction,
    /// Applied when the stencil test fails.
    pub fail_op: StencilOperation,
    /// Applied when the stencil test passes but the depth test fails.
    pub depth_fail_op: StencilOperation,
    /// Applied when both tests pass.
    pub depth_pass_op: StencilOperation,
}

impl StencilFaceState {
    /// A face state that never reads or writes the stencil buffer.
    pub const IGNORE: Self = Self {
        compare: CompareFunction::Always,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        depth_pass_op: StencilOperation::Keep,
    };

    /// `true` unless the face is [`StencilFaceState::IGNORE`].
    pub fn is_enabled(&self) -> bool {
        *self != Self::IGNORE
    }
}

/// Depth and stencil testing state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilStateDescriptor {
    /// If `true`, the depth test is performed.
    pub depth_test_enabled: bool,
    /// If `true`, depth values are written.
    pub depth_write_enabled: bool,
    /// The depth comparison.
    pub depth_compare: CompareFunction,
    /// Stencil state for front faces.
    pub stencil_front: StencilFaceState,
    /// Stencil state for back faces.
    pub stencil_back: StencilFaceState,
    /// Mask applied when reading the stencil buffer.
    pub stencil_read_mask: u32,
    /// Mask applied when writing the stencil buffer.
    pub stencil_write_mask: u32,
    /// The stencil reference used when none is given at bind time.
    pub stencil_reference: u32,
}

impl DepthStencilStateDescriptor {
    /// `true` if either face tests or writes the stencil buffer.
    pub fn stencil_enabled(&self) -> bool {
        self.stencil_front.is_enabled() || self.stencil_back.is_enabled()
    }
}

impl Default for DepthStencilStateDescriptor {
    fn default() -> Self {
        Self {
            depth_test_enabled: true,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            stencil_front: StencilFaceState::IGNORE,
            stencil_back: StencilFaceState::IGNORE,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            stencil_reference: 0,
        }
    }
}

/// One blend equation (color or alpha).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponentDescriptor {
    /// Factor applied to the fragment output.
    pub src_factor: BlendFactor,
    /// Factor applied to the framebuffer value.
    pub dst_factor: BlendFactor,
    /// How both terms are combined.
    pub operation: BlendOperation,
}

/// Blend state of the color targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendStateDescriptor {
    /// Equation for the RGB channels.
    pub color: BlendComponentDescriptor,
    /// Equation for the alpha channel.
    pub alpha: BlendComponentDescriptor,
}

impl BlendStateDescriptor {
    /// Classic `src * a + dst * (1 - a)` blending.
    pub const ALPHA_BLENDING: Self = Self {
        color: BlendComponentDescriptor {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
        alpha: BlendComponentDescriptor {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
    };
}

/// Everything needed to build an immutable [`PipelineState`].
#[derive(Debug, Clone, Default)]
pub struct PipelineStateDescriptor<'a> {
    /// Optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Rasterizer configuration.
    pub rasterizer: RasterizerStateDescriptor,
    /// Depth/stencil configuration, `None` disables both tests.
    pub depth_stencil: Option<DepthStencilStateDescriptor>,
    /// Blend configuration, `None` disables blending.
    pub blend: Option<BlendStateDescriptor>,
}

/// An opaque handle to a pipeline state compiled by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineStateId(pub usize);

/// A precompiled pipeline state as seen by the command layer.
///
/// Only the parts the executor needs are kept CPU side: whether draws under
/// this state test the stencil buffer, and the reference to use by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    /// The device handle.
    pub id: PipelineStateId,
    /// `true` if the state tests or writes the stencil buffer.
    pub stencil_enabled: bool,
    /// The stencil reference bound with this state by default.
    pub stencil_reference: u32,
}

impl PipelineState {
    /// Builds the CPU-side view of a state compiled from `descriptor`.
    pub fn from_descriptor(id: PipelineStateId, descriptor: &PipelineStateDescriptor<'_>) -> Self {
        let depth_stencil = descriptor.depth_stencil.as_ref();
        Self {
            id,
            stencil_enabled: depth_stencil.is_some_and(|ds| ds.stencil_enabled()),
            stencil_reference: depth_stencil.map_or(0, |ds| ds.stencil_reference),
        }
    }
}

/// An opaque handle to a vertex input layout owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputLayoutId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_has_no_stencil() {
        let state = PipelineState::from_descriptor(
            PipelineStateId(3),
            &PipelineStateDescriptor {
                depth_stencil: Some(DepthStencilStateDescriptor::default()),
                ..Default::default()
            },
        );
        assert!(!state.stencil_enabled);
        assert_eq!(state.id, PipelineStateId(3));
    }

    #[test]
    fn test_stencil_face_enables_stencil() {
        let descriptor = PipelineStateDescriptor {
            label: Some("outline".into()),
            depth_stencil: Some(DepthStencilStateDescriptor {
                stencil_front: StencilFaceState {
                    compare: CompareFunction::Equal,
                    ..StencilFaceState::IGNORE
                },
                stencil_reference: 7,
                ..Default::default()
            }),
            ..Default::default()
        };
        let state = PipelineState::from_descriptor(PipelineStateId(0), &descriptor);
        assert!(state.stencil_enabled);
        assert_eq!(state.stencil_reference, 7);
    }
}
