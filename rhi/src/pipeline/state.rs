//! Fixed-function pipeline state descriptors.
//!
//! Every descriptor can write a canonical byte encoding of itself. The
//! encoding is part of the key backends use to look pipelines up in a
//! [`super::PipelineCache`], so it must stay stable across processes.

use bitflags::bitflags;

use crate::types::{CompareMode, TextureFormat, MAX_RENDER_TARGET_ATTACHMENTS, MAX_VERTEX_ATTRIBS};

// ============================================================================
// Blend
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
    BlendConstant,
    OneMinusBlendConstant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    /// Color channels written by an attachment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorMask: u8 {
        const RED = 0x1;
        const GREEN = 0x2;
        const BLUE = 0x4;
        const ALPHA = 0x8;
        const ALL = 0xF;
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Blending of one color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AttachmentBlend {
    pub enabled: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub color_op: BlendOp,
    pub alpha_op: BlendOp,
    pub write_mask: ColorMask,
}

impl AttachmentBlend {
    /// Standard `src * a + dst * (1 - a)` blending.
    pub fn alpha_blending() -> Self {
        Self {
            enabled: true,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::OneMinusSrcAlpha,
            ..Default::default()
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[
            self.enabled as u8,
            self.src_factor as u8,
            self.dst_factor as u8,
            self.src_alpha_factor as u8,
            self.dst_alpha_factor as u8,
            self.color_op as u8,
            self.alpha_op as u8,
            self.write_mask.bits(),
        ]);
    }
}

/// Blend state of all color attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendStateDesc {
    /// Per attachment; only the first entry is used unless `independent_blend` is set.
    pub attachments: [AttachmentBlend; MAX_RENDER_TARGET_ATTACHMENTS],
    pub alpha_to_coverage: bool,
    pub independent_blend: bool,
}

impl BlendStateDesc {
    /// Apply the same blending to every attachment.
    pub fn uniform(blend: AttachmentBlend) -> Self {
        Self {
            attachments: [blend; MAX_RENDER_TARGET_ATTACHMENTS],
            ..Default::default()
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.alpha_to_coverage as u8);
        out.push(self.independent_blend as u8);
        let used = if self.independent_blend {
            MAX_RENDER_TARGET_ATTACHMENTS
        } else {
            1
        };
        for attachment in &self.attachments[..used] {
            attachment.encode(out);
        }
    }
}

// ============================================================================
// Depth / stencil
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    SetZero,
    Replace,
    Invert,
    IncrementWrap,
    DecrementWrap,
    IncrementClamp,
    DecrementClamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceDesc {
    pub func: CompareMode,
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

impl Default for StencilFaceDesc {
    fn default() -> Self {
        Self {
            func: CompareMode::Always,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStateDesc {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareMode,
    pub stencil_test: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: StencilFaceDesc,
    pub back: StencilFaceDesc,
}

impl Default for DepthStateDesc {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            depth_func: CompareMode::LessEqual,
            stencil_test: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front: StencilFaceDesc::default(),
            back: StencilFaceDesc::default(),
        }
    }
}

impl DepthStateDesc {
    /// Depth test and write with `LessEqual`.
    pub fn depth_test_write() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            ..Default::default()
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[
            self.depth_test as u8,
            self.depth_write as u8,
            self.depth_func as u8,
            self.stencil_test as u8,
            self.stencil_read_mask,
            self.stencil_write_mask,
        ]);
        for face in [&self.front, &self.back] {
            out.extend_from_slice(&[
                face.func as u8,
                face.fail as u8,
                face.depth_fail as u8,
                face.pass as u8,
            ]);
        }
    }
}

// ============================================================================
// Rasterizer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RasterizerStateDesc {
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub front_face: FrontFace,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub multisample: bool,
    pub scissor: bool,
    pub depth_clamp: bool,
}

// Float fields compare by bit pattern so the state can key hash maps.
impl PartialEq for RasterizerStateDesc {
    fn eq(&self, other: &Self) -> bool {
        self.cull_mode == other.cull_mode
            && self.fill_mode == other.fill_mode
            && self.front_face == other.front_face
            && self.depth_bias == other.depth_bias
            && self.slope_scaled_depth_bias.to_bits() == other.slope_scaled_depth_bias.to_bits()
            && self.multisample == other.multisample
            && self.scissor == other.scissor
            && self.depth_clamp == other.depth_clamp
    }
}

impl Eq for RasterizerStateDesc {}

impl std::hash::Hash for RasterizerStateDesc {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.cull_mode.hash(state);
        self.fill_mode.hash(state);
        self.front_face.hash(state);
        self.depth_bias.hash(state);
        self.slope_scaled_depth_bias.to_bits().hash(state);
        self.multisample.hash(state);
        self.scissor.hash(state);
        self.depth_clamp.hash(state);
    }
}

impl RasterizerStateDesc {
    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[
            self.cull_mode as u8,
            self.fill_mode as u8,
            self.front_face as u8,
            self.multisample as u8,
            self.scissor as u8,
            self.depth_clamp as u8,
        ]);
        out.extend_from_slice(&self.depth_bias.to_le_bytes());
        out.extend_from_slice(&self.slope_scaled_depth_bias.to_bits().to_le_bytes());
    }
}

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    PatchList,
}

// ============================================================================
// Vertex layout
// ============================================================================

/// Whether a vertex binding advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

/// One vertex buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub stride: u32,
    pub rate: VertexInputRate,
}

/// One vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: TextureFormat,
    pub offset: u32,
}

/// Vertex input layout of a graphics pipeline.
///
/// # Example
///
/// ```ignore
/// let layout = VertexLayout::new()
///     .with_binding(VertexBinding { stride: 20, rate: VertexInputRate::Vertex })
///     .with_attribute(VertexAttribute { location: 0, binding: 0, format: TextureFormat::Rg32Float, offset: 0 });
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binding(mut self, binding: VertexBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn with_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Check attribute count and binding references.
    pub fn validate(&self, max_bindings: u32) -> Result<(), String> {
        if self.bindings.len() > max_bindings as usize {
            return Err(format!(
                "{} vertex bindings, limit is {max_bindings}",
                self.bindings.len()
            ));
        }
        if self.attributes.len() > MAX_VERTEX_ATTRIBS {
            return Err(format!(
                "{} vertex attributes, limit is {MAX_VERTEX_ATTRIBS}",
                self.attributes.len()
            ));
        }
        for attribute in &self.attributes {
            let Some(binding) = self.bindings.get(attribute.binding as usize) else {
                return Err(format!(
                    "attribute at location {} references missing binding {}",
                    attribute.location, attribute.binding
                ));
            };
            if attribute.offset + attribute.format.block_size() > binding.stride {
                return Err(format!(
                    "attribute at location {} ends past stride {}",
                    attribute.location, binding.stride
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.bindings.len() as u8);
        for binding in &self.bindings {
            out.extend_from_slice(&binding.stride.to_le_bytes());
            out.push(binding.rate as u8);
        }
        out.push(self.attributes.len() as u8);
        for attribute in &self.attributes {
            out.extend_from_slice(&attribute.location.to_le_bytes());
            out.extend_from_slice(&attribute.binding.to_le_bytes());
            out.extend_from_slice(&(attribute.format as u32).to_le_bytes());
            out.extend_from_slice(&attribute.offset.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_layout() -> VertexLayout {
        VertexLayout::new()
            .with_binding(VertexBinding {
                stride: 12,
                rate: VertexInputRate::Vertex,
            })
            .with_attribute(VertexAttribute {
                location: 0,
                binding: 0,
                format: TextureFormat::Rg32Float,
                offset: 4,
            })
    }

    #[test]
    fn test_vertex_layout_validation() {
        assert!(position_layout().validate(16).is_ok());
        assert!(position_layout().validate(0).is_err());

        let mut bad = position_layout();
        bad.attributes[0].offset = 8;
        assert!(bad.validate(16).unwrap_err().contains("past stride"));

        let mut missing = position_layout();
        missing.attributes[0].binding = 3;
        assert!(missing.validate(16).unwrap_err().contains("missing binding"));
    }

    #[test]
    fn test_encoding_distinguishes_states() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        RasterizerStateDesc::default().encode(&mut a);
        RasterizerStateDesc::default()
            .with_cull_mode(CullMode::Back)
            .encode(&mut b);
        assert_ne!(a, b);

        let mut c = Vec::new();
        let mut d = Vec::new();
        DepthStateDesc::default().encode(&mut c);
        DepthStateDesc::depth_test_write().encode(&mut d);
        assert_ne!(c, d);
    }

    #[test]
    fn test_rasterizer_hash_by_bits() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let state = RasterizerStateDesc {
            slope_scaled_depth_bias: 1.5,
            ..Default::default()
        };
        set.insert(state);
        assert!(set.contains(&state));
        assert_eq!(state, state);
    }

    #[test]
    fn test_dependent_blend_encodes_first_attachment_only() {
        let mut blend = BlendStateDesc::uniform(AttachmentBlend::alpha_blending());
        let mut first = Vec::new();
        blend.encode(&mut first);
        blend.attachments[3] = AttachmentBlend::default();
        let mut second = Vec::new();
        blend.encode(&mut second);
        assert_eq!(first, second);
    }
}
