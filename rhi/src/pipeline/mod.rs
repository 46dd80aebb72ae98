//! Compiled pipeline state objects.
//!
//! A [`PipelineDesc`] is a tagged union over the three pipeline shapes. On
//! creation the frontend validates the shape, lowers it into a
//! backend-neutral compile description (stage bytecode plus a canonical
//! encoding of all fixed-function state) and hands that to the backend,
//! optionally together with a [`PipelineCache`].
//!
//! ```ignore
//! let desc = PipelineDesc::graphics(
//!     GraphicsPipelineDesc::new(&shader, &root_signature)
//!         .with_color_formats(&[TextureFormat::Rgba8Unorm])
//!         .with_rasterizer_state(&RasterizerStateDesc::default()),
//! )
//! .with_cache(&cache);
//! let pipeline = renderer.add_pipeline(&desc)?;
//! ```

mod cache;
mod state;

pub use cache::{PipelineCache, PipelineCacheDesc, PipelineCacheFlags, PipelineCacheStats};
pub use state::{
    AttachmentBlend, BlendFactor, BlendOp, BlendStateDesc, ColorMask, CullMode, DepthStateDesc,
    FillMode, FrontFace, PrimitiveTopology, RasterizerStateDesc, StencilFaceDesc, StencilOp,
    VertexAttribute, VertexBinding, VertexInputRate, VertexLayout,
};

pub(crate) use cache::fnv1a;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{NativeHandle, ResourceId};
use crate::renderer::FormatCapabilities;
use crate::root_signature::{RootSignature, RootSignatureLayout};
use crate::shader::{Shader, ShaderStage};
use crate::types::{SampleCount, TextureFormat, MAX_RENDER_TARGET_ATTACHMENTS};

/// Kind of a pipeline or root signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineType {
    #[default]
    Undefined,
    Compute,
    Graphics,
    Raytracing,
}

#[derive(Debug, Clone, Copy)]
pub struct ComputePipelineDesc<'a> {
    pub shader: &'a Shader,
    pub root_signature: &'a RootSignature,
}

#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub shader: &'a Shader,
    pub root_signature: &'a RootSignature,
    pub vertex_layout: Option<&'a VertexLayout>,
    pub blend_state: Option<&'a BlendStateDesc>,
    pub depth_state: Option<&'a DepthStateDesc>,
    pub rasterizer_state: Option<&'a RasterizerStateDesc>,
    pub color_formats: &'a [TextureFormat],
    /// `Undefined` when the pipeline renders without depth.
    pub depth_stencil_format: TextureFormat,
    pub sample_count: SampleCount,
    pub sample_quality: u32,
    pub primitive_topology: PrimitiveTopology,
}

impl<'a> GraphicsPipelineDesc<'a> {
    pub fn new(shader: &'a Shader, root_signature: &'a RootSignature) -> Self {
        Self {
            shader,
            root_signature,
            vertex_layout: None,
            blend_state: None,
            depth_state: None,
            rasterizer_state: None,
            color_formats: &[],
            depth_stencil_format: TextureFormat::Undefined,
            sample_count: SampleCount::default(),
            sample_quality: 0,
            primitive_topology: PrimitiveTopology::TriangleList,
        }
    }

    pub fn with_vertex_layout(mut self, layout: &'a VertexLayout) -> Self {
        self.vertex_layout = Some(layout);
        self
    }

    pub fn with_blend_state(mut self, state: &'a BlendStateDesc) -> Self {
        self.blend_state = Some(state);
        self
    }

    pub fn with_depth_state(mut self, state: &'a DepthStateDesc) -> Self {
        self.depth_state = Some(state);
        self
    }

    pub fn with_rasterizer_state(mut self, state: &'a RasterizerStateDesc) -> Self {
        self.rasterizer_state = Some(state);
        self
    }

    pub fn with_color_formats(mut self, formats: &'a [TextureFormat]) -> Self {
        self.color_formats = formats;
        self
    }

    pub fn with_depth_stencil_format(mut self, format: TextureFormat) -> Self {
        self.depth_stencil_format = format;
        self
    }

    pub fn with_sample_count(mut self, count: SampleCount) -> Self {
        self.sample_count = count;
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.primitive_topology = topology;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RaytracingPipelineDesc<'a> {
    pub shader: &'a Shader,
    pub root_signature: &'a RootSignature,
    pub max_trace_recursion_depth: u32,
    pub payload_size: u32,
}

/// The three pipeline shapes.
#[derive(Debug, Clone, Copy)]
pub enum PipelineShape<'a> {
    Compute(ComputePipelineDesc<'a>),
    Graphics(GraphicsPipelineDesc<'a>),
    Raytracing(RaytracingPipelineDesc<'a>),
}

/// Descriptor for [`crate::Renderer::add_pipeline`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineDesc<'a> {
    pub shape: PipelineShape<'a>,
    pub cache: Option<&'a PipelineCache>,
    pub name: Option<&'a str>,
}

impl<'a> PipelineDesc<'a> {
    pub fn compute(shader: &'a Shader, root_signature: &'a RootSignature) -> Self {
        Self::from_shape(PipelineShape::Compute(ComputePipelineDesc {
            shader,
            root_signature,
        }))
    }

    pub fn graphics(desc: GraphicsPipelineDesc<'a>) -> Self {
        Self::from_shape(PipelineShape::Graphics(desc))
    }

    pub fn raytracing(desc: RaytracingPipelineDesc<'a>) -> Self {
        Self::from_shape(PipelineShape::Raytracing(desc))
    }

    fn from_shape(shape: PipelineShape<'a>) -> Self {
        Self {
            shape,
            cache: None,
            name: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a PipelineCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn pipeline_type(&self) -> PipelineType {
        match self.shape {
            PipelineShape::Compute(_) => PipelineType::Compute,
            PipelineShape::Graphics(_) => PipelineType::Graphics,
            PipelineShape::Raytracing(_) => PipelineType::Raytracing,
        }
    }

    fn parts(&self) -> (&'a Shader, &'a RootSignature) {
        match self.shape {
            PipelineShape::Compute(d) => (d.shader, d.root_signature),
            PipelineShape::Graphics(d) => (d.shader, d.root_signature),
            PipelineShape::Raytracing(d) => (d.shader, d.root_signature),
        }
    }
}

/// One shader stage handed to the backend compiler.
#[derive(Debug, Clone)]
pub(crate) struct CompileStage {
    pub(crate) stage: ShaderStage,
    pub(crate) bytecode: Arc<[u8]>,
    pub(crate) entry_point: String,
}

/// Backend-neutral input of pipeline compilation.
#[derive(Debug, Clone)]
pub(crate) struct PipelineCompileDesc {
    pub(crate) pipeline_type: PipelineType,
    pub(crate) name: Option<String>,
    pub(crate) stages: Vec<CompileStage>,
    /// Canonical encoding of root layout and fixed-function state.
    pub(crate) fixed_function: Vec<u8>,
}

impl PipelineCompileDesc {
    /// Process-independent key of everything that affects compiled output.
    pub(crate) fn cache_key(&self) -> u64 {
        let kind = [self.pipeline_type as u8];
        let headers: Vec<[u8; 4]> = self.stages.iter().map(|s| s.stage.bits().to_le_bytes()).collect();
        let mut chunks: Vec<&[u8]> = vec![&kind[..], self.fixed_function.as_slice()];
        for (stage, header) in self.stages.iter().zip(&headers) {
            chunks.push(header);
            chunks.push(&stage.bytecode);
            chunks.push(stage.entry_point.as_bytes());
        }
        fnv1a(chunks)
    }
}

fn invalid(message: String) -> GraphicsError {
    GraphicsError::InvalidParameter(message)
}

fn validate_graphics(context: &RendererContext, desc: &GraphicsPipelineDesc<'_>) -> GraphicsResult<()> {
    let stages = desc.shader.stages();
    if !stages.contains(ShaderStage::VERT) {
        return Err(invalid("graphics pipeline shader has no vertex stage".to_string()));
    }
    if stages.contains(ShaderStage::COMP) {
        return Err(invalid("graphics pipeline shader contains a compute stage".to_string()));
    }
    if desc.color_formats.len() > MAX_RENDER_TARGET_ATTACHMENTS {
        return Err(invalid(format!(
            "{} color formats, limit is {MAX_RENDER_TARGET_ATTACHMENTS}",
            desc.color_formats.len()
        )));
    }
    for &format in desc.color_formats {
        let caps = context.backend.format_capabilities(format);
        if format.is_depth_stencil() || !caps.contains(FormatCapabilities::RENDER_TARGET_WRITE) {
            return Err(invalid(format!("{format:?} is not a color attachment format")));
        }
    }
    let depth = desc.depth_stencil_format;
    if depth != TextureFormat::Undefined && !depth.is_depth_stencil() {
        return Err(invalid(format!("{depth:?} is not a depth format")));
    }
    if let Some(layout) = desc.vertex_layout {
        layout
            .validate(context.settings.max_vertex_input_bindings)
            .map_err(invalid)?;
    }
    Ok(())
}

fn encode_graphics(desc: &GraphicsPipelineDesc<'_>, out: &mut Vec<u8>) {
    match desc.vertex_layout {
        Some(layout) => layout.encode(out),
        None => VertexLayout::default().encode(out),
    }
    desc.blend_state.copied().unwrap_or_default().encode(out);
    desc.depth_state.copied().unwrap_or_default().encode(out);
    desc.rasterizer_state.copied().unwrap_or_default().encode(out);
    out.push(desc.color_formats.len() as u8);
    for &format in desc.color_formats {
        out.extend_from_slice(&(format as u32).to_le_bytes());
    }
    out.extend_from_slice(&(desc.depth_stencil_format as u32).to_le_bytes());
    out.extend_from_slice(&desc.sample_count.count().to_le_bytes());
    out.extend_from_slice(&desc.sample_quality.to_le_bytes());
    out.push(desc.primitive_topology as u8);
}

/// A compiled pipeline state object.
pub struct Pipeline {
    context: Arc<RendererContext>,
    id: ResourceId,
    native: NativeHandle,
    pipeline_type: PipelineType,
    root_signature: ResourceId,
    layout: Arc<RootSignatureLayout>,
    name: RwLock<Option<String>>,
}

impl Pipeline {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &PipelineDesc<'_>) -> GraphicsResult<Self> {
        let (shader, root_signature) = desc.parts();
        let pipeline_type = desc.pipeline_type();
        if root_signature.pipeline_type() != pipeline_type {
            return Err(invalid(format!(
                "{pipeline_type:?} pipeline with a {:?} root signature",
                root_signature.pipeline_type()
            )));
        }

        let mut fixed_function = Vec::with_capacity(128);
        root_signature.layout().encode(&mut fixed_function);
        match &desc.shape {
            PipelineShape::Graphics(graphics) => {
                validate_graphics(context, graphics)?;
                encode_graphics(graphics, &mut fixed_function);
            }
            PipelineShape::Compute(_) => {
                if shader.stages() != ShaderStage::COMP {
                    return Err(invalid(format!(
                        "compute pipeline shader must have only a compute stage, has {:?}",
                        shader.stages()
                    )));
                }
            }
            PipelineShape::Raytracing(raytracing) => {
                if !context.settings.raytracing_supported {
                    return Err(GraphicsError::FeatureNotSupported(
                        "raytracing pipelines".to_string(),
                    ));
                }
                if !shader.stages().contains(ShaderStage::RAYTRACING) {
                    return Err(invalid("raytracing pipeline shader has no raytracing stage".to_string()));
                }
                fixed_function.extend_from_slice(&raytracing.max_trace_recursion_depth.to_le_bytes());
                fixed_function.extend_from_slice(&raytracing.payload_size.to_le_bytes());
            }
        }

        let compile = PipelineCompileDesc {
            pipeline_type,
            name: desc.name.map(str::to_string),
            stages: shader
                .entries()
                .iter()
                .map(|entry| CompileStage {
                    stage: entry.stage,
                    bytecode: Arc::clone(&entry.bytecode),
                    entry_point: entry.entry_point.clone(),
                })
                .collect(),
            fixed_function,
        };
        let native = context
            .backend
            .create_pipeline(&compile, desc.cache.map(PipelineCache::native))?;
        let id = context.ids.next_id();
        log::trace!(
            "Pipeline: created {id} ({pipeline_type:?}, root signature {})",
            root_signature.id()
        );

        Ok(Self {
            context: Arc::clone(context),
            id,
            native,
            pipeline_type,
            root_signature: root_signature.id(),
            layout: Arc::clone(root_signature.layout()),
            name: RwLock::new(desc.name.map(str::to_string)),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn native(&self) -> NativeHandle {
        self.native
    }

    pub fn pipeline_type(&self) -> PipelineType {
        self.pipeline_type
    }

    pub fn root_signature_id(&self) -> ResourceId {
        self.root_signature
    }

    pub(crate) fn layout(&self) -> &Arc<RootSignatureLayout> {
        &self.layout
    }

    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        self.context.backend.set_debug_name(self.native, name);
        *self.name.write() = Some(name.to_string());
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.context.backend.destroy_pipeline(self.native);
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("pipeline_type", &self.pipeline_type)
            .field("name", &*self.name.read())
            .finish()
    }
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::null_context;
    use crate::root_signature::RootSignatureDesc;
    use crate::shader::{BinaryShaderDesc, BinaryShaderStageDesc, ShaderReflection};

    fn shader(context: &Arc<RendererContext>, stages: &[ShaderStage]) -> Shader {
        let mut desc = BinaryShaderDesc::new("test");
        for &stage in stages {
            desc = desc.with_stage(
                BinaryShaderStageDesc::new(stage, vec![0xAB; 8]).with_reflection(ShaderReflection::new(stage)),
            );
        }
        Shader::create(context, &desc).unwrap()
    }

    #[test]
    fn test_graphics_pipeline_validation() {
        let context = null_context();
        let vs_fs = shader(&context, &[ShaderStage::VERT, ShaderStage::FRAG]);
        let fs_only = shader(&context, &[ShaderStage::FRAG]);
        let rs = RootSignature::create(&context, &RootSignatureDesc::new(&[&vs_fs])).unwrap();

        let formats = [TextureFormat::Rgba8Unorm];
        let ok = PipelineDesc::graphics(GraphicsPipelineDesc::new(&vs_fs, &rs).with_color_formats(&formats));
        let pipeline = Pipeline::create(&context, &ok).unwrap();
        assert_eq!(pipeline.pipeline_type(), PipelineType::Graphics);
        assert_eq!(pipeline.root_signature_id(), rs.id());

        let no_vertex = PipelineDesc::graphics(GraphicsPipelineDesc::new(&fs_only, &rs));
        assert!(matches!(
            Pipeline::create(&context, &no_vertex),
            Err(GraphicsError::InvalidParameter(_))
        ));

        let too_many = [TextureFormat::Rgba8Unorm; 9];
        let desc = PipelineDesc::graphics(GraphicsPipelineDesc::new(&vs_fs, &rs).with_color_formats(&too_many));
        assert!(Pipeline::create(&context, &desc).is_err());

        let depth_as_color = [TextureFormat::Depth32Float];
        let desc = PipelineDesc::graphics(GraphicsPipelineDesc::new(&vs_fs, &rs).with_color_formats(&depth_as_color));
        assert!(Pipeline::create(&context, &desc).is_err());
    }

    #[test]
    fn test_compute_pipeline_requires_compute_root_signature() {
        let context = null_context();
        let cs = shader(&context, &[ShaderStage::COMP]);
        let vs = shader(&context, &[ShaderStage::VERT]);
        let compute_rs = RootSignature::create(&context, &RootSignatureDesc::new(&[&cs])).unwrap();
        let graphics_rs = RootSignature::create(&context, &RootSignatureDesc::new(&[&vs])).unwrap();

        assert!(Pipeline::create(&context, &PipelineDesc::compute(&cs, &compute_rs)).is_ok());
        assert!(Pipeline::create(&context, &PipelineDesc::compute(&cs, &graphics_rs)).is_err());
        assert!(Pipeline::create(&context, &PipelineDesc::compute(&vs, &compute_rs)).is_err());
    }

    #[test]
    fn test_raytracing_not_supported_on_null_backend() {
        let context = null_context();
        let rt = shader(&context, &[ShaderStage::RAYTRACING]);
        let rs = RootSignature::create(&context, &RootSignatureDesc::new(&[&rt])).unwrap();
        let desc = PipelineDesc::raytracing(RaytracingPipelineDesc {
            shader: &rt,
            root_signature: &rs,
            max_trace_recursion_depth: 1,
            payload_size: 16,
        });
        assert!(matches!(
            Pipeline::create(&context, &desc),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
    }

    #[test]
    fn test_cache_key_tracks_state() {
        let context = null_context();
        let vs = shader(&context, &[ShaderStage::VERT]);
        let rs = RootSignature::create(&context, &RootSignatureDesc::new(&[&vs])).unwrap();
        let key = |raster: &RasterizerStateDesc| {
            let desc = GraphicsPipelineDesc::new(&vs, &rs).with_rasterizer_state(raster);
            let mut fixed_function = Vec::new();
            rs.layout().encode(&mut fixed_function);
            encode_graphics(&desc, &mut fixed_function);
            PipelineCompileDesc {
                pipeline_type: PipelineType::Graphics,
                name: None,
                stages: Vec::new(),
                fixed_function,
            }
            .cache_key()
        };
        let default = RasterizerStateDesc::default();
        let culled = RasterizerStateDesc::default().with_cull_mode(CullMode::Back);
        assert_eq!(key(&default), key(&default));
        assert_ne!(key(&default), key(&culled));
    }
}
