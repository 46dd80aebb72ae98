//! Shader stages, reflection data and compiled shader objects.
//!
//! Compiling and reflecting shaders is outside this crate. A shader is
//! created from already compiled bytecode per stage, together with either a
//! pre-computed [`ShaderReflection`] or a [`ShaderReflector`] installed on the
//! renderer that produces one.
//!
//! # Example
//!
//! ```ignore
//! let shader = renderer.add_shader_binary(
//!     &BinaryShaderDesc::new("fullscreen")
//!         .with_stage(BinaryShaderStageDesc::new(ShaderStage::VERT, vert_spirv).with_reflection(vert_refl))
//!         .with_stage(BinaryShaderStageDesc::new(ShaderStage::FRAG, frag_spirv).with_reflection(frag_refl)),
//! )?;
//! ```

use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::ResourceId;
use crate::types::DescriptorType;

bitflags! {
    /// Shader stage mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStage: u32 {
        const NONE = 0;
        const VERT = 0x01;
        const TESC = 0x02;
        const TESE = 0x04;
        const GEOM = 0x08;
        const FRAG = 0x10;
        const COMP = 0x20;
        const RAYTRACING = 0x40;
        const ALL_GRAPHICS = 0x1F;
    }
}

/// Dimensionality of a reflected texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    #[default]
    Undefined,
    D1,
    D2,
    D2Ms,
    D3,
    Cube,
    D1Array,
    D2Array,
    D2MsArray,
    CubeArray,
}

/// One binding reported by shader reflection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderResource {
    pub name: String,
    pub descriptor_type: DescriptorType,
    /// Binding set / register space.
    pub set: u32,
    /// Binding / register index inside the set.
    pub binding: u32,
    /// Array element count, 0 for unbounded arrays. Byte size for root constants.
    pub size: u32,
    /// Stages using the binding. Filled in from the owning stage when empty.
    pub used_stages: ShaderStage,
    pub dim: TextureDimension,
}

impl ShaderResource {
    pub fn new(name: impl Into<String>, descriptor_type: DescriptorType, set: u32, binding: u32) -> Self {
        Self {
            name: name.into(),
            descriptor_type,
            set,
            binding,
            size: 1,
            used_stages: ShaderStage::NONE,
            dim: TextureDimension::Undefined,
        }
    }

    /// A root constant block of `bytes` bytes.
    pub fn root_constant(name: impl Into<String>, bytes: u32) -> Self {
        Self::new(name, DescriptorType::ROOT_CONSTANT, 0, 0).with_size(bytes)
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn with_dim(mut self, dim: TextureDimension) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_stages(mut self, stages: ShaderStage) -> Self {
        self.used_stages = stages;
        self
    }
}

/// Reflection data of one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderReflection {
    pub stage: ShaderStage,
    pub resources: Vec<ShaderResource>,
    /// Compute thread group size; zero for other stages.
    pub thread_group_size: [u32; 3],
}

impl ShaderReflection {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            ..Default::default()
        }
    }

    pub fn with_resource(mut self, resource: ShaderResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_thread_group_size(mut self, size: [u32; 3]) -> Self {
        self.thread_group_size = size;
        self
    }
}

/// Produces reflection data from compiled bytecode.
///
/// Implemented outside this crate (SPIR-V, DXIL or MSL reflection).
pub trait ShaderReflector: Send + Sync {
    fn reflect(&self, stage: ShaderStage, bytecode: &[u8], entry_point: &str) -> GraphicsResult<ShaderReflection>;
}

/// Compiled bytecode of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryShaderStageDesc {
    pub stage: ShaderStage,
    pub bytecode: Vec<u8>,
    pub entry_point: String,
    /// Pre-computed reflection; the renderer's reflector is used when absent.
    pub reflection: Option<ShaderReflection>,
}

impl BinaryShaderStageDesc {
    pub fn new(stage: ShaderStage, bytecode: impl Into<Vec<u8>>) -> Self {
        Self {
            stage,
            bytecode: bytecode.into(),
            entry_point: "main".to_string(),
            reflection: None,
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_reflection(mut self, reflection: ShaderReflection) -> Self {
        self.reflection = Some(reflection);
        self
    }
}

/// Descriptor for [`crate::Renderer::add_shader_binary`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinaryShaderDesc {
    pub name: Option<String>,
    pub stages: Vec<BinaryShaderStageDesc>,
}

impl BinaryShaderDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: BinaryShaderStageDesc) -> Self {
        self.stages.push(stage);
        self
    }
}

/// One stage of a [`Shader`].
#[derive(Debug, Clone)]
pub struct ShaderStageEntry {
    pub stage: ShaderStage,
    pub bytecode: Arc<[u8]>,
    pub entry_point: String,
    pub reflection: ShaderReflection,
}

/// A set of compiled stages with their reflection data.
///
/// Shaders hold no backend object; bytecode is handed to the backend when a
/// pipeline is created.
pub struct Shader {
    id: ResourceId,
    name: Option<String>,
    stages: ShaderStage,
    entries: Vec<ShaderStageEntry>,
}

impl Shader {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &BinaryShaderDesc) -> GraphicsResult<Self> {
        if desc.stages.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "shader has no stages".to_string(),
            ));
        }

        let mut mask = ShaderStage::NONE;
        let mut entries = Vec::with_capacity(desc.stages.len());
        for stage_desc in &desc.stages {
            let stage = stage_desc.stage;
            if stage.bits().count_ones() != 1 {
                return Err(GraphicsError::InvalidParameter(format!(
                    "shader stage {stage:?} must name exactly one stage"
                )));
            }
            if mask.intersects(stage) {
                return Err(GraphicsError::InvalidParameter(format!(
                    "duplicate shader stage {stage:?}"
                )));
            }
            if stage_desc.bytecode.is_empty() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "empty bytecode for stage {stage:?}"
                )));
            }
            mask |= stage;

            let mut reflection = match (&stage_desc.reflection, &context.shader_reflector) {
                (Some(reflection), _) => reflection.clone(),
                (None, Some(reflector)) => {
                    reflector.reflect(stage, &stage_desc.bytecode, &stage_desc.entry_point)?
                }
                (None, None) => {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "no reflection for stage {stage:?} and no shader reflector configured"
                    )))
                }
            };
            reflection.stage = stage;
            for resource in &mut reflection.resources {
                if resource.used_stages.is_empty() {
                    resource.used_stages = stage;
                }
            }

            entries.push(ShaderStageEntry {
                stage,
                bytecode: Arc::from(stage_desc.bytecode.as_slice()),
                entry_point: stage_desc.entry_point.clone(),
                reflection,
            });
        }

        for exclusive in [ShaderStage::COMP, ShaderStage::RAYTRACING] {
            if mask.contains(exclusive) && mask != exclusive {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{exclusive:?} cannot be combined with other stages ({mask:?})"
                )));
            }
        }

        let id = context.ids.next_id();
        log::trace!("Shader: created {id} {:?} stages={mask:?}", desc.name);
        Ok(Self {
            id,
            name: desc.name.clone(),
            stages: mask,
            entries,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Mask of all stages.
    pub fn stages(&self) -> ShaderStage {
        self.stages
    }

    pub fn entries(&self) -> &[ShaderStageEntry] {
        &self.entries
    }

    pub fn reflection(&self, stage: ShaderStage) -> Option<&ShaderReflection> {
        self.entries
            .iter()
            .find(|entry| entry.stage == stage)
            .map(|entry| &entry.reflection)
    }

    /// Thread group size of a compute shader.
    pub fn thread_group_size(&self) -> Option<[u32; 3]> {
        self.reflection(ShaderStage::COMP)
            .map(|reflection| reflection.thread_group_size)
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stages", &self.stages)
            .finish()
    }
}

static_assertions::assert_impl_all!(Shader: Send, Sync);
