//! Root signatures: the merged binding layout of a set of shaders.
//!
//! Construction merges every stage's reflected bindings into one ordered list
//! of [`DescriptorInfo`] records. Each record is assigned an update frequency
//! from its binding set, and every frequency tier gets its own table so that
//! rarely changing bindings stay resident while per-draw tables are refreshed.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{NativeHandle, ResourceId};
use crate::pipeline::PipelineType;
use crate::resources::Sampler;
use crate::shader::{Shader, ShaderStage, TextureDimension};
use crate::types::{DescriptorType, DescriptorUpdateFrequency};

/// Suffix marking a uniform buffer as a root descriptor.
pub const ROOT_DESCRIPTOR_SUFFIX: &str = "rootcbv";

/// Root signature cost of a root descriptor, in dwords.
const ROOT_DESCRIPTOR_DWORDS: u32 = 2;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RootSignatureFlags: u32 {
        const NONE = 0;
        /// Local root signature (raytracing shader tables).
        const LOCAL = 0x1;
    }
}

/// Descriptor for [`crate::Renderer::add_root_signature`].
#[derive(Debug, Clone, Copy)]
pub struct RootSignatureDesc<'a> {
    pub shaders: &'a [&'a Shader],
    /// Element count given to unbounded texture arrays.
    pub max_bindless_textures: u32,
    /// Samplers baked into the layout, matched to sampler bindings by name.
    pub static_samplers: &'a [(&'a str, &'a Sampler)],
    pub flags: RootSignatureFlags,
}

impl<'a> RootSignatureDesc<'a> {
    pub fn new(shaders: &'a [&'a Shader]) -> Self {
        Self {
            shaders,
            max_bindless_textures: 0,
            static_samplers: &[],
            flags: RootSignatureFlags::NONE,
        }
    }

    pub fn with_static_samplers(mut self, samplers: &'a [(&'a str, &'a Sampler)]) -> Self {
        self.static_samplers = samplers;
        self
    }

    pub fn with_max_bindless_textures(mut self, count: u32) -> Self {
        self.max_bindless_textures = count;
        self
    }
}

/// One merged binding of a root signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub name: String,
    pub descriptor_type: DescriptorType,
    pub dim: TextureDimension,
    /// Bound directly in the root signature instead of a table.
    pub root_descriptor: bool,
    /// Baked static sampler; never part of a descriptor set.
    pub static_sampler: bool,
    pub update_frequency: DescriptorUpdateFrequency,
    /// Element count; byte size for root constants.
    pub size: u32,
    /// Position in [`RootSignature::descriptors`].
    pub index_in_parent: u32,
    /// First slot inside the frequency table.
    pub handle_index: u32,
    pub set: u32,
    pub binding: u32,
    pub used_stages: ShaderStage,
}

/// Descriptors of one update frequency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FrequencyTable {
    pub(crate) descriptors: Vec<u32>,
    /// Total slot count of the table.
    pub(crate) handle_count: u32,
}

/// Immutable layout shared by a root signature, its descriptor sets and pipelines.
#[derive(Debug)]
pub(crate) struct RootSignatureLayout {
    pub(crate) descriptors: Vec<DescriptorInfo>,
    pub(crate) name_to_index: HashMap<String, u32>,
    pub(crate) tables: [FrequencyTable; DescriptorUpdateFrequency::COUNT],
    pub(crate) pipeline_type: PipelineType,
    pub(crate) static_samplers: Vec<(u32, NativeHandle)>,
    pub(crate) root_dwords: u32,
}

impl RootSignatureLayout {
    pub(crate) fn table(&self, frequency: DescriptorUpdateFrequency) -> &FrequencyTable {
        &self.tables[frequency.index()]
    }

    /// Canonical bytes of the layout, used as part of pipeline cache keys.
    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.descriptors.len() as u32).to_le_bytes());
        for d in &self.descriptors {
            out.extend_from_slice(&d.descriptor_type.bits().to_le_bytes());
            out.extend_from_slice(&d.set.to_le_bytes());
            out.extend_from_slice(&d.binding.to_le_bytes());
            out.extend_from_slice(&d.size.to_le_bytes());
            out.push(d.root_descriptor as u8 | (d.static_sampler as u8) << 1);
        }
    }
}

fn pipeline_type_for(stages: ShaderStage) -> GraphicsResult<PipelineType> {
    let graphics = stages.intersects(ShaderStage::ALL_GRAPHICS);
    let compute = stages.contains(ShaderStage::COMP);
    let raytracing = stages.contains(ShaderStage::RAYTRACING);
    match (graphics, compute, raytracing) {
        (true, false, false) => Ok(PipelineType::Graphics),
        (false, true, false) => Ok(PipelineType::Compute),
        (false, false, true) => Ok(PipelineType::Raytracing),
        _ => Err(GraphicsError::InvalidParameter(format!(
            "root signature shaders mix pipeline kinds ({stages:?})"
        ))),
    }
}

fn is_root_descriptor(name: &str, descriptor_type: DescriptorType) -> bool {
    descriptor_type == DescriptorType::UNIFORM_BUFFER
        && name.to_ascii_lowercase().ends_with(ROOT_DESCRIPTOR_SUFFIX)
}

/// Binding layout contract derived from shader reflection.
pub struct RootSignature {
    id: ResourceId,
    layout: Arc<RootSignatureLayout>,
}

impl RootSignature {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &RootSignatureDesc<'_>) -> GraphicsResult<Self> {
        if desc.shaders.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "root signature needs at least one shader".to_string(),
            ));
        }

        let mut stages = ShaderStage::NONE;
        let mut descriptors: Vec<DescriptorInfo> = Vec::new();
        let mut name_to_index: HashMap<String, u32> = HashMap::new();

        for shader in desc.shaders {
            stages |= shader.stages();
            for entry in shader.entries() {
                for resource in &entry.reflection.resources {
                    if let Some(&index) = name_to_index.get(&resource.name) {
                        let existing = &mut descriptors[index as usize];
                        if existing.descriptor_type != resource.descriptor_type {
                            return Err(GraphicsError::InvalidParameter(format!(
                                "binding '{}' declared as {:?} and {:?}",
                                resource.name, existing.descriptor_type, resource.descriptor_type
                            )));
                        }
                        if existing.set != resource.set || existing.binding != resource.binding {
                            log::warn!(
                                "RootSignature: binding '{}' at ({}, {}) and ({}, {}); keeping the first",
                                resource.name,
                                existing.set,
                                existing.binding,
                                resource.set,
                                resource.binding
                            );
                        }
                        existing.used_stages |= resource.used_stages;
                        existing.size = existing.size.max(resource.size);
                        continue;
                    }

                    let index = descriptors.len() as u32;
                    name_to_index.insert(resource.name.clone(), index);
                    descriptors.push(DescriptorInfo {
                        name: resource.name.clone(),
                        descriptor_type: resource.descriptor_type,
                        dim: resource.dim,
                        root_descriptor: is_root_descriptor(&resource.name, resource.descriptor_type),
                        static_sampler: false,
                        update_frequency: DescriptorUpdateFrequency::from_set_index(resource.set),
                        size: resource.size,
                        index_in_parent: index,
                        handle_index: 0,
                        set: resource.set,
                        binding: resource.binding,
                        used_stages: resource.used_stages,
                    });
                }
            }
        }

        let pipeline_type = pipeline_type_for(stages)?;

        let mut static_samplers = Vec::new();
        for (name, sampler) in desc.static_samplers {
            match name_to_index.get(*name) {
                Some(&index) if descriptors[index as usize].descriptor_type == DescriptorType::SAMPLER => {
                    descriptors[index as usize].static_sampler = true;
                    static_samplers.push((index, sampler.native()));
                }
                Some(_) => {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "static sampler '{name}' names a binding that is not a sampler"
                    )))
                }
                None => log::warn!("RootSignature: static sampler '{name}' matches no binding"),
            }
        }

        let mut tables: [FrequencyTable; DescriptorUpdateFrequency::COUNT] = Default::default();
        let mut root_dwords = 0u32;
        for descriptor in &mut descriptors {
            if descriptor.static_sampler {
                continue;
            }
            if descriptor.descriptor_type == DescriptorType::ROOT_CONSTANT {
                if descriptor.size == 0 {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "root constant '{}' has zero size",
                        descriptor.name
                    )));
                }
                descriptor.update_frequency = DescriptorUpdateFrequency::None;
                root_dwords += descriptor.size.div_ceil(4);
                continue;
            }
            if descriptor.size == 0 {
                if desc.max_bindless_textures == 0 || !descriptor.descriptor_type.is_texture_slot() {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "unbounded array '{}' needs a texture type and max_bindless_textures",
                        descriptor.name
                    )));
                }
                descriptor.size = desc.max_bindless_textures;
            }
            if descriptor.root_descriptor {
                root_dwords += ROOT_DESCRIPTOR_DWORDS;
            }
            let table = &mut tables[descriptor.update_frequency.index()];
            descriptor.handle_index = table.handle_count;
            table.handle_count += descriptor.size;
            table.descriptors.push(descriptor.index_in_parent);
        }
        root_dwords += tables.iter().filter(|t| t.handle_count > 0).count() as u32;

        let max_dwords = context.settings.max_root_signature_dwords;
        if root_dwords > max_dwords {
            return Err(GraphicsError::InvalidParameter(format!(
                "root signature needs {root_dwords} dwords, limit is {max_dwords}"
            )));
        }

        let id = context.ids.next_id();
        log::trace!(
            "RootSignature: created {id} ({:?}, {} descriptors, {root_dwords} root dwords)",
            pipeline_type,
            descriptors.len()
        );

        Ok(Self {
            id,
            layout: Arc::new(RootSignatureLayout {
                descriptors,
                name_to_index,
                tables,
                pipeline_type,
                static_samplers,
                root_dwords,
            }),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn layout(&self) -> &Arc<RootSignatureLayout> {
        &self.layout
    }

    pub fn pipeline_type(&self) -> PipelineType {
        self.layout.pipeline_type
    }

    /// All merged descriptors in declaration order.
    pub fn descriptors(&self) -> &[DescriptorInfo] {
        &self.layout.descriptors
    }

    pub fn descriptor(&self, index: u32) -> Option<&DescriptorInfo> {
        self.layout.descriptors.get(index as usize)
    }

    /// Resolve a binding name to its descriptor index.
    pub fn descriptor_index(&self, name: &str) -> Option<u32> {
        self.layout.name_to_index.get(name).copied()
    }

    /// Number of descriptors in a frequency tier.
    pub fn descriptor_count(&self, frequency: DescriptorUpdateFrequency) -> u32 {
        self.layout.table(frequency).descriptors.len() as u32
    }

    /// Number of slots in a frequency tier's table.
    pub fn handle_count(&self, frequency: DescriptorUpdateFrequency) -> u32 {
        self.layout.table(frequency).handle_count
    }

    /// Root signature size in dwords.
    pub fn root_dwords(&self) -> u32 {
        self.layout.root_dwords
    }

    pub fn static_sampler_count(&self) -> usize {
        self.layout.static_samplers.len()
    }
}

impl std::fmt::Debug for RootSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootSignature")
            .field("id", &self.id)
            .field("pipeline_type", &self.layout.pipeline_type)
            .field("descriptors", &self.layout.descriptors.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(RootSignature: Send, Sync);
