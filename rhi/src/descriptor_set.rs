//! Descriptor sets: ring instances of one frequency table of a root signature.
//!
//! A set pre-allocates `max_sets` copies of the table. Callers pick the copy
//! explicitly on update and bind, and are responsible for not overwriting a
//! copy the GPU may still read.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{NativeHandle, ResourceId};
use crate::resources::{Buffer, RenderTarget, Sampler, Texture};
use crate::root_signature::{DescriptorInfo, RootSignature, RootSignatureLayout};
use crate::types::{DescriptorType, DescriptorUpdateFrequency};

/// Slot types compared against a resource's declared views.
const VIEW_MASK: DescriptorType = DescriptorType::SAMPLER
    .union(DescriptorType::TEXTURE)
    .union(DescriptorType::RW_TEXTURE)
    .union(DescriptorType::BUFFER)
    .union(DescriptorType::RW_BUFFER)
    .union(DescriptorType::UNIFORM_BUFFER)
    .union(DescriptorType::TEXTURE_CUBE);

/// Descriptor for [`crate::Renderer::add_descriptor_set`].
#[derive(Debug, Clone, Copy)]
pub struct DescriptorSetDesc<'a> {
    pub root_signature: &'a RootSignature,
    pub update_frequency: DescriptorUpdateFrequency,
    /// Number of ring instances.
    pub max_sets: u32,
    pub node_index: u32,
}

impl<'a> DescriptorSetDesc<'a> {
    pub fn new(root_signature: &'a RootSignature, update_frequency: DescriptorUpdateFrequency, max_sets: u32) -> Self {
        Self {
            root_signature,
            update_frequency,
            max_sets,
            node_index: 0,
        }
    }
}

/// Target slot of a [`DescriptorData`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorSlot<'a> {
    /// Resolved through the root signature's name map.
    Name(&'a str),
    /// Pre-resolved descriptor index.
    Index(u32),
}

impl<'a> From<&'a str> for DescriptorSlot<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl From<u32> for DescriptorSlot<'_> {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

/// Resource array written by one [`DescriptorData`] entry.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorResources<'a> {
    Textures(&'a [&'a Texture]),
    Buffers(&'a [&'a Buffer]),
    Samplers(&'a [&'a Sampler]),
    RenderTargets(&'a [&'a RenderTarget]),
}

impl DescriptorResources<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Textures(r) => r.len(),
            Self::Buffers(r) => r.len(),
            Self::Samplers(r) => r.len(),
            Self::RenderTargets(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> BoundKind {
        match self {
            Self::Textures(_) => BoundKind::Texture,
            Self::Buffers(_) => BoundKind::Buffer,
            Self::Samplers(_) => BoundKind::Sampler,
            Self::RenderTargets(_) => BoundKind::RenderTarget,
        }
    }
}

/// One update of a descriptor slot.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorData<'a> {
    pub slot: DescriptorSlot<'a>,
    pub resources: DescriptorResources<'a>,
    /// Per-element byte offsets into buffers.
    pub offsets: Option<&'a [u64]>,
    /// Per-element byte ranges of buffers.
    pub sizes: Option<&'a [u64]>,
    /// Mip level bound to a read-write texture slot.
    pub uav_mip_slice: u32,
    /// Bind the stencil aspect of a depth/stencil target.
    pub bind_stencil_resource: bool,
    /// First array element written.
    pub array_offset: u32,
}

impl<'a> DescriptorData<'a> {
    pub fn new(slot: impl Into<DescriptorSlot<'a>>, resources: DescriptorResources<'a>) -> Self {
        Self {
            slot: slot.into(),
            resources,
            offsets: None,
            sizes: None,
            uav_mip_slice: 0,
            bind_stencil_resource: false,
            array_offset: 0,
        }
    }

    pub fn textures(slot: impl Into<DescriptorSlot<'a>>, textures: &'a [&'a Texture]) -> Self {
        Self::new(slot, DescriptorResources::Textures(textures))
    }

    pub fn buffers(slot: impl Into<DescriptorSlot<'a>>, buffers: &'a [&'a Buffer]) -> Self {
        Self::new(slot, DescriptorResources::Buffers(buffers))
    }

    pub fn samplers(slot: impl Into<DescriptorSlot<'a>>, samplers: &'a [&'a Sampler]) -> Self {
        Self::new(slot, DescriptorResources::Samplers(samplers))
    }

    pub fn render_targets(slot: impl Into<DescriptorSlot<'a>>, targets: &'a [&'a RenderTarget]) -> Self {
        Self::new(slot, DescriptorResources::RenderTargets(targets))
    }

    pub fn with_offsets(mut self, offsets: &'a [u64]) -> Self {
        self.offsets = Some(offsets);
        self
    }

    pub fn with_sizes(mut self, sizes: &'a [u64]) -> Self {
        self.sizes = Some(sizes);
        self
    }

    pub fn with_uav_mip_slice(mut self, mip: u32) -> Self {
        self.uav_mip_slice = mip;
        self
    }

    pub fn with_stencil(mut self) -> Self {
        self.bind_stencil_resource = true;
        self
    }

    pub fn with_array_offset(mut self, offset: u32) -> Self {
        self.array_offset = offset;
        self
    }
}

/// Kind of object held by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundKind {
    Texture,
    Buffer,
    Sampler,
    RenderTarget,
}

/// What one slot element of one instance holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundDescriptor {
    pub kind: BoundKind,
    pub resource: ResourceId,
    pub handle: NativeHandle,
    pub offset: u64,
    /// Byte range for buffers; 0 means the whole buffer.
    pub size: u64,
    pub mip_slice: u32,
    pub stencil: bool,
}

type Instance = Box<[Option<BoundDescriptor>]>;

/// `max_sets` parallel instances of one frequency table.
pub struct DescriptorSet {
    context: Arc<RendererContext>,
    id: ResourceId,
    root_signature: ResourceId,
    layout: Arc<RootSignatureLayout>,
    update_frequency: DescriptorUpdateFrequency,
    node_index: u32,
    instances: Vec<Mutex<Instance>>,
}

impl DescriptorSet {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &DescriptorSetDesc<'_>) -> GraphicsResult<Self> {
        if desc.max_sets == 0 {
            return Err(GraphicsError::InvalidParameter(
                "descriptor set needs at least one instance".to_string(),
            ));
        }
        context.check_node(desc.node_index, "add_descriptor_set");

        let layout = Arc::clone(desc.root_signature.layout());
        let handle_count = layout.table(desc.update_frequency).handle_count as usize;
        let instances = (0..desc.max_sets)
            .map(|_| Mutex::new(vec![None; handle_count].into_boxed_slice()))
            .collect();

        let id = context.ids.next_id();
        log::trace!(
            "DescriptorSet: created {id} for {} ({:?}, {} sets x {handle_count} slots)",
            desc.root_signature.id(),
            desc.update_frequency,
            desc.max_sets
        );

        Ok(Self {
            context: Arc::clone(context),
            id,
            root_signature: desc.root_signature.id(),
            layout,
            update_frequency: desc.update_frequency,
            node_index: desc.node_index,
            instances,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn root_signature_id(&self) -> ResourceId {
        self.root_signature
    }

    pub fn update_frequency(&self) -> DescriptorUpdateFrequency {
        self.update_frequency
    }

    pub fn max_sets(&self) -> u32 {
        self.instances.len() as u32
    }

    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    /// What instance `index` holds at `slot[element]`.
    ///
    /// `None` for slots of another update frequency.
    pub fn bound(&self, index: u32, slot: DescriptorSlot<'_>, element: u32) -> Option<BoundDescriptor> {
        let instance = self.instances.get(index as usize)?;
        let descriptor = self.resolve_slot(slot)?;
        if descriptor.update_frequency != self.update_frequency || element >= descriptor.size {
            return None;
        }
        instance
            .lock()
            .get(descriptor.handle_index as usize + element as usize)
            .copied()
            .flatten()
    }

    fn resolve_slot(&self, slot: DescriptorSlot<'_>) -> Option<&DescriptorInfo> {
        let index = match slot {
            DescriptorSlot::Name(name) => *self.layout.name_to_index.get(name)?,
            DescriptorSlot::Index(index) => index,
        };
        self.layout.descriptors.get(index as usize)
    }

    /// Contract violation with validation; warning and skip otherwise.
    #[track_caller]
    fn reject(&self, message: String) {
        if self.context.validator.enabled() {
            self.context.validator.violation(&message);
        }
        self.context.logger.warn("descriptor_set", &message);
    }

    pub(crate) fn update(&self, index: u32, params: &[DescriptorData<'_>]) {
        self.context.check_alive("update_descriptor_set");
        let Some(instance) = self.instances.get(index as usize) else {
            self.reject(format!(
                "update_descriptor_set: index {index} out of range for {} (max_sets {})",
                self.id,
                self.instances.len()
            ));
            return;
        };

        let mut instance = instance.lock();
        for param in params {
            let Some(descriptor) = self.resolve_slot(param.slot) else {
                self.reject(format!("update_descriptor_set: unresolved slot {:?}", param.slot));
                continue;
            };
            if let Err(message) = self.check_param(descriptor, param) {
                self.reject(format!("update_descriptor_set: '{}': {message}", descriptor.name));
                continue;
            }

            let base = descriptor.handle_index + param.array_offset;
            for element in 0..param.resources.len() {
                let offset = param.offsets.map_or(0, |o| o[element]);
                let size = param.sizes.map_or(0, |s| s[element]);
                let (resource, handle) = match param.resources {
                    DescriptorResources::Textures(r) => (r[element].id(), r[element].native()),
                    DescriptorResources::Buffers(r) => (r[element].id(), r[element].native()),
                    DescriptorResources::Samplers(r) => (r[element].id(), r[element].native()),
                    DescriptorResources::RenderTargets(r) => (r[element].id(), r[element].native()),
                };
                instance[base as usize + element] = Some(BoundDescriptor {
                    kind: param.resources.kind(),
                    resource,
                    handle,
                    offset,
                    size,
                    mip_slice: param.uav_mip_slice,
                    stencil: param.bind_stencil_resource,
                });
            }
        }
    }

    fn check_param(&self, descriptor: &DescriptorInfo, param: &DescriptorData<'_>) -> Result<(), String> {
        if descriptor.update_frequency != self.update_frequency {
            return Err(format!(
                "slot belongs to {:?}, set is {:?}",
                descriptor.update_frequency, self.update_frequency
            ));
        }
        if descriptor.static_sampler {
            return Err("static samplers cannot be updated".to_string());
        }
        if descriptor.descriptor_type == DescriptorType::ROOT_CONSTANT {
            return Err("root constants are set with bind_push_constants".to_string());
        }
        let count = param.resources.len() as u64;
        if count == 0 {
            return Err("empty resource array".to_string());
        }
        if param.array_offset as u64 + count > descriptor.size as u64 {
            return Err(format!(
                "{count} elements at offset {} overflow array of {}",
                param.array_offset, descriptor.size
            ));
        }
        for (what, lens) in [("offsets", param.offsets.map(<[u64]>::len)), ("sizes", param.sizes.map(<[u64]>::len))] {
            if let Some(len) = lens {
                if len as u64 != count {
                    return Err(format!("{len} {what} for {count} resources"));
                }
            }
        }

        let slot = descriptor.descriptor_type;
        let required = slot & VIEW_MASK;
        let mismatch = |declared: DescriptorType| !declared.contains(required);
        let ok = match param.resources {
            DescriptorResources::Samplers(_) => slot == DescriptorType::SAMPLER,
            DescriptorResources::Textures(textures) => {
                slot.is_texture_slot() && !textures.iter().any(|t| mismatch(t.desc().descriptors))
            }
            DescriptorResources::RenderTargets(targets) => {
                slot.is_texture_slot() && !targets.iter().any(|t| mismatch(t.desc().descriptors))
            }
            DescriptorResources::Buffers(buffers) => {
                slot.is_buffer_slot() && !buffers.iter().any(|b| mismatch(b.desc().descriptors))
            }
        };
        if !ok {
            return Err(format!(
                "{:?} cannot be bound to a {slot:?} slot",
                param.resources.kind()
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSet")
            .field("id", &self.id)
            .field("root_signature", &self.root_signature)
            .field("update_frequency", &self.update_frequency)
            .field("max_sets", &self.instances.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(DescriptorSet: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::null_context;
    use crate::root_signature::RootSignatureDesc;
    use crate::shader::{
        BinaryShaderDesc, BinaryShaderStageDesc, Shader, ShaderReflection, ShaderResource, ShaderStage,
    };
    use crate::types::{BufferDesc, ResourceMemoryUsage, TextureDesc, TextureFormat};

    fn root_signature(context: &Arc<RendererContext>) -> RootSignature {
        let reflection = ShaderReflection::new(ShaderStage::COMP)
            .with_resource(ShaderResource::new("params", DescriptorType::UNIFORM_BUFFER, 3, 0))
            .with_resource(ShaderResource::new("inputs", DescriptorType::TEXTURE, 3, 1).with_size(2))
            .with_resource(ShaderResource::new("frame", DescriptorType::UNIFORM_BUFFER, 1, 0));
        let shader = Shader::create(
            context,
            &BinaryShaderDesc::new("cs").with_stage(
                BinaryShaderStageDesc::new(ShaderStage::COMP, vec![1u8]).with_reflection(reflection),
            ),
        )
        .unwrap();
        RootSignature::create(context, &RootSignatureDesc::new(&[&shader])).unwrap()
    }

    fn uniform(context: &Arc<RendererContext>) -> Buffer {
        Buffer::create(
            context,
            &BufferDesc::new(256, ResourceMemoryUsage::CpuToGpu, DescriptorType::UNIFORM_BUFFER),
        )
        .unwrap()
    }

    #[test]
    fn test_ring_instances_are_isolated() {
        let context = null_context();
        let rs = root_signature(&context);
        let set = DescriptorSet::create(
            &context,
            &DescriptorSetDesc::new(&rs, DescriptorUpdateFrequency::PerDraw, 3),
        )
        .unwrap();
        let buffers: Vec<Buffer> = (0..3).map(|_| uniform(&context)).collect();
        for (index, buffer) in buffers.iter().enumerate() {
            set.update(index as u32, &[DescriptorData::buffers("params", &[buffer])]);
        }
        for (index, buffer) in buffers.iter().enumerate() {
            let bound = set.bound(index as u32, DescriptorSlot::Name("params"), 0).unwrap();
            assert_eq!(bound.resource, buffer.id());
            assert_eq!(bound.kind, BoundKind::Buffer);
        }
    }

    #[test]
    fn test_array_offset_and_index_slot() {
        let context = null_context();
        let rs = root_signature(&context);
        let set = DescriptorSet::create(
            &context,
            &DescriptorSetDesc::new(&rs, DescriptorUpdateFrequency::PerDraw, 1),
        )
        .unwrap();
        let texture = Texture::create(&context, &TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm)).unwrap();
        let index = rs.descriptor_index("inputs").unwrap();
        set.update(0, &[DescriptorData::textures(index, &[&texture]).with_array_offset(1)]);
        assert_eq!(set.bound(0, DescriptorSlot::Index(index), 0), None);
        assert_eq!(
            set.bound(0, DescriptorSlot::Index(index), 1).map(|b| b.resource),
            Some(texture.id())
        );
    }

    #[test]
    fn test_bound_on_other_frequency_is_none() {
        let context = null_context();
        let rs = root_signature(&context);
        let set = DescriptorSet::create(
            &context,
            &DescriptorSetDesc::new(&rs, DescriptorUpdateFrequency::PerFrame, 1),
        )
        .unwrap();
        let buffer = uniform(&context);
        set.update(0, &[DescriptorData::buffers("frame", &[&buffer])]);

        // "inputs" lives in the PerDraw table, which this set does not hold.
        assert_eq!(set.bound(0, DescriptorSlot::Name("inputs"), 0), None);
        assert_eq!(set.bound(0, DescriptorSlot::Name("inputs"), 1), None);
        assert_eq!(set.bound(0, DescriptorSlot::Name("params"), 0), None);
        assert_eq!(
            set.bound(0, DescriptorSlot::Name("frame"), 0).map(|b| b.resource),
            Some(buffer.id())
        );
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn test_count_overflow_is_violation() {
        let context = null_context();
        let rs = root_signature(&context);
        let set = DescriptorSet::create(
            &context,
            &DescriptorSetDesc::new(&rs, DescriptorUpdateFrequency::PerDraw, 1),
        )
        .unwrap();
        let texture = Texture::create(&context, &TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm)).unwrap();
        set.update(0, &[DescriptorData::textures("inputs", &[&texture, &texture, &texture])]);
    }

    #[test]
    #[should_panic(expected = "cannot be bound")]
    fn test_type_mismatch_is_violation() {
        let context = null_context();
        let rs = root_signature(&context);
        let set = DescriptorSet::create(
            &context,
            &DescriptorSetDesc::new(&rs, DescriptorUpdateFrequency::PerDraw, 1),
        )
        .unwrap();
        // created with BUFFER views only
        let buffer = Buffer::create(&context, &BufferDesc::upload(256)).unwrap();
        set.update(0, &[DescriptorData::buffers("params", &[&buffer])]);
    }

    #[test]
    #[should_panic(expected = "belongs to PerFrame")]
    fn test_other_frequency_is_violation() {
        let context = null_context();
        let rs = root_signature(&context);
        let set = DescriptorSet::create(
            &context,
            &DescriptorSetDesc::new(&rs, DescriptorUpdateFrequency::PerDraw, 1),
        )
        .unwrap();
        let buffer = uniform(&context);
        set.update(0, &[DescriptorData::buffers("frame", &[&buffer])]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_index_past_max_sets_is_violation() {
        let context = null_context();
        let rs = root_signature(&context);
        let set = DescriptorSet::create(
            &context,
            &DescriptorSetDesc::new(&rs, DescriptorUpdateFrequency::PerDraw, 2),
        )
        .unwrap();
        set.update(2, &[]);
    }
}
