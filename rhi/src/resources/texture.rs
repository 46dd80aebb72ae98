//! GPU texture resource.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::allocator::{AllocationKind, AllocationRequest, MemoryAllocation};
use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{NativeHandle, ResourceId};
use crate::renderer::FormatCapabilities;
use crate::types::{
    DescriptorType, Extent3d, ResourceMemoryUsage, TextureCreationFlags, TextureDesc, TextureFormat,
};

/// Number of mip levels in a full chain for the given extent.
pub fn max_mip_levels(extent: Extent3d) -> u32 {
    let largest = extent.width.max(extent.height).max(extent.depth).max(1);
    32 - largest.leading_zeros()
}

/// Bytes needed to store every subresource of a texture.
pub(crate) fn texture_byte_size(desc: &TextureDesc) -> u64 {
    let extent = desc.extent();
    let per_layer: u64 = (0..desc.mip_levels)
        .map(|mip| extent.mip_level(mip).texel_count() * desc.format.block_size() as u64)
        .sum();
    per_layer * desc.array_size as u64 * desc.sample_count.count() as u64
}

/// A GPU texture resource.
///
/// Textures are created by [`crate::Renderer::add_texture`]. Render targets
/// and swapchain images are backed by a `Texture` as well.
pub struct Texture {
    context: Arc<RendererContext>,
    id: ResourceId,
    native: NativeHandle,
    desc: TextureDesc,
    allocation: MemoryAllocation,
    name: RwLock<Option<String>>,
}

impl Texture {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &TextureDesc) -> GraphicsResult<Self> {
        validate_desc(context, desc)?;
        context.check_node(desc.node_index, "add_texture");

        let allocation = context.allocator.allocate(&AllocationRequest {
            size: texture_byte_size(desc),
            alignment: 0,
            usage: ResourceMemoryUsage::GpuOnly,
            kind: AllocationKind::Texture,
            dedicated: desc.flags.contains(TextureCreationFlags::OWN_MEMORY),
            name: desc.name.as_deref(),
        })?;

        let native = match context.backend.create_texture(desc) {
            Ok(native) => native,
            Err(err) => {
                context.allocator.free(&allocation);
                return Err(err);
            }
        };

        let id = context.ids.next_id();
        context.validator.register_resource(id, desc.start_state);
        if let Some(name) = &desc.name {
            context.backend.set_debug_name(native, name);
        }

        log::trace!(
            "Texture: created {id} {:?} ({}x{}x{}, {:?}, mips={}, layers={})",
            desc.name,
            desc.width,
            desc.height,
            desc.depth,
            desc.format,
            desc.mip_levels,
            desc.array_size
        );

        Ok(Self {
            context: Arc::clone(context),
            id,
            native,
            desc: desc.clone(),
            allocation,
            name: RwLock::new(desc.name.clone()),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Backend handle.
    pub fn native(&self) -> NativeHandle {
        self.native
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn extent(&self) -> Extent3d {
        self.desc.extent()
    }

    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    pub fn array_size(&self) -> u32 {
        self.desc.array_size
    }

    pub fn allocation(&self) -> &MemoryAllocation {
        &self.allocation
    }

    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.write() = Some(name.to_string());
        self.context.backend.set_debug_name(self.native, name);
    }
}

fn validate_desc(context: &RendererContext, desc: &TextureDesc) -> GraphicsResult<()> {
    if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
        return Err(GraphicsError::InvalidParameter(format!(
            "texture dimensions cannot be zero ({}x{}x{})",
            desc.width, desc.height, desc.depth
        )));
    }
    if desc.array_size == 0 || desc.mip_levels == 0 {
        return Err(GraphicsError::InvalidParameter(
            "texture array size and mip level count must be at least 1".to_string(),
        ));
    }
    if desc.depth > 1 && desc.array_size > 1 {
        return Err(GraphicsError::InvalidParameter(
            "3D textures cannot be arrays".to_string(),
        ));
    }
    if desc.format == TextureFormat::Undefined {
        return Err(GraphicsError::InvalidParameter(
            "texture format cannot be undefined".to_string(),
        ));
    }
    let max_mips = max_mip_levels(desc.extent());
    if desc.mip_levels > max_mips {
        return Err(GraphicsError::InvalidParameter(format!(
            "{} mip levels requested, extent allows {max_mips}",
            desc.mip_levels
        )));
    }
    if desc.sample_count.count() > 1 && desc.mip_levels > 1 {
        return Err(GraphicsError::InvalidParameter(
            "multisampled textures cannot have mip levels".to_string(),
        ));
    }
    let caps = context.backend.format_capabilities(desc.format);
    if desc.descriptors.contains(DescriptorType::RW_TEXTURE)
        && !caps.contains(FormatCapabilities::SHADER_WRITE)
    {
        return Err(GraphicsError::InvalidParameter(format!(
            "{:?} does not support shader writes",
            desc.format
        )));
    }
    if desc.descriptors.contains(DescriptorType::TEXTURE)
        && !caps.contains(FormatCapabilities::SHADER_READ)
    {
        return Err(GraphicsError::InvalidParameter(format!(
            "{:?} cannot be sampled",
            desc.format
        )));
    }
    Ok(())
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.context.validator.unregister_resource(self.id);
        self.context.backend.destroy_texture(self.native);
        self.context.allocator.free(&self.allocation);
        log::trace!("Texture: destroyed {}", self.id);
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("extent", &self.desc.extent())
            .field("format", &self.desc.format)
            .field("name", &*self.name.read())
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
