//! Texture and render target descriptors.

use bitflags::bitflags;

use super::{DescriptorType, Extent3d, ResourceState, TextureFormat};

/// Multisample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleCount {
    #[default]
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
    X16 = 16,
}

impl SampleCount {
    pub fn count(self) -> u32 {
        self as u32
    }
}

bitflags! {
    /// Creation flags for textures and render targets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureCreationFlags: u32 {
        const NONE = 0;
        /// Dedicated allocation instead of sub-allocation.
        const OWN_MEMORY = 0x01;
        /// Memory shared with other processes.
        const EXPORT = 0x02;
        const EXPORT_ADAPTER = 0x04;
        const IMPORT = 0x08;
        /// Tile-memory only (transient attachment).
        const ON_TILE = 0x20;
        /// Disable framebuffer compression.
        const NO_COMPRESSION = 0x40;
        const FORCE_2D = 0x80;
        const FORCE_3D = 0x100;
        /// Usable as a display target.
        const ALLOW_DISPLAY_TARGET = 0x200;
        /// Create sRGB views.
        const SRGB = 0x400;
    }
}

/// Clear value for render targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// Clear color attachment with RGBA values.
    Color([f32; 4]),
    /// Clear depth/stencil attachment.
    DepthStencil { depth: f32, stencil: u32 },
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::Color([0.0, 0.0, 0.0, 0.0])
    }
}

impl ClearValue {
    /// Create a color clear value.
    pub fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Color([r, g, b, a])
    }

    /// Create a depth/stencil clear value.
    pub fn depth_stencil(depth: f32, stencil: u32) -> Self {
        Self::DepthStencil { depth, stencil }
    }

    /// Color components; depth/stencil values map to `[depth, stencil, 0, 0]`.
    pub fn as_rgba(&self) -> [f32; 4] {
        match *self {
            Self::Color(rgba) => rgba,
            Self::DepthStencil { depth, stencil } => [depth, stencil as f32, 0.0, 0.0],
        }
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    /// Debug name.
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Depth in texels; 1 for 1D/2D textures.
    pub depth: u32,
    pub array_size: u32,
    pub mip_levels: u32,
    pub sample_count: SampleCount,
    pub sample_quality: u32,
    pub format: TextureFormat,
    /// Optimized clear value.
    pub clear_value: ClearValue,
    /// State the texture is in right after creation.
    pub start_state: ResourceState,
    /// Views the texture must support.
    pub descriptors: DescriptorType,
    pub flags: TextureCreationFlags,
    pub node_index: u32,
    pub shared_node_indices: Vec<u32>,
}

impl TextureDesc {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            name: None,
            width,
            height,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            sample_count: SampleCount::X1,
            sample_quality: 0,
            format,
            clear_value: ClearValue::default(),
            start_state: ResourceState::UNDEFINED,
            descriptors: DescriptorType::TEXTURE,
            flags: TextureCreationFlags::NONE,
            node_index: 0,
            shared_node_indices: Vec::new(),
        }
    }

    /// Set the debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_levels = count;
        self
    }

    pub fn with_array_size(mut self, size: u32) -> Self {
        self.array_size = size;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_descriptors(mut self, descriptors: DescriptorType) -> Self {
        self.descriptors = descriptors;
        self
    }

    pub fn with_start_state(mut self, state: ResourceState) -> Self {
        self.start_state = state;
        self
    }

    pub fn with_sample_count(mut self, count: SampleCount) -> Self {
        self.sample_count = count;
        self
    }

    pub fn extent(&self) -> Extent3d {
        Extent3d::new_3d(self.width, self.height, self.depth)
    }
}

/// Descriptor for creating a render target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    /// Debug name.
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub mip_levels: u32,
    pub sample_count: SampleCount,
    pub sample_quality: u32,
    pub format: TextureFormat,
    /// Optimized clear value.
    pub clear_value: ClearValue,
    pub start_state: ResourceState,
    /// Additional views (e.g. `TEXTURE` to sample the target later).
    pub descriptors: DescriptorType,
    pub flags: TextureCreationFlags,
    pub node_index: u32,
    pub shared_node_indices: Vec<u32>,
}

impl RenderTargetDesc {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        let clear_value = if format.is_depth_stencil() {
            ClearValue::depth_stencil(1.0, 0)
        } else {
            ClearValue::default()
        };
        Self {
            name: None,
            width,
            height,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            sample_count: SampleCount::X1,
            sample_quality: 0,
            format,
            clear_value,
            start_state: ResourceState::UNDEFINED,
            descriptors: DescriptorType::UNDEFINED,
            flags: TextureCreationFlags::NONE,
            node_index: 0,
            shared_node_indices: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_clear_value(mut self, clear_value: ClearValue) -> Self {
        self.clear_value = clear_value;
        self
    }

    pub fn with_start_state(mut self, state: ResourceState) -> Self {
        self.start_state = state;
        self
    }

    pub fn with_descriptors(mut self, descriptors: DescriptorType) -> Self {
        self.descriptors = descriptors;
        self
    }

    pub fn with_array_size(mut self, size: u32) -> Self {
        self.array_size = size;
        self
    }

    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_levels = count;
        self
    }

    pub fn with_sample_count(mut self, count: SampleCount) -> Self {
        self.sample_count = count;
        self
    }

    pub fn with_flags(mut self, flags: TextureCreationFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The descriptor of the texture backing this render target.
    pub fn texture_desc(&self) -> TextureDesc {
        TextureDesc {
            name: self.name.clone(),
            width: self.width,
            height: self.height,
            depth: self.depth,
            array_size: self.array_size,
            mip_levels: self.mip_levels,
            sample_count: self.sample_count,
            sample_quality: self.sample_quality,
            format: self.format,
            clear_value: self.clear_value,
            start_state: self.start_state,
            descriptors: self.descriptors,
            flags: self.flags,
            node_index: self.node_index,
            shared_node_indices: self.shared_node_indices.clone(),
        }
    }
}
