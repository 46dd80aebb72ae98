//! Descriptor types and update frequencies.

use bitflags::bitflags;

bitflags! {
    /// Binding kinds. Used both as the declared type of a root signature slot
    /// and as the set of views a buffer or texture is created with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorType: u32 {
        const UNDEFINED = 0;
        const SAMPLER = 0x01;
        /// SRV read-only texture.
        const TEXTURE = 0x02;
        /// UAV texture.
        const RW_TEXTURE = 0x04;
        /// SRV read-only buffer.
        const BUFFER = 0x08;
        const BUFFER_RAW = 0x08 | 0x10;
        /// UAV buffer.
        const RW_BUFFER = 0x20;
        const RW_BUFFER_RAW = 0x20 | 0x40;
        const UNIFORM_BUFFER = 0x80;
        /// Push constant / root constant.
        const ROOT_CONSTANT = 0x100;
        const VERTEX_BUFFER = 0x200;
        const INDEX_BUFFER = 0x400;
        const INDIRECT_BUFFER = 0x800;
        const TEXTURE_CUBE = 0x02 | 0x1000;
        const RENDER_TARGET_MIP_SLICES = 0x2000;
        const RENDER_TARGET_ARRAY_SLICES = 0x4000;
        const RENDER_TARGET_DEPTH_SLICES = 0x8000;
        const RAY_TRACING = 0x10000;
    }
}

impl DescriptorType {
    /// Slot types a texture (or render target) can be bound to.
    pub const TEXTURE_SLOTS: Self = Self::TEXTURE
        .union(Self::RW_TEXTURE)
        .union(Self::TEXTURE_CUBE);

    /// Slot types a buffer can be bound to.
    pub const BUFFER_SLOTS: Self = Self::BUFFER_RAW
        .union(Self::RW_BUFFER_RAW)
        .union(Self::UNIFORM_BUFFER);

    /// Returns true for slots that take textures.
    pub fn is_texture_slot(self) -> bool {
        !self.is_empty() && Self::TEXTURE_SLOTS.contains(self)
    }

    /// Returns true for slots that take buffers.
    pub fn is_buffer_slot(self) -> bool {
        !self.is_empty() && Self::BUFFER_SLOTS.contains(self)
    }

    /// Returns true for writable (UAV) slots.
    pub fn is_read_write(self) -> bool {
        self.intersects(Self::RW_TEXTURE | Self::RW_BUFFER)
    }
}

/// How often a group of bindings is expected to change.
///
/// Bindings are grouped by tier so that rarely changing tables can stay
/// resident while per-draw tables are refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DescriptorUpdateFrequency {
    #[default]
    None,
    PerFrame,
    PerBatch,
    PerDraw,
}

impl DescriptorUpdateFrequency {
    /// Number of tiers.
    pub const COUNT: usize = 4;

    pub const ALL: [Self; Self::COUNT] = [Self::None, Self::PerFrame, Self::PerBatch, Self::PerDraw];

    /// Tier for a reflected binding set / register space. Spaces past the
    /// last tier fold into `PerDraw`.
    pub fn from_set_index(set: u32) -> Self {
        match set {
            0 => Self::None,
            1 => Self::PerFrame,
            2 => Self::PerBatch,
            _ => Self::PerDraw,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}
