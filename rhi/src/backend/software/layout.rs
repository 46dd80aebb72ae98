//! Image layouts, access masks and pipeline stages.
//!
//! The software backend keeps one [`ImageLayout`] per texture subresource and
//! moves it only when a barrier says so. Commands that touch an image check
//! the layout they find and report a mismatch instead of silently fixing it,
//! which is what an explicit-barrier driver would do to the contents.

use bitflags::bitflags;

use crate::types::ResourceState;

/// Physical arrangement of an image subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(usize)]
pub(crate) enum ImageLayout {
    /// Contents undefined. Can transition to any layout.
    #[default]
    Undefined = 0,
    ColorAttachment = 1,
    DepthStencilAttachment = 2,
    /// Depth testing and sampling without writes.
    DepthStencilReadOnly = 3,
    ShaderReadOnly = 4,
    TransferSrc = 5,
    TransferDst = 6,
    PresentSrc = 7,
    /// Any access, least optimal.
    General = 8,
}

bitflags! {
    /// Memory accesses made visible or available by a barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub(crate) struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const SHADER_READ = 1 << 4;
        const SHADER_WRITE = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 7;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 8;
        const TRANSFER_READ = 1 << 9;
        const TRANSFER_WRITE = 1 << 10;
        const ACCELERATION_STRUCTURE_READ = 1 << 11;
        const MEMORY_READ = 1 << 12;
    }
}

bitflags! {
    /// Pipeline stages that must finish (source) or wait (destination).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub(crate) struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
        const TRANSFER = 1 << 9;
        const BOTTOM_OF_PIPE = 1 << 10;
        const ALL_COMMANDS = 1 << 11;
    }
}

impl ImageLayout {
    /// The layout an image must be in to be used in `state`.
    ///
    /// Write states win over read states; mixed read states fall back to
    /// the most general read layout that covers all of them.
    pub(crate) fn from_state(state: ResourceState, is_depth: bool) -> Self {
        if state.is_empty() {
            return Self::Undefined;
        }
        if state.contains(ResourceState::UNORDERED_ACCESS) {
            return Self::General;
        }
        if state.contains(ResourceState::RENDER_TARGET) {
            return Self::ColorAttachment;
        }
        if state.contains(ResourceState::DEPTH_WRITE) {
            return Self::DepthStencilAttachment;
        }
        if state.contains(ResourceState::COPY_DEST) {
            return Self::TransferDst;
        }
        if state.contains(ResourceState::PRESENT) {
            return Self::PresentSrc;
        }
        if state.contains(ResourceState::DEPTH_READ) {
            return Self::DepthStencilReadOnly;
        }
        if state == ResourceState::COPY_SOURCE {
            return Self::TransferSrc;
        }
        if state.intersects(ResourceState::SHADER_RESOURCE) {
            return if is_depth {
                Self::DepthStencilReadOnly
            } else {
                Self::ShaderReadOnly
            };
        }
        if state.contains(ResourceState::COPY_SOURCE) {
            return Self::TransferSrc;
        }
        Self::General
    }

    /// Access mask of the layout (as source).
    pub(crate) fn src_access_mask(self) -> AccessFlags {
        match self {
            Self::Undefined | Self::PresentSrc => AccessFlags::empty(),
            Self::ColorAttachment => AccessFlags::COLOR_ATTACHMENT_WRITE,
            Self::DepthStencilAttachment => AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            Self::DepthStencilReadOnly => AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            Self::ShaderReadOnly => AccessFlags::SHADER_READ,
            Self::TransferSrc => AccessFlags::TRANSFER_READ,
            Self::TransferDst => AccessFlags::TRANSFER_WRITE,
            Self::General => AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
        }
    }

    /// Access mask of the layout (as destination).
    pub(crate) fn dst_access_mask(self) -> AccessFlags {
        match self {
            Self::PresentSrc => AccessFlags::MEMORY_READ,
            Self::DepthStencilAttachment => {
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            other => other.src_access_mask(),
        }
    }

    pub(crate) fn src_stage(self) -> PipelineStages {
        match self {
            Self::Undefined => PipelineStages::TOP_OF_PIPE,
            Self::ColorAttachment => PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthStencilAttachment => PipelineStages::LATE_FRAGMENT_TESTS,
            Self::DepthStencilReadOnly => PipelineStages::EARLY_FRAGMENT_TESTS,
            Self::ShaderReadOnly => PipelineStages::FRAGMENT_SHADER,
            Self::TransferSrc | Self::TransferDst => PipelineStages::TRANSFER,
            Self::PresentSrc => PipelineStages::BOTTOM_OF_PIPE,
            Self::General => PipelineStages::COMPUTE_SHADER,
        }
    }

    pub(crate) fn dst_stage(self) -> PipelineStages {
        match self {
            Self::DepthStencilAttachment => PipelineStages::EARLY_FRAGMENT_TESTS,
            other => other.src_stage(),
        }
    }

    /// Whether a render pass may write the image in this layout.
    pub(crate) fn is_attachment_writable(self, is_depth: bool) -> bool {
        match self {
            Self::General => true,
            Self::ColorAttachment => !is_depth,
            Self::DepthStencilAttachment => is_depth,
            _ => false,
        }
    }

    /// Whether a copy may read the image in this layout.
    pub(crate) fn is_copy_readable(self) -> bool {
        matches!(self, Self::TransferSrc | Self::General)
    }
}

/// Access mask of a buffer in `state`.
pub(crate) fn buffer_access_mask(state: ResourceState) -> AccessFlags {
    let mut access = AccessFlags::empty();
    let pairs = [
        (ResourceState::VERTEX_AND_CONSTANT_BUFFER, AccessFlags::VERTEX_ATTRIBUTE_READ | AccessFlags::UNIFORM_READ),
        (ResourceState::INDEX_BUFFER, AccessFlags::INDEX_READ),
        (ResourceState::UNORDERED_ACCESS, AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE),
        (ResourceState::SHADER_RESOURCE, AccessFlags::SHADER_READ),
        (ResourceState::INDIRECT_ARGUMENT, AccessFlags::INDIRECT_COMMAND_READ),
        (ResourceState::COPY_DEST, AccessFlags::TRANSFER_WRITE),
        (ResourceState::COPY_SOURCE, AccessFlags::TRANSFER_READ),
        (
            ResourceState::RAYTRACING_ACCELERATION_STRUCTURE,
            AccessFlags::ACCELERATION_STRUCTURE_READ,
        ),
    ];
    for (bits, mask) in pairs {
        if state.intersects(bits) {
            access |= mask;
        }
    }
    access
}

/// Pipeline stages that touch a buffer in `state`.
pub(crate) fn buffer_stages(state: ResourceState) -> PipelineStages {
    let mut stages = PipelineStages::empty();
    if state.intersects(ResourceState::VERTEX_AND_CONSTANT_BUFFER | ResourceState::INDEX_BUFFER) {
        stages |= PipelineStages::VERTEX_INPUT | PipelineStages::VERTEX_SHADER;
    }
    if state.intersects(ResourceState::SHADER_RESOURCE | ResourceState::UNORDERED_ACCESS) {
        stages |= PipelineStages::VERTEX_SHADER | PipelineStages::FRAGMENT_SHADER | PipelineStages::COMPUTE_SHADER;
    }
    if state.contains(ResourceState::INDIRECT_ARGUMENT) {
        stages |= PipelineStages::DRAW_INDIRECT;
    }
    if state.intersects(ResourceState::COPY_DEST | ResourceState::COPY_SOURCE) {
        stages |= PipelineStages::TRANSFER;
    }
    if state.intersects(ResourceState::COMMON | ResourceState::STREAM_OUT) {
        stages |= PipelineStages::ALL_COMMANDS;
    }
    if stages.is_empty() {
        PipelineStages::TOP_OF_PIPE
    } else {
        stages
    }
}
