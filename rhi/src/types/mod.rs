//! Common types and descriptors.
//!
//! This module contains state flags, format enums, queue enums and the
//! descriptor structs consumed by the `add_*` entry points of
//! [`crate::Renderer`].

mod buffer;
mod common;
mod descriptor;
mod format;
mod indirect;
mod queue;
mod sampler;
mod state;
mod texture;

pub use buffer::{BufferCreationFlags, BufferDesc, IndexType, ResourceMemoryUsage};
pub use common::{
    Extent3d, LoadActionType, LoadActionsDesc, MAX_RENDER_TARGET_ATTACHMENTS, MAX_VERTEX_ATTRIBS,
    ScissorRect, Viewport,
};
pub use descriptor::{DescriptorType, DescriptorUpdateFrequency};
pub use format::TextureFormat;
pub use indirect::{IndirectDispatchArguments, IndirectDrawArguments, IndirectDrawIndexArguments};
pub use queue::{QueueDesc, QueueFlag, QueuePriority, QueueType};
pub use sampler::{AddressMode, CompareMode, FilterType, MipMapMode, SamplerDesc};
pub use state::ResourceState;
pub use texture::{
    ClearValue, RenderTargetDesc, SampleCount, TextureCreationFlags, TextureDesc,
};
