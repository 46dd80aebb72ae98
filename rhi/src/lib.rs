//! # RedLilium RHI
//!
//! Render hardware interface: one object model for command submission,
//! resource lifetime and state synchronization over backends with very
//! different hazard-tracking models.
//!
//! ## Overview
//!
//! - [`Renderer`] - the logical device; every `add_*`/`remove_*` entry point
//! - [`Cmd`] - command recording with the Initial, Recording, Executable,
//!   Pending, Completed state machine
//! - [`BufferBarrier`], [`TextureBarrier`], [`RenderTargetBarrier`] - caller
//!   supplied state transitions, including split barriers and queue ownership
//!   transfer
//! - [`RootSignature`] and [`DescriptorSet`] - binding layouts tiered by update
//!   frequency, and ring instances of their tables
//! - [`Pipeline`] and [`PipelineCache`] - compute, graphics and raytracing
//!   pipelines with a persistent cache
//!
//! Resource states are never inferred: each barrier states the state the
//! resource is in and the one it moves to. With validation enabled a side
//! tracker checks those claims and panics on a mismatch.
//!
//! ## Backends
//!
//! - `Null`: implicit tracking, barriers accepted and ignored, submissions
//!   complete synchronously
//! - `Software` (feature `software-backend`, default): explicit barriers,
//!   real memory, one worker thread per queue
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_rhi::*;
//!
//! let renderer = Renderer::new("demo", &RendererDesc::new().with_api(RendererApi::Software))?;
//! let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics))?;
//! let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(&queue))?;
//! let mut cmd = renderer.add_cmd(&CmdDesc::new(&pool))?;
//! let target = renderer.add_render_target(&RenderTargetDesc::new(64, 64, TextureFormat::Rgba8Unorm))?;
//!
//! cmd.begin();
//! cmd.resource_barrier(&[], &[], &[RenderTargetBarrier::transition(
//!     &target, ResourceState::UNDEFINED, ResourceState::RENDER_TARGET)]);
//! // bind targets, pipeline, draw ...
//! cmd.end();
//! ```

pub mod allocator;
mod backend;
pub mod barrier;
pub mod command;
pub mod command_signature;
pub mod config;
mod context;
pub mod descriptor_set;
pub mod error;
pub mod handle;
pub mod logging;
pub mod pipeline;
pub mod profiling;
pub mod query;
pub mod queue;
pub mod renderer;
pub mod resources;
pub mod root_signature;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod types;
pub mod validation;

pub use allocator::{
    AllocationKind, AllocationRequest, BudgetAllocator, MemoryAllocation, MemoryAllocator,
    MemoryBudget, MemoryHeap, MemoryStats,
};
pub use barrier::{BufferBarrier, RenderTargetBarrier, Subresource, TextureBarrier};
pub use command::{BindRenderTargetsDesc, Cmd, CmdDesc, CmdPool, CmdPoolDesc, CmdState};
pub use command_signature::{CommandSignature, CommandSignatureDesc, IndirectArgument, IndirectCommandType};
pub use config::{GpuMode, RendererApi, RendererDesc, SoftwareBackendConfig, ValidationMode};
pub use descriptor_set::{
    BoundDescriptor, BoundKind, DescriptorData, DescriptorResources, DescriptorSet, DescriptorSetDesc,
    DescriptorSlot,
};
pub use error::{GraphicsError, GraphicsResult};
pub use handle::{NativeHandle, ResourceId};
pub use logging::{LogCallback, LogType, Logger};
pub use pipeline::{
    ComputePipelineDesc, GraphicsPipelineDesc, Pipeline, PipelineCache, PipelineCacheDesc,
    PipelineCacheFlags, PipelineCacheStats, PipelineDesc, PipelineShape, PipelineType,
    RaytracingPipelineDesc, VertexLayout,
};
pub use query::{QueryPool, QueryPoolDesc, QueryType};
pub use queue::{Queue, QueuePresentDesc, QueueSubmitDesc};
pub use renderer::{
    BarrierModel, FormatCapabilities, GpuPresetLevel, GpuSettings, GpuVendorPreset, Renderer,
    WaveOpsSupportFlags,
};
pub use resources::{Buffer, RenderTarget, Sampler, Texture};
pub use root_signature::{DescriptorInfo, RootSignature, RootSignatureDesc, RootSignatureFlags};
pub use shader::{
    BinaryShaderDesc, BinaryShaderStageDesc, Shader, ShaderReflection, ShaderReflector, ShaderResource,
    ShaderStage,
};
pub use swapchain::{SwapChain, SwapChainDesc};
pub use sync::{Fence, FenceStatus, Semaphore};
pub use types::{
    BufferDesc, ClearValue, DescriptorType, DescriptorUpdateFrequency, Extent3d, IndexType,
    IndirectDispatchArguments, IndirectDrawArguments, IndirectDrawIndexArguments, LoadActionType,
    LoadActionsDesc, QueueDesc, QueueType, RenderTargetDesc, ResourceMemoryUsage, ResourceState,
    SampleCount, SamplerDesc, ScissorRect, TextureDesc, TextureFormat, Viewport,
};

/// RHI library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    static_assertions::assert_impl_all!(Buffer: Send, Sync);
    static_assertions::assert_impl_all!(Queue: Send, Sync);
    static_assertions::assert_impl_all!(Cmd: Send);
    static_assertions::assert_impl_all!(DescriptorSet: Send, Sync);
}
