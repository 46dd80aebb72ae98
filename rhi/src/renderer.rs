//! The renderer: a logical GPU device and the entry point for every object.
//!
//! A [`Renderer`] owns the backend chosen at creation, the validation state
//! and the memory allocator. Objects created through it keep the device
//! context alive, so dropping the renderer first is allowed: their backend
//! storage is still released, but any further use of them is a contract
//! violation.

use std::sync::Arc;
use std::time::Instant;

use bitflags::bitflags;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::allocator::{format_memory_stats, BudgetAllocator, MemoryAllocator, MemoryStats};
use crate::backend::null::NullBackend;
use crate::backend::Backend;
use crate::command::{Cmd, CmdDesc, CmdPool, CmdPoolDesc, CmdState};
use crate::command_signature::{CommandSignature, CommandSignatureDesc};
use crate::config::{GpuMode, RendererApi, RendererDesc};
use crate::context::RendererContext;
use crate::descriptor_set::{DescriptorData, DescriptorSet, DescriptorSetDesc};
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::ResourceId;
use crate::logging::Logger;
use crate::pipeline::{Pipeline, PipelineCache, PipelineCacheDesc, PipelineDesc};
use crate::profiling::profile_function;
use crate::query::{QueryPool, QueryPoolDesc};
use crate::queue::{Queue, QueuePresentDesc, QueueSubmitDesc};
use crate::resources::{Buffer, RenderTarget, Sampler, Texture};
use crate::root_signature::{RootSignature, RootSignatureDesc};
use crate::shader::{BinaryShaderDesc, Shader};
use crate::swapchain::{SwapChain, SwapChainDesc};
use crate::sync::{Fence, FenceStatus, Semaphore};
use crate::types::{
    BufferDesc, QueueDesc, RenderTargetDesc, ResourceState, SamplerDesc, TextureDesc, TextureFormat,
};
use crate::validation::Validator;

/// Coarse performance class of a GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum GpuPresetLevel {
    #[default]
    None,
    /// Below the supported minimum.
    Office,
    Low,
    Medium,
    High,
    Ultra,
}

/// Identity of the adapter behind a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GpuVendorPreset {
    pub vendor_id: String,
    pub model_id: String,
    /// Empty when the adapter reports none.
    pub revision_id: String,
    pub preset_level: GpuPresetLevel,
    pub gpu_name: String,
    pub driver_version: String,
}

impl GpuVendorPreset {
    pub fn new(vendor_id: &str, model_id: &str, gpu_name: &str) -> Self {
        Self {
            vendor_id: vendor_id.to_string(),
            model_id: model_id.to_string(),
            gpu_name: gpu_name.to_string(),
            preset_level: GpuPresetLevel::Medium,
            driver_version: crate::VERSION.to_string(),
            ..Self::default()
        }
    }
}

bitflags! {
    /// Subgroup operations available to shaders.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WaveOpsSupportFlags: u32 {
        const BASIC = 0x1;
        const VOTE = 0x2;
        const ARITHMETIC = 0x4;
        const BALLOT = 0x8;
        const SHUFFLE = 0x10;
        const SHUFFLE_RELATIVE = 0x20;
        const CLUSTERED = 0x40;
        const QUAD = 0x80;
    }
}

/// How a backend handles hazards between commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierModel {
    /// The driver tracks hazards; barrier records are accepted and ignored.
    Implicit,
    /// Barrier records are translated and executed as recorded.
    Explicit,
}

bitflags! {
    /// What a texture format can be used for on the active device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatCapabilities: u32 {
        const SHADER_READ = 0x1;
        const SHADER_WRITE = 0x2;
        const RENDER_TARGET_WRITE = 0x4;
        const LINEAR_FILTER = 0x8;
        const BLEND = 0x10;
    }
}

/// Limits and capabilities of the active device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuSettings {
    pub vendor: GpuVendorPreset,
    pub linked_node_count: u32,
    pub barrier_model: BarrierModel,
    pub uniform_buffer_alignment: u32,
    pub upload_buffer_texture_alignment: u32,
    pub upload_buffer_texture_row_alignment: u32,
    pub max_vertex_input_bindings: u32,
    pub max_root_signature_dwords: u32,
    pub wave_lane_count: u32,
    pub wave_ops: WaveOpsSupportFlags,
    pub multi_draw_indirect: bool,
    pub tessellation_supported: bool,
    pub geometry_shader_supported: bool,
    pub raytracing_supported: bool,
    pub hdr_supported: bool,
    pub timestamp_queries: bool,
    pub occlusion_queries: bool,
    pub pipeline_statistics_queries: bool,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            vendor: GpuVendorPreset::default(),
            linked_node_count: 1,
            barrier_model: BarrierModel::Implicit,
            uniform_buffer_alignment: 256,
            upload_buffer_texture_alignment: 16,
            upload_buffer_texture_row_alignment: 1,
            max_vertex_input_bindings: 16,
            max_root_signature_dwords: 64,
            wave_lane_count: 32,
            wave_ops: WaveOpsSupportFlags::BASIC
                | WaveOpsSupportFlags::VOTE
                | WaveOpsSupportFlags::ARITHMETIC
                | WaveOpsSupportFlags::BALLOT,
            multi_draw_indirect: true,
            tessellation_supported: false,
            geometry_shader_supported: false,
            raytracing_supported: false,
            hdr_supported: false,
            timestamp_queries: true,
            occlusion_queries: true,
            pipeline_statistics_queries: true,
        }
    }
}

/// A logical GPU device.
///
/// Creation and removal functions are `&self` but are not meant to race
/// against each other on one renderer; recording and submission are.
///
/// # Example
///
/// ```ignore
/// let renderer = Renderer::new("app", &RendererDesc::new())?;
/// let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics))?;
/// let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(&queue))?;
/// let mut cmd = renderer.add_cmd(&CmdDesc::new(&pool))?;
/// let fence = renderer.add_fence()?;
/// cmd.begin();
/// cmd.end();
/// renderer.queue_submit(&queue, &QueueSubmitDesc::new(&[&cmd]).with_signal_fence(&fence))?;
/// renderer.wait_for_fences(&[&fence])?;
/// ```
pub struct Renderer {
    context: Arc<RendererContext>,
    app_name: String,
    api: RendererApi,
    gpu_mode: GpuMode,
}

impl Renderer {
    /// Create a renderer.
    ///
    /// # Errors
    ///
    /// `InitializationFailed` when the requested backend is not compiled in,
    /// `InvalidParameter` for an unusable descriptor.
    pub fn new(app_name: &str, desc: &RendererDesc) -> GraphicsResult<Self> {
        crate::profiling::init();
        let logger = Logger::new(desc.log_fn.clone());

        let linked_node_count = match desc.gpu_mode {
            GpuMode::Single => 1,
            GpuMode::Linked => desc.software.linked_node_count,
        };
        if linked_node_count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "linked GPU mode with zero nodes".to_string(),
            ));
        }
        if desc.wait_timeout.is_zero() {
            return Err(GraphicsError::InvalidParameter("wait timeout is zero".to_string()));
        }

        let backend: Box<dyn Backend> = match desc.api {
            RendererApi::Null => Box::new(NullBackend::new(linked_node_count, logger.clone())),
            RendererApi::Software => software_backend(desc, linked_node_count, &logger)?,
        };
        let allocator: Arc<dyn MemoryAllocator> = match &desc.allocator {
            Some(allocator) => Arc::clone(allocator),
            None => Arc::new(BudgetAllocator::new(desc.memory_budget)),
        };
        let validation = desc.validation.is_enabled();

        log::info!(
            "Renderer: creating '{app_name}' on {} ({:?}, {linked_node_count} node(s), validation {})",
            backend.name(),
            desc.gpu_mode,
            if validation { "on" } else { "off" }
        );

        let context = RendererContext::new(
            backend,
            Validator::new(validation, logger.clone()),
            logger,
            allocator,
            desc.shader_reflector.clone(),
            linked_node_count,
            desc.wait_timeout,
        );
        log::info!("Renderer: adapter '{}'", context.settings.vendor.gpu_name);

        Ok(Self {
            context: Arc::new(context),
            app_name: app_name.to_string(),
            api: desc.api,
            gpu_mode: desc.gpu_mode,
        })
    }

    /// Tear the renderer down. Equivalent to dropping it.
    pub fn remove_renderer(self) {}

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn api(&self) -> RendererApi {
        self.api
    }

    pub fn gpu_mode(&self) -> GpuMode {
        self.gpu_mode
    }

    pub fn gpu_settings(&self) -> &GpuSettings {
        &self.context.settings
    }

    pub fn linked_node_count(&self) -> u32 {
        self.context.linked_node_count
    }

    pub fn format_capabilities(&self, format: TextureFormat) -> FormatCapabilities {
        self.context.backend.format_capabilities(format)
    }

    pub fn is_validation_enabled(&self) -> bool {
        self.context.validator.enabled()
    }

    /// Objects created through this renderer that are still alive.
    ///
    /// Render targets count once for themselves and once for their texture.
    pub fn live_object_count(&self) -> usize {
        Arc::strong_count(&self.context) - 1
    }

    /// Last state the validation tracker saw for a resource. `None` when
    /// validation is off or the resource is unknown.
    pub fn tracked_state(&self, id: ResourceId) -> Option<ResourceState> {
        self.context.validator.tracked_state(id)
    }

    /// The device has failed and accepts no further work.
    pub fn is_device_lost(&self) -> bool {
        self.context.backend.is_lost()
    }

    // Queues and synchronization

    pub fn add_queue(&self, desc: &QueueDesc) -> GraphicsResult<Queue> {
        Queue::create(&self.context, desc)
    }

    pub fn remove_queue(&self, queue: Queue) {
        drop(queue);
    }

    pub fn add_fence(&self) -> GraphicsResult<Fence> {
        self.context.ensure_not_lost()?;
        Ok(Fence::create(&self.context))
    }

    pub fn remove_fence(&self, fence: Fence) {
        self.context.validator.check(fence.status() != FenceStatus::Incomplete, || {
            format!("remove_fence: fence {} is still Incomplete", fence.id())
        });
        drop(fence);
    }

    pub fn add_semaphore(&self) -> GraphicsResult<Semaphore> {
        self.context.ensure_not_lost()?;
        Ok(Semaphore::create(&self.context))
    }

    pub fn remove_semaphore(&self, semaphore: Semaphore) {
        drop(semaphore);
    }

    pub fn get_fence_status(&self, fence: &Fence) -> FenceStatus {
        fence.status()
    }

    /// Block until every fence is complete.
    ///
    /// Fences that were never submitted return immediately.
    ///
    /// # Errors
    ///
    /// `Timeout` after the configured wait timeout, `DeviceLost` when the
    /// device failed while waiting.
    pub fn wait_for_fences(&self, fences: &[&Fence]) -> GraphicsResult<()> {
        profile_function!();
        let deadline = Instant::now() + self.context.wait_timeout;
        for fence in fences {
            if !fence.shared().wait_until(deadline) {
                log::warn!("Renderer: timed out waiting for fence {}", fence.id());
                return Err(GraphicsError::Timeout);
            }
        }
        self.context.ensure_not_lost()
    }

    #[track_caller]
    pub fn queue_submit(&self, queue: &Queue, desc: &QueueSubmitDesc<'_>) -> GraphicsResult<()> {
        queue.submit(desc)
    }

    #[track_caller]
    pub fn queue_present(&self, queue: &Queue, desc: &QueuePresentDesc<'_>) -> GraphicsResult<()> {
        queue.present(desc)
    }

    pub fn wait_queue_idle(&self, queue: &Queue) -> GraphicsResult<()> {
        queue.wait_idle()
    }

    /// Timestamp query ticks per second on `queue`.
    pub fn get_timestamp_frequency(&self, queue: &Queue) -> f64 {
        queue.timestamp_frequency()
    }

    // Command buffers

    pub fn add_cmd_pool(&self, desc: &CmdPoolDesc<'_>) -> GraphicsResult<CmdPool> {
        self.context.ensure_not_lost()?;
        Ok(CmdPool::create(&self.context, desc))
    }

    pub fn remove_cmd_pool(&self, pool: CmdPool) {
        drop(pool);
    }

    pub fn add_cmd(&self, desc: &CmdDesc<'_>) -> GraphicsResult<Cmd> {
        self.context.ensure_not_lost()?;
        Ok(desc.pool.allocate(desc.secondary))
    }

    pub fn add_cmd_n(&self, desc: &CmdDesc<'_>, count: usize) -> GraphicsResult<Vec<Cmd>> {
        self.context.ensure_not_lost()?;
        Ok((0..count).map(|_| desc.pool.allocate(desc.secondary)).collect())
    }

    #[track_caller]
    pub fn remove_cmd(&self, cmd: Cmd) {
        let state = cmd.state();
        self.context.validator.check(state != CmdState::Pending, || {
            format!("remove_cmd: command buffer {} is still Pending", cmd.id())
        });
        drop(cmd);
    }

    #[track_caller]
    pub fn remove_cmd_n(&self, cmds: Vec<Cmd>) {
        for cmd in cmds {
            self.remove_cmd(cmd);
        }
    }

    /// Return every command buffer of `pool` to `Initial`.
    #[track_caller]
    pub fn reset_cmd_pool(&self, pool: &CmdPool) {
        self.context.check_alive("reset_cmd_pool");
        pool.reset();
    }

    // Resources

    pub fn add_buffer(&self, desc: &BufferDesc) -> GraphicsResult<Arc<Buffer>> {
        Buffer::create(&self.context, desc).map(Arc::new)
    }

    pub fn remove_buffer(&self, buffer: Arc<Buffer>) {
        release("buffer", buffer);
    }

    pub fn add_texture(&self, desc: &TextureDesc) -> GraphicsResult<Arc<Texture>> {
        Texture::create(&self.context, desc).map(Arc::new)
    }

    pub fn remove_texture(&self, texture: Arc<Texture>) {
        release("texture", texture);
    }

    pub fn add_render_target(&self, desc: &RenderTargetDesc) -> GraphicsResult<Arc<RenderTarget>> {
        RenderTarget::create(&self.context, desc).map(Arc::new)
    }

    pub fn remove_render_target(&self, render_target: Arc<RenderTarget>) {
        release("render target", render_target);
    }

    pub fn add_sampler(&self, desc: &SamplerDesc) -> GraphicsResult<Arc<Sampler>> {
        Sampler::create(&self.context, desc).map(Arc::new)
    }

    pub fn remove_sampler(&self, sampler: Arc<Sampler>) {
        release("sampler", sampler);
    }

    /// `(used_bytes, total_allocated_bytes)` of the memory allocator.
    pub fn calculate_memory_use(&self) -> (u64, u64) {
        let stats = self.memory_stats();
        (stats.used_bytes, stats.total_allocated_bytes)
    }

    /// Human-readable allocator report.
    pub fn calculate_memory_stats(&self) -> String {
        format_memory_stats(&self.memory_stats())
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.context.allocator.stats()
    }

    pub fn set_buffer_name(&self, buffer: &Buffer, name: &str) {
        buffer.set_name(name);
    }

    pub fn set_texture_name(&self, texture: &Texture, name: &str) {
        texture.set_name(name);
    }

    pub fn set_render_target_name(&self, render_target: &RenderTarget, name: &str) {
        render_target.set_name(name);
    }

    pub fn set_pipeline_name(&self, pipeline: &Pipeline, name: &str) {
        pipeline.set_name(name);
    }

    // Shaders and binding

    pub fn add_shader_binary(&self, desc: &BinaryShaderDesc) -> GraphicsResult<Shader> {
        Shader::create(&self.context, desc)
    }

    pub fn remove_shader(&self, shader: Shader) {
        drop(shader);
    }

    pub fn add_root_signature(&self, desc: &RootSignatureDesc<'_>) -> GraphicsResult<RootSignature> {
        RootSignature::create(&self.context, desc)
    }

    pub fn remove_root_signature(&self, root_signature: RootSignature) {
        drop(root_signature);
    }

    pub fn add_descriptor_set(&self, desc: &DescriptorSetDesc<'_>) -> GraphicsResult<DescriptorSet> {
        DescriptorSet::create(&self.context, desc)
    }

    pub fn remove_descriptor_set(&self, set: DescriptorSet) {
        drop(set);
    }

    /// Write `params` into instance `index` of `set`.
    #[track_caller]
    pub fn update_descriptor_set(&self, index: u32, set: &DescriptorSet, params: &[DescriptorData<'_>]) {
        set.update(index, params);
    }

    // Pipelines

    pub fn add_pipeline(&self, desc: &PipelineDesc<'_>) -> GraphicsResult<Pipeline> {
        Pipeline::create(&self.context, desc)
    }

    pub fn remove_pipeline(&self, pipeline: Pipeline) {
        drop(pipeline);
    }

    pub fn add_pipeline_cache(&self, desc: &PipelineCacheDesc<'_>) -> GraphicsResult<PipelineCache> {
        PipelineCache::create(&self.context, desc)
    }

    pub fn remove_pipeline_cache(&self, cache: PipelineCache) {
        drop(cache);
    }

    /// Serialized contents of `cache`, loadable with [`Self::add_pipeline_cache`].
    pub fn get_pipeline_cache_data(&self, cache: &PipelineCache) -> GraphicsResult<Vec<u8>> {
        cache.data()
    }

    pub fn add_indirect_command_signature(
        &self,
        desc: &CommandSignatureDesc<'_>,
    ) -> GraphicsResult<CommandSignature> {
        CommandSignature::create(&self.context, desc)
    }

    pub fn remove_indirect_command_signature(&self, signature: CommandSignature) {
        drop(signature);
    }

    // Presentation and queries

    pub fn add_swap_chain<W>(&self, window: &W, desc: &SwapChainDesc<'_>) -> GraphicsResult<SwapChain>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        SwapChain::create(&self.context, window, desc)
    }

    pub fn remove_swap_chain(&self, swap_chain: SwapChain) {
        drop(swap_chain);
    }

    /// Index of the next backbuffer. `semaphore` and `fence` are signaled
    /// once it is available.
    #[track_caller]
    pub fn acquire_next_image(
        &self,
        swap_chain: &SwapChain,
        semaphore: Option<&Semaphore>,
        fence: Option<&Fence>,
    ) -> GraphicsResult<u32> {
        swap_chain.acquire_next_image(semaphore, fence)
    }

    pub fn toggle_vsync(&self, swap_chain: &mut SwapChain) {
        swap_chain.toggle_vsync();
    }

    /// Backbuffer format to request from [`Self::add_swap_chain`].
    pub fn get_recommended_swapchain_format(&self, hint_hdr: bool) -> TextureFormat {
        if hint_hdr && self.context.settings.hdr_supported {
            TextureFormat::Rgb10a2Unorm
        } else {
            TextureFormat::Bgra8Unorm
        }
    }

    pub fn add_query_pool(&self, desc: &QueryPoolDesc) -> GraphicsResult<QueryPool> {
        QueryPool::create(&self.context, desc)
    }

    pub fn remove_query_pool(&self, pool: QueryPool) {
        drop(pool);
    }
}

fn release<T>(what: &str, object: Arc<T>) {
    if Arc::strong_count(&object) > 1 {
        log::trace!("Renderer: {what} removed while still referenced elsewhere");
    }
    drop(object);
}

#[cfg(feature = "software-backend")]
fn software_backend(desc: &RendererDesc, node_count: u32, logger: &Logger) -> GraphicsResult<Box<dyn Backend>> {
    use crate::backend::software::SoftwareBackend;
    Ok(Box::new(SoftwareBackend::new(
        &desc.software,
        node_count,
        desc.wait_timeout,
        logger.clone(),
    )))
}

#[cfg(not(feature = "software-backend"))]
fn software_backend(_desc: &RendererDesc, _node_count: u32, _logger: &Logger) -> GraphicsResult<Box<dyn Backend>> {
    Err(GraphicsError::InitializationFailed(
        "software backend not compiled in (enable the `software-backend` feature)".to_string(),
    ))
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.context.validator.report_unmatched_transfers();
        let live = self.live_object_count();
        if live > 0 {
            self.context.logger.warn(
                "renderer",
                &format!("'{}' removed with {live} live object(s)", self.app_name),
            );
        }
        self.context.mark_destroyed();
        log::info!("Renderer: '{}' removed", self.app_name);
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("app_name", &self.app_name)
            .field("api", &self.api)
            .field("gpu_mode", &self.gpu_mode)
            .field("context", &self.context)
            .finish()
    }
}

static_assertions::assert_impl_all!(Renderer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationMode;
    use crate::types::{DescriptorType, QueueType, ResourceMemoryUsage};

    fn null_renderer() -> Renderer {
        Renderer::new(
            "unit",
            &RendererDesc::new()
                .with_api(RendererApi::Null)
                .with_validation(ValidationMode::Enabled),
        )
        .unwrap()
    }

    #[test]
    fn test_linked_mode_node_count() {
        let renderer = Renderer::new(
            "linked",
            &RendererDesc::new()
                .with_api(RendererApi::Null)
                .with_gpu_mode(GpuMode::Linked),
        )
        .unwrap();
        assert_eq!(renderer.linked_node_count(), 2);
        assert_eq!(renderer.gpu_settings().linked_node_count, 2);
        assert_eq!(null_renderer().linked_node_count(), 1);
    }

    #[test]
    fn test_live_object_count() {
        let renderer = null_renderer();
        assert_eq!(renderer.live_object_count(), 0);
        let buffer = renderer
            .add_buffer(&BufferDesc::upload(64))
            .unwrap();
        let fence = renderer.add_fence().unwrap();
        assert_eq!(renderer.live_object_count(), 2);
        renderer.remove_buffer(buffer);
        renderer.remove_fence(fence);
        assert_eq!(renderer.live_object_count(), 0);
    }

    #[test]
    fn test_unsubmitted_fence_wait_returns() {
        let renderer = null_renderer();
        let fence = renderer.add_fence().unwrap();
        assert_eq!(renderer.get_fence_status(&fence), FenceStatus::NotSubmitted);
        renderer.wait_for_fences(&[&fence]).unwrap();
    }

    #[test]
    fn test_memory_use_tracks_buffers() {
        let renderer = null_renderer();
        let buffer = renderer
            .add_buffer(&BufferDesc::new(
                1000,
                ResourceMemoryUsage::GpuOnly,
                DescriptorType::empty(),
            ))
            .unwrap();
        let (used, allocated) = renderer.calculate_memory_use();
        assert_eq!(used, 1000);
        assert!(allocated >= used);
        assert!(renderer.calculate_memory_stats().contains("used bytes: 1000"));
        drop(buffer);
        assert_eq!(renderer.calculate_memory_use(), (0, 0));
    }

    #[test]
    fn test_recommended_swapchain_format() {
        let renderer = null_renderer();
        assert_eq!(renderer.get_recommended_swapchain_format(true), TextureFormat::Bgra8Unorm);
        assert_eq!(renderer.get_recommended_swapchain_format(false), TextureFormat::Bgra8Unorm);
    }

    #[test]
    fn test_queue_node_out_of_range() {
        let renderer = null_renderer();
        let desc = QueueDesc {
            node_index: 3,
            ..QueueDesc::new(QueueType::Graphics)
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| renderer.add_queue(&desc)));
        assert!(result.is_err());
    }
}
