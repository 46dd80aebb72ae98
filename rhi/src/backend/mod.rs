//! GPU backend abstraction layer.
//!
//! The frontend validates, tracks and records. Everything that touches
//! device memory or executes work goes through the [`Backend`] trait, chosen
//! once at renderer creation.
//!
//! # Available Backends
//!
//! - `null`: implicit hazard tracking, accepts every barrier flag and ignores
//!   it, completes submissions synchronously inside `queue_submit`
//! - `software` (feature `software-backend`, default): explicit barriers
//!   translated to image layouts, real memory, one worker thread per queue,
//!   persistent pipeline cache
//!
//! Objects are referred to by [`NativeHandle`]; the frontend never looks
//! inside them.

pub(crate) mod null;
#[cfg(feature = "software-backend")]
pub(crate) mod software;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::error::GraphicsResult;
use crate::handle::NativeHandle;
use crate::pipeline::{PipelineCacheStats, PipelineCompileDesc};
use crate::query::QueryPoolDesc;
use crate::queue::{PresentWork, QueueWork};
use crate::renderer::{FormatCapabilities, GpuSettings};
use crate::types::{BufferDesc, QueueDesc, SamplerDesc, TextureDesc, TextureFormat};

/// Device-level backend entry points.
pub(crate) trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn gpu_settings(&self) -> GpuSettings;

    fn format_capabilities(&self, format: TextureFormat) -> FormatCapabilities {
        default_format_capabilities(format)
    }

    /// Ticks per second of timestamp query values.
    fn timestamp_frequency(&self) -> f64;

    /// The device failed and accepts no further work.
    fn is_lost(&self) -> bool;

    fn set_debug_name(&self, handle: NativeHandle, name: &str);

    // Resources
    fn create_buffer(&self, desc: &BufferDesc) -> GraphicsResult<NativeHandle>;
    fn destroy_buffer(&self, handle: NativeHandle);
    fn write_buffer(&self, handle: NativeHandle, offset: u64, data: &[u8]) -> GraphicsResult<()>;
    fn read_buffer(&self, handle: NativeHandle, offset: u64, size: u64) -> GraphicsResult<Vec<u8>>;
    fn create_texture(&self, desc: &TextureDesc) -> GraphicsResult<NativeHandle>;
    fn destroy_texture(&self, handle: NativeHandle);
    fn create_sampler(&self, desc: &SamplerDesc) -> GraphicsResult<NativeHandle>;
    fn destroy_sampler(&self, handle: NativeHandle);

    // Pipelines
    fn create_pipeline(
        &self,
        desc: &PipelineCompileDesc,
        cache: Option<NativeHandle>,
    ) -> GraphicsResult<NativeHandle>;
    fn destroy_pipeline(&self, handle: NativeHandle);
    fn create_pipeline_cache(&self, data: &[u8]) -> GraphicsResult<NativeHandle>;
    fn pipeline_cache_data(&self, handle: NativeHandle) -> GraphicsResult<Vec<u8>>;
    fn pipeline_cache_stats(&self, handle: NativeHandle) -> PipelineCacheStats;
    fn destroy_pipeline_cache(&self, handle: NativeHandle);

    // Queries
    fn create_query_pool(&self, desc: &QueryPoolDesc) -> GraphicsResult<NativeHandle>;
    fn destroy_query_pool(&self, handle: NativeHandle);

    // Submission
    fn create_queue(&self, desc: &QueueDesc) -> GraphicsResult<Box<dyn BackendQueue>>;
    fn create_swap_chain(
        &self,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        desc: &SwapChainSurfaceDesc,
    ) -> GraphicsResult<Arc<dyn BackendSwapChain>>;
}

/// Backend side of a [`crate::Queue`]. Calls are serialized by the queue.
pub(crate) trait BackendQueue: Send + Sync {
    /// Execute `work`, then call [`QueueWork::complete`]. May return before
    /// the work has executed.
    fn submit(&self, work: QueueWork) -> GraphicsResult<()>;

    /// Present after all previously submitted work, then call
    /// [`PresentWork::complete`].
    fn present(&self, work: PresentWork) -> GraphicsResult<()>;
}

/// Backend side of a [`crate::SwapChain`].
pub(crate) trait BackendSwapChain: Send + Sync {
    /// Index of the next image the presentation engine releases.
    fn acquire_next_image(&self) -> GraphicsResult<u32>;

    fn present(&self, image_index: u32) -> GraphicsResult<()>;

    fn set_vsync(&self, enabled: bool);

    /// Images handed back by `present` so far.
    fn presented_count(&self) -> u64;
}

/// The part of a swapchain descriptor a backend needs to create its surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SwapChainSurfaceDesc {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) image_count: u32,
    pub(crate) format: TextureFormat,
    pub(crate) vsync: bool,
}

/// Swap chain without a presentation engine.
///
/// Both in-tree backends present to nothing: images are handed out round
/// robin and presents are counted. The window only has to provide handles.
#[derive(Debug)]
pub(crate) struct HeadlessSwapChain {
    image_count: u32,
    next: AtomicU32,
    presented: AtomicU64,
    vsync: AtomicBool,
}

impl HeadlessSwapChain {
    pub(crate) fn new(desc: &SwapChainSurfaceDesc) -> Self {
        Self {
            image_count: desc.image_count.max(1),
            next: AtomicU32::new(0),
            presented: AtomicU64::new(0),
            vsync: AtomicBool::new(desc.vsync),
        }
    }
}

impl BackendSwapChain for HeadlessSwapChain {
    fn acquire_next_image(&self) -> GraphicsResult<u32> {
        Ok(self.next.fetch_add(1, Ordering::AcqRel) % self.image_count)
    }

    fn present(&self, image_index: u32) -> GraphicsResult<()> {
        self.presented.fetch_add(1, Ordering::AcqRel);
        log::trace!(
            "HeadlessSwapChain: presented image {image_index} (vsync {})",
            self.vsync.load(Ordering::Relaxed)
        );
        Ok(())
    }

    fn set_vsync(&self, enabled: bool) {
        self.vsync.store(enabled, Ordering::Release);
    }

    fn presented_count(&self) -> u64 {
        self.presented.load(Ordering::Acquire)
    }
}

/// Capabilities shared by both in-tree backends.
pub(crate) fn default_format_capabilities(format: TextureFormat) -> FormatCapabilities {
    if format == TextureFormat::Undefined {
        return FormatCapabilities::empty();
    }
    if format.is_depth_stencil() {
        return FormatCapabilities::SHADER_READ | FormatCapabilities::RENDER_TARGET_WRITE;
    }
    let mut caps = FormatCapabilities::SHADER_READ
        | FormatCapabilities::RENDER_TARGET_WRITE
        | FormatCapabilities::LINEAR_FILTER
        | FormatCapabilities::BLEND;
    if !format.is_srgb() {
        caps |= FormatCapabilities::SHADER_WRITE;
    }
    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_capabilities() {
        assert!(default_format_capabilities(TextureFormat::Undefined).is_empty());
        let depth = default_format_capabilities(TextureFormat::Depth32Float);
        assert!(depth.contains(FormatCapabilities::RENDER_TARGET_WRITE));
        assert!(!depth.contains(FormatCapabilities::SHADER_WRITE));
        assert!(!default_format_capabilities(TextureFormat::Rgba8UnormSrgb)
            .contains(FormatCapabilities::SHADER_WRITE));
        assert!(default_format_capabilities(TextureFormat::Rgba16Float).contains(FormatCapabilities::BLEND));
    }

    #[test]
    fn test_headless_swap_chain_round_robin() {
        let chain = HeadlessSwapChain::new(&SwapChainSurfaceDesc {
            width: 4,
            height: 4,
            image_count: 3,
            format: TextureFormat::Bgra8Unorm,
            vsync: true,
        });
        let order: Vec<u32> = (0..4).map(|_| chain.acquire_next_image().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2, 0]);
        chain.present(0).unwrap();
        chain.present(1).unwrap();
        assert_eq!(chain.presented_count(), 2);
    }
}
