//! Presentable image chains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::{BackendSwapChain, SwapChainSurfaceDesc};
use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::ResourceId;
use crate::queue::Queue;
use crate::resources::RenderTarget;
use crate::sync::{Fence, FenceStatus, Semaphore};
use crate::types::{ClearValue, RenderTargetDesc, ResourceState, TextureFormat};

/// Images a swap chain may hold.
pub const MAX_SWAPCHAIN_IMAGES: u32 = 3;

/// Descriptor for [`crate::Renderer::add_swap_chain`].
#[derive(Debug, Clone, Copy)]
pub struct SwapChainDesc<'a> {
    /// Queues allowed to present this swap chain.
    pub present_queues: &'a [&'a Queue],
    pub width: u32,
    pub height: u32,
    pub image_count: u32,
    pub color_format: TextureFormat,
    pub color_clear_value: ClearValue,
    pub enable_vsync: bool,
}

impl<'a> SwapChainDesc<'a> {
    pub fn new(present_queues: &'a [&'a Queue], width: u32, height: u32) -> Self {
        Self {
            present_queues,
            width,
            height,
            image_count: 2,
            color_format: TextureFormat::Bgra8Unorm,
            color_clear_value: ClearValue::color(0.0, 0.0, 0.0, 1.0),
            enable_vsync: true,
        }
    }

    pub fn with_image_count(mut self, image_count: u32) -> Self {
        self.image_count = image_count;
        self
    }

    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    pub fn with_vsync(mut self, enabled: bool) -> Self {
        self.enable_vsync = enabled;
        self
    }
}

/// A chain of presentable render targets.
///
/// Images start in [`ResourceState::PRESENT`]. A frame transitions the
/// acquired image to `RENDER_TARGET` and back to `PRESENT` before
/// [`crate::Renderer::queue_present`].
pub struct SwapChain {
    context: Arc<RendererContext>,
    id: ResourceId,
    images: Vec<Arc<RenderTarget>>,
    present_queues: Vec<ResourceId>,
    vsync: AtomicBool,
    backend: Arc<dyn BackendSwapChain>,
}

impl SwapChain {
    pub(crate) fn create<W>(context: &Arc<RendererContext>, window: &W, desc: &SwapChainDesc<'_>) -> GraphicsResult<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        if desc.width == 0 || desc.height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "swap chain extent {}x{} is empty",
                desc.width, desc.height
            )));
        }
        if desc.image_count == 0 || desc.image_count > MAX_SWAPCHAIN_IMAGES {
            return Err(GraphicsError::InvalidParameter(format!(
                "swap chain image count {} outside 1..={MAX_SWAPCHAIN_IMAGES}",
                desc.image_count
            )));
        }
        if desc.present_queues.is_empty() {
            return Err(GraphicsError::InvalidParameter("swap chain has no present queue".to_string()));
        }
        for queue in desc.present_queues {
            context.validator.check(queue.queue_type().supports_graphics(), || {
                format!("add_swap_chain: present queue {} is a {:?} queue", queue.id(), queue.queue_type())
            });
        }

        let window_handle = window
            .window_handle()
            .map_err(|e| GraphicsError::InitializationFailed(format!("failed to get window handle: {e}")))?;
        let display_handle = window
            .display_handle()
            .map_err(|e| GraphicsError::InitializationFailed(format!("failed to get display handle: {e}")))?;

        let backend = context.backend.create_swap_chain(
            window_handle.as_raw(),
            display_handle.as_raw(),
            &SwapChainSurfaceDesc {
                width: desc.width,
                height: desc.height,
                image_count: desc.image_count,
                format: desc.color_format,
                vsync: desc.enable_vsync,
            },
        )?;

        let images = (0..desc.image_count)
            .map(|i| {
                RenderTarget::create(
                    context,
                    &RenderTargetDesc::new(desc.width, desc.height, desc.color_format)
                        .with_clear_value(desc.color_clear_value)
                        .with_start_state(ResourceState::PRESENT)
                        .with_name(format!("swapchain image {i}")),
                )
                .map(Arc::new)
            })
            .collect::<GraphicsResult<Vec<_>>>()?;

        let id = context.ids.next_id();
        log::debug!(
            "SwapChain: created {id} ({}x{}, {} images, {:?}, vsync {})",
            desc.width,
            desc.height,
            desc.image_count,
            desc.color_format,
            desc.enable_vsync
        );
        Ok(Self {
            context: Arc::clone(context),
            id,
            images,
            present_queues: desc.present_queues.iter().map(|q| q.id()).collect(),
            vsync: AtomicBool::new(desc.enable_vsync),
            backend,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn image(&self, index: u32) -> Option<&Arc<RenderTarget>> {
        self.images.get(index as usize)
    }

    pub fn images(&self) -> &[Arc<RenderTarget>] {
        &self.images
    }

    pub fn vsync(&self) -> bool {
        self.vsync.load(Ordering::Acquire)
    }

    /// Images handed to the presentation engine so far.
    pub fn presented_count(&self) -> u64 {
        self.backend.presented_count()
    }

    pub(crate) fn is_present_queue(&self, queue: ResourceId) -> bool {
        self.present_queues.contains(&queue)
    }

    pub(crate) fn backend(&self) -> &Arc<dyn BackendSwapChain> {
        &self.backend
    }

    pub(crate) fn toggle_vsync(&mut self) {
        let enabled = !self.vsync.load(Ordering::Acquire);
        self.vsync.store(enabled, Ordering::Release);
        self.backend.set_vsync(enabled);
        log::debug!("SwapChain {}: vsync {}", self.id, enabled);
    }

    /// Acquire the next image; signal `semaphore` and `fence` once it is available.
    #[track_caller]
    pub(crate) fn acquire_next_image(&self, semaphore: Option<&Semaphore>, fence: Option<&Fence>) -> GraphicsResult<u32> {
        self.context.check_alive("acquire_next_image");
        self.context.ensure_not_lost()?;
        if let Some(fence) = fence {
            let status = fence.status();
            self.context.validator.check(status != FenceStatus::Incomplete, || {
                format!("acquire_next_image: fence {} is still Incomplete", fence.id())
            });
        }

        let index = self.backend.acquire_next_image()?;
        if let Some(semaphore) = semaphore {
            semaphore.shared().reserve_signal();
            semaphore.shared().signal();
        }
        if let Some(fence) = fence {
            fence.shared().mark_submitted();
            fence.shared().signal();
        }
        log::trace!("SwapChain {}: acquired image {index}", self.id);
        Ok(index)
    }
}

impl std::fmt::Debug for SwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapChain")
            .field("id", &self.id)
            .field("images", &self.images.len())
            .field("vsync", &self.vsync())
            .finish()
    }
}

static_assertions::assert_impl_all!(SwapChain: Send, Sync);
