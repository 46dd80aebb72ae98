//! Common utilities for RHI integration tests.
//!
//! Every test runs against both in-tree backends through [`TestContext`].

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use parking_lot::Mutex;
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawWindowHandle, WebWindowHandle,
    WindowHandle,
};

use redlilium_rhi::{
    BinaryShaderDesc, BinaryShaderStageDesc, Buffer, BufferDesc, Cmd, CmdDesc, CmdPool, CmdPoolDesc,
    Fence, GraphicsPipelineDesc, LogType, Pipeline, PipelineCache, PipelineDesc, Queue, QueueDesc,
    QueueSubmitDesc, QueueType, RenderTarget, RenderTargetDesc, Renderer, RendererApi, RendererDesc,
    RootSignature, RootSignatureDesc, Shader, ShaderReflection, ShaderStage, SoftwareBackendConfig,
    TextureFormat, ValidationMode,
};

static LOGGER: Once = Once::new();

/// Route `log` output to the test harness.
pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
    });
}

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Backends the tests run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Implicit tracking, nothing executes.
    Null,
    /// Explicit barriers, real memory.
    Software,
}

impl Backend {
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Null => true,
            Backend::Software => cfg!(feature = "software-backend"),
        }
    }

    pub fn api(self) -> RendererApi {
        match self {
            Backend::Null => RendererApi::Null,
            Backend::Software => RendererApi::Software,
        }
    }

    /// Whether command streams actually execute and produce data.
    pub fn executes(self) -> bool {
        self == Backend::Software
    }

    pub fn renderer_desc(self) -> RendererDesc {
        RendererDesc::new()
            .with_api(self.api())
            .with_validation(ValidationMode::Enabled)
            .with_wait_timeout(Duration::from_secs(5))
            .with_software_config(SoftwareBackendConfig::default())
    }
}

// ============================================================================
// Log capture
// ============================================================================

/// Messages received through the renderer's log callback.
#[derive(Clone, Default)]
pub struct LogCapture {
    messages: Arc<Mutex<Vec<(LogType, String, String)>>>,
}

impl LogCapture {
    pub fn callback(&self) -> redlilium_rhi::LogCallback {
        let messages = Arc::clone(&self.messages);
        Arc::new(move |ty: LogType, component: &str, message: &str| {
            messages.lock().push((ty, component.to_string(), message.to_string()));
        })
    }

    pub fn warnings(&self) -> Vec<String> {
        self.of_type(LogType::Warning)
    }

    pub fn errors(&self) -> Vec<String> {
        self.of_type(LogType::Error)
    }

    fn of_type(&self, ty: LogType) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(t, _, _)| *t == ty)
            .map(|(_, _, message)| message.clone())
            .collect()
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A renderer with one graphics queue and a command pool for it.
pub struct TestContext {
    pub backend: Backend,
    pub log: LogCapture,
    pub renderer: Renderer,
    pub queue: Queue,
    pub pool: CmdPool,
}

impl TestContext {
    /// Returns `None` if the backend is not compiled in.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_desc(backend, backend.renderer_desc())
    }

    pub fn with_desc(backend: Backend, desc: RendererDesc) -> Option<Self> {
        if !backend.is_available() {
            return None;
        }
        init_logging();
        let log = LogCapture::default();
        let renderer = Renderer::new("rhi-tests", &desc.with_log_fn(log.callback())).ok()?;
        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).ok()?;
        let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(&queue)).ok()?;
        Some(Self {
            backend,
            log,
            renderer,
            queue,
            pool,
        })
    }

    pub fn cmd(&self) -> Cmd {
        self.renderer
            .add_cmd(&CmdDesc::new(&self.pool))
            .expect("Failed to allocate command buffer")
    }

    pub fn fence(&self) -> Fence {
        self.renderer.add_fence().expect("Failed to create fence")
    }

    /// Submit `cmds` on the graphics queue and wait for them to finish.
    pub fn submit_and_wait(&self, cmds: &[&Cmd]) {
        let fence = self.fence();
        self.renderer
            .queue_submit(&self.queue, &QueueSubmitDesc::new(cmds).with_signal_fence(&fence))
            .expect("Submission failed");
        self.renderer.wait_for_fences(&[&fence]).expect("Fence wait failed");
    }

    pub fn render_target(&self, width: u32, height: u32, format: TextureFormat) -> Arc<RenderTarget> {
        self.renderer
            .add_render_target(&RenderTargetDesc::new(width, height, format))
            .expect("Failed to create render target")
    }

    pub fn readback(&self, size: u64) -> Arc<Buffer> {
        self.renderer
            .add_buffer(&BufferDesc::readback(size))
            .expect("Failed to create readback buffer")
    }

    /// A vertex + fragment shader without bindings.
    pub fn graphics_shader(&self, code: &[u8]) -> Shader {
        self.renderer
            .add_shader_binary(
                &BinaryShaderDesc::new("solid")
                    .with_stage(
                        BinaryShaderStageDesc::new(ShaderStage::VERT, code.to_vec())
                            .with_reflection(ShaderReflection::new(ShaderStage::VERT)),
                    )
                    .with_stage(
                        BinaryShaderStageDesc::new(ShaderStage::FRAG, code.to_vec())
                            .with_reflection(ShaderReflection::new(ShaderStage::FRAG)),
                    ),
            )
            .expect("Failed to create shader")
    }

    pub fn root_signature(&self, shaders: &[&Shader]) -> RootSignature {
        self.renderer
            .add_root_signature(&RootSignatureDesc::new(shaders))
            .expect("Failed to create root signature")
    }

    /// A graphics pipeline writing one color target of `format`.
    pub fn graphics_pipeline(
        &self,
        shader: &Shader,
        root_signature: &RootSignature,
        format: TextureFormat,
        cache: Option<&PipelineCache>,
    ) -> Pipeline {
        let formats = [format];
        let mut desc = PipelineDesc::graphics(
            GraphicsPipelineDesc::new(shader, root_signature).with_color_formats(&formats),
        );
        if let Some(cache) = cache {
            desc = desc.with_cache(cache);
        }
        self.renderer.add_pipeline(&desc).expect("Failed to create pipeline")
    }
}

// ============================================================================
// Window
// ============================================================================

/// A window that only provides handles.
pub struct FakeWindow;

impl HasWindowHandle for FakeWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let raw = RawWindowHandle::Web(WebWindowHandle::new(1));
        // SAFETY: a web handle is an id with no resources behind it.
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for FakeWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        Ok(DisplayHandle::web())
    }
}

/// The RGBA8 bytes of pixel `(x, y)` in a tightly packed image.
pub fn rgba8_pixel(data: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * width + x) * 4) as usize;
    [data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]
}
