//! Render target resource.

use std::sync::Arc;

use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{NativeHandle, ResourceId};
use crate::renderer::FormatCapabilities;
use crate::types::{ClearValue, RenderTargetDesc, SampleCount, TextureFormat};

use super::Texture;

/// A texture that can be bound as a color or depth/stencil attachment.
pub struct RenderTarget {
    texture: Texture,
    desc: RenderTargetDesc,
}

impl RenderTarget {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &RenderTargetDesc) -> GraphicsResult<Self> {
        let caps = context.backend.format_capabilities(desc.format);
        if !caps.contains(FormatCapabilities::RENDER_TARGET_WRITE) {
            return Err(GraphicsError::InvalidParameter(format!(
                "{:?} cannot be used as a render target",
                desc.format
            )));
        }
        if let ClearValue::DepthStencil { .. } = desc.clear_value {
            if !desc.format.is_depth_stencil() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "depth/stencil clear value on color format {:?}",
                    desc.format
                )));
            }
        }
        let texture = Texture::create(context, &desc.texture_desc())?;
        log::trace!("RenderTarget: created {} {:?}", texture.id(), desc.name);
        Ok(Self {
            texture,
            desc: desc.clone(),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.texture.id()
    }

    pub fn native(&self) -> NativeHandle {
        self.texture.native()
    }

    /// The texture backing this render target.
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn desc(&self) -> &RenderTargetDesc {
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

    pub fn sample_count(&self) -> SampleCount {
        self.desc.sample_count
    }

    pub fn clear_value(&self) -> ClearValue {
        self.desc.clear_value
    }

    pub fn name(&self) -> Option<String> {
        self.texture.name()
    }

    pub(crate) fn set_name(&self, name: &str) {
        self.texture.set_name(name);
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("id", &self.id())
            .field("width", &self.desc.width)
            .field("height", &self.desc.height)
            .field("format", &self.desc.format)
            .field("name", &self.name())
            .finish()
    }
}

static_assertions::assert_impl_all!(RenderTarget: Send, Sync);
