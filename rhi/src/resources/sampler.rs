//! Sampler resource.

use std::sync::Arc;

use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{NativeHandle, ResourceId};
use crate::types::SamplerDesc;

/// Immutable filtering state.
pub struct Sampler {
    context: Arc<RendererContext>,
    id: ResourceId,
    native: NativeHandle,
    desc: SamplerDesc,
}

impl Sampler {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &SamplerDesc) -> GraphicsResult<Self> {
        if !(0.0..=SamplerDesc::MAX_ANISOTROPY).contains(&desc.max_anisotropy) {
            return Err(GraphicsError::InvalidParameter(format!(
                "max anisotropy {} outside [0, {}]",
                desc.max_anisotropy,
                SamplerDesc::MAX_ANISOTROPY
            )));
        }
        if !desc.mip_lod_bias.is_finite() {
            return Err(GraphicsError::InvalidParameter(
                "mip LOD bias must be finite".to_string(),
            ));
        }
        let native = context.backend.create_sampler(desc)?;
        let id = context.ids.next_id();
        log::trace!("Sampler: created {id} {:?}", desc);
        Ok(Self {
            context: Arc::clone(context),
            id,
            native,
            desc: desc.clone(),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn native(&self) -> NativeHandle {
        self.native
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.context.backend.destroy_sampler(self.native);
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.id)
            .field("min_filter", &self.desc.min_filter)
            .field("mag_filter", &self.desc.mag_filter)
            .finish()
    }
}

static_assertions::assert_impl_all!(Sampler: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::null_context;

    #[test]
    fn test_anisotropy_range() {
        let context = null_context();
        assert!(Sampler::create(&context, &SamplerDesc::linear().with_anisotropy(16.0)).is_ok());
        assert!(matches!(
            Sampler::create(&context, &SamplerDesc::linear().with_anisotropy(32.0)),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }
}
