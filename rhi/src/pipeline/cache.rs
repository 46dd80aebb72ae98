//! Pipeline cache objects.

use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RendererContext;
use crate::error::GraphicsResult;
use crate::handle::{NativeHandle, ResourceId};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineCacheFlags: u32 {
        /// The application serializes all access to the cache.
        const EXTERNALLY_SYNCHRONIZED = 0x1;
    }
}

/// Descriptor for [`crate::Renderer::add_pipeline_cache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineCacheDesc<'a> {
    /// Blob previously returned by `get_pipeline_cache_data`, or empty.
    pub data: &'a [u8],
    pub flags: PipelineCacheFlags,
}

impl<'a> PipelineCacheDesc<'a> {
    pub fn from_data(data: &'a [u8]) -> Self {
        Self {
            data,
            flags: PipelineCacheFlags::empty(),
        }
    }
}

/// Lookup counters of a pipeline cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineCacheStats {
    /// Pipelines created from an existing entry.
    pub hits: u64,
    /// Pipelines that had to be compiled.
    pub misses: u64,
    pub entries: u64,
}

/// Backend blob cache for compiled pipeline state.
pub struct PipelineCache {
    context: Arc<RendererContext>,
    id: ResourceId,
    native: NativeHandle,
    flags: PipelineCacheFlags,
}

impl PipelineCache {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &PipelineCacheDesc<'_>) -> GraphicsResult<Self> {
        let native = context.backend.create_pipeline_cache(desc.data)?;
        let id = context.ids.next_id();
        log::trace!("PipelineCache: created {id} from {} byte blob", desc.data.len());
        Ok(Self {
            context: Arc::clone(context),
            id,
            native,
            flags: desc.flags,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn native(&self) -> NativeHandle {
        self.native
    }

    pub fn flags(&self) -> PipelineCacheFlags {
        self.flags
    }

    pub fn stats(&self) -> PipelineCacheStats {
        self.context.backend.pipeline_cache_stats(self.native)
    }

    /// Serialize the accumulated entries.
    pub(crate) fn data(&self) -> GraphicsResult<Vec<u8>> {
        self.context.backend.pipeline_cache_data(self.native)
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        self.context.backend.destroy_pipeline_cache(self.native);
    }
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .finish()
    }
}

/// 64-bit FNV-1a over a sequence of byte chunks.
pub(crate) fn fnv1a<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for chunk in chunks {
        for &byte in chunk {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

static_assertions::assert_impl_all!(PipelineCache: Send, Sync);
